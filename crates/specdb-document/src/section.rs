//! Specdb Document Section
//!
//! The in-memory document map of a store together with its indexes. Every
//! mutation validates all index constraints before it touches anything, so a
//! failed call leaves the section exactly as it was.
//!
//! The id index is implicit: it is always present at position zero, is
//! unique, and cannot be removed.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::index::{Index, IndexInfo, IndexOptions, Node};
use specdb_common::{Document, Result, SpecdbError, Value, ID};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// Section
// =============================================================================

/// Primary document storage keyed by id.
#[derive(Debug)]
pub struct Section {
    entries: BTreeMap<Value, Document>,
    indexes: Vec<Index>,
}

impl Section {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            indexes: vec![Index::new(vec![ID.to_string()], IndexOptions::unique())],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &Value) -> bool {
        self.entries.contains_key(id)
    }

    /// Get a document by id.
    pub fn load(&self, id: &Value) -> Result<&Document> {
        self.entries
            .get(id)
            .ok_or_else(|| SpecdbError::KeyNotFound(id.to_string()))
    }

    /// All documents in ascending id order.
    pub fn range(&self) -> impl Iterator<Item = &Document> {
        self.entries.values()
    }

    // -------------------------------------------------------------------------
    // Mutation
    // -------------------------------------------------------------------------

    /// Add a new document.
    pub fn store(&mut self, doc: Document) -> Result<Value> {
        let id = Self::id_of(&doc)?;
        if self.entries.contains_key(&id) {
            return Err(SpecdbError::KeyDuplicate(id.to_string()));
        }

        let targets = self.prepare(&doc, &id)?;
        for (index, accepted) in self.indexes.iter_mut().zip(targets) {
            if accepted {
                index.insert(&doc, id.clone());
            }
        }
        self.entries.insert(id.clone(), doc);
        Ok(id)
    }

    /// Replace an existing document, returning the previous version.
    pub fn swap(&mut self, doc: Document) -> Result<Document> {
        let id = Self::id_of(&doc)?;
        let Some(old) = self.entries.get(&id) else {
            return Err(SpecdbError::KeyNotFound(id.to_string()));
        };

        let targets = self.prepare(&doc, &id)?;
        for (index, accepted) in self.indexes.iter_mut().zip(targets) {
            index.remove(old, &id);
            if accepted {
                index.insert(&doc, id.clone());
            }
        }

        self.entries
            .insert(id.clone(), doc)
            .ok_or_else(|| SpecdbError::KeyNotFound(id.to_string()))
    }

    /// Remove a document, returning it.
    pub fn delete(&mut self, id: &Value) -> Result<Document> {
        let doc = self
            .entries
            .remove(id)
            .ok_or_else(|| SpecdbError::KeyNotFound(id.to_string()))?;
        for index in &mut self.indexes {
            index.remove(&doc, id);
        }
        Ok(doc)
    }

    fn id_of(doc: &Document) -> Result<Value> {
        doc.id()
            .cloned()
            .ok_or_else(|| SpecdbError::KeyMissing(ID.to_string()))
    }

    /// Decide, per index, whether `doc` goes in, failing on any unique
    /// violation.
    fn prepare(&self, doc: &Document, id: &Value) -> Result<Vec<bool>> {
        self.indexes
            .iter()
            .map(|index| {
                if !index.accepts(doc) {
                    return Ok(false);
                }
                if let Some(other) = index.conflict(doc, id) {
                    return Err(SpecdbError::KeyDuplicate(format!(
                        "{} conflicts with {} on index {:?}",
                        id,
                        other,
                        index.keys()
                    )));
                }
                Ok(true)
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // Index Management
    // -------------------------------------------------------------------------

    /// Declare an index, building it over existing documents.
    ///
    /// Re-declaring an existing key list rebuilds it with the new options.
    /// Declaring the id index is a no-op.
    pub fn index(&mut self, keys: Vec<String>, options: IndexOptions) -> Result<()> {
        if keys.is_empty() {
            return Err(SpecdbError::UnsupportedOperation(
                "index requires at least one key".to_string(),
            ));
        }
        if keys.len() == 1 && keys[0] == ID {
            return Ok(());
        }
        if let Some(filter) = &options.filter {
            crate::query::validate(filter)?;
        }

        let mut index = Index::new(keys, options);
        for (id, doc) in &self.entries {
            if !index.accepts(doc) {
                continue;
            }
            if let Some(other) = index.conflict(doc, id) {
                return Err(SpecdbError::KeyDuplicate(format!(
                    "{} conflicts with {} on index {:?}",
                    id,
                    other,
                    index.keys()
                )));
            }
            index.insert(doc, id.clone());
        }

        tracing::info!("Created index {:?} ({} entries)", index.keys(), index.len());
        self.indexes.retain(|existing| existing.keys() != index.keys());
        self.indexes.push(index);
        Ok(())
    }

    /// Remove an index. Returns false if no such index existed.
    pub fn unindex(&mut self, keys: &[String]) -> bool {
        if keys.len() == 1 && keys[0] == ID {
            return false;
        }
        let before = self.indexes.len();
        self.indexes.retain(|index| index.keys() != keys);
        let removed = self.indexes.len() != before;
        if removed {
            tracing::info!("Removed index {:?}", keys);
        }
        removed
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn index_info(&self) -> Vec<IndexInfo> {
        self.indexes.iter().map(Index::info).collect()
    }

    // -------------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------------

    /// Start an index scan bounding `key` to `[min, max]`.
    ///
    /// Returns `None` if no complete index leads with `key`.
    pub fn scan(&self, key: &str, min: Option<&Value>, max: Option<&Value>) -> Option<Scan<'_>> {
        let index = self.find_index(&[key])?;
        Some(Scan {
            section: self,
            index,
            ranges: vec![KeyRange::new(key, min, max)],
        })
    }

    fn find_index(&self, prefix: &[&str]) -> Option<&Index> {
        self.indexes
            .iter()
            .filter(|index| !index.is_partial())
            .find(|index| index.covers(prefix))
    }
}

impl Default for Section {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Scan
// =============================================================================

/// Inclusive bounds on one index key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyRange {
    pub key: String,
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl KeyRange {
    pub fn new(key: &str, min: Option<&Value>, max: Option<&Value>) -> Self {
        Self {
            key: key.to_string(),
            min: min.cloned(),
            max: max.cloned(),
        }
    }
}

/// A lazily evaluated walk over an index, restricted level by level.
#[derive(Debug)]
pub struct Scan<'a> {
    section: &'a Section,
    index: &'a Index,
    ranges: Vec<KeyRange>,
}

impl<'a> Scan<'a> {
    /// Restrict the next index level. Returns `None` if no complete index
    /// continues the current key prefix with `key`.
    pub fn scan(mut self, key: &str, min: Option<&Value>, max: Option<&Value>) -> Option<Scan<'a>> {
        let mut prefix: Vec<&str> = self.ranges.iter().map(|r| r.key.as_str()).collect();
        prefix.push(key);
        self.index = self.section.find_index(&prefix)?;
        self.ranges.push(KeyRange::new(key, min, max));
        Some(self)
    }

    /// Number of index levels restricted.
    pub fn depth(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[KeyRange] {
        &self.ranges
    }

    /// Keys of the index this scan walks.
    pub fn index_keys(&self) -> &'a [String] {
        self.index.keys()
    }

    fn nodes(&self) -> Vec<&'a Node> {
        let mut nodes = vec![self.index.root()];
        for range in &self.ranges {
            nodes = nodes
                .into_iter()
                .flat_map(|node| node.range(range.min.as_ref(), range.max.as_ref()))
                .collect();
        }
        nodes
    }

    /// Number of candidate documents the scan yields.
    pub fn estimate(&self) -> usize {
        self.nodes().iter().map(|node| node.len()).sum()
    }

    /// Candidate ids in ascending order.
    pub fn ids(&self) -> BTreeSet<&'a Value> {
        let mut ids = BTreeSet::new();
        for node in self.nodes() {
            node.collect_ids(&mut ids);
        }
        ids
    }

    /// Candidate documents in ascending id order.
    pub fn documents(&self) -> impl Iterator<Item = &'a Document> + 'a {
        let entries = &self.section.entries;
        self.ids().into_iter().filter_map(move |id| entries.get(id))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Document {
        Document::from_json(json).unwrap()
    }

    fn keys(keys: &[&str]) -> Vec<String> {
        keys.iter().map(|k| k.to_string()).collect()
    }

    fn create_test_section() -> Section {
        let mut section = Section::new();
        for (id, kind, version) in [("a", "x", 1), ("b", "y", 2), ("c", "x", 3), ("d", "y", 4)] {
            section
                .store(doc(json!({"id": id, "kind": kind, "version": version})))
                .unwrap();
        }
        section
    }

    #[test]
    fn test_store_and_load() {
        let section = create_test_section();
        assert_eq!(section.len(), 4);
        assert_eq!(
            section.load(&"b".into()).unwrap().get("kind"),
            Some(&Value::from("y"))
        );
        assert!(matches!(
            section.load(&"z".into()),
            Err(SpecdbError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_store_requires_id() {
        let mut section = Section::new();
        let err = section.store(doc(json!({"kind": "x"}))).unwrap_err();
        assert_eq!(err, SpecdbError::KeyMissing("id".to_string()));
    }

    #[test]
    fn test_store_duplicate_id() {
        let mut section = create_test_section();
        let err = section.store(doc(json!({"id": "a"}))).unwrap_err();
        assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
        assert_eq!(section.len(), 4);
    }

    #[test]
    fn test_swap_returns_previous() {
        let mut section = create_test_section();
        let old = section
            .swap(doc(json!({"id": "a", "kind": "z", "version": 9})))
            .unwrap();
        assert_eq!(old.get("kind"), Some(&Value::from("x")));
        assert_eq!(
            section.load(&"a".into()).unwrap().get("kind"),
            Some(&Value::from("z"))
        );

        let err = section.swap(doc(json!({"id": "q"}))).unwrap_err();
        assert!(matches!(err, SpecdbError::KeyNotFound(_)));
    }

    #[test]
    fn test_delete() {
        let mut section = create_test_section();
        let removed = section.delete(&"c".into()).unwrap();
        assert_eq!(removed.id(), Some(&Value::from("c")));
        assert!(!section.contains(&"c".into()));
        assert!(section.delete(&"c".into()).is_err());
    }

    #[test]
    fn test_unique_violation_leaves_section_untouched() {
        let mut section = create_test_section();
        section.index(keys(&["version"]), IndexOptions::unique()).unwrap();

        let err = section
            .store(doc(json!({"id": "e", "kind": "x", "version": 1})))
            .unwrap_err();
        assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
        assert_eq!(section.len(), 4);

        let err = section
            .swap(doc(json!({"id": "b", "kind": "y", "version": 3})))
            .unwrap_err();
        assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
        assert_eq!(
            section.load(&"b".into()).unwrap().get("version"),
            Some(&Value::Int(2))
        );
    }

    #[test]
    fn test_index_build_fails_on_existing_duplicates() {
        let mut section = create_test_section();
        let err = section.index(keys(&["kind"]), IndexOptions::unique()).unwrap_err();
        assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
        assert_eq!(section.indexes().len(), 1);
    }

    #[test]
    fn test_partial_unique_index() {
        let mut section = create_test_section();
        let options = IndexOptions::unique().with_filter(doc(json!({"kind": "x"})));
        section.index(keys(&["version"]), options).unwrap();

        // outside the filter, duplicates are allowed
        section
            .store(doc(json!({"id": "e", "kind": "y", "version": 1})))
            .unwrap();

        let err = section
            .store(doc(json!({"id": "f", "kind": "x", "version": 3})))
            .unwrap_err();
        assert!(matches!(err, SpecdbError::KeyDuplicate(_)));

        // partial indexes are never scanned
        assert!(section.scan("version", None, None).is_none());
    }

    #[test]
    fn test_partial_index_skips_mismatched_shapes() {
        let mut section = create_test_section();
        section
            .store(doc(json!({"id": "m1", "name": "n", "meta": "x"})))
            .unwrap();

        // building over a document whose meta is a scalar succeeds
        let options = IndexOptions::unique().with_filter(doc(json!({"meta": {"active": true}})));
        section.index(keys(&["name"]), options).unwrap();

        // so do later writes of the same shape, even on the same key
        section
            .store(doc(json!({"id": "m2", "name": "n", "meta": "x"})))
            .unwrap();
        section
            .store(doc(json!({"id": "m3", "name": "n", "meta": {"active": true}})))
            .unwrap();
        let err = section
            .store(doc(json!({"id": "m4", "name": "n", "meta": {"active": true}})))
            .unwrap_err();
        assert!(matches!(err, SpecdbError::KeyDuplicate(_)));
        assert!(section.load(&"m2".into()).is_ok());
    }

    #[test]
    fn test_index_and_unindex() {
        let mut section = create_test_section();
        section.index(keys(&["kind", "version"]), IndexOptions::new()).unwrap();
        assert_eq!(section.indexes().len(), 2);

        // re-declaring replaces
        section.index(keys(&["kind", "version"]), IndexOptions::new()).unwrap();
        assert_eq!(section.indexes().len(), 2);

        // id index is implicit
        section.index(keys(&["id"]), IndexOptions::new()).unwrap();
        assert_eq!(section.indexes().len(), 2);
        assert!(!section.unindex(&keys(&["id"])));

        assert!(section.unindex(&keys(&["kind", "version"])));
        assert!(!section.unindex(&keys(&["kind", "version"])));
        assert_eq!(section.index_info(), vec![IndexInfo {
            keys: keys(&["id"]),
            unique: true,
            partial: false,
        }]);
    }

    #[test]
    fn test_scan_single_level() {
        let mut section = create_test_section();
        section.index(keys(&["version"]), IndexOptions::new()).unwrap();

        let scan = section
            .scan("version", Some(&Value::Int(2)), Some(&Value::Int(3)))
            .unwrap();
        assert_eq!(scan.estimate(), 2);
        let ids: Vec<_> = scan.documents().filter_map(|d| d.id().cloned()).collect();
        assert_eq!(ids, vec![Value::from("b"), Value::from("c")]);

        assert!(section.scan("kind", None, None).is_none());
    }

    #[test]
    fn test_scan_chained() {
        let mut section = create_test_section();
        section.index(keys(&["kind", "version"]), IndexOptions::new()).unwrap();

        let kind = Value::from("y");
        let scan = section
            .scan("kind", Some(&kind), Some(&kind))
            .unwrap()
            .scan("version", Some(&Value::Int(3)), None)
            .unwrap();
        assert_eq!(scan.depth(), 2);
        let ids: Vec<_> = scan.ids().into_iter().cloned().collect();
        assert_eq!(ids, vec![Value::from("d")]);

        assert!(section
            .scan("kind", None, None)
            .unwrap()
            .scan("missing", None, None)
            .is_none());
    }

    #[test]
    fn test_scan_reflects_mutations() {
        let mut section = create_test_section();
        section.index(keys(&["kind"]), IndexOptions::new()).unwrap();
        section.delete(&"a".into()).unwrap();
        section
            .swap(doc(json!({"id": "b", "kind": "x", "version": 2})))
            .unwrap();

        let x = Value::from("x");
        let ids: Vec<_> = section
            .scan("kind", Some(&x), Some(&x))
            .unwrap()
            .ids()
            .into_iter()
            .cloned()
            .collect();
        assert_eq!(ids, vec![Value::from("b"), Value::from("c")]);
    }
}

//! Specdb Document Index
//!
//! Compound secondary indexes. An index over keys `[k1, ..., kn]` is a trie of
//! ordered maps: the first level is keyed by the value of `k1`, the next by
//! `k2`, and the leaves hold the ids of the documents carrying that exact key
//! tuple. Every node tracks how many ids live beneath it so that range
//! estimates are a sum over the nodes a scan would visit.
//!
//! Key Features:
//! - Missing fields are indexed under `null`
//! - Unique indexes reject a second id on the same key tuple
//! - Partial indexes only hold documents matching their filter
//! - Empty branches are pruned on removal
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::query;
use specdb_common::{Document, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

// =============================================================================
// Index Options
// =============================================================================

/// Options for declaring an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Reject two documents with the same key tuple.
    pub unique: bool,
    /// Only index documents matching this filter.
    pub filter: Option<Document>,
}

impl IndexOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique() -> Self {
        Self {
            unique: true,
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Description of a declared index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub keys: Vec<String>,
    pub unique: bool,
    pub partial: bool,
}

// =============================================================================
// Node
// =============================================================================

/// One level of the index trie.
#[derive(Debug, Default)]
pub(crate) struct Node {
    len: usize,
    children: BTreeMap<Value, Node>,
    ids: BTreeSet<Value>,
}

impl Node {
    /// Number of ids stored beneath this node.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn insert(&mut self, path: &[Value], id: Value) -> bool {
        let inserted = match path.split_first() {
            None => self.ids.insert(id),
            Some((head, rest)) => self
                .children
                .entry(head.clone())
                .or_default()
                .insert(rest, id),
        };
        if inserted {
            self.len += 1;
        }
        inserted
    }

    fn remove(&mut self, path: &[Value], id: &Value) -> bool {
        let removed = match path.split_first() {
            None => self.ids.remove(id),
            Some((head, rest)) => {
                let Some(child) = self.children.get_mut(head) else {
                    return false;
                };
                let removed = child.remove(rest, id);
                if child.len == 0 {
                    self.children.remove(head);
                }
                removed
            }
        };
        if removed {
            self.len -= 1;
        }
        removed
    }

    fn leaf(&self, path: &[Value]) -> Option<&Node> {
        match path.split_first() {
            None => Some(self),
            Some((head, rest)) => self.children.get(head)?.leaf(rest),
        }
    }

    /// Children whose key lies within the inclusive bounds.
    pub(crate) fn range(&self, min: Option<&Value>, max: Option<&Value>) -> Vec<&Node> {
        if let (Some(min), Some(max)) = (min, max) {
            if min > max {
                return Vec::new();
            }
        }
        let lower = min.map_or(Bound::Unbounded, Bound::Included);
        let upper = max.map_or(Bound::Unbounded, Bound::Included);
        self.children
            .range::<Value, _>((lower, upper))
            .map(|(_, node)| node)
            .collect()
    }

    /// Collect every id stored beneath this node.
    pub(crate) fn collect_ids<'a>(&'a self, out: &mut BTreeSet<&'a Value>) {
        out.extend(self.ids.iter());
        for child in self.children.values() {
            child.collect_ids(out);
        }
    }
}

// =============================================================================
// Index
// =============================================================================

/// A compound index over one or more (dotted) field paths.
#[derive(Debug)]
pub struct Index {
    keys: Vec<String>,
    unique: bool,
    filter: Option<Document>,
    root: Node,
}

impl Index {
    pub fn new(keys: Vec<String>, options: IndexOptions) -> Self {
        Self {
            keys,
            unique: options.unique,
            filter: options.filter,
            root: Node::default(),
        }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_partial(&self) -> bool {
        self.filter.is_some()
    }

    pub fn filter(&self) -> Option<&Document> {
        self.filter.as_ref()
    }

    /// Number of documents held by the index.
    pub fn len(&self) -> usize {
        self.root.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.len == 0
    }

    pub fn info(&self) -> IndexInfo {
        IndexInfo {
            keys: self.keys.clone(),
            unique: self.unique,
            partial: self.is_partial(),
        }
    }

    /// Check whether a document belongs in this index. A document the
    /// filter cannot be evaluated against is left out.
    pub fn accepts(&self, doc: &Document) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };
        match query::matches(doc, filter) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::debug!("Excluding document from index {:?}: {}", self.keys, e);
                false
            }
        }
    }

    /// Extract the key tuple of a document.
    pub fn key_of(&self, doc: &Document) -> Vec<Value> {
        self.keys
            .iter()
            .map(|key| doc.get(key).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// For unique indexes, find an id other than `id` already holding the
    /// key tuple of `doc`.
    pub fn conflict(&self, doc: &Document, id: &Value) -> Option<&Value> {
        if !self.unique {
            return None;
        }
        self.root
            .leaf(&self.key_of(doc))?
            .ids
            .iter()
            .find(|other| *other != id)
    }

    /// Add a document. Returns false if the id was already present.
    pub fn insert(&mut self, doc: &Document, id: Value) -> bool {
        let key = self.key_of(doc);
        self.root.insert(&key, id)
    }

    /// Remove a document. Returns false if it was not indexed.
    pub fn remove(&mut self, doc: &Document, id: &Value) -> bool {
        let key = self.key_of(doc);
        self.root.remove(&key, id)
    }

    pub(crate) fn root(&self) -> &Node {
        &self.root
    }

    /// Returns true if `prefix` is a leading run of this index's keys.
    pub fn covers(&self, prefix: &[&str]) -> bool {
        prefix.len() <= self.keys.len()
            && self.keys.iter().zip(prefix).all(|(key, p)| key == p)
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

    #[test]
    fn test_insert_and_remove() {
        let mut index = Index::new(keys(&["kind", "version"]), IndexOptions::new());
        let a = doc(json!({"id": "a", "kind": "x", "version": 1}));
        let b = doc(json!({"id": "b", "kind": "x", "version": 2}));

        assert!(index.insert(&a, "a".into()));
        assert!(index.insert(&b, "b".into()));
        assert!(!index.insert(&a, "a".into()));
        assert_eq!(index.len(), 2);

        assert!(index.remove(&a, &"a".into()));
        assert!(!index.remove(&a, &"a".into()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_empty_branches_are_pruned() {
        let mut index = Index::new(keys(&["kind", "version"]), IndexOptions::new());
        let a = doc(json!({"id": "a", "kind": "x", "version": 1}));

        index.insert(&a, "a".into());
        index.remove(&a, &"a".into());

        assert!(index.is_empty());
        assert!(index.root().children.is_empty());
    }

    #[test]
    fn test_missing_field_keyed_as_null() {
        let index = Index::new(keys(&["kind"]), IndexOptions::new());
        let a = doc(json!({"id": "a"}));
        assert_eq!(index.key_of(&a), vec![Value::Null]);

        let nested = Index::new(keys(&["spec.kind"]), IndexOptions::new());
        let b = doc(json!({"id": "b", "spec": {"kind": "snippet"}}));
        assert_eq!(nested.key_of(&b), vec![Value::from("snippet")]);
    }

    #[test]
    fn test_unique_conflict() {
        let mut index = Index::new(keys(&["name"]), IndexOptions::unique());
        let a = doc(json!({"id": "a", "name": "n"}));
        let b = doc(json!({"id": "b", "name": "n"}));
        index.insert(&a, "a".into());

        assert_eq!(index.conflict(&b, &"b".into()), Some(&Value::from("a")));
        // re-storing the same id is not a conflict
        assert_eq!(index.conflict(&a, &"a".into()), None);

        let plain = Index::new(keys(&["name"]), IndexOptions::new());
        assert_eq!(plain.conflict(&b, &"b".into()), None);
    }

    #[test]
    fn test_partial_filter() {
        let options = IndexOptions::unique().with_filter(doc(json!({"active": true})));
        let index = Index::new(keys(&["name"]), options);

        assert!(index.is_partial());
        assert!(index.accepts(&doc(json!({"active": true}))));
        assert!(!index.accepts(&doc(json!({"active": false}))));
        assert!(!index.accepts(&doc(json!({}))));
    }

    #[test]
    fn test_partial_filter_shape_mismatch() {
        let filter = doc(json!({"meta": {"active": true}}));
        let index = Index::new(keys(&["name"]), IndexOptions::new().with_filter(filter));

        assert!(index.accepts(&doc(json!({"meta": {"active": true}}))));
        assert!(!index.accepts(&doc(json!({"meta": "x"}))));
        assert!(!index.accepts(&doc(json!({"meta": 3}))));
    }

    #[test]
    fn test_range_counts() {
        let mut index = Index::new(keys(&["version"]), IndexOptions::new());
        for i in 0..10 {
            let d = doc(json!({"id": i, "version": i % 5}));
            index.insert(&d, Value::Int(i));
        }

        let nodes = index.root().range(Some(&Value::Int(1)), Some(&Value::Int(2)));
        let total: usize = nodes.iter().map(|n| n.len()).sum();
        assert_eq!(total, 4);

        let nodes = index.root().range(Some(&Value::Int(3)), None);
        assert_eq!(nodes.len(), 2);

        assert!(index
            .root()
            .range(Some(&Value::Int(4)), Some(&Value::Int(1)))
            .is_empty());
    }

    #[test]
    fn test_covers() {
        let index = Index::new(keys(&["a", "b"]), IndexOptions::new());
        assert!(index.covers(&["a"]));
        assert!(index.covers(&["a", "b"]));
        assert!(!index.covers(&["b"]));
        assert!(!index.covers(&["a", "b", "c"]));
    }
}

//! Specdb Document Engine
//!
//! The in-memory implementation of [`Store`]. One reader-writer lock guards the
//! section and the subscriber registry together, so every mutation and the
//! events it emits form a single critical section: subscribers observe events
//! in commit order, and a find never sees half of a batch that is still being
//! validated.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::cursor::Cursor;
use crate::index::{IndexInfo, IndexOptions};
use crate::planner::{self, ExecutionPlan};
use crate::query;
use crate::section::Section;
use crate::store::{FindOptions, Sort, Store, UpdateOptions};
use async_trait::async_trait;
use parking_lot::RwLock;
use specdb_common::{Document, Result, SpecdbError, StoreConfig, Value, ID};
use specdb_streaming::{Event, Stream, Subscribers};
use std::cmp::Ordering;
use std::sync::{Arc, Weak};

static NULL: Value = Value::Null;

// =============================================================================
// Memory Store
// =============================================================================

/// An in-memory document store. Clones share the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: StoreConfig,
    state: RwLock<State>,
    stats: RwLock<StoreStats>,
}

struct State {
    section: Section,
    subscribers: Subscribers,
}

impl MemoryStore {
    /// Create a new store with default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create a new store with custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        let subscribers = Subscribers::new(config.stream_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                state: RwLock::new(State {
                    section: Section::new(),
                    subscribers,
                }),
                stats: RwLock::new(StoreStats::default()),
            }),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.inner.config
    }

    /// Get a document by id.
    pub fn load(&self, id: &Value) -> Result<Document> {
        self.inner.state.read().section.load(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().section.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Describe every declared index, the implicit id index first.
    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.inner.state.read().section.index_info()
    }

    /// Number of live watch subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.read().subscribers.len()
    }

    /// Show the index plan a find with `filter` would use.
    pub fn explain(&self, filter: &Document) -> Option<ExecutionPlan> {
        if !self.inner.config.use_indexes {
            return None;
        }
        planner::plan(filter, &self.inner.state.read().section)
    }

    // -------------------------------------------------------------------------
    // Statistics
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> StoreStats {
        self.inner.stats.read().clone()
    }

    pub fn reset_stats(&self) {
        *self.inner.stats.write() = StoreStats::default();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("config", &self.inner.config)
            .field("documents", &self.len())
            .finish()
    }
}

// =============================================================================
// Operations
// =============================================================================

impl Inner {
    fn record(&self, f: impl FnOnce(&mut StoreStats)) {
        f(&mut self.stats.write());
    }

    /// Documents matching `filter` in ascending id order, stopping early once
    /// `limit` matches are found.
    fn select<'s>(
        &self,
        section: &'s Section,
        filter: &Document,
        limit: Option<usize>,
    ) -> Result<Vec<&'s Document>> {
        let plan = if self.config.use_indexes {
            planner::plan(filter, section)
        } else {
            None
        };

        let candidates: Box<dyn Iterator<Item = &'s Document> + 's> =
            match plan.as_ref().and_then(|plan| plan.scan(section)) {
                Some(scan) => {
                    self.record(|s| s.index_scans += 1);
                    Box::new(scan.documents())
                }
                None => {
                    self.record(|s| s.full_scans += 1);
                    Box::new(section.range())
                }
            };

        let mut matched = Vec::new();
        for doc in candidates {
            if limit.map_or(false, |limit| matched.len() >= limit) {
                break;
            }
            if query::matches(doc, filter)? {
                matched.push(doc);
            }
        }
        Ok(matched)
    }

    fn insert(&self, docs: Vec<Document>) -> Result<Vec<Value>> {
        if docs.len() > self.config.max_batch_size {
            return Err(SpecdbError::UnsupportedOperation(format!(
                "batch of {} documents exceeds limit of {}",
                docs.len(),
                self.config.max_batch_size
            )));
        }

        let mut guard = self.state.write();
        let state = &mut *guard;
        let mut ids = Vec::with_capacity(docs.len());

        for doc in docs {
            let id = state.section.store(doc)?;
            self.record(|s| s.documents_inserted += 1);
            let doc = state.section.load(&id)?;
            self.emit(&state.subscribers, &Event::insert(id.clone()), doc);
            ids.push(id);
        }

        tracing::debug!("Inserted {} documents", ids.len());
        Ok(ids)
    }

    fn update(&self, filter: &Document, update: &Document, options: UpdateOptions) -> Result<usize> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let ids: Vec<Value> = self
            .select(&state.section, filter, None)?
            .into_iter()
            .filter_map(|doc| doc.id().cloned())
            .collect();

        if ids.is_empty() {
            if !options.upsert {
                return Ok(0);
            }
            let seed = query::apply(filter)?;
            let doc = query::patch(&seed, update)?;
            let id = state.section.store(doc)?;
            self.record(|s| s.documents_inserted += 1);
            let doc = state.section.load(&id)?;
            self.emit(&state.subscribers, &Event::insert(id.clone()), doc);
            tracing::debug!("Upserted document {}", id);
            return Ok(1);
        }

        let mut count = 0;
        for id in ids {
            let patched = query::patch(state.section.load(&id)?, update)?;
            if patched.id() != Some(&id) {
                return Err(SpecdbError::UnsupportedOperation(format!(
                    "update cannot change {} of document {}",
                    ID, id
                )));
            }
            state.section.swap(patched)?;
            self.record(|s| s.documents_updated += 1);
            let doc = state.section.load(&id)?;
            self.emit(&state.subscribers, &Event::update(id), doc);
            count += 1;
        }

        tracing::debug!("Updated {} documents", count);
        Ok(count)
    }

    fn delete(&self, filter: &Document) -> Result<usize> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let ids: Vec<Value> = self
            .select(&state.section, filter, None)?
            .into_iter()
            .filter_map(|doc| doc.id().cloned())
            .collect();

        for id in &ids {
            let doc = state.section.delete(id)?;
            self.record(|s| s.documents_deleted += 1);
            self.emit(&state.subscribers, &Event::delete(id.clone()), &doc);
        }

        tracing::debug!("Deleted {} documents", ids.len());
        Ok(ids.len())
    }

    fn find(&self, filter: &Document, options: &FindOptions) -> Result<Cursor> {
        self.record(|s| s.queries_executed += 1);

        let early_limit = if options.sort.is_empty() {
            options.limit
        } else {
            None
        };

        let mut documents: Vec<Document> = {
            let state = self.state.read();
            self.select(&state.section, filter, early_limit)?
                .into_iter()
                .cloned()
                .collect()
        };

        if !options.sort.is_empty() {
            documents.sort_by(|a, b| compare_by(&options.sort, a, b));
        }
        if let Some(limit) = options.limit {
            documents.truncate(limit);
        }

        Ok(Cursor::new(documents))
    }

    /// Deliver an event to every subscriber whose filter matches `doc`.
    fn emit(&self, subscribers: &Subscribers, event: &Event, doc: &Document) {
        let delivered = subscribers.publish(event, |filter| match query::matches(doc, filter) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::debug!("Watch filter skipped event {}: {}", event, e);
                false
            }
        });
        if delivered > 0 {
            self.record(|s| s.events_published += delivered as u64);
        }
    }

    fn unsubscribe(weak: &Weak<Inner>, id: specdb_streaming::SubscriberId) {
        if let Some(inner) = weak.upgrade() {
            inner.state.write().subscribers.unsubscribe(id);
        }
    }
}

fn compare_by(sort: &[Sort], a: &Document, b: &Document) -> Ordering {
    for key in sort {
        let left = a.get(&key.field).unwrap_or(&NULL);
        let right = b.get(&key.field).unwrap_or(&NULL);
        let ordering = if key.ascending {
            left.cmp(right)
        } else {
            right.cmp(left)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl Store for MemoryStore {
    async fn watch(&self, filter: &Document) -> Result<Stream> {
        query::validate(filter)?;
        let (id, receiver) = self.inner.state.write().subscribers.subscribe(filter.clone());
        let weak = Arc::downgrade(&self.inner);
        Ok(Stream::spawn(id, receiver, move |id| Inner::unsubscribe(&weak, id)))
    }

    async fn index(&self, keys: &[String], options: IndexOptions) -> Result<()> {
        self.inner.state.write().section.index(keys.to_vec(), options)
    }

    async fn unindex(&self, keys: &[String]) -> Result<()> {
        if !self.inner.state.write().section.unindex(keys) {
            tracing::debug!("No index {:?} to remove", keys);
        }
        Ok(())
    }

    async fn insert(&self, docs: Vec<Document>) -> Result<Vec<Value>> {
        self.inner.insert(docs)
    }

    async fn update(
        &self,
        filter: &Document,
        update: &Document,
        options: UpdateOptions,
    ) -> Result<usize> {
        self.inner.update(filter, update, options)
    }

    async fn delete(&self, filter: &Document) -> Result<usize> {
        self.inner.delete(filter)
    }

    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Cursor> {
        self.inner.find(filter, &options)
    }
}

// =============================================================================
// Store Statistics
// =============================================================================

/// Operation counters for a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub documents_inserted: u64,
    pub documents_updated: u64,
    pub documents_deleted: u64,
    pub queries_executed: u64,
    pub index_scans: u64,
    pub full_scans: u64,
    pub events_published: u64,
}

// =============================================================================
// Tests
// =============================================================================

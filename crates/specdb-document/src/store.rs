//! Specdb Document Store
//!
//! The store contract shared by every backend, together with the option
//! types its operations take.
//!
//! Key Features:
//! - Async operations so remote backends fit the same trait
//! - Watch subscriptions that report committed mutations
//! - Compound, unique and partial secondary indexes
//! - Upsert updates seeded from filter equalities
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::cursor::Cursor;
use crate::index::IndexOptions;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use specdb_common::{Document, Result, SpecdbError, Value};
use specdb_streaming::Stream;

// =============================================================================
// Store Trait
// =============================================================================

/// A document store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Subscribe to mutations of documents matching `filter`.
    async fn watch(&self, filter: &Document) -> Result<Stream>;

    /// Declare an index over the given key paths.
    async fn index(&self, keys: &[String], options: IndexOptions) -> Result<()>;

    /// Remove the index over exactly the given key paths.
    async fn unindex(&self, keys: &[String]) -> Result<()>;

    /// Insert documents, returning their ids.
    async fn insert(&self, docs: Vec<Document>) -> Result<Vec<Value>>;

    /// Patch every document matching `filter`, returning how many changed.
    async fn update(&self, filter: &Document, update: &Document, options: UpdateOptions)
        -> Result<usize>;

    /// Remove every document matching `filter`, returning how many went.
    async fn delete(&self, filter: &Document) -> Result<usize>;

    /// Query documents matching `filter`.
    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Cursor>;
}

// =============================================================================
// Options
// =============================================================================

/// Options for [`Store::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Insert a document seeded from the filter when nothing matches.
    pub upsert: bool,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self { upsert: true }
    }
}

/// Options for [`Store::find`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub limit: Option<usize>,
    pub sort: Vec<Sort>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }
}

// =============================================================================
// Sort
// =============================================================================

/// One sort key of a find.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub ascending: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    /// Parse the `{field: 1 | -1}` form.
    ///
    /// Documents keep their keys sorted, so the fields apply in ascending
    /// name order whatever order they were written in. Build the `Vec<Sort>`
    /// directly when precedence matters.
    pub fn from_document(doc: &Document) -> Result<Vec<Sort>> {
        doc.iter()
            .map(|(field, direction)| match direction.as_i64() {
                Some(1) => Ok(Sort::asc(field.clone())),
                Some(-1) => Ok(Sort::desc(field.clone())),
                _ => Err(SpecdbError::UnsupportedType(format!(
                    "sort direction for {} must be 1 or -1, got {}",
                    field, direction
                ))),
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

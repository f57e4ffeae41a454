//! Specdb Document Cursor
//!
//! Iteration over the results of a find. Results are materialized when the
//! query runs, so a cursor never observes later writes.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use serde::de::DeserializeOwned;
use specdb_common::{Document, Result, SpecdbError};

// =============================================================================
// Cursor
// =============================================================================

/// Result set of a find, consumed one document at a time.
#[derive(Debug)]
pub struct Cursor {
    documents: std::vec::IntoIter<Document>,
    current: Option<Document>,
}

impl Cursor {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents: documents.into_iter(),
            current: None,
        }
    }

    /// Advance to the next document. Returns false once exhausted.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> bool {
        self.current = self.documents.next();
        self.current.is_some()
    }

    /// The document the cursor is positioned on.
    pub fn document(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    /// Deserialize the current document into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let doc = self.current.as_ref().ok_or_else(|| {
            SpecdbError::UnsupportedType("cursor is not positioned on a document".to_string())
        })?;
        serde_json::from_value(doc.to_json())
            .map_err(|e| SpecdbError::UnsupportedType(e.to_string()))
    }

    /// Documents not yet visited.
    pub fn remaining(&self) -> usize {
        self.documents.len()
    }

    /// Release the remaining results.
    pub fn close(&mut self) {
        self.documents = Vec::new().into_iter();
        self.current = None;
    }

    /// Drain the remaining documents.
    pub fn collect_documents(mut self) -> Vec<Document> {
        let mut documents = Vec::with_capacity(self.remaining());
        while self.next() {
            if let Some(doc) = self.current.take() {
                documents.push(doc);
            }
        }
        documents
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Specdb Error - Unified Error Types
//!
//! Error taxonomy shared by every specdb component. All variants describe
//! caller errors: nothing here is retried internally, and every error bubbles
//! unmodified from the section through the store facade to the caller.
//!
//! Key Features:
//! - Key family errors (missing, duplicate, not found) for document identity
//! - Type and operation errors for the filter and update DSL
//! - Configuration errors for loading store settings
//!
//! @version 0.1.0
//! @author Specdb Development Team

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Unified error type for all specdb operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecdbError {
    // Key errors
    #[error("key missing: {0}")]
    KeyMissing(String),

    #[error("key duplicate: {0}")]
    KeyDuplicate(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    // DSL errors
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

// =============================================================================
// Type Aliases
// =============================================================================

/// Result type alias for specdb operations.
pub type Result<T> = std::result::Result<T, SpecdbError>;

// =============================================================================
// Error Classification
// =============================================================================

impl SpecdbError {
    /// Returns true if the operation can be safely retried. Always false here.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Returns true if this error concerns document identity or uniqueness.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            SpecdbError::KeyMissing(_) | SpecdbError::KeyDuplicate(_) | SpecdbError::KeyNotFound(_)
        )
    }

    /// Returns true if this error was raised while interpreting a filter or update.
    pub fn is_dsl_error(&self) -> bool {
        matches!(
            self,
            SpecdbError::UnsupportedType(_) | SpecdbError::UnsupportedOperation(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

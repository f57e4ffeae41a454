//! Specdb Common - Shared Types and Utilities
//!
//! Foundational types shared by the specdb crates: the ordered document value
//! model, the error taxonomy, and store configuration.
//!
//! Key Features:
//! - Totally ordered, hashable `Value` and `Document` types
//! - Unified error type with key/DSL classification
//! - Store configuration with TOML loading
//!
//! @version 0.1.0
//! @author Specdb Development Team

pub mod config;
pub mod error;
pub mod types;

pub use config::StoreConfig;
pub use error::{Result, SpecdbError};
pub use types::{Document, Value, ID};

//! Specdb Document - Document Store Engine
//!
//! Schema-free JSON document storage with a MongoDB-style filter language,
//! compound secondary indexes, a cost-based index planner and live change
//! streams.
//!
//! Key Features:
//! - Dotted field paths into nested documents
//! - Compound, unique and partial indexes
//! - Index range scans chosen per query
//! - Watch subscriptions over insert, update and delete events
//!
//! @version 0.1.0
//! @author Specdb Development Team

pub mod cursor;
pub mod engine;
pub mod index;
pub mod planner;
pub mod query;
pub mod section;
pub mod store;

pub use cursor::Cursor;
pub use engine::{MemoryStore, StoreStats};
pub use index::{Index, IndexInfo, IndexOptions};
pub use planner::ExecutionPlan;
pub use section::{KeyRange, Scan, Section};
pub use store::{FindOptions, Sort, Store, UpdateOptions};

pub use specdb_common::{Document, Result, SpecdbError, StoreConfig, Value, ID};
pub use specdb_streaming::{Event, EventOp, Stream, StreamCloser};

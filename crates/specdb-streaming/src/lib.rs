//! Specdb Streaming - Change Subscriptions
//!
//! Live change notification for the document store. Mutations publish
//! events into a subscriber registry; every watch call receives a stream fed
//! by its own forwarding task.
//!
//! Key Features:
//! - Insert/update/delete events with a stable wire shape
//! - Bounded, non-blocking delivery with drop-oldest overflow
//! - Cooperative cancellation through stream closers
//!
//! @version 0.1.0
//! @author Specdb Development Team

pub mod event;
pub mod stream;
pub mod subscriber;

pub use event::{Event, EventOp};
pub use stream::{Stream, StreamCloser};
pub use subscriber::{SubscriberId, Subscribers};

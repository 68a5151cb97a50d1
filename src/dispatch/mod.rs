//! Update dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! transport text/binary frame
//!     → frame.rs (decode; malformed frames dropped and logged)
//!     → dispatcher.rs (overlay onto MetricsSnapshot, stamp local time)
//!     → subscribers (synchronous, in subscription order)
//! ```
//!
//! # Design Decisions
//! - Transport-agnostic: nothing here knows about sockets or reconnects
//! - Snapshots are immutable `Arc`s swapped atomically; readers never block the writer
//! - One failing subscriber never starves the others

pub mod dispatcher;
pub mod frame;
pub mod snapshot;

pub use dispatcher::{Subscription, UpdateDispatcher};
pub use frame::{parse_binary_frame, parse_frame, Frame, FrameError};
pub use snapshot::MetricsSnapshot;

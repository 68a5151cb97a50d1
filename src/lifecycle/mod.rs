//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Mount:
//!     LiveMetricsClient::new → Shutdown::new → driver task subscribes
//!
//! Unmount (shutdown.rs):
//!     shutdown() → flag set synchronously → broadcast wakes driver
//!     → pending timer dropped → live connection closed → driver exits
//!
//! Signals (signals.rs):
//!     Ctrl+C → CLI calls shutdown()
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

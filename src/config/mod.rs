//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ClientConfig (validated, immutable)
//!     → passed by value to LiveMetricsClient::new
//! ```
//!
//! # Design Decisions
//! - No ambient defaults inside the client logic; every knob lives here
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AuthConfig, BreakerConfig, ClientConfig, ObservabilityConfig, ReconnectConfig, TransportConfig,
};

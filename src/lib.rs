//! flightsearch: scatter-gather flight search host.
//!
//! Wraps the `flightsearch-core` coordinator in a runnable process:
//!
//! - **Config**: TOML file with server, deadline and provider profiles
//! - **Providers**: simulated flight APIs with random latency and failures
//! - **API**: axum front end that starts searches and reports their status
//! - **Runtime**: spawns one inquiry router per provider, the aggregator and
//!   a completion listener, then serves HTTP until Ctrl-C

pub mod api;
pub mod config;
pub mod error;
pub mod providers;
pub mod runtime;

pub use config::{AppConfig, ProviderProfile, ServerConfig};
pub use error::{AppError, Result};
pub use providers::SimulatedProvider;
pub use runtime::Runtime;

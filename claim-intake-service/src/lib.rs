pub mod api;
pub mod config;
pub mod telemetry;

pub use api::{AppState, build_router, create_app};
pub use config::{ConfigError, ServiceConfig};

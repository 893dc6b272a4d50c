pub mod api;
pub mod config;
pub mod context;
pub mod error;
pub mod ingestion;
pub mod queue;
pub mod resilience;
pub mod store;

pub use config::Config;
pub use context::ServiceContext;
pub use error::{Error, Result};

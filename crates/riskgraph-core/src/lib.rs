//! Core types, error taxonomy, configuration and capability traits shared by
//! the RiskGraph entity dependency graph engine.

pub mod config_manager;
pub mod edge;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod node;
pub mod snapshot;
pub mod strategy;
pub mod traits;
pub mod types;

pub use config_manager::*;
pub use edge::*;
pub use error::*;
pub use ingest::*;
pub use logging::init_tracing;
pub use node::*;
pub use snapshot::*;
pub use strategy::*;
pub use traits::*;
pub use types::*;

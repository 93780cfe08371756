//! Entity dependency graph engine: the in-memory graph store, influence-path,
//! cascade and cluster analyzers, centrality and retention maintenance, and
//! the [`GraphService`] facade tying them to a shared lock.

pub mod cascade;
pub mod centrality;
pub mod cluster;
pub mod graph;
pub mod graph_updater;
mod louvain;
mod projection;
pub mod pruning;
pub mod service;
pub mod snapshot_store;
pub mod statistics;
pub mod traversal;
pub mod visualization;

pub use cascade::*;
pub use centrality::*;
pub use cluster::*;
pub use graph::*;
pub use graph_updater::*;
pub use pruning::*;
pub use service::*;
pub use snapshot_store::*;
pub use statistics::*;
pub use traversal::*;
pub use visualization::*;

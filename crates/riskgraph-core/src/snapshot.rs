use crate::{EntityEdge, EntityNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Point-in-time copy of the whole graph, used for persistence sync and as
/// the input handed to an influence predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<EntityEdge>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<EntityNode>, edges: Vec<EntityEdge>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Utc::now(),
            nodes,
            edges,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

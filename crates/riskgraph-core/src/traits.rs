use crate::{GraphSnapshot, NodeId, Result};
use async_trait::async_trait;
use std::collections::HashMap;

/// External durable store the in-memory graph syncs to. Best-effort: the
/// engine logs failures and keeps serving from memory.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()>;
    async fn load_snapshot(&self) -> Result<Option<GraphSnapshot>>;
}

/// Optional ML capability scoring how strongly `source` influences other
/// nodes. Scores are expected in `[0, 1]`; analyzers fall back to native
/// traversal when this errors.
#[async_trait]
pub trait InfluencePredictor: Send + Sync {
    async fn predict_influence(
        &self,
        snapshot: &GraphSnapshot,
        source: &str,
    ) -> Result<HashMap<NodeId, f64>>;
}

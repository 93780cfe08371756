use async_trait::async_trait;
use parking_lot::Mutex;
use riskgraph_core::{GraphSnapshot, Result, RiskGraphError, SnapshotStore, SNAPSHOT_FORMAT_VERSION};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Snapshot persisted as one JSON document. Writes go to a sibling temp file
/// that is renamed over the target, so readers never see a partial file.
#[derive(Debug, Clone)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileSnapshotStore {
    async fn save_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp = self.temp_path();
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(
            path = %self.path.display(),
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "Snapshot written"
        );
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<GraphSnapshot>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version > SNAPSHOT_FORMAT_VERSION {
            return Err(RiskGraphError::invalid(format!(
                "Snapshot format version {} is newer than supported version {}",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }
}

/// Keeps the latest snapshot in memory. Useful for tests and for embedding
/// the engine without a filesystem.
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    latest: Mutex<Option<GraphSnapshot>>,
    saves: Mutex<usize>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: GraphSnapshot) -> Self {
        Self {
            latest: Mutex::new(Some(snapshot)),
            saves: Mutex::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, snapshot: &GraphSnapshot) -> Result<()> {
        *self.latest.lock() = Some(snapshot.clone());
        *self.saves.lock() += 1;
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<GraphSnapshot>> {
        Ok(self.latest.lock().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgraph_core::{EntityEdge, EntityNode, NodeType, RelationshipType};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> GraphSnapshot {
        GraphSnapshot::new(
            vec![
                EntityNode::new("a", NodeType::Bank)
                    .with_risk_score(0.4)
                    .with_property("country", json!("FR")),
                EntityNode::new("b", NodeType::Sector),
            ],
            vec![EntityEdge::new("a", "b", RelationshipType::OperatesIn)
                .with_weight(0.5)
                .with_property("exposure_eur", json!(1_250_000))],
        )
    }

    #[tokio::test]
    async fn file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("nested/graph.json"));

        assert!(store.load_snapshot().await.unwrap().is_none());
        let snapshot = sample();
        store.save_snapshot(&snapshot).await.unwrap();

        let loaded = store.load_snapshot().await.unwrap().unwrap();
        assert_eq!(loaded.nodes, snapshot.nodes);
        assert_eq!(loaded.edges, snapshot.edges);
        assert_eq!(loaded.nodes[0].properties.get("country"), Some(&json!("FR")));
        assert_eq!(
            loaded.edges[0].properties.get("exposure_eur"),
            Some(&json!(1_250_000))
        );
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn newer_format_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileSnapshotStore::new(dir.path().join("graph.json"));
        let mut snapshot = sample();
        snapshot.version = SNAPSHOT_FORMAT_VERSION + 1;
        store.save_snapshot(&snapshot).await.unwrap();

        assert!(matches!(
            store.load_snapshot().await,
            Err(RiskGraphError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let result = JsonFileSnapshotStore::new(&path).load_snapshot().await;
        assert!(matches!(result, Err(RiskGraphError::Serialization(_))));
    }

    #[tokio::test]
    async fn memory_store_keeps_latest() {
        let store = InMemorySnapshotStore::new();
        store.save_snapshot(&GraphSnapshot::empty()).await.unwrap();
        assert!(store.load_snapshot().await.unwrap().unwrap().is_empty());
        store.save_snapshot(&sample()).await.unwrap();

        assert_eq!(store.save_count(), 2);
        let latest = store.load_snapshot().await.unwrap().unwrap();
        assert!(!latest.is_empty());
        assert_eq!(latest.nodes.len(), 2);
    }
}

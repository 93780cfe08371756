//! Agent-result ingestion and the periodic maintenance loop.

use crate::centrality::refresh_centrality;
use crate::graph::UpsertOutcome;
use crate::pruning::{apply_retention, PruneReport};
use crate::EntityGraph;
use chrono::Utc;
use parking_lot::RwLock;
use riskgraph_core::{
    AgentResult, NodeId, NodeType, Result, RetentionConfig, RiskGraphConfig, RiskGraphError,
    SnapshotStore, UpdaterConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type SharedGraph = Arc<RwLock<EntityGraph>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub centrality_updated: usize,
    pub pruned: PruneReport,
    pub snapshot_saved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub entity_id: NodeId,
    pub created: bool,
    pub risk_score: f64,
    pub edges_created: usize,
    pub edges_updated: usize,
}

pub struct GraphUpdater {
    graph: SharedGraph,
    config: UpdaterConfig,
    retention: RetentionConfig,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl GraphUpdater {
    pub fn new(graph: SharedGraph, config: &RiskGraphConfig) -> Self {
        Self {
            graph,
            config: config.updater.clone(),
            retention: config.retention.clone(),
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Apply one agent result: upsert the analysed entity with its risk score
    /// and analysis metadata, then one edge per declared dependency
    /// (`entity -> dependency`). The payload is validated before anything is
    /// written.
    pub fn ingest_agent_result(&self, result: &AgentResult) -> Result<IngestSummary> {
        let entity_id = result.entity_id.trim();
        if entity_id.is_empty() {
            return Err(RiskGraphError::invalid("entity_id must not be empty"));
        }
        if let Some(dep) = result
            .dependencies
            .iter()
            .find(|d| d.entity_id.trim().is_empty())
        {
            return Err(RiskGraphError::invalid(format!(
                "dependency of {} has an empty entity_id (relationship {})",
                entity_id, dep.relationship_type
            )));
        }

        let node_type: NodeType = result
            .entity_type
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or_default();

        let mut graph = self.graph.write();
        let risk_score = match result.risk_score {
            Some(score) if score.is_finite() && (0.0..=1.0).contains(&score) => score,
            Some(score) => {
                warn!(
                    entity = entity_id,
                    agent = %result.agent_id,
                    risk_score = score,
                    "Risk score outside [0, 1], clamping"
                );
                riskgraph_core::clamp_unit(score)
            }
            None => graph.risk_score(entity_id),
        };

        let now = Utc::now();
        let outcome =
            graph.record_analysis(entity_id, node_type, risk_score, &result.agent_id, now);

        let mut summary = IngestSummary {
            entity_id: entity_id.to_string(),
            created: outcome == UpsertOutcome::Created,
            risk_score,
            edges_created: 0,
            edges_updated: 0,
        };
        for dep in &result.dependencies {
            match graph.record_dependency(
                entity_id,
                dep.entity_id.trim(),
                dep.relationship_type.clone(),
                dep.weight,
                dep.properties.clone(),
                now,
            ) {
                UpsertOutcome::Created => summary.edges_created += 1,
                UpsertOutcome::Updated => summary.edges_updated += 1,
                UpsertOutcome::Unchanged => {}
            }
        }
        drop(graph);

        info!(
            agent = %result.agent_id,
            entity = entity_id,
            risk_score,
            dependencies = result.dependencies.len(),
            "Graph updated from agent analysis"
        );
        Ok(summary)
    }

    /// One maintenance cycle: centrality, retention, then a best-effort
    /// snapshot save.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        debug!("Starting graph update cycle");
        let centrality_updated = refresh_centrality(self.graph.clone(), self.config.clone()).await?;

        let pruned = {
            let mut graph = self.graph.write();
            apply_retention(&mut graph, &self.retention, Utc::now())
        };

        let snapshot_saved = match &self.store {
            Some(store) => {
                let snapshot = self.graph.read().snapshot();
                match store.save_snapshot(&snapshot).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Snapshot save failed, continuing");
                        false
                    }
                }
            }
            None => false,
        };

        debug!(centrality_updated, snapshot_saved, "Graph update cycle completed");
        Ok(CycleReport {
            centrality_updated,
            pruned,
            snapshot_saved,
        })
    }

    /// Run maintenance cycles until `cancel` fires. A failed cycle is logged
    /// and followed by the shorter error backoff.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.config.update_interval_secs,
            "Graph updater started"
        );
        loop {
            let delay = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => match outcome {
                    Ok(_) => Duration::from_secs(self.config.update_interval_secs),
                    Err(e) => {
                        error!(error = %e, "Error in graph update cycle");
                        Duration::from_secs(self.config.error_backoff_secs)
                    }
                },
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        info!("Graph updater stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot_store::InMemorySnapshotStore;
    use riskgraph_core::{AgentDependency, Properties, RelationshipType};

    fn updater() -> GraphUpdater {
        GraphUpdater::new(
            Arc::new(RwLock::new(EntityGraph::new())),
            &RiskGraphConfig::default(),
        )
    }

    fn result(entity: &str, risk: Option<f64>, deps: &[&str]) -> AgentResult {
        AgentResult {
            agent_id: "credit_risk".to_string(),
            entity_id: entity.to_string(),
            entity_type: Some("bank".to_string()),
            risk_score: risk,
            dependencies: deps
                .iter()
                .map(|d| AgentDependency {
                    entity_id: d.to_string(),
                    relationship_type: RelationshipType::Credits,
                    weight: 0.4,
                    properties: Properties::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn ingest_creates_node_and_edges() {
        let updater = updater();
        let summary = updater
            .ingest_agent_result(&result("bank_a", Some(0.72), &["corp_b", "corp_c"]))
            .unwrap();

        assert!(summary.created);
        assert_eq!(summary.edges_created, 2);
        let graph = updater.graph().read();
        let node = graph.node("bank_a").unwrap();
        assert_eq!(node.node_type, NodeType::Bank);
        assert_eq!(node.risk_score, 0.72);
        assert_eq!(node.last_agent.as_deref(), Some("credit_risk"));
        assert!(node.last_analysis.is_some());
        assert_eq!(graph.node("corp_b").unwrap().node_type, NodeType::Unknown);
        assert_eq!(graph.edge("bank_a", "corp_c").unwrap().weight, 0.4);
    }

    #[test]
    fn reanalysis_overwrites_risk_and_keeps_it_when_absent() {
        let updater = updater();
        updater.ingest_agent_result(&result("e", Some(0.2), &[])).unwrap();
        updater.ingest_agent_result(&result("e", Some(0.9), &[])).unwrap();
        assert_eq!(updater.graph().read().risk_score("e"), 0.9);

        let summary = updater.ingest_agent_result(&result("e", None, &[])).unwrap();
        assert!(!summary.created);
        assert_eq!(summary.risk_score, 0.9);
    }

    #[test]
    fn out_of_range_risk_is_clamped() {
        let updater = updater();
        let summary = updater
            .ingest_agent_result(&result("e", Some(3.5), &[]))
            .unwrap();
        assert_eq!(summary.risk_score, 1.0);
    }

    #[test]
    fn empty_ids_are_rejected_without_writes() {
        let updater = updater();
        let err = updater
            .ingest_agent_result(&result("  ", Some(0.5), &[]))
            .unwrap_err();
        assert!(matches!(err, RiskGraphError::InvalidInput(_)));

        let err = updater
            .ingest_agent_result(&result("ok", Some(0.5), &["corp", ""]))
            .unwrap_err();
        assert!(matches!(err, RiskGraphError::InvalidInput(_)));
        assert!(updater.graph().read().is_empty());
    }

    #[tokio::test]
    async fn cycle_refreshes_centrality_and_saves() {
        let store = Arc::new(InMemorySnapshotStore::new());
        let updater = updater().with_store(store.clone());
        updater
            .ingest_agent_result(&result("a", Some(0.5), &["b"]))
            .unwrap();

        let report = updater.run_cycle().await.unwrap();
        assert_eq!(report.centrality_updated, 2);
        assert!(report.snapshot_saved);
        assert_eq!(store.save_count(), 1);
        assert!(updater
            .graph()
            .read()
            .node("a")
            .unwrap()
            .centrality
            .computed_at
            .is_some());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let updater = Arc::new(updater());
        let cancel = CancellationToken::new();
        let handle = {
            let updater = updater.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { updater.run(cancel).await })
        };
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("updater did not stop")
            .unwrap();
    }
}

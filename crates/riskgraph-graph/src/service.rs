//! Owned facade over the shared entity graph. Cloning is cheap; every clone
//! talks to the same graph.

use crate::cascade::{CascadeAnalyzer, CascadeReport};
use crate::cluster::{ClusterAnalyzer, ClusterReport, HotspotReport};
use crate::graph::UpsertOutcome;
use crate::graph_updater::{GraphUpdater, IngestSummary, SharedGraph};
use crate::pruning::{apply_retention, PruneReport};
use crate::statistics::GraphStatistics;
use crate::traversal::{InfluencePath, PathAnalyzer, PathRiskAnalysis, PathSearch, SearchLimits};
use crate::visualization::VisualizationData;
use crate::EntityGraph;
use chrono::Utc;
use parking_lot::RwLock;
use riskgraph_core::{
    clamp_unit, AgentResult, ClusteringStrategy, InfluencePredictor, NodeId, NodeType,
    Properties, RelationshipType, Result, RiskGraphConfig, RiskGraphError, SnapshotStore,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone)]
pub struct GraphService {
    graph: SharedGraph,
    config: Arc<RiskGraphConfig>,
    updater: Arc<GraphUpdater>,
    predictor: Option<Arc<dyn InfluencePredictor>>,
    store: Option<Arc<dyn SnapshotStore>>,
    shutdown: CancellationToken,
}

impl GraphService {
    pub fn new(config: RiskGraphConfig) -> Self {
        Self::with_graph(EntityGraph::new(), config)
    }

    pub fn with_graph(graph: EntityGraph, config: RiskGraphConfig) -> Self {
        let graph = Arc::new(RwLock::new(graph));
        Self {
            updater: Arc::new(GraphUpdater::new(graph.clone(), &config)),
            graph,
            config: Arc::new(config),
            predictor: None,
            store: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_predictor(mut self, predictor: Arc<dyn InfluencePredictor>) -> Self {
        self.predictor = Some(predictor);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.updater = Arc::new(
            GraphUpdater::new(self.graph.clone(), &self.config).with_store(store.clone()),
        );
        self.store = Some(store);
        self
    }

    pub fn graph(&self) -> SharedGraph {
        self.graph.clone()
    }

    pub fn config(&self) -> &RiskGraphConfig {
        &self.config
    }

    pub fn updater(&self) -> Arc<GraphUpdater> {
        self.updater.clone()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel in-flight queries and the updater loop if it was started with
    /// [`GraphService::shutdown_token`].
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn limits(&self) -> SearchLimits {
        SearchLimits::new(self.config.graph.max_visits).with_cancel(self.shutdown.child_token())
    }

    /// Run `query` against the graph on the blocking pool under a read lock.
    async fn read_blocking<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&EntityGraph) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let graph = self.graph.clone();
        tokio::task::spawn_blocking(move || {
            let guard = graph.read();
            query(&guard)
        })
        .await
        .map_err(|e| RiskGraphError::Task(format!("Query task failed: {}", e)))?
    }

    pub fn upsert_node(&self, id: &str, node_type: NodeType, properties: Properties) -> UpsertOutcome {
        self.graph.write().upsert_node(id, node_type, properties)
    }

    pub fn upsert_edge(
        &self,
        source: &str,
        target: &str,
        relationship_type: RelationshipType,
        weight: Option<f64>,
        properties: Option<Properties>,
    ) -> UpsertOutcome {
        self.graph
            .write()
            .upsert_edge(source, target, relationship_type, weight, properties)
    }

    pub fn remove_node(&self, id: &str) -> bool {
        self.graph.write().remove_node(id)
    }

    pub fn remove_edge(&self, source: &str, target: &str) -> bool {
        self.graph.write().remove_edge(source, target)
    }

    pub fn ingest_agent_result(&self, result: &AgentResult) -> Result<IngestSummary> {
        self.updater.ingest_agent_result(result)
    }

    /// Apply the configured retention policy immediately.
    pub fn prune(&self) -> PruneReport {
        apply_retention(&mut self.graph.write(), &self.config.retention, Utc::now())
    }

    pub fn statistics(&self) -> GraphStatistics {
        self.graph.read().statistics()
    }

    pub fn visualization(&self, filter: Option<&[NodeId]>, max_nodes: Option<usize>) -> VisualizationData {
        let max_nodes = max_nodes.unwrap_or(self.config.graph.visualization_max_nodes);
        self.graph.read().visualization_projection(filter, max_nodes)
    }

    pub async fn visualization_with_clusters(
        &self,
        filter: Option<Vec<NodeId>>,
        max_nodes: Option<usize>,
    ) -> Result<VisualizationData> {
        let max_nodes = max_nodes.unwrap_or(self.config.graph.visualization_max_nodes);
        let config = self.config.clustering.clone();
        self.read_blocking(move |g| {
            Ok(g.visualization_with_clusters(filter.as_deref(), max_nodes, &config))
        })
        .await
    }

    /// Influence paths; `None` bounds fall back to the configured defaults.
    pub async fn find_paths(
        &self,
        source: &str,
        target: &str,
        max_depth: Option<usize>,
        max_paths: Option<usize>,
    ) -> Result<PathSearch> {
        let (source, target) = (source.to_string(), target.to_string());
        let max_depth = max_depth.unwrap_or(self.config.graph.default_max_depth);
        let max_paths = max_paths.unwrap_or(self.config.graph.default_max_paths);
        let limits = self.limits();
        self.read_blocking(move |g| {
            PathAnalyzer::new(g, limits).find_paths(&source, &target, max_depth, max_paths)
        })
        .await
    }

    pub async fn shortest_path(&self, source: &str, target: &str) -> Result<Option<InfluencePath>> {
        let (source, target) = (source.to_string(), target.to_string());
        let max_depth = self.config.graph.shortest_path_max_depth;
        let limits = self.limits();
        self.read_blocking(move |g| PathAnalyzer::new(g, limits).shortest_path(&source, &target, max_depth))
            .await
    }

    pub async fn analyze_path_risk(&self, path: Vec<NodeId>) -> Result<PathRiskAnalysis> {
        let limits = self.limits();
        self.read_blocking(move |g| PathAnalyzer::new(g, limits).analyze_path_risk(&path))
            .await
    }

    /// Cascade analysis. When a predictor is configured it is consulted on a
    /// snapshot taken outside the lock; any predictor failure degrades to
    /// risk-ranked sampling.
    pub async fn analyze_cascade(&self, source: &str, max_depth: Option<usize>) -> Result<CascadeReport> {
        let max_depth = max_depth.unwrap_or(self.config.graph.default_max_depth);
        if max_depth == 0 {
            return Err(RiskGraphError::invalid("max_depth must be at least 1"));
        }

        let predictions = self.predict_influence(source).await;
        let source = source.to_string();
        let limits = self.limits();
        let samples = self.config.graph.critical_path_samples_per_depth;
        let max_critical = self.config.graph.max_critical_paths;
        self.read_blocking(move |g| {
            let mut analyzer =
                CascadeAnalyzer::new(g, limits).with_sampling(samples, max_critical);
            if let Some(p) = predictions.as_ref() {
                analyzer = analyzer.with_predictions(p);
            }
            analyzer.analyze_cascade(&source, max_depth)
        })
        .await
    }

    async fn predict_influence(&self, source: &str) -> Option<HashMap<NodeId, f64>> {
        let predictor = self.predictor.as_ref()?;
        let snapshot = {
            let graph = self.graph.read();
            if !graph.contains(source) {
                return None;
            }
            graph.snapshot()
        };

        match predictor.predict_influence(&snapshot, source).await {
            Ok(scores) => Some(
                scores
                    .into_iter()
                    .map(|(id, score)| (id, clamp_unit(score)))
                    .collect(),
            ),
            Err(e) => {
                warn!(source, error = %e, "Influence predictor failed, using native ranking");
                None
            }
        }
    }

    /// Cluster detection; `None` uses the configured default strategy.
    pub async fn detect_clusters(
        &self,
        strategy: Option<ClusteringStrategy>,
        min_cluster_size: usize,
    ) -> Result<ClusterReport> {
        let config = self.config.clustering.clone();
        let strategy = strategy.unwrap_or(config.default_strategy);
        let limits = self.limits();
        self.read_blocking(move |g| {
            ClusterAnalyzer::new(g, config)
                .with_limits(limits)
                .detect_clusters(strategy, min_cluster_size)
        })
        .await
    }

    pub async fn find_hotspots(
        &self,
        min_risk_threshold: f64,
        min_cluster_size: usize,
    ) -> Result<HotspotReport> {
        let config = self.config.clustering.clone();
        let limits = self.limits();
        self.read_blocking(move |g| {
            ClusterAnalyzer::new(g, config)
                .with_limits(limits)
                .find_hotspots(min_risk_threshold, min_cluster_size)
        })
        .await
    }

    /// Replace the graph with the stored snapshot, if any. Returns whether a
    /// snapshot was loaded.
    pub async fn load_snapshot(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load_snapshot().await? {
            Some(snapshot) => {
                let (nodes, edges) = (snapshot.nodes.len(), snapshot.edges.len());
                self.graph.write().restore(snapshot);
                info!(nodes, edges, "Graph restored from snapshot");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn save_snapshot(&self) -> Result<bool> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        let snapshot = self.graph.read().snapshot();
        store.save_snapshot(&snapshot).await?;
        Ok(true)
    }
}

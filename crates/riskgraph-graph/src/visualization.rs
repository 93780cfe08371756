//! Bounded subgraph projections for rendering.

use crate::cluster::ClusterAnalyzer;
use crate::EntityGraph;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use riskgraph_core::{ClusteringConfig, NodeId, NodeType, Properties, RelationshipType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

/// Minimum cluster size used when annotating a projection.
const VISUAL_MIN_CLUSTER_SIZE: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: NodeId,
    pub node_type: NodeType,
    pub label: String,
    pub risk_score: f64,
    pub degree_centrality: f64,
    pub properties: Properties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub relationship_type: RelationshipType,
    pub weight: f64,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationStats {
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub nodes: Vec<NodeId>,
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationData {
    pub nodes: Vec<VisualNode>,
    pub edges: Vec<VisualEdge>,
    pub statistics: VisualizationStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<BTreeMap<usize, ClusterSummary>>,
}

impl EntityGraph {
    /// Induced subgraph for display. With `filter`, the ids in it that exist
    /// (no cap); otherwise the `max_nodes` nodes with the highest degree
    /// centrality, ties broken by ascending id. Nodes come out sorted by id
    /// and edges by `(source, target)`.
    pub fn visualization_projection(
        &self,
        filter: Option<&[NodeId]>,
        max_nodes: usize,
    ) -> VisualizationData {
        let selected: Vec<NodeIndex> = match filter {
            Some(ids) => {
                let mut picked: Vec<NodeIndex> =
                    ids.iter().filter_map(|id| self.index_of(id)).collect();
                picked.sort_by(|a, b| self.id_of(*a).cmp(self.id_of(*b)));
                picked.dedup();
                picked
            }
            None => {
                let mut ranked: Vec<(usize, NodeIndex)> = self
                    .graph
                    .node_indices()
                    .map(|idx| (self.degree(idx), idx))
                    .collect();
                ranked.sort_by(|(da, a), (db, b)| {
                    db.cmp(da).then_with(|| self.id_of(*a).cmp(self.id_of(*b)))
                });
                let mut picked: Vec<NodeIndex> =
                    ranked.into_iter().take(max_nodes).map(|(_, i)| i).collect();
                picked.sort_by(|a, b| self.id_of(*a).cmp(self.id_of(*b)));
                picked
            }
        };

        let scale = match self.node_count() {
            0 | 1 => 0.0,
            n => 1.0 / (n - 1) as f64,
        };
        let nodes: Vec<VisualNode> = selected
            .iter()
            .map(|&idx| {
                let node = &self.graph[idx];
                VisualNode {
                    id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    label: node.id.clone(),
                    risk_score: node.risk_score,
                    degree_centrality: self.degree(idx) as f64 * scale,
                    properties: node.properties.clone(),
                    cluster_id: None,
                }
            })
            .collect();

        let members: HashSet<NodeIndex> = selected.iter().copied().collect();
        let mut edges: Vec<VisualEdge> = selected
            .iter()
            .flat_map(|&idx| self.graph.edges_directed(idx, Direction::Outgoing))
            .filter(|e| members.contains(&e.target()))
            .map(|e| {
                let edge = e.weight();
                VisualEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    relationship_type: edge.relationship_type.clone(),
                    weight: edge.weight,
                    properties: edge.properties.clone(),
                }
            })
            .collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));

        VisualizationData {
            statistics: VisualizationStats {
                node_count: nodes.len(),
                edge_count: edges.len(),
            },
            nodes,
            edges,
            clusters: None,
        }
    }

    /// Projection annotated with cluster membership from the configured
    /// default strategy. Clustering failures leave the projection
    /// unannotated.
    pub fn visualization_with_clusters(
        &self,
        filter: Option<&[NodeId]>,
        max_nodes: usize,
        config: &ClusteringConfig,
    ) -> VisualizationData {
        let mut data = self.visualization_projection(filter, max_nodes);

        let report = match ClusterAnalyzer::new(self, config.clone())
            .detect_clusters(config.default_strategy, VISUAL_MIN_CLUSTER_SIZE)
        {
            Ok(report) => report,
            Err(e) => {
                warn!(error = %e, "Failed to add cluster information");
                return data;
            }
        };

        let mut membership: BTreeMap<&str, usize> = BTreeMap::new();
        for cluster in &report.clusters {
            for id in &cluster.nodes {
                membership.insert(id.as_str(), cluster.cluster_id);
            }
        }
        for node in &mut data.nodes {
            node.cluster_id = membership.get(node.id.as_str()).copied();
        }
        data.clusters = Some(
            report
                .clusters
                .iter()
                .map(|c| {
                    (
                        c.cluster_id,
                        ClusterSummary {
                            nodes: c.nodes.clone(),
                            risk_score: c.risk_score,
                        },
                    )
                })
                .collect(),
        );
        data
    }
}

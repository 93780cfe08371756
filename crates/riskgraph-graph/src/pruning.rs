//! Retention policy: expire stale edges, then stale nodes left without
//! edges, then enforce an optional node cap.

use crate::EntityGraph;
use chrono::{DateTime, Duration, Utc};
use petgraph::stable_graph::EdgeIndex;
use riskgraph_core::{NodeId, RetentionConfig};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    pub edges_removed: usize,
    pub nodes_removed: usize,
}

impl PruneReport {
    pub fn is_empty(&self) -> bool {
        self.edges_removed == 0 && self.nodes_removed == 0
    }
}

/// Remove edges last updated before `cutoff`.
pub fn prune_stale_edges(graph: &mut EntityGraph, cutoff: DateTime<Utc>) -> usize {
    let stale: Vec<EdgeIndex> = graph
        .graph
        .edge_indices()
        .filter(|&idx| {
            graph
                .graph
                .edge_weight(idx)
                .is_some_and(|e| e.updated_at < cutoff)
        })
        .collect();

    let count = stale.len();
    for idx in stale {
        graph.graph.remove_edge(idx);
    }
    count
}

/// Remove nodes last updated before `cutoff` that no longer have any
/// incident edge. A fresh edge keeps a stale endpoint alive.
pub fn prune_stale_nodes(graph: &mut EntityGraph, cutoff: DateTime<Utc>) -> usize {
    let stale: Vec<NodeId> = graph
        .graph
        .node_indices()
        .filter(|&idx| graph.graph[idx].updated_at < cutoff && graph.degree(idx) == 0)
        .map(|idx| graph.graph[idx].id.clone())
        .collect();

    let count = stale.len();
    for id in &stale {
        graph.remove_node(id);
    }
    count
}

/// Evict least recently updated nodes (ties by id) until at most
/// `max_nodes` remain. Returns `(nodes_removed, edges_removed)`.
pub fn enforce_node_cap(graph: &mut EntityGraph, max_nodes: usize) -> (usize, usize) {
    let excess = graph.node_count().saturating_sub(max_nodes);
    if excess == 0 {
        return (0, 0);
    }

    let mut by_age: Vec<(DateTime<Utc>, NodeId)> = graph
        .nodes()
        .map(|n| (n.updated_at, n.id.clone()))
        .collect();
    by_age.sort();

    let edges_before = graph.edge_count();
    for (_, id) in by_age.into_iter().take(excess) {
        graph.remove_node(&id);
    }
    (excess, edges_before - graph.edge_count())
}

/// Full retention pass as configured. Disabled policies are a no-op.
pub fn apply_retention(
    graph: &mut EntityGraph,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> PruneReport {
    let mut report = PruneReport::default();
    if !config.enabled {
        return report;
    }

    // Ages beyond chrono's range mean nothing can be stale.
    let cutoff = config
        .max_node_age_secs
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(Duration::try_seconds)
        .and_then(|age| now.checked_sub_signed(age));
    if let Some(cutoff) = cutoff {
        report.edges_removed += prune_stale_edges(graph, cutoff);
        report.nodes_removed += prune_stale_nodes(graph, cutoff);
    }

    if let Some(max_nodes) = config.max_nodes {
        let (nodes, edges) = enforce_node_cap(graph, max_nodes);
        report.nodes_removed += nodes;
        report.edges_removed += edges;
    }

    if !report.is_empty() {
        info!(
            edges_removed = report.edges_removed,
            nodes_removed = report.nodes_removed,
            "Retention pass removed stale entities"
        );
    }
    report
}

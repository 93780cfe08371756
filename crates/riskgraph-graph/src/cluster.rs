//! Risk cluster detection and hotspot filtering over the undirected
//! projection of the entity graph.

use crate::louvain::louvain;
use crate::projection::UndirectedProjection;
use crate::traversal::{SearchLimits, VisitBudget};
use crate::EntityGraph;
use petgraph::unionfind::UnionFind;
use riskgraph_core::{
    ClusteringConfig, ClusteringStrategy, NodeId, NodeType, Result, RiskGraphError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCluster {
    pub cluster_id: usize,
    /// Member ids in ascending order.
    pub nodes: Vec<NodeId>,
    pub size: usize,
    /// Induced undirected edges over the maximum possible `n(n-1)/2`.
    pub density: f64,
    /// Mean member risk score.
    pub risk_score: f64,
    pub dominant_type: NodeType,
    pub type_distribution: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterReport {
    pub strategy_requested: ClusteringStrategy,
    /// Differs from the request when the backend was unavailable and the
    /// analyzer fell back to connected components.
    pub strategy_used: ClusteringStrategy,
    pub clusters: Vec<RiskCluster>,
    pub total_clusters: usize,
    pub total_nodes_in_clusters: usize,
    pub high_risk_cluster_ids: Vec<usize>,
    pub clusters_by_type: BTreeMap<String, Vec<usize>>,
    /// Modularity of the full partition; nodes outside every cluster count
    /// as singletons. `None` for an empty graph.
    pub modularity: Option<f64>,
    /// True when clique enumeration ran out of visit budget, so the
    /// communities cover only the cliques found so far.
    pub truncated: bool,
}

impl ClusterReport {
    fn empty(strategy: ClusteringStrategy) -> Self {
        Self {
            strategy_requested: strategy,
            strategy_used: strategy,
            clusters: Vec::new(),
            total_clusters: 0,
            total_nodes_in_clusters: 0,
            high_risk_cluster_ids: Vec::new(),
            clusters_by_type: BTreeMap::new(),
            modularity: None,
            truncated: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotspotReport {
    pub min_risk_threshold: f64,
    pub strategy_used: ClusteringStrategy,
    /// Sorted by risk descending, then cluster id.
    pub hotspots: Vec<RiskCluster>,
    pub hotspot_count: usize,
    pub total_nodes_in_hotspots: usize,
    pub average_hotspot_risk: f64,
    /// Carried over from the underlying cluster detection.
    pub truncated: bool,
}

pub struct ClusterAnalyzer<'a> {
    graph: &'a EntityGraph,
    config: ClusteringConfig,
    limits: SearchLimits,
}

impl<'a> ClusterAnalyzer<'a> {
    pub fn new(graph: &'a EntityGraph, config: ClusteringConfig) -> Self {
        Self {
            graph,
            config,
            limits: SearchLimits::default(),
        }
    }

    /// Bounds the clique enumeration, which is exponential in the worst case.
    pub fn with_limits(mut self, limits: SearchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn detect_clusters(
        &self,
        strategy: ClusteringStrategy,
        min_cluster_size: usize,
    ) -> Result<ClusterReport> {
        let projection = UndirectedProjection::build(self.graph);
        if projection.is_empty() {
            return Ok(ClusterReport::empty(strategy));
        }

        let mut truncated = false;
        let (groups, strategy_used) = match strategy {
            ClusteringStrategy::Modularity => {
                match louvain(&projection, self.config.seed, self.config.max_louvain_passes) {
                    Ok(outcome) => {
                        debug!(
                            levels = outcome.levels,
                            modularity = outcome.modularity,
                            "Louvain converged"
                        );
                        (group_labels(&outcome.community), strategy)
                    }
                    Err(RiskGraphError::AlgorithmUnavailable(reason)) => {
                        warn!(%reason, "Modularity clustering unavailable, falling back to connected components");
                        (
                            projection.components(),
                            ClusteringStrategy::ConnectedComponents,
                        )
                    }
                    Err(e) => return Err(e),
                }
            }
            ClusteringStrategy::KClique => {
                let (groups, exhausted) =
                    k_clique_communities(&projection, self.config.k_clique_size, &self.limits)?;
                truncated = exhausted;
                (groups, strategy)
            }
            ClusteringStrategy::ConnectedComponents => (projection.components(), strategy),
        };

        let modularity = Some(partition_modularity(&projection, &groups));

        let mut clusters: Vec<RiskCluster> = groups
            .into_iter()
            .filter(|members| members.len() >= min_cluster_size.max(1))
            .map(|members| self.describe(&projection, &members))
            .collect();
        clusters.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.nodes[0].cmp(&b.nodes[0])));

        let mut report = ClusterReport::empty(strategy);
        report.strategy_used = strategy_used;
        report.modularity = modularity;
        report.truncated = truncated;
        for (id, cluster) in clusters.iter_mut().enumerate() {
            cluster.cluster_id = id;
            report.total_nodes_in_clusters += cluster.size;
            if cluster.risk_score > self.config.high_risk_threshold {
                report.high_risk_cluster_ids.push(id);
            }
            report
                .clusters_by_type
                .entry(cluster.dominant_type.to_string())
                .or_default()
                .push(id);
        }
        report.total_clusters = clusters.len();
        report.clusters = clusters;

        info!(
            requested = %strategy,
            used = %strategy_used,
            clusters = report.total_clusters,
            nodes = report.total_nodes_in_clusters,
            truncated,
            "Cluster detection complete"
        );
        Ok(report)
    }

    /// Clusters from the configured default strategy whose mean risk is at
    /// least `min_risk_threshold`.
    pub fn find_hotspots(
        &self,
        min_risk_threshold: f64,
        min_cluster_size: usize,
    ) -> Result<HotspotReport> {
        if !min_risk_threshold.is_finite() || !(0.0..=1.0).contains(&min_risk_threshold) {
            return Err(RiskGraphError::invalid(format!(
                "min_risk_threshold must be within [0, 1], got {}",
                min_risk_threshold
            )));
        }

        let report = self.detect_clusters(self.config.default_strategy, min_cluster_size)?;
        let mut hotspots: Vec<RiskCluster> = report
            .clusters
            .into_iter()
            .filter(|c| c.risk_score >= min_risk_threshold)
            .collect();
        hotspots.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| a.cluster_id.cmp(&b.cluster_id))
        });

        let total_nodes_in_hotspots = hotspots.iter().map(|h| h.size).sum();
        let average_hotspot_risk = if hotspots.is_empty() {
            0.0
        } else {
            hotspots.iter().map(|h| h.risk_score).sum::<f64>() / hotspots.len() as f64
        };

        Ok(HotspotReport {
            min_risk_threshold,
            strategy_used: report.strategy_used,
            hotspot_count: hotspots.len(),
            hotspots,
            total_nodes_in_hotspots,
            average_hotspot_risk,
            truncated: report.truncated,
        })
    }

    fn describe(&self, projection: &UndirectedProjection, members: &[usize]) -> RiskCluster {
        let g = &self.graph.graph;
        let nodes: Vec<NodeId> = members
            .iter()
            .map(|&pos| g[projection.indices[pos]].id.clone())
            .collect();

        let mut type_distribution: BTreeMap<String, usize> = BTreeMap::new();
        let mut risk_sum = 0.0;
        for &pos in members {
            let node = &g[projection.indices[pos]];
            risk_sum += node.risk_score;
            *type_distribution
                .entry(node.node_type.to_string())
                .or_insert(0) += 1;
        }

        // BTreeMap iterates names ascending, so strict `>` keeps the
        // alphabetically first type on ties.
        let mut dominant: Option<(&String, usize)> = None;
        for (name, &count) in &type_distribution {
            let better = match dominant {
                Some((_, best)) => count > best,
                None => true,
            };
            if better {
                dominant = Some((name, count));
            }
        }
        let dominant_type: NodeType = dominant
            .and_then(|(name, _)| name.parse().ok())
            .unwrap_or_default();

        let size = members.len();
        let density = if size < 2 {
            0.0
        } else {
            let possible = size * (size - 1) / 2;
            projection.induced_edge_count(members) as f64 / possible as f64
        };

        RiskCluster {
            cluster_id: 0,
            nodes,
            size,
            density,
            risk_score: risk_sum / size as f64,
            dominant_type,
            type_distribution,
        }
    }
}

fn group_labels(labels: &[usize]) -> Vec<Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (pos, &label) in labels.iter().enumerate() {
        groups.entry(label).or_default().push(pos);
    }
    groups.into_values().collect()
}

fn partition_modularity(projection: &UndirectedProjection, groups: &[Vec<usize>]) -> f64 {
    // Uncovered positions keep a label of their own.
    let mut labels: Vec<usize> = (0..projection.len()).map(|p| groups.len() + p).collect();
    for (label, members) in groups.iter().enumerate() {
        for &pos in members {
            labels[pos] = label;
        }
    }
    projection.modularity(&labels)
}

/// Maximal cliques of at least `k` nodes, merged whenever they share a node.
///
/// This is an approximation of clique percolation: two cliques touching in a
/// single node end up in one community, and enumeration stops early when the
/// visit budget runs out. The flag reports that early stop.
fn k_clique_communities(
    projection: &UndirectedProjection,
    k: usize,
    limits: &SearchLimits,
) -> Result<(Vec<Vec<usize>>, bool)> {
    let neighbors: Vec<BTreeSet<usize>> = projection
        .adjacency
        .iter()
        .map(|list| list.iter().map(|(n, _)| *n).collect())
        .collect();

    let mut search = CliqueSearch {
        neighbors: &neighbors,
        min_size: k.max(2),
        clique: Vec::new(),
        found: Vec::new(),
        exhausted: false,
    };
    let mut budget = VisitBudget::new(limits);
    search.expand((0..projection.len()).collect(), BTreeSet::new(), &mut budget)?;
    if search.exhausted {
        warn!(
            cliques = search.found.len(),
            "Clique enumeration hit the visit budget; communities are partial"
        );
    }

    let mut uf = UnionFind::new(projection.len());
    let mut covered = vec![false; projection.len()];
    for clique in &search.found {
        for &pos in clique {
            covered[pos] = true;
            uf.union(clique[0], pos);
        }
    }

    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for pos in (0..projection.len()).filter(|&p| covered[p]) {
        groups.entry(uf.find(pos)).or_default().push(pos);
    }
    Ok((groups.into_values().collect(), search.exhausted))
}

/// Bron–Kerbosch with Tomita pivoting.
struct CliqueSearch<'n> {
    neighbors: &'n [BTreeSet<usize>],
    min_size: usize,
    clique: Vec<usize>,
    found: Vec<Vec<usize>>,
    exhausted: bool,
}

impl CliqueSearch<'_> {
    fn expand(
        &mut self,
        mut candidates: BTreeSet<usize>,
        mut excluded: BTreeSet<usize>,
        budget: &mut VisitBudget<'_>,
    ) -> Result<()> {
        if self.exhausted {
            return Ok(());
        }
        if !budget.tick()? {
            self.exhausted = true;
            return Ok(());
        }
        if candidates.is_empty() && excluded.is_empty() {
            if self.clique.len() >= self.min_size {
                let mut clique = self.clique.clone();
                clique.sort_unstable();
                self.found.push(clique);
            }
            return Ok(());
        }
        if self.clique.len() + candidates.len() < self.min_size {
            return Ok(());
        }

        let pivot = candidates
            .iter()
            .chain(excluded.iter())
            .copied()
            .max_by(|&a, &b| {
                let ca = candidates.intersection(&self.neighbors[a]).count();
                let cb = candidates.intersection(&self.neighbors[b]).count();
                ca.cmp(&cb).then_with(|| b.cmp(&a))
            });
        let branch: Vec<usize> = match pivot {
            Some(u) => candidates.difference(&self.neighbors[u]).copied().collect(),
            None => candidates.iter().copied().collect(),
        };

        for v in branch {
            let next_candidates = candidates.intersection(&self.neighbors[v]).copied().collect();
            let next_excluded = excluded.intersection(&self.neighbors[v]).copied().collect();
            self.clique.push(v);
            self.expand(next_candidates, next_excluded, budget)?;
            self.clique.pop();
            candidates.remove(&v);
            excluded.insert(v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgraph_core::{Properties, RelationshipType};

    fn add_node(g: &mut EntityGraph, id: &str, node_type: NodeType, risk: f64) {
        let mut p = Properties::new();
        p.insert("risk_score".into(), serde_json::json!(risk));
        g.upsert_node(id, node_type, p);
    }

    fn link(g: &mut EntityGraph, s: &str, t: &str) {
        g.upsert_edge(s, t, RelationshipType::CorrelatesWith, None, None);
    }

    fn triangle(g: &mut EntityGraph, ids: [&str; 3], risks: [f64; 3]) {
        for (id, risk) in ids.iter().zip(risks) {
            add_node(g, id, NodeType::Bank, risk);
        }
        link(g, ids[0], ids[1]);
        link(g, ids[1], ids[2]);
        link(g, ids[2], ids[0]);
    }

    #[test]
    fn complete_triangle_metrics() {
        let mut g = EntityGraph::new();
        triangle(&mut g, ["x", "y", "z"], [0.9, 0.8, 0.7]);

        for strategy in [
            ClusteringStrategy::Modularity,
            ClusteringStrategy::KClique,
            ClusteringStrategy::ConnectedComponents,
        ] {
            let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
                .detect_clusters(strategy, 3)
                .unwrap();
            assert_eq!(report.clusters.len(), 1, "{strategy}");
            let cluster = &report.clusters[0];
            assert!((cluster.risk_score - 0.8).abs() < 1e-9);
            assert_eq!(cluster.density, 1.0);
            assert_eq!(cluster.dominant_type, NodeType::Bank);
            assert_eq!(report.high_risk_cluster_ids, vec![0]);
        }
    }

    #[test]
    fn clusters_sorted_by_size_then_id() {
        let mut g = EntityGraph::new();
        triangle(&mut g, ["m1", "m2", "m3"], [0.1, 0.1, 0.1]);
        triangle(&mut g, ["a1", "a2", "a3"], [0.1, 0.1, 0.1]);
        for (s, t) in [("q1", "q2"), ("q2", "q3"), ("q3", "q4")] {
            link(&mut g, s, t);
        }

        let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(ClusteringStrategy::ConnectedComponents, 1)
            .unwrap();
        let firsts: Vec<&str> = report.clusters.iter().map(|c| c.nodes[0].as_str()).collect();
        assert_eq!(firsts, vec!["q1", "a1", "m1"]);
        let ids: Vec<usize> = report.clusters.iter().map(|c| c.cluster_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(report.total_nodes_in_clusters, 10);
    }

    #[test]
    fn zero_weight_modularity_falls_back() {
        let mut g = EntityGraph::new();
        g.upsert_edge("a", "b", RelationshipType::Credits, Some(0.0), None);
        g.upsert_edge("b", "c", RelationshipType::Credits, Some(0.0), None);

        let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(ClusteringStrategy::Modularity, 2)
            .unwrap();
        assert_eq!(report.strategy_requested, ClusteringStrategy::Modularity);
        assert_eq!(report.strategy_used, ClusteringStrategy::ConnectedComponents);
        assert_eq!(report.clusters[0].nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn k_clique_ignores_sparse_tails() {
        let mut g = EntityGraph::new();
        triangle(&mut g, ["a", "b", "c"], [0.5, 0.5, 0.5]);
        link(&mut g, "c", "d");
        link(&mut g, "d", "e");

        let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(ClusteringStrategy::KClique, 1)
            .unwrap();
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].nodes, vec!["a", "b", "c"]);
    }

    #[test]
    fn clique_budget_marks_report_truncated() {
        let mut g = EntityGraph::new();
        triangle(&mut g, ["a", "b", "c"], [0.5, 0.5, 0.5]);
        triangle(&mut g, ["x", "y", "z"], [0.5, 0.5, 0.5]);

        let complete = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(ClusteringStrategy::KClique, 3)
            .unwrap();
        assert!(!complete.truncated);
        assert_eq!(complete.total_clusters, 2);

        let partial = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .with_limits(SearchLimits::new(1))
            .detect_clusters(ClusteringStrategy::KClique, 3)
            .unwrap();
        assert!(partial.truncated);
        assert!(partial.total_clusters < 2);
    }

    #[test]
    fn dominant_type_ties_break_by_name() {
        let mut g = EntityGraph::new();
        add_node(&mut g, "s", NodeType::Sector, 0.0);
        add_node(&mut g, "c", NodeType::Company, 0.0);
        link(&mut g, "s", "c");

        let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(ClusteringStrategy::ConnectedComponents, 2)
            .unwrap();
        assert_eq!(report.clusters[0].dominant_type, NodeType::Company);
    }

    #[test]
    fn hotspots_filter_by_threshold() {
        let mut g = EntityGraph::new();
        triangle(&mut g, ["h1", "h2", "h3"], [0.9, 0.8, 0.7]);
        triangle(&mut g, ["l1", "l2", "l3"], [0.6, 0.6, 0.6]);

        let analyzer = ClusterAnalyzer::new(&g, ClusteringConfig::default());
        let hotspots = analyzer.find_hotspots(0.7, 3).unwrap();
        assert_eq!(hotspots.hotspot_count, 1);
        assert_eq!(hotspots.hotspots[0].nodes, vec!["h1", "h2", "h3"]);
        assert_eq!(hotspots.total_nodes_in_hotspots, 3);

        assert!(matches!(
            analyzer.find_hotspots(1.5, 3),
            Err(RiskGraphError::InvalidInput(_))
        ));
        assert!(analyzer.find_hotspots(f64::NAN, 3).is_err());
    }

    #[test]
    fn empty_graph_has_no_clusters() {
        let g = EntityGraph::new();
        let report = ClusterAnalyzer::new(&g, ClusteringConfig::default())
            .detect_clusters(ClusteringStrategy::Modularity, 1)
            .unwrap();
        assert!(report.clusters.is_empty());
        assert!(report.modularity.is_none());
    }
}

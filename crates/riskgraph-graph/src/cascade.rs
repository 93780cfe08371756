//! Cascade-effect analysis: who is reachable from a source entity, grouped
//! by hop distance, plus the highest-risk paths into those groups.

use crate::traversal::{InfluencePath, PathAnalyzer, SearchLimits, VisitBudget};
use crate::EntityGraph;
use petgraph::Direction;
use petgraph::visit::NodeIndexable;
use riskgraph_core::{clamp_unit, NodeId, Result, RiskGraphError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::info;

pub const DEFAULT_SAMPLES_PER_DEPTH: usize = 16;
pub const DEFAULT_MAX_CRITICAL_PATHS: usize = 10;

/// Nodes found at one hop distance from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthBucket {
    pub node_count: usize,
    pub nodes: Vec<NodeId>,
    pub average_risk: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeAnalysis {
    pub source_id: NodeId,
    pub source_risk: f64,
    pub max_depth: usize,
    /// Every node reachable from the source, including those deeper than
    /// `max_depth`.
    pub total_reachable: usize,
    pub depth_breakdown: BTreeMap<usize, DepthBucket>,
    pub critical_paths: Vec<InfluencePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_influence: Option<BTreeMap<NodeId, f64>>,
    pub truncated: bool,
    pub visited: usize,
}

/// Outcome of a cascade query. An unknown source is a normal answer, not an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CascadeReport {
    Found(CascadeAnalysis),
    NotFound { source_id: NodeId },
}

impl CascadeReport {
    pub fn analysis(&self) -> Option<&CascadeAnalysis> {
        match self {
            CascadeReport::Found(a) => Some(a),
            CascadeReport::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, CascadeReport::Found(_))
    }
}

pub struct CascadeAnalyzer<'a> {
    graph: &'a EntityGraph,
    limits: SearchLimits,
    samples_per_depth: usize,
    max_critical_paths: usize,
    predictions: Option<&'a HashMap<NodeId, f64>>,
}

impl<'a> CascadeAnalyzer<'a> {
    pub fn new(graph: &'a EntityGraph, limits: SearchLimits) -> Self {
        Self {
            graph,
            limits,
            samples_per_depth: DEFAULT_SAMPLES_PER_DEPTH,
            max_critical_paths: DEFAULT_MAX_CRITICAL_PATHS,
            predictions: None,
        }
    }

    pub fn with_sampling(mut self, samples_per_depth: usize, max_critical_paths: usize) -> Self {
        self.samples_per_depth = samples_per_depth;
        self.max_critical_paths = max_critical_paths;
        self
    }

    /// Rank critical-path candidates by predicted influence instead of raw
    /// node risk.
    pub fn with_predictions(mut self, predictions: &'a HashMap<NodeId, f64>) -> Self {
        self.predictions = Some(predictions);
        self
    }

    pub fn analyze_cascade(&self, source: &str, max_depth: usize) -> Result<CascadeReport> {
        if max_depth == 0 {
            return Err(RiskGraphError::invalid("max_depth must be at least 1"));
        }
        let Some(start) = self.graph.index_of(source) else {
            info!(source, "Cascade source not in graph");
            return Ok(CascadeReport::NotFound {
                source_id: source.to_string(),
            });
        };

        let g = &self.graph.graph;
        let mut budget = VisitBudget::new(&self.limits);
        budget.check_cancelled()?;

        let mut depth_of: Vec<Option<usize>> = vec![None; g.node_bound()];
        let mut queue = VecDeque::new();
        depth_of[start.index()] = Some(0);
        queue.push_back(start);
        let mut total_reachable = 0usize;
        let mut buckets: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        let mut truncated = false;

        while let Some(current) = queue.pop_front() {
            if !budget.tick()? {
                truncated = true;
                break;
            }
            let depth = depth_of[current.index()].unwrap_or(0);
            for next in g.neighbors_directed(current, Direction::Outgoing) {
                if depth_of[next.index()].is_some() {
                    continue;
                }
                depth_of[next.index()] = Some(depth + 1);
                total_reachable += 1;
                if depth < max_depth {
                    buckets
                        .entry(depth + 1)
                        .or_default()
                        .push(g[next].id.clone());
                }
                queue.push_back(next);
            }
        }

        let mut depth_breakdown = BTreeMap::new();
        for (depth, mut nodes) in buckets {
            nodes.sort();
            let risk_sum: f64 = nodes.iter().map(|id| self.graph.risk_score(id)).sum();
            depth_breakdown.insert(
                depth,
                DepthBucket {
                    node_count: nodes.len(),
                    average_risk: risk_sum / nodes.len() as f64,
                    nodes,
                },
            );
        }

        // Critical paths draw on what the BFS left of the same budget.
        let critical_paths =
            self.critical_paths(source, &depth_breakdown, &mut budget, &mut truncated)?;

        info!(
            source,
            max_depth,
            total_reachable,
            critical_paths = critical_paths.len(),
            truncated,
            "Cascade analysis complete"
        );

        Ok(CascadeReport::Found(CascadeAnalysis {
            source_id: source.to_string(),
            source_risk: self.graph.risk_score(source),
            max_depth,
            total_reachable,
            depth_breakdown,
            critical_paths,
            predicted_influence: self.predictions.map(|p| {
                p.iter()
                    .map(|(k, v)| (k.clone(), clamp_unit(*v)))
                    .collect()
            }),
            truncated,
            visited: budget.visited,
        }))
    }

    fn critical_paths(
        &self,
        source: &str,
        depth_breakdown: &BTreeMap<usize, DepthBucket>,
        budget: &mut VisitBudget<'_>,
        truncated: &mut bool,
    ) -> Result<Vec<InfluencePath>> {
        let paths = PathAnalyzer::new(self.graph, self.limits.clone());
        let mut candidates = Vec::new();

        'buckets: for (&depth, bucket) in depth_breakdown {
            for target in self.sample(&bucket.nodes) {
                let search = paths.find_paths_within(source, target, depth, 1, budget)?;
                candidates.extend(search.paths.into_iter().next());
                if search.truncated {
                    *truncated = true;
                    break 'buckets;
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.risk_propagation
                .total_cmp(&a.risk_propagation)
                .then_with(|| a.nodes.cmp(&b.nodes))
        });
        candidates.truncate(self.max_critical_paths);
        Ok(candidates)
    }

    /// Highest-ranked nodes of one bucket: predicted influence when present,
    /// then risk, both descending, then id.
    fn sample<'n>(&self, nodes: &'n [NodeId]) -> Vec<&'n str> {
        let influence = |id: &str| {
            self.predictions
                .and_then(|p| p.get(id))
                .map(|v| clamp_unit(*v))
                .unwrap_or(0.0)
        };
        let mut ranked: Vec<&str> = nodes.iter().map(String::as_str).collect();
        ranked.sort_by(|a, b| {
            influence(b)
                .total_cmp(&influence(a))
                .then_with(|| self.graph.risk_score(b).total_cmp(&self.graph.risk_score(a)))
                .then_with(|| a.cmp(b))
        });
        ranked.truncate(self.samples_per_depth);
        ranked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgraph_core::{NodeType, Properties, RelationshipType};

    fn chain() -> EntityGraph {
        let mut g = EntityGraph::new();
        for (s, t) in [("A", "B"), ("B", "C"), ("C", "D")] {
            g.upsert_edge(s, t, RelationshipType::Credits, None, None);
        }
        g
    }

    fn set_risk(g: &mut EntityGraph, id: &str, risk: f64) {
        let mut p = Properties::new();
        p.insert("risk_score".into(), serde_json::json!(risk));
        g.upsert_node(id, NodeType::Company, p);
    }

    #[test]
    fn buckets_by_depth_and_excludes_deeper_nodes() {
        let g = chain();
        let report = CascadeAnalyzer::new(&g, SearchLimits::default())
            .analyze_cascade("A", 2)
            .unwrap();
        let analysis = report.analysis().unwrap();

        assert_eq!(analysis.depth_breakdown[&1].nodes, vec!["B".to_string()]);
        assert_eq!(analysis.depth_breakdown[&2].nodes, vec!["C".to_string()]);
        assert!(!analysis.depth_breakdown.contains_key(&3));
        assert_eq!(analysis.total_reachable, 3);
        assert_eq!(analysis.critical_paths.len(), 2);
    }

    #[test]
    fn one_budget_covers_bfs_and_critical_paths() {
        let g = chain();
        let full = CascadeAnalyzer::new(&g, SearchLimits::default())
            .analyze_cascade("A", 3)
            .unwrap();
        let full = full.analysis().unwrap();
        // 4 BFS pops, then 2 + 3 + 4 walk visits for the paths to B, C, D.
        assert_eq!(full.visited, 13);
        assert!(!full.truncated);
        assert_eq!(full.critical_paths.len(), 3);

        let capped = CascadeAnalyzer::new(&g, SearchLimits::new(7))
            .analyze_cascade("A", 3)
            .unwrap();
        let capped = capped.analysis().unwrap();
        assert!(capped.truncated);
        assert_eq!(capped.visited, 7);
        assert_eq!(capped.total_reachable, 3);
        assert_eq!(capped.critical_paths.len(), 1);
        assert_eq!(capped.critical_paths[0].nodes, vec!["A", "B"]);
    }

    #[test]
    fn absent_source_is_not_found() {
        let g = EntityGraph::new();
        let report = CascadeAnalyzer::new(&g, SearchLimits::default())
            .analyze_cascade("ghost", 3)
            .unwrap();
        assert!(matches!(report, CascadeReport::NotFound { ref source_id } if source_id == "ghost"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "not_found");
    }

    #[test]
    fn zero_depth_is_rejected() {
        let g = chain();
        let err = CascadeAnalyzer::new(&g, SearchLimits::default())
            .analyze_cascade("A", 0)
            .unwrap_err();
        assert!(matches!(err, RiskGraphError::InvalidInput(_)));
    }

    #[test]
    fn critical_paths_rank_by_risk() {
        let mut g = EntityGraph::new();
        g.upsert_edge("src", "calm", RelationshipType::Credits, None, None);
        g.upsert_edge("src", "hot", RelationshipType::Credits, None, None);
        set_risk(&mut g, "hot", 0.9);
        set_risk(&mut g, "calm", 0.1);

        let report = CascadeAnalyzer::new(&g, SearchLimits::default())
            .analyze_cascade("src", 1)
            .unwrap();
        let analysis = report.analysis().unwrap();
        assert_eq!(analysis.critical_paths[0].nodes.last().unwrap(), "hot");
        assert!((analysis.depth_breakdown[&1].average_risk - 0.5).abs() < 1e-9);
    }

    #[test]
    fn predictions_drive_sampling() {
        let mut g = EntityGraph::new();
        for leaf in ["a", "b", "c"] {
            g.upsert_edge("src", leaf, RelationshipType::Credits, None, None);
        }
        set_risk(&mut g, "a", 0.9);
        let predictions: HashMap<NodeId, f64> = [("c".to_string(), 0.95)].into_iter().collect();

        let report = CascadeAnalyzer::new(&g, SearchLimits::default())
            .with_sampling(1, 10)
            .with_predictions(&predictions)
            .analyze_cascade("src", 1)
            .unwrap();
        let analysis = report.analysis().unwrap();
        assert_eq!(analysis.critical_paths.len(), 1);
        assert_eq!(analysis.critical_paths[0].nodes, vec!["src", "c"]);
        assert!(analysis.predicted_influence.is_some());
    }
}

//! Bounded influence-path search between two entities.
//!
//! Enumeration is iterative deepening over simple directed paths. A reverse
//! BFS from the target gives every node its distance-to-target, which lets
//! the search skip branches that cannot reach the target within the
//! remaining depth. Work is capped by a node-visit budget and can be
//! cancelled cooperatively.

use crate::EntityGraph;
use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;
use petgraph::visit::NodeIndexable;
use riskgraph_core::{NodeId, NodeType, RelationshipType, Result, RiskGraphError};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_MAX_VISITS: usize = 100_000;

/// Cancellation is polled once every this many visits.
const CANCEL_CHECK_INTERVAL: usize = 1024;

const UNREACHABLE: usize = usize::MAX;

/// Work bounds shared by path enumeration and cascade BFS.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    /// Maximum number of node expansions before returning partial results.
    pub max_visits: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_visits: DEFAULT_MAX_VISITS,
            cancel: None,
        }
    }
}

impl SearchLimits {
    pub fn new(max_visits: usize) -> Self {
        Self {
            max_visits,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

/// Running visit counter for one query.
#[derive(Debug)]
pub(crate) struct VisitBudget<'a> {
    limits: &'a SearchLimits,
    pub(crate) visited: usize,
}

impl<'a> VisitBudget<'a> {
    pub(crate) fn new(limits: &'a SearchLimits) -> Self {
        Self { limits, visited: 0 }
    }

    /// Count one visit. `Ok(false)` means the budget is spent.
    pub(crate) fn tick(&mut self) -> Result<bool> {
        if self.visited >= self.limits.max_visits {
            return Ok(false);
        }
        self.visited += 1;
        if self.visited % CANCEL_CHECK_INTERVAL == 0 && self.limits.is_cancelled() {
            return Err(RiskGraphError::Cancelled {
                visited: self.visited,
            });
        }
        Ok(true)
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.limits.is_cancelled() {
            return Err(RiskGraphError::Cancelled {
                visited: self.visited,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNodeDetail {
    pub id: NodeId,
    pub node_type: NodeType,
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathEdgeDetail {
    pub source: NodeId,
    pub target: NodeId,
    pub relationship_type: RelationshipType,
    pub weight: f64,
}

/// A simple directed path with its weight and risk summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfluencePath {
    pub nodes: Vec<NodeId>,
    /// Number of edges.
    pub length: usize,
    pub total_weight: f64,
    pub risk_propagation: f64,
    pub node_details: Vec<PathNodeDetail>,
    pub edge_details: Vec<PathEdgeDetail>,
}

/// Result of a bounded path search.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSearch {
    pub paths: Vec<InfluencePath>,
    /// True when the visit budget ran out before the search finished.
    pub truncated: bool,
    pub visited: usize,
}

/// Risk metrics for a caller-supplied path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathRiskAnalysis {
    pub path: Vec<NodeId>,
    pub length: usize,
    pub total_risk: f64,
    pub average_risk: f64,
    pub max_risk: f64,
    pub total_weight: f64,
    pub risk_propagation: f64,
}

/// Mean node risk along `path`; missing nodes count as 0.
///
/// This is an unnormalized ranking heuristic, not a probability: it ignores
/// edge weights and does not decay with distance.
pub fn risk_propagation(graph: &EntityGraph, path: &[NodeId]) -> f64 {
    if path.is_empty() {
        return 0.0;
    }
    let total: f64 = path.iter().map(|id| graph.risk_score(id)).sum();
    total / path.len() as f64
}

/// Path queries over a borrowed graph.
pub struct PathAnalyzer<'a> {
    graph: &'a EntityGraph,
    limits: SearchLimits,
}

impl<'a> PathAnalyzer<'a> {
    pub fn new(graph: &'a EntityGraph, limits: SearchLimits) -> Self {
        Self { graph, limits }
    }

    /// Up to `max_path_count` simple paths from `source` to `target` with at
    /// most `max_depth` edges, ordered by length ascending, then total weight
    /// descending, then node ids.
    pub fn find_paths(
        &self,
        source: &str,
        target: &str,
        max_depth: usize,
        max_path_count: usize,
    ) -> Result<PathSearch> {
        let mut budget = VisitBudget::new(&self.limits);
        let search =
            self.find_paths_within(source, target, max_depth, max_path_count, &mut budget)?;
        info!(
            source,
            target,
            max_depth,
            paths = search.paths.len(),
            visited = search.visited,
            truncated = search.truncated,
            "Influence path search complete"
        );
        Ok(search)
    }

    /// [`find_paths`](Self::find_paths) charged against a caller-owned
    /// budget. Once a walk runs, `visited` is the budget total so far.
    pub(crate) fn find_paths_within(
        &self,
        source: &str,
        target: &str,
        max_depth: usize,
        max_path_count: usize,
        budget: &mut VisitBudget<'_>,
    ) -> Result<PathSearch> {
        if source == target || max_depth == 0 || max_path_count == 0 {
            return Ok(PathSearch::default());
        }
        let (Some(s), Some(t)) = (self.graph.index_of(source), self.graph.index_of(target))
        else {
            info!(source, target, "Path search endpoint not in graph");
            return Ok(PathSearch::default());
        };

        // A simple path never has more than n - 1 edges.
        let max_depth = max_depth.min(self.graph.node_count().saturating_sub(1));
        let dist = self.distances_to(t, max_depth);
        let shortest = dist[s.index()];
        if shortest == UNREACHABLE {
            debug!(source, target, max_depth, "Target unreachable within depth");
            return Ok(PathSearch::default());
        }

        budget.check_cancelled()?;

        let mut search = PathSearch::default();
        for len in shortest..=max_depth {
            let mut walker = DepthWalker {
                graph: self.graph,
                dist: &dist,
                target: t,
                len,
                on_path: vec![false; self.graph.graph.node_bound()],
                path: Vec::with_capacity(len + 1),
                found: Vec::new(),
                exhausted: false,
            };
            walker.walk(s, budget)?;

            let mut level: Vec<InfluencePath> = walker
                .found
                .iter()
                .map(|p| self.build_path(p))
                .collect();
            level.sort_by(compare_paths);

            let remaining = max_path_count - search.paths.len();
            level.truncate(remaining);
            search.paths.extend(level);

            if walker.exhausted {
                search.truncated = true;
                break;
            }
            if search.paths.len() >= max_path_count {
                break;
            }
        }
        search.visited = budget.visited;
        Ok(search)
    }

    /// Shortest path (ties broken by heavier total weight, then ids).
    pub fn shortest_path(
        &self,
        source: &str,
        target: &str,
        max_depth: usize,
    ) -> Result<Option<InfluencePath>> {
        let search = self.find_paths(source, target, max_depth, 1)?;
        Ok(search.paths.into_iter().next())
    }

    /// Validate `path` against the graph and summarise its risk.
    pub fn analyze_path_risk(&self, path: &[NodeId]) -> Result<PathRiskAnalysis> {
        if path.is_empty() {
            return Err(RiskGraphError::invalid("Path must contain at least one node"));
        }
        let mut risks = Vec::with_capacity(path.len());
        for id in path {
            let node = self
                .graph
                .node(id)
                .ok_or_else(|| RiskGraphError::not_found(id.clone()))?;
            risks.push(node.risk_score);
        }

        let mut total_weight = 0.0;
        for pair in path.windows(2) {
            let edge = self.graph.edge(&pair[0], &pair[1]).ok_or_else(|| {
                RiskGraphError::invalid(format!("No edge from {} to {}", pair[0], pair[1]))
            })?;
            total_weight += edge.weight;
        }

        let total_risk: f64 = risks.iter().sum();
        Ok(PathRiskAnalysis {
            path: path.to_vec(),
            length: path.len() - 1,
            total_risk,
            average_risk: total_risk / path.len() as f64,
            max_risk: risks.iter().copied().fold(0.0, f64::max),
            total_weight,
            risk_propagation: risk_propagation(self.graph, path),
        })
    }

    /// Hop distance from every node to `target`, up to `max_depth`.
    fn distances_to(&self, target: NodeIndex, max_depth: usize) -> Vec<usize> {
        let mut dist = vec![UNREACHABLE; self.graph.graph.node_bound()];
        let mut queue = VecDeque::new();
        dist[target.index()] = 0;
        queue.push_back(target);

        while let Some(current) = queue.pop_front() {
            let d = dist[current.index()];
            if d >= max_depth {
                continue;
            }
            for pred in self.graph.graph.neighbors_directed(current, Direction::Incoming) {
                if dist[pred.index()] == UNREACHABLE {
                    dist[pred.index()] = d + 1;
                    queue.push_back(pred);
                }
            }
        }
        dist
    }

    fn build_path(&self, indices: &[NodeIndex]) -> InfluencePath {
        let g = &self.graph.graph;
        let node_details: Vec<PathNodeDetail> = indices
            .iter()
            .map(|&idx| {
                let node = &g[idx];
                PathNodeDetail {
                    id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    risk_score: node.risk_score,
                }
            })
            .collect();

        let edge_details: Vec<PathEdgeDetail> = indices
            .windows(2)
            .filter_map(|pair| g.find_edge(pair[0], pair[1]))
            .map(|e| {
                let edge = &g[e];
                PathEdgeDetail {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    relationship_type: edge.relationship_type.clone(),
                    weight: edge.weight,
                }
            })
            .collect();

        let nodes: Vec<NodeId> = node_details.iter().map(|n| n.id.clone()).collect();
        let total_weight = edge_details.iter().map(|e| e.weight).sum();
        let risk = node_details.iter().map(|n| n.risk_score).sum::<f64>() / nodes.len() as f64;

        InfluencePath {
            length: nodes.len().saturating_sub(1),
            nodes,
            total_weight,
            risk_propagation: risk,
            node_details,
            edge_details,
        }
    }
}

fn compare_paths(a: &InfluencePath, b: &InfluencePath) -> std::cmp::Ordering {
    a.length
        .cmp(&b.length)
        .then_with(|| b.total_weight.total_cmp(&a.total_weight))
        .then_with(|| a.nodes.cmp(&b.nodes))
}

/// Depth-first enumeration of simple paths of exactly `len` edges.
///
/// The descent is driven by an explicit frame stack, so path length is
/// bounded by the heap rather than the thread stack.
struct DepthWalker<'g> {
    graph: &'g EntityGraph,
    dist: &'g [usize],
    target: NodeIndex,
    len: usize,
    on_path: Vec<bool>,
    path: Vec<NodeIndex>,
    found: Vec<Vec<NodeIndex>>,
    exhausted: bool,
}

/// Outgoing neighbours of one path node and the next one to try.
struct Frame {
    neighbors: Vec<NodeIndex>,
    cursor: usize,
}

impl DepthWalker<'_> {
    fn walk(&mut self, start: NodeIndex, budget: &mut VisitBudget<'_>) -> Result<()> {
        let mut stack = Vec::new();
        match self.enter(start, budget)? {
            Some(frame) => stack.push(frame),
            None => return Ok(()),
        }

        while let Some(frame) = stack.last_mut() {
            let Some(&next) = frame.neighbors.get(frame.cursor) else {
                stack.pop();
                self.leave();
                continue;
            };
            frame.cursor += 1;

            let depth = self.path.len() - 1;
            let remaining = self.dist[next.index()];
            if self.on_path[next.index()]
                || remaining == UNREACHABLE
                || depth + 1 + remaining > self.len
            {
                continue;
            }
            match self.enter(next, budget)? {
                Some(frame) => stack.push(frame),
                None => break,
            }
        }

        Ok(())
    }

    /// Spend one visit and push `node` onto the path. `None` means the budget
    /// is spent and the walk must stop.
    fn enter(
        &mut self,
        node: NodeIndex,
        budget: &mut VisitBudget<'_>,
    ) -> Result<Option<Frame>> {
        if !budget.tick()? {
            self.exhausted = true;
            return Ok(None);
        }
        self.path.push(node);
        self.on_path[node.index()] = true;

        // Paths end at the target, so it is never expanded.
        let neighbors = if node == self.target {
            if self.path.len() - 1 == self.len {
                self.found.push(self.path.clone());
            }
            Vec::new()
        } else {
            self.graph.sorted_neighbors(node, Direction::Outgoing)
        };
        Ok(Some(Frame {
            neighbors,
            cursor: 0,
        }))
    }

    fn leave(&mut self) {
        if let Some(node) = self.path.pop() {
            self.on_path[node.index()] = false;
        }
    }
}

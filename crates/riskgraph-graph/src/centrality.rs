//! Degree, betweenness and closeness centrality.
//!
//! Computation runs on a compact adjacency copy so the graph lock is only
//! held while copying and while writing results back. Above
//! `exact_centrality_max_nodes` both betweenness and closeness switch to
//! seeded pivot sampling and the results are flagged `sampled`.

use crate::EntityGraph;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use petgraph::stable_graph::NodeIndex;
use petgraph::Direction;
use petgraph::visit::NodeIndexable;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use riskgraph_core::{Centrality, NodeId, Result, RiskGraphError, UpdaterConfig};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Sources per rayon task; partial sums are added in chunk order so the
/// result does not depend on thread scheduling.
const SOURCE_CHUNK: usize = 32;

/// Adjacency snapshot detached from the graph lock.
#[derive(Debug, Clone, Default)]
pub struct CentralityInput {
    pub ids: Vec<NodeId>,
    outgoing: Vec<Vec<usize>>,
    incoming: Vec<Vec<usize>>,
}

impl CentralityInput {
    pub fn from_graph(graph: &EntityGraph) -> Self {
        let indices = graph.sorted_indices();
        let mut position = vec![usize::MAX; graph.graph.node_bound()];
        for (pos, idx) in indices.iter().enumerate() {
            position[idx.index()] = pos;
        }
        let neighbors = |idx: NodeIndex, dir: Direction| -> Vec<usize> {
            graph
                .graph
                .neighbors_directed(idx, dir)
                .map(|n| position[n.index()])
                .collect()
        };

        Self {
            ids: indices.iter().map(|&i| graph.id_of(i).to_string()).collect(),
            outgoing: indices
                .iter()
                .map(|&i| neighbors(i, Direction::Outgoing))
                .collect(),
            incoming: indices
                .iter()
                .map(|&i| neighbors(i, Direction::Incoming))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CentralityScores {
    pub ids: Vec<NodeId>,
    pub degree: Vec<f64>,
    pub betweenness: Vec<f64>,
    pub closeness: Vec<f64>,
    pub sampled: bool,
    pub computed_at: DateTime<Utc>,
}

impl CentralityScores {
    pub fn get(&self, id: &str) -> Option<Centrality> {
        let pos = self.ids.iter().position(|x| x == id)?;
        Some(self.at(pos))
    }

    fn at(&self, pos: usize) -> Centrality {
        Centrality {
            degree: self.degree[pos],
            betweenness: self.betweenness[pos],
            closeness: self.closeness[pos],
            computed_at: Some(self.computed_at),
            sampled: self.sampled,
        }
    }
}

pub fn compute_centrality(input: &CentralityInput, config: &UpdaterConfig) -> CentralityScores {
    let n = input.len();
    let sampled = n > config.exact_centrality_max_nodes;
    let pivots: Vec<usize> = if sampled {
        let mut rng = StdRng::seed_from_u64(config.sample_seed);
        let k = config.centrality_sample_size.clamp(1, n);
        let mut picked = rand::seq::index::sample(&mut rng, n, k).into_vec();
        picked.sort_unstable();
        picked
    } else {
        (0..n).collect()
    };

    let (betweenness, closeness) = rayon::join(
        || betweenness(input, &pivots, sampled),
        || {
            if sampled {
                sampled_closeness(input, &pivots)
            } else {
                exact_closeness(input)
            }
        },
    );

    CentralityScores {
        ids: input.ids.clone(),
        degree: degree(input),
        betweenness,
        closeness,
        sampled,
        computed_at: Utc::now(),
    }
}

fn degree(input: &CentralityInput) -> Vec<f64> {
    let n = input.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    let scale = 1.0 / (n - 1) as f64;
    (0..n)
        .map(|v| (input.outgoing[v].len() + input.incoming[v].len()) as f64 * scale)
        .collect()
}

/// Brandes accumulation from `sources`, unweighted and directed.
fn betweenness(input: &CentralityInput, sources: &[usize], sampled: bool) -> Vec<f64> {
    let n = input.len();
    if n <= 2 {
        return vec![0.0; n];
    }

    let partials: Vec<Vec<f64>> = sources
        .par_chunks(SOURCE_CHUNK)
        .map(|chunk| {
            let mut acc = vec![0.0; n];
            for &s in chunk {
                accumulate_dependencies(input, s, &mut acc);
            }
            acc
        })
        .collect();

    let mut scores = vec![0.0; n];
    for partial in partials {
        for (total, value) in scores.iter_mut().zip(partial) {
            *total += value;
        }
    }

    let mut scale = 1.0 / ((n - 1) * (n - 2)) as f64;
    if sampled {
        scale *= n as f64 / sources.len() as f64;
    }
    for value in &mut scores {
        *value *= scale;
    }
    scores
}

fn accumulate_dependencies(input: &CentralityInput, source: usize, acc: &mut [f64]) {
    let n = input.len();
    let mut stack = Vec::with_capacity(n);
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut dist = vec![-1i64; n];
    sigma[source] = 1.0;
    dist[source] = 0;

    let mut queue = VecDeque::new();
    queue.push_back(source);
    while let Some(v) = queue.pop_front() {
        stack.push(v);
        for &w in &input.outgoing[v] {
            if dist[w] < 0 {
                dist[w] = dist[v] + 1;
                queue.push_back(w);
            }
            if dist[w] == dist[v] + 1 {
                sigma[w] += sigma[v];
                preds[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = stack.pop() {
        for &v in &preds[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
        if w != source {
            acc[w] += delta[w];
        }
    }
}

/// Hop distances from `start` following `adjacency`.
fn bfs_distances(adjacency: &[Vec<usize>], start: usize) -> Vec<Option<usize>> {
    let mut dist = vec![None; adjacency.len()];
    dist[start] = Some(0);
    let mut queue = VecDeque::new();
    queue.push_back(start);
    while let Some(v) = queue.pop_front() {
        let d = dist[v].unwrap_or(0);
        for &w in &adjacency[v] {
            if dist[w].is_none() {
                dist[w] = Some(d + 1);
                queue.push_back(w);
            }
        }
    }
    dist
}

/// Closeness over incoming distances with the Wasserman–Faust correction for
/// graphs that are not strongly connected.
fn exact_closeness(input: &CentralityInput) -> Vec<f64> {
    let n = input.len();
    if n <= 1 {
        return vec![0.0; n];
    }
    (0..n)
        .into_par_iter()
        .map(|v| {
            let dist = bfs_distances(&input.incoming, v);
            let (reached, total) = dist
                .iter()
                .flatten()
                .fold((0usize, 0usize), |(r, t), d| (r + 1, t + d));
            if total == 0 {
                return 0.0;
            }
            let others = (reached - 1) as f64;
            (others / total as f64) * (others / (n - 1) as f64)
        })
        .collect()
}

/// Estimate closeness from forward BFS out of each pivot: the share of
/// pivots reaching a node stands in for its reachable fraction, and their
/// mean distance for its average distance.
fn sampled_closeness(input: &CentralityInput, pivots: &[usize]) -> Vec<f64> {
    let n = input.len();
    let per_pivot: Vec<Vec<Option<usize>>> = pivots
        .par_iter()
        .map(|&p| bfs_distances(&input.outgoing, p))
        .collect();

    (0..n)
        .map(|v| {
            let mut reached = 0usize;
            let mut total = 0usize;
            let mut eligible = 0usize;
            for (dist, &p) in per_pivot.iter().zip(pivots) {
                if p == v {
                    continue;
                }
                eligible += 1;
                if let Some(d) = dist[v] {
                    reached += 1;
                    total += d;
                }
            }
            if total == 0 || eligible == 0 {
                return 0.0;
            }
            (reached as f64 / eligible as f64) * (reached as f64 / total as f64)
        })
        .collect()
}

impl EntityGraph {
    /// Write scores onto nodes that still exist. Returns how many were
    /// updated; ids removed since the input was taken are skipped.
    pub fn apply_centrality(&mut self, scores: &CentralityScores) -> usize {
        let mut updated = 0;
        for (pos, id) in scores.ids.iter().enumerate() {
            if let Some(idx) = self.index_of(id) {
                self.graph[idx].centrality = scores.at(pos);
                updated += 1;
            }
        }
        updated
    }
}

/// Recompute centrality for a shared graph: copy under a read lock, compute
/// on the blocking pool, write back under a short write lock.
pub async fn refresh_centrality(
    graph: Arc<RwLock<EntityGraph>>,
    config: UpdaterConfig,
) -> Result<usize> {
    let input = {
        let guard = graph.read();
        CentralityInput::from_graph(&guard)
    };
    if input.is_empty() {
        debug!("Skipping centrality on empty graph");
        return Ok(0);
    }

    let nodes = input.len();
    let scores = tokio::task::spawn_blocking(move || compute_centrality(&input, &config))
        .await
        .map_err(|e| RiskGraphError::Task(format!("Centrality task failed: {}", e)))?;

    let updated = graph.write().apply_centrality(&scores);
    info!(
        nodes,
        updated,
        sampled = scores.sampled,
        "Centrality recomputed"
    );
    Ok(updated)
}

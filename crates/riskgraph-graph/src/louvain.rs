//! Seeded Louvain community detection (local moving + aggregation).
//!
//! Node visiting order is shuffled with a seeded `StdRng`, and ties between
//! candidate communities keep the current one, else the lowest label, so a
//! given seed and graph always produce the same partition.

use crate::projection::UndirectedProjection;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use riskgraph_core::{Result, RiskGraphError};
use std::collections::BTreeMap;
use tracing::debug;

const GAIN_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone)]
pub(crate) struct LouvainOutcome {
    /// Community label per projection position, numbered by first member.
    pub(crate) community: Vec<usize>,
    pub(crate) modularity: f64,
    pub(crate) levels: usize,
}

/// One level of the coarsened graph. `self_loops[c]` holds twice the weight
/// internal to super-node `c`.
struct Level {
    adjacency: Vec<Vec<(usize, f64)>>,
    self_loops: Vec<f64>,
}

impl Level {
    fn len(&self) -> usize {
        self.adjacency.len()
    }

    fn strength(&self, node: usize) -> f64 {
        self.adjacency[node].iter().map(|(_, w)| w).sum::<f64>() + self.self_loops[node]
    }
}

pub(crate) fn louvain(
    projection: &UndirectedProjection,
    seed: u64,
    max_passes: usize,
) -> Result<LouvainOutcome> {
    if projection.total_weight <= 0.0 {
        return Err(RiskGraphError::AlgorithmUnavailable(
            "modularity is undefined without positive edge weight".to_string(),
        ));
    }

    let m2 = 2.0 * projection.total_weight;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut membership: Vec<usize> = (0..projection.len()).collect();
    let mut level = Level {
        adjacency: projection.adjacency.clone(),
        self_loops: vec![0.0; projection.len()],
    };
    let mut levels = 0;

    for _ in 0..max_passes.max(1) {
        let (community, improved) = local_moving(&level, m2, &mut rng, max_passes);
        if !improved {
            break;
        }

        let (labels, count) = renumber(&community);
        for m in membership.iter_mut() {
            *m = labels[*m];
        }
        level = aggregate(&level, &labels, count);
        levels += 1;
        debug!(level = levels, communities = count, "Louvain aggregation");
    }

    let (community, _) = renumber(&membership);
    let modularity = projection.modularity(&community);
    Ok(LouvainOutcome {
        community,
        modularity,
        levels,
    })
}

/// Greedy node moves until no move improves modularity. Returns the
/// community per level node and whether anything moved.
fn local_moving(
    level: &Level,
    m2: f64,
    rng: &mut StdRng,
    max_passes: usize,
) -> (Vec<usize>, bool) {
    let n = level.len();
    let strength: Vec<f64> = (0..n).map(|i| level.strength(i)).collect();
    let mut community: Vec<usize> = (0..n).collect();
    let mut totals = strength.clone();
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    let mut improved = false;

    for _ in 0..max_passes.max(1) {
        let mut moved = false;
        for &node in &order {
            let current = community[node];
            let k = strength[node];

            let mut links: BTreeMap<usize, f64> = BTreeMap::new();
            for &(other, w) in &level.adjacency[node] {
                *links.entry(community[other]).or_insert(0.0) += w;
            }

            totals[current] -= k;
            let gain = |c: usize, w: f64| w - totals[c] * k / m2;
            let mut best = current;
            let mut best_gain = gain(current, links.get(&current).copied().unwrap_or(0.0));
            for (&c, &w) in &links {
                let g = gain(c, w);
                if g > best_gain + GAIN_EPSILON {
                    best = c;
                    best_gain = g;
                }
            }
            totals[best] += k;

            if best != current {
                community[node] = best;
                moved = true;
                improved = true;
            }
        }
        if !moved {
            break;
        }
    }
    (community, improved)
}

/// Relabel communities 0..k in order of their lowest member.
fn renumber(community: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: BTreeMap<usize, usize> = BTreeMap::new();
    let labels = community
        .iter()
        .map(|c| {
            let next = mapping.len();
            *mapping.entry(*c).or_insert(next)
        })
        .collect();
    (labels, mapping.len())
}

fn aggregate(level: &Level, labels: &[usize], count: usize) -> Level {
    let mut links: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
    let mut self_loops = vec![0.0; count];

    for node in 0..level.len() {
        let c = labels[node];
        self_loops[c] += level.self_loops[node];
        for &(other, w) in &level.adjacency[node] {
            let d = labels[other];
            if c == d {
                self_loops[c] += w;
            } else {
                *links[c].entry(d).or_insert(0.0) += w;
            }
        }
    }

    Level {
        adjacency: links.into_iter().map(|m| m.into_iter().collect()).collect(),
        self_loops,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EntityGraph;
    use riskgraph_core::RelationshipType;

    fn two_triangles() -> EntityGraph {
        let mut g = EntityGraph::new();
        for (s, t) in [
            ("a1", "a2"),
            ("a2", "a3"),
            ("a3", "a1"),
            ("b1", "b2"),
            ("b2", "b3"),
            ("b3", "b1"),
            ("a1", "b1"),
        ] {
            g.upsert_edge(s, t, RelationshipType::CorrelatesWith, None, None);
        }
        g
    }

    #[test]
    fn separates_loosely_joined_triangles() {
        let projection = UndirectedProjection::build(&two_triangles());
        let outcome = louvain(&projection, 42, 100).unwrap();

        // positions: a1 a2 a3 b1 b2 b3
        assert_eq!(outcome.community, vec![0, 0, 0, 1, 1, 1]);
        assert!(outcome.modularity > 0.3);
    }

    #[test]
    fn same_seed_same_partition() {
        let projection = UndirectedProjection::build(&two_triangles());
        let first = louvain(&projection, 7, 100).unwrap();
        let second = louvain(&projection, 7, 100).unwrap();
        assert_eq!(first.community, second.community);
    }

    #[test]
    fn zero_weight_is_unavailable() {
        let mut g = EntityGraph::new();
        g.upsert_edge("a", "b", RelationshipType::Credits, Some(0.0), None);
        let projection = UndirectedProjection::build(&g);
        assert!(matches!(
            louvain(&projection, 42, 100),
            Err(RiskGraphError::AlgorithmUnavailable(_))
        ));
    }
}

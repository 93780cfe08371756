//! Undirected weighted view of the entity graph used by the community
//! algorithms. Antiparallel edges collapse into one pair whose weight is the
//! sum of both directions; self-loops are dropped.

use crate::EntityGraph;
use petgraph::stable_graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::NodeIndexable;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub(crate) struct UndirectedProjection {
    /// Position -> graph index, in ascending node-id order.
    pub(crate) indices: Vec<NodeIndex>,
    /// Symmetric adjacency lists sorted by neighbor position.
    pub(crate) adjacency: Vec<Vec<(usize, f64)>>,
    /// Sum of pair weights, each undirected pair counted once.
    pub(crate) total_weight: f64,
}

impl UndirectedProjection {
    pub(crate) fn build(graph: &EntityGraph) -> Self {
        let g = &graph.graph;
        let indices = graph.sorted_indices();
        let mut position = vec![usize::MAX; g.node_bound()];
        for (pos, idx) in indices.iter().enumerate() {
            position[idx.index()] = pos;
        }

        let mut pairs: BTreeMap<(usize, usize), f64> = BTreeMap::new();
        for e in g.edge_indices() {
            let Some((s, t)) = g.edge_endpoints(e) else {
                continue;
            };
            if s == t {
                continue;
            }
            let (a, b) = (position[s.index()], position[t.index()]);
            let key = if a < b { (a, b) } else { (b, a) };
            *pairs.entry(key).or_insert(0.0) += g[e].weight;
        }

        let mut adjacency = vec![Vec::new(); indices.len()];
        let mut total_weight = 0.0;
        for (&(a, b), &w) in &pairs {
            adjacency[a].push((b, w));
            adjacency[b].push((a, w));
            total_weight += w;
        }
        for list in &mut adjacency {
            list.sort_by_key(|(n, _)| *n);
        }

        Self {
            indices,
            adjacency,
            total_weight,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.indices.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Weakly connected components, each sorted, ordered by first member.
    pub(crate) fn components(&self) -> Vec<Vec<usize>> {
        let mut uf = UnionFind::new(self.len());
        for (a, list) in self.adjacency.iter().enumerate() {
            for &(b, _) in list {
                uf.union(a, b);
            }
        }
        let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for pos in 0..self.len() {
            groups.entry(uf.find(pos)).or_default().push(pos);
        }
        let mut out: Vec<Vec<usize>> = groups.into_values().collect();
        out.sort_by_key(|members| members[0]);
        out
    }

    /// Number of undirected pairs with both ends in `members`.
    pub(crate) fn induced_edge_count(&self, members: &[usize]) -> usize {
        let mut inside = vec![false; self.len()];
        for &m in members {
            inside[m] = true;
        }
        members
            .iter()
            .map(|&a| {
                self.adjacency[a]
                    .iter()
                    .filter(|(b, _)| *b > a && inside[*b])
                    .count()
            })
            .sum()
    }

    /// Newman modularity of the partition given by `labels` (one label per
    /// position). Zero when the projection carries no weight.
    pub(crate) fn modularity(&self, labels: &[usize]) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        let m2 = 2.0 * self.total_weight;
        let mut internal: BTreeMap<usize, f64> = BTreeMap::new();
        let mut strength: BTreeMap<usize, f64> = BTreeMap::new();
        for (a, list) in self.adjacency.iter().enumerate() {
            let ca = labels[a];
            for &(b, w) in list {
                *strength.entry(ca).or_insert(0.0) += w;
                if labels[b] == ca {
                    *internal.entry(ca).or_insert(0.0) += w;
                }
            }
        }
        strength
            .iter()
            .map(|(c, tot)| {
                let inside = internal.get(c).copied().unwrap_or(0.0);
                inside / m2 - (tot / m2).powi(2)
            })
            .sum()
    }
}

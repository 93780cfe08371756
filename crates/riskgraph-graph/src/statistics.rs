use crate::projection::UndirectedProjection;
use crate::EntityGraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    /// `e / (n(n-1))`, zero for graphs with fewer than two nodes.
    pub density: f64,
    pub component_count: usize,
    /// False for the empty graph.
    pub is_weakly_connected: bool,
    pub node_types: BTreeMap<String, usize>,
    pub relationship_types: BTreeMap<String, usize>,
}

impl EntityGraph {
    pub fn statistics(&self) -> GraphStatistics {
        let n = self.node_count();
        let e = self.edge_count();
        let density = if n <= 1 {
            0.0
        } else {
            e as f64 / (n * (n - 1)) as f64
        };

        let mut node_types = BTreeMap::new();
        for node in self.nodes() {
            *node_types.entry(node.node_type.to_string()).or_insert(0) += 1;
        }
        let mut relationship_types = BTreeMap::new();
        for edge in self.edges() {
            *relationship_types
                .entry(edge.relationship_type.to_string())
                .or_insert(0) += 1;
        }

        let component_count = self.weak_component_count();
        GraphStatistics {
            node_count: n,
            edge_count: e,
            density,
            component_count,
            is_weakly_connected: component_count == 1,
            node_types,
            relationship_types,
        }
    }

    pub fn weak_component_count(&self) -> usize {
        UndirectedProjection::build(self).components().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use riskgraph_core::{NodeType, Properties, RelationshipType};

    #[test]
    fn counts_match_graph() {
        let mut g = EntityGraph::new();
        g.upsert_node("bank", NodeType::Bank, Properties::new());
        g.upsert_edge("bank", "corp", RelationshipType::Credits, None, None);
        g.upsert_edge("corp", "sector", RelationshipType::OperatesIn, None, None);
        g.upsert_node("island", NodeType::Region, Properties::new());

        let stats = g.statistics();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.component_count, 2);
        assert!(!stats.is_weakly_connected);
        assert!((stats.density - 2.0 / 12.0).abs() < 1e-12);
        assert_eq!(stats.node_types.get("unknown"), Some(&2));
        assert_eq!(stats.relationship_types.get("credits"), Some(&1));
    }

    #[test]
    fn empty_graph_statistics() {
        let stats = EntityGraph::new().statistics();
        assert_eq!(stats.node_count, 0);
        assert_eq!(stats.density, 0.0);
        assert_eq!(stats.component_count, 0);
        assert!(!stats.is_weakly_connected);
    }
}

//! In-memory entity graph backed by a petgraph `StableDiGraph` with an
//! id -> index map for O(1) lookup.

use chrono::{DateTime, Utc};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use riskgraph_core::{
    clamp_unit, sanitize_weight, EntityEdge, EntityNode, GraphSnapshot, NodeId, NodeType,
    Properties, RelationshipType, DEFAULT_EDGE_WEIGHT,
};
use std::collections::HashMap;
use tracing::{debug, warn};

pub type EntityStableGraph = StableDiGraph<EntityNode, EntityEdge>;

/// Property key lifted into [`EntityNode::risk_score`] by `upsert_node`.
pub const RISK_SCORE_KEY: &str = "risk_score";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
    Unchanged,
}

/// Directed simple graph of financial entities. Owns every node and edge.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    pub(crate) graph: EntityStableGraph,
    pub(crate) node_index: HashMap<NodeId, NodeIndex>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&EntityNode> {
        self.index_of(id).and_then(|idx| self.graph.node_weight(idx))
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&EntityEdge> {
        self.edge_index(source, target)
            .and_then(|e| self.graph.edge_weight(e))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &EntityNode> {
        self.graph.node_weights()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EntityEdge> {
        self.graph.edge_weights()
    }

    pub fn risk_score(&self, id: &str) -> f64 {
        self.node(id).map(|n| n.risk_score).unwrap_or(0.0)
    }

    /// Explicit upsert-or-create-unknown: returns the index for `id`, creating
    /// a placeholder node of type `unknown` when nobody declared it yet.
    pub fn ensure_node(&mut self, id: &str) -> NodeIndex {
        if let Some(&idx) = self.node_index.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(EntityNode::placeholder(id));
        self.node_index.insert(id.to_string(), idx);
        debug!(node = id, "Created placeholder node for edge endpoint");
        idx
    }

    /// Create or merge a node. Properties overwrite key by key; a numeric
    /// `risk_score` entry is lifted into the node's risk score. Passing
    /// `NodeType::Unknown` never downgrades an already typed node.
    ///
    /// `updated_at` only moves when something changed, so repeating an
    /// identical call is a no-op.
    pub fn upsert_node(
        &mut self,
        id: &str,
        node_type: NodeType,
        properties: Properties,
    ) -> UpsertOutcome {
        let (idx, created) = match self.node_index.get(id) {
            Some(&idx) => (idx, false),
            None => {
                let idx = self.graph.add_node(EntityNode::new(id, node_type.clone()));
                self.node_index.insert(id.to_string(), idx);
                (idx, true)
            }
        };

        let node = &mut self.graph[idx];
        let mut changed = false;

        if !node_type.is_unknown() && node.node_type != node_type {
            node.node_type = node_type;
            changed = true;
        }

        for (key, value) in properties {
            if key == RISK_SCORE_KEY {
                match value.as_f64() {
                    Some(score) => {
                        let score = clamp_unit(score);
                        if node.risk_score != score {
                            node.risk_score = score;
                            changed = true;
                        }
                    }
                    None => warn!(node = id, "Ignoring non-numeric risk_score property"),
                }
                continue;
            }
            if node.properties.get(&key) != Some(&value) {
                node.properties.insert(key, value);
                changed = true;
            }
        }

        if created {
            debug!(node = id, node_type = %node.node_type, "Added node");
            UpsertOutcome::Created
        } else if changed {
            node.touch();
            debug!(node = id, "Updated node");
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Unchanged
        }
    }

    /// Write the outcome of an agent analysis onto a node, creating it if
    /// needed. Always refreshes `updated_at` and `last_analysis`.
    pub fn record_analysis(
        &mut self,
        id: &str,
        node_type: NodeType,
        risk_score: f64,
        agent_id: &str,
        at: DateTime<Utc>,
    ) -> UpsertOutcome {
        let outcome = self.upsert_node(id, node_type, Properties::new());
        let idx = self.ensure_node(id);
        let node = &mut self.graph[idx];
        node.risk_score = clamp_unit(risk_score);
        node.last_analysis = Some(at);
        node.last_agent = Some(agent_id.to_string());
        node.updated_at = at;
        match outcome {
            UpsertOutcome::Created => UpsertOutcome::Created,
            _ => UpsertOutcome::Updated,
        }
    }

    /// Create or overwrite the `(source, target)` edge. Missing endpoints are
    /// created as `unknown` placeholders. `weight: None` keeps the current
    /// weight (1.0 for new edges); `properties: None` keeps the current map.
    pub fn upsert_edge(
        &mut self,
        source: &str,
        target: &str,
        relationship_type: RelationshipType,
        weight: Option<f64>,
        properties: Option<Properties>,
    ) -> UpsertOutcome {
        let weight = weight.map(|w| {
            let clean = sanitize_weight(w);
            if clean != w {
                warn!(source, target, weight = w, "Clamped invalid edge weight to 0");
            }
            clean
        });

        let s = self.ensure_node(source);
        let t = self.ensure_node(target);

        if let Some(e) = self.graph.find_edge(s, t) {
            let edge = &mut self.graph[e];
            let mut changed = false;
            if edge.relationship_type != relationship_type {
                edge.relationship_type = relationship_type;
                changed = true;
            }
            if let Some(w) = weight {
                if edge.weight != w {
                    edge.weight = w;
                    changed = true;
                }
            }
            if let Some(props) = properties {
                if edge.properties != props {
                    edge.properties = props;
                    changed = true;
                }
            }
            if changed {
                edge.updated_at = Utc::now();
                debug!(source, target, "Overwrote edge");
                return UpsertOutcome::Updated;
            }
            return UpsertOutcome::Unchanged;
        }

        let mut edge = EntityEdge::new(source, target, relationship_type)
            .with_weight(weight.unwrap_or(DEFAULT_EDGE_WEIGHT));
        if let Some(props) = properties {
            edge.properties = props;
        }
        debug!(
            "Added edge: {} --[{}]--> {} (weight: {})",
            source, edge.relationship_type, target, edge.weight
        );
        self.graph.add_edge(s, t, edge);
        UpsertOutcome::Created
    }

    /// Ingestion write for a reported dependency. Same merge as
    /// [`upsert_edge`](Self::upsert_edge), but the edge is stamped with `at`
    /// even when the report matches what is stored, so retention treats it
    /// as freshly confirmed.
    pub fn record_dependency(
        &mut self,
        source: &str,
        target: &str,
        relationship_type: RelationshipType,
        weight: f64,
        properties: Properties,
        at: DateTime<Utc>,
    ) -> UpsertOutcome {
        let outcome = self.upsert_edge(
            source,
            target,
            relationship_type,
            Some(weight),
            Some(properties),
        );
        if let Some(e) = self.edge_index(source, target) {
            self.graph[e].updated_at = at;
        }
        outcome
    }

    pub fn remove_edge(&mut self, source: &str, target: &str) -> bool {
        match self.edge_index(source, target) {
            Some(e) => self.graph.remove_edge(e).is_some(),
            None => false,
        }
    }

    /// Remove a node and every incident edge.
    pub fn remove_node(&mut self, id: &str) -> bool {
        match self.node_index.remove(id) {
            Some(idx) => self.graph.remove_node(idx).is_some(),
            None => false,
        }
    }

    /// Export every node and edge, sorted by id for stable output.
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes: Vec<EntityNode> = self.graph.node_weights().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<EntityEdge> = self.graph.edge_weights().cloned().collect();
        edges.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        GraphSnapshot::new(nodes, edges)
    }

    /// Rebuild a graph from a snapshot. Edges pointing at ids missing from
    /// the node list get placeholder endpoints; duplicate pairs keep the
    /// last occurrence.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            match graph.node_index.get(&node.id) {
                Some(&idx) => graph.graph[idx] = node,
                None => {
                    let id = node.id.clone();
                    let idx = graph.graph.add_node(node);
                    graph.node_index.insert(id, idx);
                }
            }
        }
        for edge in snapshot.edges {
            let s = graph.ensure_node(&edge.source);
            let t = graph.ensure_node(&edge.target);
            match graph.graph.find_edge(s, t) {
                Some(e) => graph.graph[e] = edge,
                None => {
                    graph.graph.add_edge(s, t, edge);
                }
            }
        }
        graph
    }

    /// Replace the whole graph with the contents of `snapshot`.
    pub fn restore(&mut self, snapshot: GraphSnapshot) {
        *self = Self::from_snapshot(snapshot);
    }

    /// Ids of direct successors, sorted. Empty for unknown ids.
    pub fn successors(&self, id: &str) -> Vec<&str> {
        self.neighbor_ids(id, Direction::Outgoing)
    }

    /// Ids of direct predecessors, sorted. Empty for unknown ids.
    pub fn predecessors(&self, id: &str) -> Vec<&str> {
        self.neighbor_ids(id, Direction::Incoming)
    }

    fn neighbor_ids(&self, id: &str, direction: Direction) -> Vec<&str> {
        match self.index_of(id) {
            Some(idx) => self
                .sorted_neighbors(idx, direction)
                .into_iter()
                .map(|n| self.id_of(n))
                .collect(),
            None => Vec::new(),
        }
    }

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_index.get(id).copied()
    }

    pub(crate) fn edge_index(&self, source: &str, target: &str) -> Option<EdgeIndex> {
        let s = self.index_of(source)?;
        let t = self.index_of(target)?;
        self.graph.find_edge(s, t)
    }

    pub(crate) fn id_of(&self, idx: NodeIndex) -> &str {
        self.graph[idx].id.as_str()
    }

    /// Total degree (in + out); a self-loop counts twice.
    pub(crate) fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.edges_directed(idx, Direction::Outgoing).count()
            + self.graph.edges_directed(idx, Direction::Incoming).count()
    }

    /// Neighbors in `direction`, ordered by node id so traversals are
    /// reproducible regardless of insertion order.
    pub(crate) fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| match direction {
                Direction::Outgoing => e.target(),
                Direction::Incoming => e.source(),
            })
            .collect();
        out.sort_by(|a, b| self.id_of(*a).cmp(self.id_of(*b)));
        out.dedup();
        out
    }

    /// All live node indices ordered by node id.
    pub(crate) fn sorted_indices(&self) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.node_indices().collect();
        out.sort_by(|a, b| self.id_of(*a).cmp(self.id_of(*b)));
        out
    }
}

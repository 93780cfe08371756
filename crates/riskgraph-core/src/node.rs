use crate::{clamp_unit, Centrality, NodeId, NodeType, Properties};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A financial entity in the dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Latest risk score reported for this entity, in `[0, 1]`.
    pub risk_score: f64,
    #[serde(default)]
    pub centrality: Centrality,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub last_analysis: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityNode {
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            node_type,
            risk_score: 0.0,
            centrality: Centrality::default(),
            properties: Properties::new(),
            last_analysis: None,
            last_agent: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Placeholder created when an edge references an id nobody declared yet.
    pub fn placeholder(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeType::Unknown)
    }

    pub fn with_risk_score(mut self, risk_score: f64) -> Self {
        self.risk_score = clamp_unit(risk_score);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

use crate::{NodeId, Properties, RelationshipType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

/// A directed relationship. At most one exists per ordered `(source, target)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEdge {
    pub source: NodeId,
    pub target: NodeId,
    pub relationship_type: RelationshipType,
    pub weight: f64,
    #[serde(default)]
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntityEdge {
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        relationship_type: RelationshipType,
    ) -> Self {
        let now = Utc::now();
        Self {
            source: source.into(),
            target: target.into(),
            relationship_type,
            weight: DEFAULT_EDGE_WEIGHT,
            properties: Properties::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = sanitize_weight(weight);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Weights are non-negative; anything else collapses to zero.
pub fn sanitize_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight >= 0.0 {
        weight
    } else {
        0.0
    }
}

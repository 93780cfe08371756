use crate::{NodeId, Properties, RelationshipType, DEFAULT_EDGE_WEIGHT};
use serde::{Deserialize, Serialize};

/// Result pushed by a risk-analysis agent once a task completes.
///
/// ```json
/// {"agent_id": "credit_risk", "entity_id": "bank_a", "entity_type": "bank",
///  "risk_score": 0.72,
///  "dependencies": [{"entity_id": "corp_b", "relationship_type": "credits", "weight": 0.4}]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub entity_id: NodeId,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub risk_score: Option<f64>,
    #[serde(default)]
    pub dependencies: Vec<AgentDependency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDependency {
    pub entity_id: NodeId,
    #[serde(default)]
    pub relationship_type: RelationshipType,
    #[serde(default = "default_dependency_weight")]
    pub weight: f64,
    #[serde(default)]
    pub properties: Properties,
}

fn default_dependency_weight() -> f64 {
    DEFAULT_EDGE_WEIGHT
}

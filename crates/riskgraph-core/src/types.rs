use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Free-form node/edge attributes. Ordered so snapshots and projections
/// serialize deterministically.
pub type Properties = BTreeMap<String, serde_json::Value>;

pub type NodeId = String;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeType {
    Institution,
    Bank,
    Company,
    Sector,
    Region,
    Asset,
    Counterparty,
    Unknown,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Institution => "institution",
            NodeType::Bank => "bank",
            NodeType::Company => "company",
            NodeType::Sector => "sector",
            NodeType::Region => "region",
            NodeType::Asset => "asset",
            NodeType::Counterparty => "counterparty",
            NodeType::Unknown => "unknown",
            NodeType::Other(s) => s.as_str(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, NodeType::Unknown)
    }
}

impl Default for NodeType {
    fn default() -> Self {
        NodeType::Unknown
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Ok(match normalized.as_str() {
            "institution" => NodeType::Institution,
            "bank" => NodeType::Bank,
            "company" => NodeType::Company,
            "sector" => NodeType::Sector,
            "region" => NodeType::Region,
            "asset" => NodeType::Asset,
            "counterparty" => NodeType::Counterparty,
            "" | "unknown" => NodeType::Unknown,
            _ => NodeType::Other(normalized),
        })
    }
}

impl Serialize for NodeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NodeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationshipType {
    Credits,
    InvestsIn,
    OperatesIn,
    CorrelatesWith,
    DependsOn,
    Other(String),
}

impl RelationshipType {
    pub fn as_str(&self) -> &str {
        match self {
            RelationshipType::Credits => "credits",
            RelationshipType::InvestsIn => "invests_in",
            RelationshipType::OperatesIn => "operates_in",
            RelationshipType::CorrelatesWith => "correlates_with",
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::Other(s) => s.as_str(),
        }
    }
}

impl Default for RelationshipType {
    fn default() -> Self {
        RelationshipType::DependsOn
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Ok(match normalized.as_str() {
            "credits" => RelationshipType::Credits,
            "invests_in" => RelationshipType::InvestsIn,
            "operates_in" => RelationshipType::OperatesIn,
            "correlates_with" => RelationshipType::CorrelatesWith,
            "" | "depends_on" => RelationshipType::DependsOn,
            _ => RelationshipType::Other(normalized),
        })
    }
}

impl Serialize for RelationshipType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RelationshipType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_default())
    }
}

/// Derived structural metrics. Recomputed by the updater, never authoritative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Centrality {
    pub degree: f64,
    pub betweenness: f64,
    pub closeness: f64,
    #[serde(default)]
    pub computed_at: Option<DateTime<Utc>>,
    /// Set when betweenness/closeness were estimated from sampled pivots.
    #[serde(default)]
    pub sampled: bool,
}

/// Clamp a score into `[0, 1]`, mapping non-finite input to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_strings() {
        assert_eq!("Bank".parse::<NodeType>().unwrap(), NodeType::Bank);
        assert_eq!(
            "hedge_fund".parse::<NodeType>().unwrap(),
            NodeType::Other("hedge_fund".into())
        );
        assert_eq!("".parse::<NodeType>().unwrap(), NodeType::Unknown);

        let json = serde_json::to_string(&NodeType::Sector).unwrap();
        assert_eq!(json, "\"sector\"");
        let back: NodeType = serde_json::from_str("\"hedge_fund\"").unwrap();
        assert_eq!(back.as_str(), "hedge_fund");
    }

    #[test]
    fn relationship_defaults_to_depends_on() {
        assert_eq!(RelationshipType::default(), RelationshipType::DependsOn);
        let parsed: RelationshipType = serde_json::from_str("\"invests_in\"").unwrap();
        assert_eq!(parsed, RelationshipType::InvestsIn);
        assert_eq!(RelationshipType::CorrelatesWith.to_string(), "correlates_with");
    }

    #[test]
    fn clamp_unit_handles_garbage() {
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(0.42), 0.42);
    }
}

use crate::RiskGraphError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Community-detection backend used by the cluster analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringStrategy {
    /// Seeded Louvain modularity optimisation on the undirected projection.
    Modularity,
    /// Maximal cliques of size >= k, overlapping cliques merged. Approximate.
    KClique,
    /// Weakly connected components.
    ConnectedComponents,
}

impl Default for ClusteringStrategy {
    fn default() -> Self {
        ClusteringStrategy::Modularity
    }
}

impl fmt::Display for ClusteringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusteringStrategy::Modularity => "modularity",
            ClusteringStrategy::KClique => "k_clique",
            ClusteringStrategy::ConnectedComponents => "connected_components",
        };
        f.write_str(s)
    }
}

impl FromStr for ClusteringStrategy {
    type Err = RiskGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "modularity" | "louvain" | "leiden" => Ok(ClusteringStrategy::Modularity),
            "k_clique" | "kclique" | "k-clique" | "clique" => Ok(ClusteringStrategy::KClique),
            "connected_components" | "components" => Ok(ClusteringStrategy::ConnectedComponents),
            other => Err(RiskGraphError::InvalidInput(format!(
                "Unknown clustering method: {}. Must be one of: louvain, modularity, k_clique, connected_components",
                other
            ))),
        }
    }
}

use crate::{ClusteringStrategy, RiskGraphError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for RiskGraphError {
    fn from(err: ConfigError) -> Self {
        RiskGraphError::Config(err.to_string())
    }
}

/// Main configuration for the entity graph engine
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RiskGraphConfig {
    /// Query bounds for path and cascade analysis
    #[serde(default)]
    pub graph: GraphConfig,

    /// Community detection settings
    #[serde(default)]
    pub clustering: ClusteringConfig,

    /// Background maintenance loop
    #[serde(default)]
    pub updater: UpdaterConfig,

    /// Node/edge eviction policy
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Snapshot persistence
    #[serde(default)]
    pub snapshot: SnapshotConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bounds applied to every traversal query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Node-visit budget for a single path search or cascade BFS
    #[serde(default = "default_max_visits")]
    pub max_visits: usize,

    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,

    #[serde(default = "default_max_paths")]
    pub default_max_paths: usize,

    /// Depth used by shortest-path lookups
    #[serde(default = "default_shortest_path_depth")]
    pub shortest_path_max_depth: usize,

    /// Nodes per cascade depth bucket that get a critical-path search
    #[serde(default = "default_critical_path_samples")]
    pub critical_path_samples_per_depth: usize,

    #[serde(default = "default_max_critical_paths")]
    pub max_critical_paths: usize,

    #[serde(default = "default_visualization_max_nodes")]
    pub visualization_max_nodes: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_visits: default_max_visits(),
            default_max_depth: default_max_depth(),
            default_max_paths: default_max_paths(),
            shortest_path_max_depth: default_shortest_path_depth(),
            critical_path_samples_per_depth: default_critical_path_samples(),
            max_critical_paths: default_max_critical_paths(),
            visualization_max_nodes: default_visualization_max_nodes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Strategy used by hotspot detection and when callers do not choose one
    #[serde(default)]
    pub default_strategy: ClusteringStrategy,

    /// Seed for the Louvain node visiting order
    #[serde(default = "default_clustering_seed")]
    pub seed: u64,

    /// Minimum clique size for the k-clique strategy
    #[serde(default = "default_k_clique_size")]
    pub k_clique_size: usize,

    /// Clusters above this mean risk are listed as high risk
    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,

    /// Upper bound on local-moving passes per Louvain level
    #[serde(default = "default_max_louvain_passes")]
    pub max_louvain_passes: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            default_strategy: ClusteringStrategy::default(),
            seed: default_clustering_seed(),
            k_clique_size: default_k_clique_size(),
            high_risk_threshold: default_high_risk_threshold(),
            max_louvain_passes: default_max_louvain_passes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,

    /// Sleep after a failed cycle before retrying
    #[serde(default = "default_error_backoff")]
    pub error_backoff_secs: u64,

    /// Above this node count betweenness/closeness are estimated from pivots
    #[serde(default = "default_exact_centrality_max_nodes")]
    pub exact_centrality_max_nodes: usize,

    /// Number of BFS pivots used once sampling kicks in
    #[serde(default = "default_centrality_sample_size")]
    pub centrality_sample_size: usize,

    #[serde(default = "default_clustering_seed")]
    pub sample_seed: u64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: default_update_interval(),
            error_backoff_secs: default_error_backoff(),
            exact_centrality_max_nodes: default_exact_centrality_max_nodes(),
            centrality_sample_size: default_centrality_sample_size(),
            sample_seed: default_clustering_seed(),
        }
    }
}

/// Eviction policy for entities that stopped being reported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Nodes and edges not updated for this long become eligible for eviction
    #[serde(default = "default_max_node_age")]
    pub max_node_age_secs: Option<u64>,

    /// Hard cap on node count; least recently updated nodes go first
    #[serde(default)]
    pub max_nodes: Option<usize>,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_node_age_secs: default_max_node_age(),
            max_nodes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_snapshot_path")]
    pub path: PathBuf,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_snapshot_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_visits() -> usize {
    100_000
}
fn default_max_depth() -> usize {
    3
}
fn default_max_paths() -> usize {
    10
}
fn default_shortest_path_depth() -> usize {
    10
}
fn default_critical_path_samples() -> usize {
    16
}
fn default_max_critical_paths() -> usize {
    10
}
fn default_visualization_max_nodes() -> usize {
    100
}
fn default_clustering_seed() -> u64 {
    42
}
fn default_k_clique_size() -> usize {
    3
}
fn default_high_risk_threshold() -> f64 {
    0.7
}
fn default_max_louvain_passes() -> usize {
    100
}
fn default_update_interval() -> u64 {
    300
}
fn default_error_backoff() -> u64 {
    60
}
fn default_exact_centrality_max_nodes() -> usize {
    2_000
}
fn default_centrality_sample_size() -> usize {
    256
}
fn default_true() -> bool {
    true
}
fn default_max_node_age() -> Option<u64> {
    Some(30 * 24 * 60 * 60)
}
fn default_snapshot_path() -> PathBuf {
    PathBuf::from("data/riskgraph-snapshot.json")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: RiskGraphConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.riskgraph.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading RiskGraph configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!(config_file = %path.display(), "Configuration loaded"),
            None => info!("Configuration loaded (defaults, no config file)"),
        }
        info!(
            update_interval_secs = config.updater.update_interval_secs,
            max_visits = config.graph.max_visits,
            clustering = %config.clustering.default_strategy,
            "Graph engine settings"
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit file, still applying env overrides and validation
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory configuration
    pub fn from_config(config: RiskGraphConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
        }
    }

    /// Search order:
    /// 1. ./.riskgraph.toml
    /// 2. ~/.riskgraph/config.toml
    /// 3. Defaults
    fn load_config_file() -> Result<(RiskGraphConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".riskgraph.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".riskgraph").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((RiskGraphConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<RiskGraphConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn apply_env_overrides(mut config: RiskGraphConfig) -> RiskGraphConfig {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        if let Some(v) = parsed("RISKGRAPH_MAX_VISITS") {
            config.graph.max_visits = v;
        }
        if let Some(v) = parsed("RISKGRAPH_UPDATE_INTERVAL_SECS") {
            config.updater.update_interval_secs = v;
        }
        if let Some(v) = parsed("RISKGRAPH_ERROR_BACKOFF_SECS") {
            config.updater.error_backoff_secs = v;
        }
        if let Some(v) = parsed("RISKGRAPH_EXACT_CENTRALITY_MAX_NODES") {
            config.updater.exact_centrality_max_nodes = v;
        }
        if let Ok(strategy) = std::env::var("RISKGRAPH_CLUSTERING_STRATEGY") {
            match strategy.parse() {
                Ok(s) => config.clustering.default_strategy = s,
                Err(e) => warn!("Ignoring RISKGRAPH_CLUSTERING_STRATEGY: {}", e),
            }
        }
        if let Some(v) = parsed("RISKGRAPH_RETENTION_MAX_AGE_SECS") {
            config.retention.max_node_age_secs = Some(v);
        }
        if let Some(v) = parsed("RISKGRAPH_RETENTION_MAX_NODES") {
            config.retention.max_nodes = Some(v);
        }
        if let Ok(path) = std::env::var("RISKGRAPH_SNAPSHOT_PATH") {
            config.snapshot.path = PathBuf::from(path);
            config.snapshot.enabled = true;
        }
        if let Ok(level) = std::env::var("RISKGRAPH_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("RISKGRAPH_LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    pub fn validate_config(config: &RiskGraphConfig) -> Result<(), ConfigError> {
        if config.graph.max_visits == 0 {
            return Err(ConfigError::ValidationError(
                "graph.max_visits must be greater than 0".into(),
            ));
        }
        if config.graph.default_max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "graph.default_max_depth must be greater than 0".into(),
            ));
        }
        if config.clustering.k_clique_size < 2 {
            return Err(ConfigError::ValidationError(
                "clustering.k_clique_size must be at least 2".into(),
            ));
        }
        let threshold = config.clustering.high_risk_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationError(format!(
                "clustering.high_risk_threshold must be within [0, 1], got {}",
                threshold
            )));
        }
        if config.updater.update_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "updater.update_interval_secs must be greater than 0".into(),
            ));
        }
        if config.updater.centrality_sample_size == 0 {
            return Err(ConfigError::ValidationError(
                "updater.centrality_sample_size must be greater than 0".into(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }
        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &RiskGraphConfig {
        &self.config
    }

    pub fn into_config(self) -> RiskGraphConfig {
        self.config
    }

    /// Get the path to the config file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = RiskGraphConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}

//! Sortify configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Voter ids used by the built-in voters and the weight table.
pub mod voter_ids {
    pub const CONTENT_TYPE: &str = "content_type";
    pub const KEYWORD: &str = "keyword";
    pub const ATLAS: &str = "atlas";
    pub const MEMORY: &str = "memory";
    pub const SESSION: &str = "session";
    pub const FREQUENCY: &str = "frequency";
    pub const REASONING: &str = "reasoning";
}

/// Main Sortify configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortifyConfig {
    /// Embedding dimension shared by every vector in the process
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Voting engine configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Voter weight table (voter id -> positive weight)
    #[serde(default = "default_weights")]
    pub weights: BTreeMap<String, f64>,

    /// Folder cluster index configuration
    #[serde(default)]
    pub atlas: AtlasConfig,

    /// Episodic memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Session context configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// External reasoning service configuration
    #[serde(default)]
    pub reasoning: ReasoningConfig,
}

/// Upper bound for time windows and retention ages (100 years)
pub const MAX_RETENTION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

fn default_dimension() -> usize {
    384
}

/// Default voter weights.
pub fn default_weights() -> BTreeMap<String, f64> {
    use voter_ids::*;
    BTreeMap::from([
        (CONTENT_TYPE.to_string(), 0.3),
        (KEYWORD.to_string(), 0.6),
        (ATLAS.to_string(), 0.6),
        (MEMORY.to_string(), 0.8),
        (SESSION.to_string(), 0.5),
        (FREQUENCY.to_string(), 0.2),
        (REASONING.to_string(), 0.9),
    ])
}

impl Default for SortifyConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            classifier: ClassifierConfig::default(),
            weights: default_weights(),
            atlas: AtlasConfig::default(),
            memory: MemoryConfig::default(),
            session: SessionConfig::default(),
            reasoning: ReasoningConfig::default(),
        }
    }
}

impl SortifyConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: SortifyConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::Config("dimension must be greater than zero".into()));
        }
        for (voter, weight) in &self.weights {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(Error::Config(format!(
                    "weight for voter '{}' must be positive, got {}",
                    voter, weight
                )));
            }
        }

        let c = &self.classifier;
        check_unit("classifier.memory_fast_path_threshold", c.memory_fast_path_threshold)?;
        check_unit("classifier.memory_voter_threshold", c.memory_voter_threshold)?;
        check_unit("classifier.escalation_threshold", c.escalation_threshold)?;
        check_unit("classifier.reasoning_confidence", c.reasoning_confidence)?;
        check_unit("classifier.keyword_threshold", c.keyword_threshold)?;
        if c.voter_workers == 0 {
            return Err(Error::Config("classifier.voter_workers must be at least 1".into()));
        }

        check_unit("atlas.match_threshold", self.atlas.match_threshold)?;
        if self.atlas.min_samples_for_centroid == 0 {
            return Err(Error::Config(
                "atlas.min_samples_for_centroid must be at least 1".into(),
            ));
        }
        for rule in &self.atlas.category_map {
            regex::RegexBuilder::new(&rule.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    Error::Config(format!(
                        "invalid category map pattern '{}': {}",
                        rule.pattern, e
                    ))
                })?;
        }

        if self.memory.capacity == 0 {
            return Err(Error::Config("memory.capacity must be at least 1".into()));
        }
        if self.memory.lsh_planes == 0 || self.memory.lsh_planes > 32 {
            return Err(Error::Config("memory.lsh_planes must be in 1..=32".into()));
        }
        if let Some(max_age) = self.memory.max_age_secs {
            check_retention("memory.max_age_secs", max_age)?;
        }

        check_retention("session.window_secs", self.session.window_secs)?;
        check_unit("session.confidence", self.session.confidence)?;
        if self.session.max_sessions == 0 {
            return Err(Error::Config("session.max_sessions must be at least 1".into()));
        }

        if self.reasoning.timeout_secs == 0 {
            return Err(Error::Config("reasoning.timeout_secs must be greater than zero".into()));
        }
        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(Error::Config(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_retention(name: &str, secs: u64) -> Result<()> {
    if secs == 0 || secs > MAX_RETENTION_SECS {
        return Err(Error::Config(format!(
            "{} must be in 1..={}, got {}",
            name, MAX_RETENTION_SECS, secs
        )));
    }
    Ok(())
}

/// Voting engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Memory similarity that short-circuits voting entirely
    pub memory_fast_path_threshold: f64,

    /// Memory similarity the memory voter accepts as a vote
    pub memory_voter_threshold: f64,

    /// Normalized ensemble confidence below which reasoning is consulted
    pub escalation_threshold: f64,

    /// Confidence attached to the reasoning service's answer
    pub reasoning_confidence: f64,

    /// Minimum keyword-to-category similarity for the keyword voter
    pub keyword_threshold: f64,

    /// Voters evaluated concurrently per request
    pub voter_workers: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            memory_fast_path_threshold: 0.75,
            memory_voter_threshold: 0.70,
            escalation_threshold: 0.60,
            reasoning_confidence: 0.85,
            keyword_threshold: 0.10,
            voter_workers: 2,
        }
    }
}

/// Folder-name pattern to category rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Case-insensitive regex matched against the request hint
    pub pattern: String,

    /// Folder the rule routes to
    pub folder: String,
}

/// Atlas configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Minimum cosine similarity for a folder match (default 0.55)
    pub match_threshold: f64,

    /// Samples needed before a content centroid is trusted over the folder name
    pub min_samples_for_centroid: u64,

    /// Static rules consulted when no cluster clears the threshold
    pub category_map: Vec<CategoryRule>,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.55,
            min_samples_for_centroid: 3,
            category_map: Vec::new(),
        }
    }
}

/// Recall index strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Exact linear scan
    #[default]
    Linear,

    /// Random-hyperplane locality-sensitive hashing
    Lsh,
}

/// Episodic memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of records; the oldest is evicted on overflow
    pub capacity: usize,

    /// Records older than this are pruned (None = keep until evicted)
    pub max_age_secs: Option<u64>,

    /// Recall index strategy
    pub index: IndexKind,

    /// Hyperplanes per LSH signature
    pub lsh_planes: usize,

    /// Seed for LSH hyperplane sampling
    pub lsh_seed: u64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            capacity: 200,
            max_age_secs: None,
            index: IndexKind::Linear,
            lsh_planes: 12,
            lsh_seed: 0x5eed,
        }
    }
}

/// Session context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sliding window length in seconds
    pub window_secs: u64,

    /// Fixed confidence of the session vote
    pub confidence: f64,

    /// Maximum retained events regardless of age
    pub max_events: usize,

    /// Session shards kept at once; the least recently active is evicted
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_secs: 300,
            confidence: 0.7,
            max_events: 50,
            max_sessions: 256,
        }
    }
}

/// External reasoning service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// HTTP endpoint of the reasoning service (None = disabled)
    pub endpoint: Option<String>,

    /// Per-call timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

//! Configuration management for notesift.
//!
//! This module provides configuration loading, saving, and defaults.
//! Configuration is stored in TOML format in a platform-appropriate location.

use crate::error::{NoteSiftError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure for notesift.
///
/// ## Example Configuration File (notesift.toml)
///
/// ```toml
/// [general]
/// max_results = 50
/// log_level = "info"
///
/// [tokenizer]
/// min_term_len = 2
/// stop_words = ["the", "and", "of"]
///
/// [ranking]
/// title_boost = 2.0
/// tag_boost = 1.5
/// recency_half_life_days = 30.0
///
/// [search]
/// max_notes = 50000
/// latency_budget_ms = 100
///
/// [snapshot]
/// enabled = true
/// compress = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Term extraction
    pub tokenizer: TokenizerConfig,

    /// Heuristic ranker weights
    pub ranking: RankingConfig,

    /// Query engine limits
    pub search: SearchConfig,

    /// Index snapshot cache
    pub snapshot: SnapshotConfig,
}

/// General configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default number of search results
    pub max_results: usize,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Snapshot directory (None = default data directory)
    pub data_dir: Option<PathBuf>,

    /// Notes database location (None = default data directory)
    pub database_path: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        GeneralConfig {
            max_results: 50,
            log_level: "info".to_string(),
            data_dir: None,
            database_path: None,
        }
    }
}

/// Tokenizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Shortest term (in characters) that is indexed
    pub min_term_len: usize,

    /// Longest term (in characters) that is indexed
    pub max_term_len: usize,

    /// Terms excluded from indexing; they still occupy a token position
    pub stop_words: Vec<String>,

    /// Largest title or body accepted by the indexer, in bytes
    pub max_field_bytes: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        TokenizerConfig {
            min_term_len: 2,
            max_term_len: 64,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            max_field_bytes: 1024 * 1024,
        }
    }
}

/// English stop words excluded from the index by default.
pub const DEFAULT_STOP_WORDS: &[&str] = &[
    "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Weights of the heuristic ranker.
///
/// The ranker is a fixed formula over these numbers; tuning happens here,
/// never in code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Multiplier on the dampened tf * idf weight of each matching term
    pub term_weight: f64,

    /// Added once per matching term that occurs in the title
    pub title_boost: f64,

    /// Added once per requested tag present on the note
    pub tag_boost: f64,

    /// Added once per quoted phrase the note contains
    pub phrase_boost: f64,

    /// Maximum recency bonus, given to the most recently modified note
    pub recency_boost: f64,

    /// Age at which the recency bonus has halved
    pub recency_half_life_days: f64,

    /// Share of an exact match's weight given to a prefix expansion of the
    /// trailing query word, in `[0, 1]`
    pub prefix_factor: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        RankingConfig {
            term_weight: 1.0,
            title_boost: 2.0,
            tag_boost: 1.5,
            phrase_boost: 1.0,
            recency_boost: 0.5,
            recency_half_life_days: 30.0,
            prefix_factor: 0.5,
        }
    }
}

/// Query engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Note-count ceiling the latency budget is sized for
    pub max_notes: usize,

    /// Default number of suggestions
    pub suggest_limit: usize,

    /// Upper bound on terms returned by a prefix scan
    pub prefix_scan_limit: usize,

    /// Candidate count above which scoring runs in parallel
    pub parallel_threshold: usize,

    /// Queries slower than this are logged as warnings
    pub latency_budget_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            max_notes: 50_000,
            suggest_limit: 10,
            prefix_scan_limit: 64,
            parallel_threshold: 2_000,
            latency_budget_ms: 100,
        }
    }
}

/// Snapshot cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Write a snapshot after each rebuild and try it before rebuilding
    pub enabled: bool,

    /// LZ4-compress the snapshot payload
    pub compress: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        SnapshotConfig {
            enabled: true,
            compress: true,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default config if no config file exists.
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Config::default());
        }

        info!(path = %path.display(), "Loading configuration");
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents).map_err(|e| NoteSiftError::ConfigError {
            reason: format!("Failed to parse config: {}", e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        info!(path = %path.display(), "Saving configuration");
        let contents = toml::to_string_pretty(self).map_err(|e| NoteSiftError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        let tokenizer = &self.tokenizer;
        if tokenizer.min_term_len == 0 || tokenizer.min_term_len > tokenizer.max_term_len {
            return Err(NoteSiftError::ConfigError {
                reason: format!(
                    "tokenizer term length range {}..={} is empty",
                    tokenizer.min_term_len, tokenizer.max_term_len
                ),
            });
        }
        let half_life = self.ranking.recency_half_life_days;
        if half_life.is_nan() || half_life <= 0.0 {
            return Err(NoteSiftError::ConfigError {
                reason: "ranking.recency_half_life_days must be positive".to_string(),
            });
        }

        let prefix_factor = self.ranking.prefix_factor;
        if !(0.0..=1.0).contains(&prefix_factor) {
            return Err(NoteSiftError::ConfigError {
                reason: "ranking.prefix_factor must be between 0 and 1".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("notesift.toml"))
    }

    /// Get the default data directory path.
    pub fn default_data_dir() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Get the snapshot directory (from config or default).
    pub fn snapshot_dir(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.general.data_dir {
            Ok(path.clone())
        } else {
            Self::default_data_dir()
        }
    }

    /// Get the notes database path (from config or default).
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.general.database_path {
            Ok(path.clone())
        } else {
            Ok(Self::default_data_dir()?.join("notes.db"))
        }
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("", "", "notesift").ok_or_else(|| NoteSiftError::ConfigError {
        reason: "Could not determine config directory".to_string(),
    })
}

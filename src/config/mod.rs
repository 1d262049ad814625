//! Configuration management.
//!
//! Configuration is read from TOML, by default from
//! `<config_dir>/cardsmith/config.toml`. Every key is optional; missing keys
//! keep their defaults. A few `CARDSMITH_*` environment variables override
//! the file:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `CARDSMITH_DATA_DIR` | `data_dir` |
//! | `CARDSMITH_LIBRARY` | `library` |
//! | `CARDSMITH_TEMPLATES_DIR` | `[templates] dir` |
//!
//! Logging and metrics overrides are applied by [`crate::observability`].
//!
//! ```toml
//! data_dir = "~/.local/share/cardsmith"
//! library = "demos/card_library.json"
//!
//! [cache]
//! l1_capacity = 100
//!
//! [retrieval]
//! rrf_k = 60.0
//! limit = 10
//!
//! [promotion]
//! template_threshold = 3
//! materialize_threshold = 10
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::services::{
    DEFAULT_L1_CAPACITY, DEFAULT_LIMIT, DEFAULT_PER_VECTOR_LIMIT, DEFAULT_RRF_K,
    PromotionThresholds, VectorSpec,
};
use crate::{Error, Result};

/// Main configuration for cardsmith.
#[derive(Debug, Clone, PartialEq)]
pub struct CardsmithConfig {
    /// Directory holding the vector snapshot and the resolution database.
    pub data_dir: PathBuf,
    /// Library manifest to index.
    pub library: Option<PathBuf>,
    /// Resolution cache settings.
    pub cache: CacheConfig,
    /// Retrieval settings.
    pub retrieval: RetrievalConfig,
    /// Promotion thresholds.
    pub promotion: PromotionConfig,
    /// Directory for materialized template artifacts.
    pub templates_dir: PathBuf,
    /// Logging settings, resolved by the observability layer.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings, resolved by the observability layer.
    pub metrics: Option<MetricsSettings>,
}

/// Resolution cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entries kept in L1.
    pub l1_capacity: usize,
    /// Whether the `SQLite` tier is used.
    pub l2_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: DEFAULT_L1_CAPACITY,
            l2_enabled: true,
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfig {
    /// RRF smoothing constant.
    pub rrf_k: f64,
    /// Fused results returned by default.
    pub limit: usize,
    /// Candidates requested per named vector.
    pub per_vector_limit: usize,
    /// Named vectors of the collection.
    pub vectors: Vec<VectorSpec>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            limit: DEFAULT_LIMIT,
            per_vector_limit: DEFAULT_PER_VECTOR_LIMIT,
            vectors: VectorSpec::defaults(),
        }
    }
}

/// Promotion thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionConfig {
    /// Positive count at which a template point is created.
    pub template_threshold: u32,
    /// Positive count at which the template artifact is written.
    pub materialize_threshold: u32,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        let thresholds = PromotionThresholds::default();
        Self {
            template_threshold: thresholds.template,
            materialize_threshold: thresholds.materialize,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Library manifest.
    pub library: Option<String>,
    /// Cache section.
    pub cache: Option<ConfigFileCache>,
    /// Retrieval section.
    pub retrieval: Option<ConfigFileRetrieval>,
    /// Promotion section.
    pub promotion: Option<ConfigFilePromotion>,
    /// Templates section.
    pub templates: Option<ConfigFileTemplates>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// Cache section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCache {
    /// L1 capacity.
    pub l1_capacity: Option<usize>,
    /// Whether L2 is used.
    pub l2_enabled: Option<bool>,
}

/// Retrieval section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetrieval {
    /// RRF constant.
    pub rrf_k: Option<f64>,
    /// Default result count.
    pub limit: Option<usize>,
    /// Candidates per vector.
    pub per_vector_limit: Option<usize>,
    /// Named vectors.
    pub vectors: Option<Vec<VectorSpec>>,
}

/// Promotion section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFilePromotion {
    /// Template threshold.
    pub template_threshold: Option<u32>,
    /// Materialize threshold.
    pub materialize_threshold: Option<u32>,
}

/// Templates section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileTemplates {
    /// Artifact directory.
    pub dir: Option<String>,
}

/// Logging section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Filter directive (`info`, `cardsmith=debug`).
    pub level: Option<String>,
    /// Log file; stderr when unset.
    pub file: Option<String>,
}

/// Metrics section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MetricsSettings {
    /// Whether the Prometheus recorder is installed.
    pub enabled: Option<bool>,
    /// Port of the Prometheus HTTP listener.
    pub port: Option<u16>,
}

impl Default for CardsmithConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", "cardsmith")
            .map_or_else(|| PathBuf::from(".cardsmith"), |dirs| dirs.data_dir().to_path_buf());
        Self {
            templates_dir: data_dir.join("templates"),
            data_dir,
            library: None,
            cache: CacheConfig::default(),
            retrieval: RetrievalConfig::default(),
            promotion: PromotionConfig::default(),
            logging: None,
            metrics: None,
        }
    }
}

impl CardsmithConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or has unknown keys.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        Self::parse(&contents)
    }

    /// Default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cardsmith")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Loads configuration from `path`, or the default location, and applies
    /// environment overrides.
    ///
    /// A missing default file yields the defaults; an explicit path must
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from_file(&path)?,
                _ => Self::default(),
            },
        };
        Ok(config.with_env_overrides(|key| std::env::var(key).ok()))
    }

    /// Applies `CARDSMITH_*` overrides read through `var`.
    #[must_use]
    pub fn with_env_overrides(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = non_empty("CARDSMITH_DATA_DIR") {
            let dir = PathBuf::from(dir);
            if self.templates_dir == self.data_dir.join("templates") {
                self.templates_dir = dir.join("templates");
            }
            self.data_dir = dir;
        }
        if let Some(library) = non_empty("CARDSMITH_LIBRARY") {
            self.library = Some(PathBuf::from(library));
        }
        if let Some(dir) = non_empty("CARDSMITH_TEMPLATES_DIR") {
            self.templates_dir = PathBuf::from(dir);
        }
        self
    }

    /// Converts a `ConfigFile` to `CardsmithConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(data_dir) = file.data_dir {
            config.data_dir = expand_home(&data_dir);
            config.templates_dir = config.data_dir.join("templates");
        }
        config.library = file.library.as_deref().map(expand_home);

        if let Some(cache) = file.cache {
            if let Some(capacity) = cache.l1_capacity {
                config.cache.l1_capacity = capacity;
            }
            if let Some(enabled) = cache.l2_enabled {
                config.cache.l2_enabled = enabled;
            }
        }
        if let Some(retrieval) = file.retrieval {
            if let Some(k) = retrieval.rrf_k {
                config.retrieval.rrf_k = k;
            }
            if let Some(limit) = retrieval.limit {
                config.retrieval.limit = limit;
            }
            if let Some(limit) = retrieval.per_vector_limit {
                config.retrieval.per_vector_limit = limit;
            }
            if let Some(vectors) = retrieval.vectors.filter(|v| !v.is_empty()) {
                config.retrieval.vectors = vectors;
            }
        }
        if let Some(promotion) = file.promotion {
            if let Some(t) = promotion.template_threshold {
                config.promotion.template_threshold = t;
            }
            if let Some(m) = promotion.materialize_threshold {
                config.promotion.materialize_threshold = m;
            }
        }
        if let Some(dir) = file.templates.and_then(|t| t.dir) {
            config.templates_dir = expand_home(&dir);
        }
        config.logging = file.logging;
        config.metrics = file.metrics;

        config
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self.templates_dir = self.data_dir.join("templates");
        self
    }

    /// Sets the library manifest.
    #[must_use]
    pub fn with_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.library = Some(path.into());
        self
    }

    /// Path of the vector snapshot.
    #[must_use]
    pub fn vector_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("vectors.json")
    }

    /// Path of the resolution database.
    #[must_use]
    pub fn resolution_db_path(&self) -> PathBuf {
        self.data_dir.join("resolution.db")
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(dirs) = directories::BaseDirs::new()
    {
        return dirs.home_dir().join(rest);
    }
    PathBuf::from(path)
}

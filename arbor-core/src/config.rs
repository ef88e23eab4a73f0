//! Configuration types
//!
//! Configuration is immutable for the lifetime of a process. A reload is a
//! restart.

use crate::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Default cache lifetime for a tree snapshot (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Default approved-comment count that makes an author trusted.
pub const DEFAULT_PROMOTION_THRESHOLD: u32 = 10;

/// Snapshot cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Lifetime of a cached snapshot in seconds; 0 disables caching.
    pub default_ttl_secs: u64,
    /// Per-tree overrides keyed by tree id; 0 disables caching for that tree.
    #[serde(default)]
    pub tree_ttl_secs: BTreeMap<String, u64>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl_secs: DEFAULT_TTL_SECS,
            tree_ttl_secs: BTreeMap::new(),
        }
    }
}

/// Trusted-author promotion settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromotionSettings {
    pub threshold: u32,
}

impl Default for PromotionSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PROMOTION_THRESHOLD,
        }
    }
}

/// Settings for one dynamic child resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Maximum number of transient children produced.
    pub limit: usize,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Location of the persistent LMDB cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LmdbSettings {
    pub path: String,
    pub max_size_mb: usize,
}

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArborConfig {
    // Languages (REQUIRED)
    pub languages: Vec<String>,
    pub default_language: String,

    // Cache key versioning (REQUIRED)
    pub schema_version: u32,

    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub promotion: PromotionSettings,
    #[serde(default)]
    pub resolvers: BTreeMap<String, ResolverSettings>,
    #[serde(default)]
    pub lmdb: Option<LmdbSettings>,
}

impl ArborConfig {
    /// Build a configuration for the given languages with default cache,
    /// promotion and no resolvers. The first language is the default.
    pub fn for_languages<I, S>(languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let languages: Vec<String> = languages.into_iter().map(Into::into).collect();
        let default_language = languages.first().cloned().unwrap_or_default();
        Self {
            languages,
            default_language,
            schema_version: 1,
            cache: CacheSettings::default(),
            promotion: PromotionSettings::default(),
            resolvers: BTreeMap::new(),
            lmdb: None,
        }
    }

    /// Register settings for a resolver.
    pub fn with_resolver(mut self, name: impl Into<String>, limit: usize) -> Self {
        self.resolvers.insert(
            name.into(),
            ResolverSettings {
                limit,
                enabled: true,
            },
        );
        self
    }

    /// Set the promotion threshold.
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.promotion.threshold = threshold;
        self
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> ArborResult<Self> {
        let config: ArborConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ArborResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Apply overrides from process environment variables.
    ///
    /// Environment variables:
    /// - `ARBOR_SCHEMA_VERSION`
    /// - `ARBOR_CACHE_DEFAULT_TTL_SECS`
    /// - `ARBOR_PROMOTION_THRESHOLD`
    pub fn apply_env_overrides(self) -> ArborResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup, then re-validate.
    pub fn apply_overrides<F>(mut self, lookup: F) -> ArborResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("ARBOR_SCHEMA_VERSION") {
            self.schema_version = parse_override("schema_version", &raw)?;
        }
        if let Some(raw) = lookup("ARBOR_CACHE_DEFAULT_TTL_SECS") {
            self.cache.default_ttl_secs = parse_override("cache.default_ttl_secs", &raw)?;
        }
        if let Some(raw) = lookup("ARBOR_PROMOTION_THRESHOLD") {
            self.promotion.threshold = parse_override("promotion.threshold", &raw)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Cache lifetime for a tree's snapshots. Zero means do not cache.
    pub fn ttl_for(&self, tree_id: &TreeId) -> Duration {
        let secs = self
            .cache
            .tree_ttl_secs
            .get(tree_id.as_str())
            .copied()
            .unwrap_or(self.cache.default_ttl_secs);
        Duration::from_secs(secs)
    }

    pub fn resolver(&self, name: &str) -> Option<&ResolverSettings> {
        self.resolvers.get(name)
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(ArborError::Config) if invalid.
    ///
    /// Validates:
    /// - languages is non-empty and has no duplicates
    /// - default_language is one of languages
    /// - promotion.threshold >= 1
    /// - every resolver limit >= 1
    /// - lmdb.max_size_mb > 0 when present
    pub fn validate(&self) -> ArborResult<()> {
        if self.languages.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "languages".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for language in &self.languages {
            if language.trim().is_empty() || !seen.insert(language.as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "languages".to_string(),
                    value: language.clone(),
                    reason: "language codes must be non-empty and unique".to_string(),
                }
                .into());
            }
        }

        if !self.languages.contains(&self.default_language) {
            return Err(ConfigError::InvalidValue {
                field: "default_language".to_string(),
                value: self.default_language.clone(),
                reason: "default_language must be one of languages".to_string(),
            }
            .into());
        }

        if self.promotion.threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "promotion.threshold".to_string(),
                value: self.promotion.threshold.to_string(),
                reason: "threshold must be at least 1".to_string(),
            }
            .into());
        }

        for (name, settings) in &self.resolvers {
            if settings.limit == 0 {
                return Err(ConfigError::InvalidValue {
                    field: format!("resolvers.{}.limit", name),
                    value: settings.limit.to_string(),
                    reason: "limit must be at least 1".to_string(),
                }
                .into());
            }
        }

        if let Some(lmdb) = &self.lmdb {
            if lmdb.max_size_mb == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "lmdb.max_size_mb".to_string(),
                    value: lmdb.max_size_mb.to_string(),
                    reason: "max_size_mb must be positive".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(field: &str, raw: &str) -> ArborResult<T> {
    raw.trim().parse().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "not a valid number".to_string(),
        }
        .into()
    })
}

// =============================================================================
// TESTS
// =============================================================================

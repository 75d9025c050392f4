//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nested keys, e.g. `APP_GEO__CACHE_DIR`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::types::RelaxStep;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// The typed application settings, validated.
    pub fn app(&self) -> anyhow::Result<AppConfig> {
        let app: AppConfig = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read configuration: {}", e))?;
        app.validate()?;
        Ok(app)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub geo: GeoConfig,
    pub engine: EngineConfig,
    pub embed: EmbedConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let t = self.geo.similarity_threshold;
        if !(t > 0.0 && t <= 1.0) {
            let msg = format!("geo.similarity_threshold must be in (0, 1], got {t}");
            return Err(Error::InvalidConfig(msg));
        }
        if self.geo.nn_candidates == 0 {
            return Err(Error::InvalidConfig("geo.nn_candidates must be at least 1".into()));
        }
        if self.engine.max_retries > 8 {
            return Err(Error::InvalidConfig(format!(
                "engine.max_retries must be <= 8, got {}",
                self.engine.max_retries
            )));
        }
        let order = &self.engine.relaxation_order;
        for (i, step) in order.iter().enumerate() {
            if order[..i].contains(step) {
                let msg = format!("engine.relaxation_order repeats '{step}'");
                return Err(Error::InvalidConfig(msg));
            }
        }
        if self.embed.dim == 0 {
            return Err(Error::InvalidConfig("embed.dim must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoConfig {
    pub cache_dir: String,
    /// Directory holding the upstream `regions.json` and `subregions.json`.
    pub source_dir: Option<String>,
    pub similarity_threshold: f32,
    /// How many nearest neighbours a fuzzy lookup inspects per name variant.
    pub nn_candidates: usize,
    /// Longest prefix, in characters, tried when splitting a compound name.
    pub max_prefix_chars: usize,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            cache_dir: "./cache".to_string(),
            source_dir: None,
            similarity_threshold: 0.7,
            nn_candidates: 2,
            max_prefix_chars: 8,
        }
    }
}

impl GeoConfig {
    pub fn cache_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.cache_dir)
    }

    pub fn source_path(&self, base: &Path) -> Option<PathBuf> {
        self.source_dir.as_ref().map(|d| resolve_with_base(base, d))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_retries: u32,
    pub relaxation_order: Vec<RelaxStep>,
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { max_retries: 2, relaxation_order: RelaxStep::default_order(), timeout_ms: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedBackend {
    Ngram,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedConfig {
    pub backend: EmbedBackend,
    pub dim: usize,
    pub model_dir: Option<String>,
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self { backend: EmbedBackend::Ngram, dim: 256, model_dir: None }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    // Expand env vars first
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    // Expand ~ at start
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

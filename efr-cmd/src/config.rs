//! Settings file: dataset location, pacing, models, forecast client and hub.

use anyhow::{Context, Result};
use efr_meteo::{CachePolicy, RetryPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetConfig {
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,
    #[serde(default = "default_id_property")]
    pub id_property: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RefreshConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause after every processed or failed batch, for API rate limits
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelsConfig {
    #[serde(default = "default_flood_model")]
    pub flood: PathBuf,
    #[serde(default = "default_flood_type_model")]
    pub flood_type: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeteoConfig {
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    /// Zero disables the response cache
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HubConfig {
    #[serde(default = "default_repo_id")]
    pub repo_id: String,
    #[serde(default = "default_filename")]
    pub filename: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Environment variable holding the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub meteo: MeteoConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            id_property: default_id_property(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            flood: default_flood_model(),
            flood_type: default_flood_type_model(),
        }
    }
}

impl Default for MeteoConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
            cache_ttl_seconds: default_cache_ttl_seconds(),
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            repo_id: default_repo_id(),
            filename: default_filename(),
            revision: default_revision(),
            token_env: default_token_env(),
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("europe_admin.geojson")
}

fn default_id_property() -> String {
    efr_regions::DEFAULT_ID_PROPERTY.to_string()
}

fn default_batch_size() -> usize {
    100
}

fn default_cooldown_seconds() -> f64 {
    65.0
}

fn default_flood_model() -> PathBuf {
    PathBuf::from("models/model_XGBC_predict_flood.json")
}

fn default_flood_type_model() -> PathBuf {
    PathBuf::from("models/model_XGBC_flood_type.json")
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".cache/open-meteo.sqlite")
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_factor() -> f64 {
    0.2
}

fn default_timeout_seconds() -> f64 {
    60.0
}

fn default_repo_id() -> String {
    "AdrienD-Skep/geo_flood_data".to_string()
}

fn default_filename() -> String {
    "europe_admin.geojson".to_string()
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_token_env() -> String {
    "HF_TOKEN".to_string()
}

fn default_endpoint() -> String {
    "https://huggingface.co".to_string()
}

fn seconds(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}

impl RefreshConfig {
    pub fn cooldown(&self) -> Duration {
        seconds(self.cooldown_seconds)
    }
}

impl MeteoConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: self.backoff_factor,
        }
    }

    pub fn cache_policy(&self) -> CachePolicy {
        match self.cache_ttl_seconds {
            0 => CachePolicy::disabled(),
            ttl => CachePolicy {
                expire_after: Some(chrono::Duration::seconds(ttl as i64)),
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_seconds)
    }
}

impl HubConfig {
    pub fn timeout(&self) -> Duration {
        seconds(self.timeout_seconds)
    }

    /// Access token from the configured environment variable, if set.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

fn repo_default_config_path() -> PathBuf {
    PathBuf::from("config/efr.toml")
}

fn resolve_config_path_with_overrides(
    raw_path: Option<PathBuf>,
    env_keys: &[&str],
    repo_default: PathBuf,
) -> Option<PathBuf> {
    if let Some(path) = raw_path {
        return Some(path);
    }

    for key in env_keys {
        if let Ok(value) = std::env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(PathBuf::from(trimmed));
            }
        }
    }

    repo_default.exists().then_some(repo_default)
}

/// Settings file to use: `--config`, then `EFR_CONFIG`, then
/// `config/efr.toml` when it exists. `None` means built-in defaults.
pub fn resolve_config_path(raw_path: Option<PathBuf>) -> Option<PathBuf> {
    resolve_config_path_with_overrides(raw_path, &["EFR_CONFIG"], repo_default_config_path())
}

pub fn load_config(path: impl AsRef<Path>) -> Result<Settings> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read config {}", path.as_ref().display()))?;
    let settings: Settings = toml::from_str(&content).context("failed to parse TOML config")?;
    if settings.refresh.batch_size == 0 {
        anyhow::bail!("refresh.batch_size must be at least 1");
    }
    Ok(settings)
}

/// Resolve and load the settings, falling back to defaults.
pub fn load_settings(raw_path: Option<PathBuf>) -> Result<Settings> {
    match resolve_config_path(raw_path) {
        Some(path) => {
            log::info!("Using config {}", path.display());
            load_config(path)
        }
        None => Ok(Settings::default()),
    }
}

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::Source;
use crate::error::CatalogError;

pub const CONFIG_FILE_NAME: &str = "neuro-catalog.json";
pub const SEARCH_URL_ENV: &str = "MARQO_URL";

pub const DEFAULT_SEARCH_URL: &str = "http://localhost:8882";
pub const DEFAULT_INDEX_NAME: &str = "neuroscience_datasets";
pub const DEFAULT_MODEL: &str = "hf/e5-base-v2";
pub const DEFAULT_OPENNEURO_URL: &str = "https://openneuro.org/crn/graphql";
pub const DEFAULT_DANDI_URL: &str = "https://api.dandiarchive.org/api";
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_BATCH_SIZE: usize = 1;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub index_name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub openneuro_url: Option<String>,
    #[serde(default)]
    pub dandi_url: Option<String>,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub cache_dir: Utf8PathBuf,
    pub search_url: String,
    pub index_name: String,
    pub model: String,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub page_size: u32,
    pub openneuro_url: String,
    pub dandi_url: String,
    pub sources: Vec<Source>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            cache_dir: Utf8PathBuf::from("cache"),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            model: DEFAULT_MODEL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: Duration::from_millis(500),
            page_size: DEFAULT_PAGE_SIZE,
            openneuro_url: DEFAULT_OPENNEURO_URL.to_string(),
            dandi_url: DEFAULT_DANDI_URL.to_string(),
            sources: Source::ALL.to_vec(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config file (explicit path, working directory, then user config dir)
    /// and applies the `MARQO_URL` override.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config = match Self::locate(path)? {
            Some(config_path) => {
                let content = fs::read_to_string(&config_path)
                    .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
                serde_json::from_str(&content)
                    .map_err(|err| CatalogError::ConfigParse(err.to_string()))?
            }
            None => Config::default(),
        };
        let env_url = std::env::var(SEARCH_URL_ENV).ok();
        Self::resolve_config(config, env_url.as_deref())
    }

    fn locate(path: Option<&str>) -> Result<Option<PathBuf>, CatalogError> {
        if let Some(path) = path {
            let explicit = PathBuf::from(path);
            if !explicit.exists() {
                return Err(CatalogError::ConfigRead(explicit));
            }
            return Ok(Some(explicit));
        }
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Ok(Some(local));
        }
        Ok(ProjectDirs::from("org", "neuro-catalog", "neuro-catalog")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .filter(|candidate| candidate.exists()))
    }

    pub fn resolve_config(
        config: Config,
        env_search_url: Option<&str>,
    ) -> Result<ResolvedConfig, CatalogError> {
        let defaults = ResolvedConfig::default();

        let search_url = env_search_url
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .or(config.search_url)
            .unwrap_or(defaults.search_url);

        let batch_size = config.batch_size.unwrap_or(defaults.batch_size);
        if batch_size == 0 {
            return Err(CatalogError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let page_size = config.page_size.unwrap_or(defaults.page_size);
        if page_size == 0 {
            return Err(CatalogError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        let sources = match config.sources {
            Some(values) => values
                .iter()
                .map(|value| value.parse::<Source>())
                .collect::<Result<Vec<_>, CatalogError>>()?,
            None => defaults.sources,
        };

        let resolved = ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            cache_dir: config
                .cache_dir
                .map(Utf8PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            search_url: search_url.trim_end_matches('/').to_string(),
            index_name: config.index_name.unwrap_or(defaults.index_name),
            model: config.model.unwrap_or(defaults.model),
            batch_size,
            batch_delay: config
                .batch_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.batch_delay),
            page_size,
            openneuro_url: config.openneuro_url.unwrap_or(defaults.openneuro_url),
            dandi_url: config
                .dandi_url
                .unwrap_or(defaults.dandi_url)
                .trim_end_matches('/')
                .to_string(),
            sources,
        };

        for (key, url) in [
            ("search_url", &resolved.search_url),
            ("openneuro_url", &resolved.openneuro_url),
            ("dandi_url", &resolved.dandi_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(CatalogError::InvalidConfig(format!(
                    "{key} must be an http(s) URL, got {url}"
                )));
            }
        }
        if resolved.index_name.trim().is_empty() {
            return Err(CatalogError::InvalidConfig(
                "index_name must not be empty".to_string(),
            ));
        }

        Ok(resolved)
    }
}

use std::fs;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::batch::BatchSize;
use crate::error::ShelfError;
use crate::reconcile::DEFAULT_TITLE_THRESHOLD;
use crate::store::PreprintStore;

pub const CONFIG_FILE: &str = "arxiv-shelf.json";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store_path: Option<Utf8PathBuf>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub download_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub artifact_extension: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub legacy_title_threshold: Option<usize>,
    #[serde(default)]
    pub bookmarks: Option<BookmarkSettings>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BookmarkSettings {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub store_path: Option<Utf8PathBuf>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store_path: Utf8PathBuf,
    pub batch_size: BatchSize,
    pub download_dir: Option<Utf8PathBuf>,
    pub artifact_extension: String,
    pub request_timeout: Duration,
    pub max_retries: usize,
    pub legacy_title_threshold: usize,
    pub bookmarks: BookmarkSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `arxiv-shelf.json` in the working directory when no
    /// path is given. Only the implicit file may be absent.
    pub fn resolve(path: Option<&str>, overrides: Overrides) -> Result<ResolvedConfig, ShelfError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.as_std_path().exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(config_path.as_std_path())
                .map_err(|_| ShelfError::ConfigRead(config_path.clone().into()))?;
            serde_json::from_str(&content).map_err(|err| ShelfError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, overrides)
    }

    pub fn resolve_config(config: Config, overrides: Overrides) -> Result<ResolvedConfig, ShelfError> {
        let store_path = match overrides.store_path.or(config.store_path) {
            Some(path) => path,
            None => PreprintStore::default_path()?,
        };
        if store_path.extension() != Some("json") {
            return Err(ShelfError::StoreFormat(store_path.into()));
        }

        let batch_size = BatchSize::new(
            overrides
                .batch_size
                .or(config.batch_size)
                .unwrap_or(crate::batch::DEFAULT_BATCH_SIZE),
        )?;

        let timeout_secs = config.request_timeout_secs.unwrap_or(30);
        if timeout_secs == 0 {
            return Err(ShelfError::InvalidConfig(
                "request_timeout_secs must be positive".to_string(),
            ));
        }

        let legacy_title_threshold = config
            .legacy_title_threshold
            .unwrap_or(DEFAULT_TITLE_THRESHOLD);
        if legacy_title_threshold == 0 {
            return Err(ShelfError::InvalidConfig(
                "legacy_title_threshold must be positive".to_string(),
            ));
        }

        let artifact_extension = config
            .artifact_extension
            .map(|ext| ext.trim_start_matches('.').to_string())
            .unwrap_or_else(|| "pdf".to_string());
        if artifact_extension.is_empty() {
            return Err(ShelfError::InvalidConfig(
                "artifact_extension must not be empty".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            store_path,
            batch_size,
            download_dir: config.download_dir,
            artifact_extension,
            request_timeout: Duration::from_secs(timeout_secs),
            max_retries: config.max_retries.unwrap_or(3),
            legacy_title_threshold,
            bookmarks: config.bookmarks.unwrap_or_default(),
        })
    }
}

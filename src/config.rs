use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::CollectorError;

pub const DATA_DIR_ENV: &str = "GENOME_COLLECTOR_DATA_DIR";
pub const API_KEY_ENV: &str = "NCBI_API_KEY";
pub const DEFAULT_CONFIG_FILE: &str = "genome-collector.json";
pub const DEFAULT_COLLECTION: &str = "default";

/// Contents of `genome-collector.json`. Every field is optional.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub autodownload: Option<bool>,
    #[serde(default)]
    pub ncbi: NcbiConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NcbiConfig {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub request_interval_ms: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub makeblastdb: Option<String>,
    #[serde(default)]
    pub blastn: Option<String>,
    #[serde(default)]
    pub blastp: Option<String>,
    #[serde(default)]
    pub bowtie_build: Option<String>,
    #[serde(default)]
    pub bowtie2_build: Option<String>,
}

/// Process environment, captured once so resolution stays a pure function.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub data_dir: Option<String>,
    pub api_key: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        let read = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        Self {
            data_dir: read(DATA_DIR_ENV),
            api_key: read(API_KEY_ENV),
        }
    }
}

/// Explicit overrides from the caller (CLI flags); they beat file and env.
#[derive(Debug, Clone, Default)]
pub struct CallerOverrides {
    pub data_dir: Option<String>,
    pub collection: Option<String>,
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct NcbiSettings {
    pub base_url: String,
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub request_interval_ms: u64,
    pub max_retries: usize,
    pub timeout_secs: u64,
}

impl Default for NcbiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            email: None,
            api_key: None,
            request_interval_ms: 340,
            max_retries: 0,
            timeout_secs: 120,
        }
    }
}

/// Executables used for building and searching databases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPrograms {
    pub makeblastdb: String,
    pub blastn: String,
    pub blastp: String,
    pub bowtie_build: String,
    pub bowtie2_build: String,
}

impl Default for ToolPrograms {
    fn default() -> Self {
        Self {
            makeblastdb: "makeblastdb".to_string(),
            blastn: "blastn".to_string(),
            blastp: "blastp".to_string(),
            bowtie_build: "bowtie-build".to_string(),
            bowtie2_build: "bowtie2-build".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionConfig {
    pub base_dir: Utf8PathBuf,
    pub collection: String,
    pub autodownload: bool,
    pub ncbi: NcbiSettings,
    pub tools: ToolPrograms,
}

impl CollectionConfig {
    /// Config rooted at an explicit directory with defaults for everything else.
    pub fn with_base_dir(base_dir: Utf8PathBuf) -> Self {
        Self {
            base_dir,
            collection: DEFAULT_COLLECTION.to_string(),
            autodownload: true,
            ncbi: NcbiSettings::default(),
            tools: ToolPrograms::default(),
        }
    }

    pub fn root(&self) -> Utf8PathBuf {
        self.base_dir.join(&self.collection)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` (or `genome-collector.json` in the working directory, if it
    /// exists) and merges it with the environment and caller overrides.
    pub fn resolve(
        path: Option<&str>,
        env: &EnvOverrides,
        overrides: &CallerOverrides,
    ) -> Result<CollectionConfig, CollectorError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| CollectorError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| CollectorError::ConfigParse(err.to_string()))?
        } else if path.is_some() {
            return Err(CollectorError::MissingConfig(config_path));
        } else {
            Config::default()
        };

        Self::resolve_config(config, env, overrides)
    }

    pub fn resolve_config(
        config: Config,
        env: &EnvOverrides,
        overrides: &CallerOverrides,
    ) -> Result<CollectionConfig, CollectorError> {
        let base_dir = match overrides
            .data_dir
            .clone()
            .or(config.data_dir)
            .or_else(|| env.data_dir.clone())
        {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_data_dir()?,
        };

        let collection = overrides
            .collection
            .clone()
            .or(config.collection)
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        if collection.is_empty() || collection.contains(['/', '\\']) || collection == ".." {
            return Err(CollectorError::ConfigParse(format!(
                "invalid collection name: {collection}"
            )));
        }

        let defaults = NcbiSettings::default();
        let ncbi = NcbiSettings {
            base_url: config.ncbi.base_url.unwrap_or(defaults.base_url),
            email: config.ncbi.email,
            api_key: config.ncbi.api_key.or_else(|| env.api_key.clone()),
            request_interval_ms: config
                .ncbi
                .request_interval_ms
                .unwrap_or(defaults.request_interval_ms),
            max_retries: config.ncbi.max_retries.unwrap_or(defaults.max_retries),
            timeout_secs: config.ncbi.timeout_secs.unwrap_or(defaults.timeout_secs),
        };

        let programs = ToolPrograms::default();
        let tools = ToolPrograms {
            makeblastdb: config.tools.makeblastdb.unwrap_or(programs.makeblastdb),
            blastn: config.tools.blastn.unwrap_or(programs.blastn),
            blastp: config.tools.blastp.unwrap_or(programs.blastp),
            bowtie_build: config.tools.bowtie_build.unwrap_or(programs.bowtie_build),
            bowtie2_build: config.tools.bowtie2_build.unwrap_or(programs.bowtie2_build),
        };

        Ok(CollectionConfig {
            base_dir,
            collection,
            autodownload: !overrides.offline && config.autodownload.unwrap_or(true),
            ncbi,
            tools,
        })
    }
}

/// Platform user-data directory, e.g. `~/.local/share/genome_collector`.
pub fn default_data_dir() -> Result<Utf8PathBuf, CollectorError> {
    ProjectDirs::from("", "EGF", "genome_collector")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().to_path_buf()).ok())
        .ok_or_else(|| CollectorError::Filesystem("unable to resolve user data directory".to_string()))
}

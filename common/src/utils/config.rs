use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::utils::embedding::EmbeddingBackend;

/// A title term whose match replaces the generic title boost.
#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct TitleBoostOverride {
    pub term: String,
    pub boost: f32,
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,
    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_dimensions")]
    pub embedding_dimensions: u32,
    #[serde(default = "default_embedding_batch_size")]
    pub embedding_batch_size: usize,
    #[serde(default = "default_embedding_max_retries")]
    pub embedding_max_retries: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_embedding_backoff_base_ms")]
    pub embedding_backoff_base_ms: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Local per-machine copy of the index. Defaults to `<data_dir>/index`.
    #[serde(default)]
    pub index_dir: Option<String>,
    /// Network-synced source of truth. When set, the daemon syncs from it on start.
    #[serde(default)]
    pub index_source_dir: Option<String>,
    #[serde(default)]
    pub embedding_cache_path: Option<String>,
    #[serde(default)]
    pub state_file: Option<String>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f32,
    #[serde(default = "default_title_boost")]
    pub title_boost: f32,
    #[serde(default)]
    pub title_boost_overrides: Vec<TitleBoostOverride>,
    #[serde(default)]
    pub intent_phrases: Option<Vec<String>>,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_client_timeout_secs")]
    pub client_timeout_secs: u64,
    #[serde(default = "default_daemon_startup_timeout_secs")]
    pub daemon_startup_timeout_secs: u64,
    #[serde(default = "default_daemon_binary")]
    pub daemon_binary: String,
    #[serde(default = "default_oneshot_binary")]
    pub oneshot_binary: String,
}

impl AppConfig {
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .as_ref()
            .map_or_else(|| Path::new(&self.data_dir).join("index"), PathBuf::from)
    }

    pub fn index_source_dir(&self) -> Option<PathBuf> {
        self.index_source_dir.as_ref().map(PathBuf::from)
    }

    pub fn embedding_cache_path(&self) -> PathBuf {
        self.embedding_cache_path.as_ref().map_or_else(
            || Path::new(&self.data_dir).join("embedding_cache.json"),
            PathBuf::from,
        )
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_file.as_ref().map_or_else(
            || Path::new(&self.data_dir).join("daemon_state.json"),
            PathBuf::from,
        )
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: default_base_url(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: default_embedding_model(),
            embedding_dimensions: default_embedding_dimensions(),
            embedding_batch_size: default_embedding_batch_size(),
            embedding_max_retries: default_embedding_max_retries(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            embedding_backoff_base_ms: default_embedding_backoff_base_ms(),
            data_dir: default_data_dir(),
            index_dir: None,
            index_source_dir: None,
            embedding_cache_path: None,
            state_file: None,
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            max_results: default_max_results(),
            similarity_threshold: default_similarity_threshold(),
            semantic_weight: default_semantic_weight(),
            keyword_weight: default_keyword_weight(),
            title_boost: default_title_boost(),
            title_boost_overrides: Vec::new(),
            intent_phrases: None,
            cache_ttl_secs: default_cache_ttl_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            client_timeout_secs: default_client_timeout_secs(),
            daemon_startup_timeout_secs: default_daemon_startup_timeout_secs(),
            daemon_binary: default_daemon_binary(),
            oneshot_binary: default_oneshot_binary(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

const fn default_embedding_dimensions() -> u32 {
    1536
}

// Provider-imposed limit on inputs per embeddings request.
const fn default_embedding_batch_size() -> usize {
    2048
}

const fn default_embedding_max_retries() -> usize {
    3
}

const fn default_embedding_timeout_secs() -> u64 {
    60
}

const fn default_embedding_backoff_base_ms() -> u64 {
    1000
}

const fn default_chunk_size() -> usize {
    500
}

const fn default_chunk_overlap() -> usize {
    100
}

const fn default_max_results() -> usize {
    10
}

const fn default_similarity_threshold() -> f32 {
    0.5
}

const fn default_semantic_weight() -> f32 {
    0.7
}

const fn default_keyword_weight() -> f32 {
    0.3
}

const fn default_title_boost() -> f32 {
    0.2
}

const fn default_cache_ttl_secs() -> u64 {
    300
}

const fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

const fn default_client_timeout_secs() -> u64 {
    10
}

const fn default_daemon_startup_timeout_secs() -> u64 {
    90
}

fn default_daemon_binary() -> String {
    "search-daemon".to_string()
}

fn default_oneshot_binary() -> String {
    "search-once".to_string()
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

/// Same as [`get_config`] but reads an explicit config file in place of `./config`.
pub fn get_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.embedding_batch_size, 2048);
        assert_eq!(config.embedding_max_retries, 3);
        assert_eq!(config.cache_ttl_secs, 300);
        assert_eq!(config.idle_timeout_secs, 1800);
        assert_eq!(config.index_dir(), Path::new("./data").join("index"));
        assert_eq!(
            config.state_file(),
            Path::new("./data").join("daemon_state.json")
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp config");
        writeln!(
            file,
            r#"
embedding_backend = "hashed"
embedding_dimensions = 64
chunk_size = 100
chunk_overlap = 20
index_dir = "/tmp/standards-index"

[[title_boost_overrides]]
term = "revit"
boost = 0.4
"#
        )
        .expect("write config");

        let config = get_config_from(file.path()).expect("config should parse");
        assert_eq!(config.embedding_backend, EmbeddingBackend::Hashed);
        assert_eq!(config.embedding_dimensions, 64);
        assert_eq!(config.chunk_size, 100);
        assert_eq!(config.chunk_overlap, 20);
        assert_eq!(config.index_dir(), PathBuf::from("/tmp/standards-index"));
        assert_eq!(
            config.title_boost_overrides,
            vec![TitleBoostOverride {
                term: "revit".into(),
                boost: 0.4
            }]
        );
        assert!((config.semantic_weight - 0.7).abs() < f32::EPSILON);
    }
}

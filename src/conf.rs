use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_with::{serde_as, DurationSeconds};
use twelf::reexports::serde::{Deserialize, Serialize};
use twelf::{config, Layer};

use crate::error::EsError;
use crate::models::bulk::BulkOperation;

pub const DEFAULT_DELETE_BATCH_SIZE: usize = 5000;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_SCROLL_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SCROLL_KEEP_ALIVE: &str = "1m";
pub const DEFAULT_RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENV_PREFIX: &str = "ESH_";

#[config]
#[derive(Debug)]
pub struct Config {
    elasticsearch: EsConfig,
    #[serde(default)]
    log_level: LevelMode,
}

#[serde_as]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EsConfig {
    url: String,
    #[serde(default)]
    basic_auth: Option<BasicAuth>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(
        rename = "response_header_timeout_seconds",
        default = "default_response_header_timeout"
    )]
    response_header_timeout: Duration,
    #[serde(default)]
    tls: TlsConfig,
    #[serde(default = "default_delete_batch_size")]
    delete_batch_size: usize,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "query_timeout_seconds", default = "default_query_timeout")]
    query_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "scroll_timeout_seconds", default = "default_scroll_timeout")]
    scroll_timeout: Duration,
    #[serde(default = "default_scroll_keep_alive")]
    scroll_keep_alive: String,
    #[serde(default = "default_true")]
    ping_on_connect: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BasicAuth {
    username: String,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct TlsConfig {
    #[serde(default)]
    min_version: TlsVersion,
    #[serde(default)]
    skip_verify: bool,
    /// Directory of PEM files added as trusted roots.
    #[serde(default)]
    root_certificates: Option<PathBuf>,
}

/// Lowest TLS version the client negotiates. The rustls backend has no
/// support for anything older than 1.2.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsVersion {
    #[default]
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

/// warn > info > debug > trace
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LevelMode {
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LevelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelMode::Warn => "warn",
            LevelMode::Info => "info",
            LevelMode::Debug => "debug",
            LevelMode::Trace => "trace",
        }
    }
    pub fn is_debug_mode(&self) -> bool {
        matches!(self, LevelMode::Debug | LevelMode::Trace)
    }
}

fn default_response_header_timeout() -> Duration {
    DEFAULT_RESPONSE_HEADER_TIMEOUT
}
fn default_delete_batch_size() -> usize {
    DEFAULT_DELETE_BATCH_SIZE
}
fn default_query_timeout() -> Duration {
    DEFAULT_QUERY_TIMEOUT
}
fn default_scroll_timeout() -> Duration {
    DEFAULT_SCROLL_TIMEOUT
}
fn default_scroll_keep_alive() -> String {
    DEFAULT_SCROLL_KEEP_ALIVE.to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Loads `path` (TOML or JSON, picked by extension), then lets `ESH_*`
    /// environment variables override top-level keys.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let file_layer = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Layer::Toml(path.to_path_buf()),
            Some("json") => Layer::Json(path.to_path_buf()),
            _ => {
                return Err(EsError::Config(format!(
                    "unsupported config file {:?}, expected .toml or .json",
                    path
                )))
            }
        };
        let config = Config::with_layers(&[file_layer, Layer::Env(Some(ENV_PREFIX.to_string()))])
            .map_err(|e| EsError::Config(format!("failed to load {:?}: {}", path, e)))?;
        config.elasticsearch.validate()?;
        Ok(config)
    }

    pub fn get_elasticsearch(&self) -> &EsConfig {
        &self.elasticsearch
    }
    pub fn get_log_level(&self) -> LevelMode {
        self.log_level
    }
}

impl EsConfig {
    /// Configuration with every optional setting at its default.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            basic_auth: None,
            response_header_timeout: DEFAULT_RESPONSE_HEADER_TIMEOUT,
            tls: TlsConfig::default(),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            scroll_timeout: DEFAULT_SCROLL_TIMEOUT,
            scroll_keep_alive: DEFAULT_SCROLL_KEEP_ALIVE.to_string(),
            ping_on_connect: true,
        }
    }

    pub fn with_basic_auth(mut self, username: &str, password: Option<&str>) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.to_string(),
            password: password.map(str::to_string),
        });
        self
    }
    pub fn with_delete_batch_size(mut self, size: usize) -> Self {
        self.delete_batch_size = size;
        self
    }
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }
    pub fn with_ping_on_connect(mut self, ping: bool) -> Self {
        self.ping_on_connect = ping;
        self
    }
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.url.trim().is_empty() {
            return Err(EsError::Config("elasticsearch.url must not be empty".to_string()));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(EsError::Config(format!(
                "elasticsearch.url {:?} must start with http:// or https://",
                self.url
            )));
        }
        if self.delete_batch_size == 0 {
            return Err(EsError::Config(
                "elasticsearch.delete_batch_size must be at least 1".to_string(),
            ));
        }
        if self.scroll_keep_alive.trim().is_empty() {
            return Err(EsError::Config(
                "elasticsearch.scroll_keep_alive must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Base url without trailing slash.
    pub fn get_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
    pub fn get_response_header_timeout(&self) -> Duration {
        self.response_header_timeout
    }
    pub fn get_tls(&self) -> &TlsConfig {
        &self.tls
    }
    pub fn get_delete_batch_size(&self) -> usize {
        self.delete_batch_size
    }
    pub fn get_query_timeout(&self) -> Duration {
        self.query_timeout
    }
    pub fn get_scroll_timeout(&self) -> Duration {
        self.scroll_timeout
    }
    pub fn get_scroll_keep_alive(&self) -> &String {
        &self.scroll_keep_alive
    }
    pub fn is_ping_on_connect(&self) -> bool {
        self.ping_on_connect
    }
    pub fn has_basic_auth(&self) -> bool {
        self.basic_auth.is_some()
    }
    pub fn get_username(&self) -> String {
        if let Some(basic_auth) = &self.basic_auth {
            basic_auth.username.clone()
        } else {
            String::default()
        }
    }
    pub fn get_password(&self) -> Option<String> {
        if let Some(basic_auth) = &self.basic_auth {
            return basic_auth.password.clone();
        }
        None
    }
}

impl TlsConfig {
    pub fn new(min_version: TlsVersion, skip_verify: bool, root_certificates: Option<PathBuf>) -> Self {
        Self {
            min_version,
            skip_verify,
            root_certificates,
        }
    }
    pub fn get_min_version(&self) -> TlsVersion {
        self.min_version
    }
    pub fn is_skip_verify(&self) -> bool {
        self.skip_verify
    }
    pub fn get_root_certificates(&self) -> Option<&PathBuf> {
        self.root_certificates.as_ref()
    }
}

/// Parses the operation names used on the command line.
pub fn parse_operation(value: &str) -> crate::error::Result<BulkOperation> {
    match value {
        "insert" | "create" => Ok(BulkOperation::Insert),
        "upsert" | "update" => Ok(BulkOperation::Upsert),
        "index" => Ok(BulkOperation::Index),
        "delete" => Ok(BulkOperation::Delete),
        other => Err(EsError::InvalidArgument(format!(
            "unknown bulk operation {:?}",
            other
        ))),
    }
}

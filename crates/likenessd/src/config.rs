use likeness_core::DistanceMetric;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid port '{value}': must be between 1 and 65535")]
    InvalidPort { value: String },
    #[error("failed to parse bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("unknown comparator '{value}': expected 'onnx' or 'remote'")]
    UnknownComparator { value: String },
    #[error("unknown distance metric '{value}': expected 'cosine' or 'euclidean_l2'")]
    UnknownMetric { value: String },
    #[error("missing required environment variable: {name}")]
    MissingEnvVar { name: &'static str },
    #[error("path is not a directory: {path}")]
    NotADirectory { path: PathBuf },
    #[error("verify timeout must be at least one second")]
    ZeroTimeout,
    #[error("request body limit must be at least one byte")]
    ZeroBodyLimit,
}

/// Default request body limit. Captured images arrive inline as base64.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Which comparator implementation the daemon probes at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparatorKind {
    /// In-process SCRFD + ArcFace.
    Onnx,
    /// External face service over HTTP.
    Remote,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    /// Directory holding reference photos.
    pub photos_dir: PathBuf,
    /// Staging directory for temporary artifacts.
    pub temp_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub comparator: ComparatorKind,
    pub metric: DistanceMetric,
    /// Base URL of the remote face service (required for `Remote`).
    pub remote_url: Option<String>,
    /// Upper bound in seconds on one verification or encode check.
    pub verify_timeout_secs: u64,
    /// Number of filenames listed by the diagnostics route.
    pub sample_limit: usize,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Config {
    /// Load configuration from `LIKENESS_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `var`.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = match var("LIKENESS_BIND_ADDR") {
            Some(value) => value
                .parse()
                .map_err(|source| ConfigError::InvalidBindAddr { value, source })?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };

        let port = match var("LIKENESS_PORT") {
            Some(value) => match value.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => return Err(ConfigError::InvalidPort { value }),
            },
            None => 5000,
        };

        let comparator = match var("LIKENESS_COMPARATOR").as_deref() {
            None | Some("onnx") => ComparatorKind::Onnx,
            Some("remote") => ComparatorKind::Remote,
            Some(other) => return Err(ConfigError::UnknownComparator { value: other.to_string() }),
        };

        let metric = match var("LIKENESS_DISTANCE_METRIC").as_deref() {
            None | Some("cosine") => DistanceMetric::Cosine,
            Some("euclidean_l2") => DistanceMetric::EuclideanL2,
            Some(other) => return Err(ConfigError::UnknownMetric { value: other.to_string() }),
        };

        let model_dir = var("LIKENESS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(likeness_core::default_model_dir);

        Ok(Self {
            bind_addr,
            port,
            photos_dir: var("LIKENESS_PHOTOS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads/photos")),
            temp_dir: var("LIKENESS_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("likeness")),
            model_dir,
            comparator,
            metric,
            remote_url: var("LIKENESS_REMOTE_URL").filter(|url| !url.trim().is_empty()),
            verify_timeout_secs: env_u64(&var, "LIKENESS_VERIFY_TIMEOUT_SECS", 20),
            sample_limit: env_usize(&var, "LIKENESS_SAMPLE_LIMIT", 20),
            max_body_bytes: env_usize(&var, "LIKENESS_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES),
        })
    }

    /// Check invariants. Does not create directories; a missing photos
    /// directory only degrades health.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.verify_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_body_bytes == 0 {
            return Err(ConfigError::ZeroBodyLimit);
        }
        if self.comparator == ComparatorKind::Remote && self.remote_url.is_none() {
            return Err(ConfigError::MissingEnvVar { name: "LIKENESS_REMOTE_URL" });
        }
        for path in [&self.photos_dir, &self.temp_dir] {
            if path.exists() && !path.is_dir() {
                return Err(ConfigError::NotADirectory { path: path.clone() });
            }
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs)
    }
}

fn env_u64(var: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> u64 {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_usize(var: &impl Fn(&str) -> Option<String>, key: &str, default: usize) -> usize {
    var(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

use paddy_api::DEFAULT_MAX_UPLOAD_BYTES;
use paddy_model_provider::config::DEFAULT_MODEL_PATH;
use paddy_model_provider::{ModelConfig, WeightsSource};
use std::env;
use std::path::PathBuf;
use url::Url;

pub const DEFAULT_SECRET_KEY: &str = "dev-key-please-change";

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Carried for deployments that set it; nothing in this service signs with it.
    pub secret_key: String,
    pub model: ModelConfig,
    pub max_upload_bytes: usize,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Config {
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 5000)?,
            secret_key: lookup("SECRET_KEY")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_SECRET_KEY.to_string()),
            model: ModelConfig::new(Self::load_weights_source(&lookup)?),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            metrics_port: lookup("METRICS_PORT")
                .map(|v| v.parse().map_err(|_| ConfigError::InvalidValue("METRICS_PORT")))
                .transpose()?,
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.secret_key == DEFAULT_SECRET_KEY
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn load_weights_source(
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<WeightsSource, ConfigError> {
        let source = lookup("MODEL_SOURCE").unwrap_or_else(|| "local".to_string());

        match source.to_lowercase().as_str() {
            "local" => Ok(WeightsSource::Local(PathBuf::from(
                lookup("MODEL_PATH").unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string()),
            ))),
            "remote" => {
                let url = lookup("MODEL_URL").ok_or(ConfigError::MissingVar("MODEL_URL"))?;
                let url = Url::parse(&url).map_err(|_| ConfigError::InvalidValue("MODEL_URL"))?;
                match url.scheme() {
                    "http" | "https" => Ok(WeightsSource::Remote(url)),
                    _ => Err(ConfigError::InvalidValue("MODEL_URL")),
                }
            }
            _ => Err(ConfigError::InvalidValue("MODEL_SOURCE")),
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(v) => v.parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    MissingVar(&'static str),
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVar(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(var) => write!(f, "Invalid value for: {}", var),
        }
    }
}

impl std::error::Error for ConfigError {}

use crate::domain::{FaultPolicies, FaultPolicy};
use sentiment_scorers::{LexiconSource, RobertaResources, VADER_LEXICON_URL};
use serde::{Deserialize, Serialize};
use std::env;

pub const DEFAULT_ORIGIN: &str = "https://sentiment-analysis-review.vercel.app";
const DEFAULT_BATCH_LIMIT_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
    pub models: ModelsConfig,
    pub fault_policy: FaultPolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The only origin allowed to make cross-origin requests.
    pub origin: String,
    pub workers: usize,
    pub keep_alive: u64,
    pub request_timeout: u64,
    pub batch_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub service_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub histogram_buckets: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
    pub enable_json: bool,
    pub enable_color: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Local lexicon file, takes precedence over the URL.
    pub vader_lexicon_path: Option<String>,
    pub vader_lexicon_url: String,
    /// Use the bundled lexicon subset instead of downloading the full one.
    pub vader_lexicon_offline: bool,
    pub roberta_model_id: String,
    pub roberta_model_url: String,
    pub roberta_config_url: String,
    pub roberta_vocab_url: String,
    pub roberta_merges_url: String,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultPolicyConfig {
    pub vader: FaultPolicy,
    pub roberta: FaultPolicy,
    pub huggingface: FaultPolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            server: ServerConfig::from_env()?,
            telemetry: TelemetryConfig::from_env()?,
            metrics: MetricsConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            models: ModelsConfig::from_env()?,
            fault_policy: FaultPolicyConfig::from_env()?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.server.origin.trim().is_empty() {
            return Err(ConfigError::MissingRequired("SERVER_ORIGIN".to_string()));
        }

        if self.server.batch_limit_bytes == 0 {
            return Err(ConfigError::InvalidValue(
                "Batch body limit cannot be 0".to_string(),
            ));
        }

        if self.models.channel_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "Model channel capacity cannot be 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("SERVER_PORT".to_string()))?,
            origin: env::var("SERVER_ORIGIN").unwrap_or_else(|_| DEFAULT_ORIGIN.to_string()),
            workers: env::var("SERVER_WORKERS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("SERVER_WORKERS".to_string()))?,
            keep_alive: env::var("SERVER_KEEP_ALIVE")
                .unwrap_or_else(|_| "75".to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("SERVER_KEEP_ALIVE".to_string()))?,
            request_timeout: env::var("SERVER_REQUEST_TIMEOUT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("SERVER_REQUEST_TIMEOUT".to_string()))?,
            batch_limit_bytes: env::var("SERVER_BATCH_LIMIT_BYTES")
                .unwrap_or_else(|_| DEFAULT_BATCH_LIMIT_BYTES.to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("SERVER_BATCH_LIMIT_BYTES".to_string()))?,
        })
    }
}

impl TelemetryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(TelemetryConfig {
            enabled: env::var("TELEMETRY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            service_name: env::var("TELEMETRY_SERVICE_NAME")
                .unwrap_or_else(|_| "sentiment-api".to_string()),
        })
    }
}

impl MetricsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let histogram_buckets = env::var("METRICS_HISTOGRAM_BUCKETS")
            .unwrap_or_else(|_| {
                "0.001,0.005,0.01,0.025,0.05,0.1,0.25,0.5,1.0,2.5,5.0,10.0".to_string()
            })
            .split(',')
            .filter_map(|s| s.trim().parse::<f64>().ok())
            .collect();

        Ok(MetricsConfig {
            enabled: env::var("METRICS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            histogram_buckets,
        })
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string()),
            enable_json: env::var("LOG_ENABLE_JSON")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
            enable_color: env::var("LOG_ENABLE_COLOR")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
        })
    }
}

impl ModelsConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = RobertaResources::default();
        Ok(ModelsConfig {
            vader_lexicon_path: env::var("VADER_LEXICON_PATH")
                .ok()
                .filter(|path| !path.trim().is_empty()),
            vader_lexicon_url: env::var("VADER_LEXICON_URL")
                .unwrap_or_else(|_| VADER_LEXICON_URL.to_string()),
            vader_lexicon_offline: env::var("VADER_LEXICON_OFFLINE")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("VADER_LEXICON_OFFLINE".to_string()))?,
            roberta_model_id: env::var("ROBERTA_MODEL_ID").unwrap_or(defaults.model_id),
            roberta_model_url: env::var("ROBERTA_MODEL_URL").unwrap_or(defaults.model),
            roberta_config_url: env::var("ROBERTA_CONFIG_URL").unwrap_or(defaults.config),
            roberta_vocab_url: env::var("ROBERTA_VOCAB_URL").unwrap_or(defaults.vocab),
            roberta_merges_url: env::var("ROBERTA_MERGES_URL").unwrap_or(defaults.merges),
            channel_capacity: env::var("MODEL_CHANNEL_CAPACITY")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .map_err(|_| ConfigError::ParseError("MODEL_CHANNEL_CAPACITY".to_string()))?,
        })
    }

    pub fn lexicon_source(&self) -> LexiconSource {
        match (&self.vader_lexicon_path, self.vader_lexicon_offline) {
            (Some(path), _) => LexiconSource::File(path.into()),
            (None, true) => LexiconSource::Embedded,
            (None, false) => LexiconSource::Remote(self.vader_lexicon_url.clone()),
        }
    }

    pub fn roberta_resources(&self) -> RobertaResources {
        RobertaResources {
            model_id: self.roberta_model_id.clone(),
            model: self.roberta_model_url.clone(),
            config: self.roberta_config_url.clone(),
            vocab: self.roberta_vocab_url.clone(),
            merges: self.roberta_merges_url.clone(),
        }
    }
}

impl FaultPolicyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = FaultPolicies::default();
        Ok(FaultPolicyConfig {
            vader: policy_from_env("VADER_FAILURE_POLICY", defaults.vader)?,
            roberta: policy_from_env("ROBERTA_FAILURE_POLICY", defaults.roberta)?,
            huggingface: policy_from_env("PIPELINE_FAILURE_POLICY", defaults.huggingface)?,
        })
    }

    pub fn policies(&self) -> FaultPolicies {
        FaultPolicies {
            vader: self.vader,
            roberta: self.roberta,
            huggingface: self.huggingface,
        }
    }
}

fn policy_from_env(key: &str, default: FaultPolicy) -> Result<FaultPolicy, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::ParseError(key.to_string())),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingRequired(String),

    #[error("Failed to parse environment variable: {0}")]
    ParseError(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

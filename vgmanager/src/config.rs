use adapter::config::{ClientConfig, ValidationError as ClientValidationError};
use engine::predicate::PredicateConfig;
use serde::Deserialize;
use std::fs::File;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    ValidationError(#[from] ValidationError),
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("statsd port cannot be 0")]
    InvalidStatsdPort,

    #[error("predicate cache capacity cannot be 0")]
    ZeroCacheCapacity,

    #[error("audited organization names must not be empty")]
    EmptyOrganization,

    #[error("devops: {0}")]
    Devops(#[from] ClientValidationError),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    pub sentry_dsn: Option<String>,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            sentry_dsn: None,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
    #[serde(default = "default_metrics_prefix")]
    pub prefix: String,
}

fn default_metrics_prefix() -> String {
    "vgmanager".into()
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct AuditConfig {
    /// JSON-lines file receiving audit entries. Without it entries are only
    /// kept for the lifetime of the process.
    pub path: Option<PathBuf>,
    /// Organizations whose changes are audited.
    #[serde(default)]
    pub organizations: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub devops: ClientConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub predicates: PredicateConfig,
}

impl Config {
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(metrics) = &self.metrics
            && metrics.statsd_port == 0
        {
            return Err(ValidationError::InvalidStatsdPort);
        }
        if self.predicates.cache_capacity == 0 {
            return Err(ValidationError::ZeroCacheCapacity);
        }
        if self.audit.organizations.iter().any(|o| o.trim().is_empty()) {
            return Err(ValidationError::EmptyOrganization);
        }
        self.devops.validate()?;
        Ok(())
    }
}

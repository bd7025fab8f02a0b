use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_PIPE_CAPACITY: usize = 16;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] ValidationError),
    #[error("unknown instance: {0}")]
    UnknownInstance(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("no instance configured")]
    NoInstance,

    #[error("empty instance name")]
    EmptyInstanceName,

    #[error("duplicate instance name: {0}")]
    DuplicateInstance(String),

    #[error("instance {0} has no api key")]
    EmptyApiKey(String),

    #[error("instance {0} url must use http or https")]
    InvalidUrl(String),

    #[error("{0} cannot be 0")]
    Zero(&'static str),
}

/// A service instance the notifier can talk to.
#[derive(Clone, Deserialize, PartialEq)]
pub struct Instance {
    pub name: String,
    /// Base URL of the service. Anything under it is appended as `/api/...`.
    pub url: Url,
    pub api_key: String,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("name", &self.name)
            .field("url", &self.url.as_str())
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct HttpConfig {
    /// Per-request timeout. Unset means requests may run indefinitely.
    pub timeout_secs: Option<u64>,
}

impl HttpConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DispatchConfig {
    /// Upper bound on categories uploading at once. Unset means one task per category.
    pub max_concurrent_uploads: Option<usize>,
    /// Chunks buffered between an archiver and its upload.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,
}

fn default_pipe_capacity() -> usize {
    DEFAULT_PIPE_CAPACITY
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            max_concurrent_uploads: None,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.instances.is_empty() {
            return Err(ValidationError::NoInstance);
        }

        let mut names = HashSet::new();
        for instance in &self.instances {
            if instance.name.is_empty() {
                return Err(ValidationError::EmptyInstanceName);
            }
            if !names.insert(&instance.name) {
                return Err(ValidationError::DuplicateInstance(instance.name.clone()));
            }
            if instance.api_key.is_empty() {
                return Err(ValidationError::EmptyApiKey(instance.name.clone()));
            }
            if !matches!(instance.url.scheme(), "http" | "https") {
                return Err(ValidationError::InvalidUrl(instance.name.clone()));
            }
        }

        if self.http.timeout_secs == Some(0) {
            return Err(ValidationError::Zero("http.timeout_secs"));
        }
        if self.dispatch.max_concurrent_uploads == Some(0) {
            return Err(ValidationError::Zero("dispatch.max_concurrent_uploads"));
        }
        if self.dispatch.pipe_capacity == 0 {
            return Err(ValidationError::Zero("dispatch.pipe_capacity"));
        }

        Ok(())
    }

    pub fn instance(&self, name: &str) -> Result<&Instance, ConfigError> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .ok_or_else(|| ConfigError::UnknownInstance(name.to_string()))
    }
}

//! Client configuration as it appears in a service's JSON config file.

use std::io::Read;

use serde::Deserialize;
use url::Url;

use crate::error::ConfigError;

/// Settings for one upstream dependency.
///
/// ```json
/// { "base_url": "https://api.example.com", "retry": 3 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    /// Maximum attempts per call.
    #[serde(default = "default_retry")]
    pub retry: u32,
}

fn default_retry() -> u32 {
    1
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, retry: u32) -> Self {
        Self {
            base_url: base_url.into(),
            retry,
        }
    }

    /// Decode and validate a JSON document.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Url::parse(&self.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            source,
        })?;
        if self.retry == 0 {
            return Err(ConfigError::InvalidRetry);
        }
        Ok(())
    }
}

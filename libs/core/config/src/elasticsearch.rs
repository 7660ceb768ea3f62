use crate::{env_or_default, env_parse, ConfigError, FromEnv};
use std::env;
use std::time::Duration;

/// Connection settings for the product search cluster
#[derive(Clone, Debug)]
pub struct ElasticsearchConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "products".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_millis(5000),
        }
    }
}

impl FromEnv for ElasticsearchConfig {
    /// Reads from environment variables with defaults:
    /// - ELASTICSEARCH_URL: http://localhost:9200
    /// - ELASTICSEARCH_INDEX: products
    /// - ELASTICSEARCH_USERNAME / ELASTICSEARCH_PASSWORD: unset
    /// - ELASTICSEARCH_TIMEOUT_MS: 5000
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("ELASTICSEARCH_URL", "http://localhost:9200"),
            index: env_or_default("ELASTICSEARCH_INDEX", "products"),
            username: env::var("ELASTICSEARCH_USERNAME").ok(),
            password: env::var("ELASTICSEARCH_PASSWORD").ok(),
            timeout: Duration::from_millis(env_parse("ELASTICSEARCH_TIMEOUT_MS", 5000)?),
        })
    }
}

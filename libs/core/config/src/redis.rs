use crate::{ConfigError, FromEnv};
use std::env;

/// Redis configuration for the result cache
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub uri: String,
}

impl RedisConfig {
    pub fn new(uri: String) -> Self {
        Self { uri }
    }
}

impl FromEnv for RedisConfig {
    /// Reads REDIS_URL, falling back to REDIS_HOST (one of them is required)
    fn from_env() -> Result<Self, ConfigError> {
        env::var("REDIS_URL")
            .or_else(|_| env::var("REDIS_HOST"))
            .map(Self::new)
            .map_err(|_| ConfigError::MissingEnvVar("REDIS_URL".to_string()))
    }
}

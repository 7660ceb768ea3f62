use core_config::database::DatabaseConfig;
use core_config::elasticsearch::ElasticsearchConfig;
use core_config::redis::RedisConfig;
use core_config::server::ServerConfig;
use core_config::{ConfigError, FromEnv};
use domain_catalog_search::{RecommendationSettings, SearchSettings};
use std::time::Duration;

// Re-export Environment for use in other modules
pub use core_config::Environment;

/// Application-specific configuration
/// Composes shared config components from the `config` library
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: Environment,
    pub server: ServerConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub search: SearchSettings,
    pub recommendations: RecommendationSettings,
    /// Upper bound on a whole request, including every backend sub-call
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        let server = ServerConfig::from_env()?; // Uses defaults: HOST=0.0.0.0, PORT=8080
        let redis = RedisConfig::from_env()?; // Required - will fail if not set
        let database = DatabaseConfig::from_env()?; // Required - order history
        let elasticsearch = ElasticsearchConfig::from_env()?;
        let search = SearchSettings::from_env()?;
        let recommendations = RecommendationSettings::from_env()?;
        let request_timeout =
            Duration::from_millis(core_config::env_parse("REQUEST_TIMEOUT_MS", 10_000)?);

        Ok(Self {
            environment,
            server,
            redis,
            database,
            elasticsearch,
            search,
            recommendations,
            request_timeout,
        })
    }
}

use std::time::Duration;

/// Search orchestration tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub cache_ttl: Duration,
    pub autocomplete_cache_ttl: Duration,
    pub max_page_size: u32,
    /// Deadline for each backend sub-call (documents, facets, suggestions)
    pub subcall_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(15 * 60),
            autocomplete_cache_ttl: Duration::from_secs(60 * 60),
            max_page_size: 100,
            subcall_timeout: Duration::from_millis(2000),
        }
    }
}

/// Similarity strategy tuning
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationSettings {
    pub max_co_buyers: usize,
    pub max_co_purchases: usize,
    pub user_history_limit: usize,
    pub price_band: f64,
    pub behavioral_boost: f64,
    pub vendor_score: f64,
    pub cache_ttl: Duration,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            max_co_buyers: 100,
            max_co_purchases: 500,
            user_history_limit: 20,
            price_band: 50.0,
            behavioral_boost: 1.2,
            vendor_score: 0.4,
            cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[cfg(feature = "config")]
mod from_env {
    use super::*;
    use crate::elasticsearch::ElasticsearchSettings;
    use core_config::elasticsearch::ElasticsearchConfig;
    use core_config::{env_parse, ConfigError, FromEnv};

    impl From<ElasticsearchConfig> for ElasticsearchSettings {
        fn from(config: ElasticsearchConfig) -> Self {
            Self {
                url: config.url,
                index: config.index,
                username: config.username,
                password: config.password,
                timeout: config.timeout,
            }
        }
    }

    impl FromEnv for SearchSettings {
        fn from_env() -> Result<Self, ConfigError> {
            let defaults = Self::default();
            Ok(Self {
                cache_ttl: Duration::from_secs(env_parse(
                    "SEARCH_CACHE_TTL_SECS",
                    defaults.cache_ttl.as_secs(),
                )?),
                autocomplete_cache_ttl: Duration::from_secs(env_parse(
                    "AUTOCOMPLETE_CACHE_TTL_SECS",
                    defaults.autocomplete_cache_ttl.as_secs(),
                )?),
                max_page_size: env_parse("SEARCH_MAX_PAGE_SIZE", defaults.max_page_size)?,
                subcall_timeout: Duration::from_millis(env_parse(
                    "SEARCH_SUBCALL_TIMEOUT_MS",
                    defaults.subcall_timeout.as_millis() as u64,
                )?),
            })
        }
    }

    impl FromEnv for RecommendationSettings {
        fn from_env() -> Result<Self, ConfigError> {
            let defaults = Self::default();
            Ok(Self {
                max_co_buyers: env_parse("RECO_MAX_CO_BUYERS", defaults.max_co_buyers)?,
                max_co_purchases: env_parse("RECO_MAX_CO_PURCHASES", defaults.max_co_purchases)?,
                user_history_limit: env_parse(
                    "RECO_USER_HISTORY_LIMIT",
                    defaults.user_history_limit,
                )?,
                price_band: env_parse("RECO_PRICE_BAND", defaults.price_band)?,
                behavioral_boost: env_parse("RECO_BEHAVIORAL_BOOST", defaults.behavioral_boost)?,
                vendor_score: env_parse("RECO_VENDOR_SCORE", defaults.vendor_score)?,
                cache_ttl: Duration::from_secs(env_parse(
                    "RECO_CACHE_TTL_SECS",
                    defaults.cache_ttl.as_secs(),
                )?),
            })
        }
    }

}

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::cache::{Cache, read_json, write_json};
use crate::error::{CatalogResult, with_timeout};
use crate::index::SearchIndex;
use crate::query::{Clause, Field, NativeQuery, SearchQuery};

pub const MIN_PREFIX_CHARS: usize = 2;
pub const MAX_FALLBACK_SUGGESTIONS: usize = 5;

/// Popular terms served when the index cannot answer
const FALLBACK_VOCABULARY: &[&str] = &[
    "laptop",
    "headphones",
    "smartphone",
    "sneakers",
    "running shoes",
    "t-shirt",
    "jeans",
    "dress",
    "jacket",
    "watch",
    "backpack",
    "sunglasses",
    "coffee maker",
    "blender",
    "yoga mat",
    "water bottle",
    "desk lamp",
    "gaming mouse",
    "keyboard",
    "phone case",
];

pub fn cache_key(prefix: &str, limit: usize) -> String {
    format!("autocomplete:{}:{}", prefix.to_lowercase(), limit)
}

/// Prefix suggestions over product, category and vendor names
#[derive(Clone)]
pub struct AutocompleteEngine {
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn Cache>,
    ttl: Duration,
    timeout: Duration,
}

impl AutocompleteEngine {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn Cache>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            cache,
            ttl,
            timeout,
        }
    }

    /// Never fails: index errors degrade to the static vocabulary
    #[instrument(skip(self))]
    pub async fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.trim();
        if prefix.chars().count() < MIN_PREFIX_CHARS || limit == 0 {
            return Vec::new();
        }

        let key = cache_key(prefix, limit);
        let cached = read_json::<Vec<String>, _>(self.cache.as_ref(), &key, self.timeout).await;
        if let Some(cached) = cached {
            return cached;
        }

        match with_timeout(self.timeout, self.lookup(prefix, limit)).await {
            Ok(suggestions) => {
                write_json(self.cache.as_ref(), &key, &suggestions, self.ttl, self.timeout).await;
                suggestions
            }
            Err(e) => {
                tracing::warn!(error = %e, "Autocomplete lookup failed, using fallback vocabulary");
                fallback(prefix, limit)
            }
        }
    }

    async fn lookup(&self, prefix: &str, limit: usize) -> CatalogResult<Vec<String>> {
        let mut query = NativeQuery::default();
        for field in [
            Field::NameAutocomplete,
            Field::CategoryNameAutocomplete,
            Field::VendorNameAutocomplete,
        ] {
            query = query.with_should(
                Clause::PhrasePrefix {
                    field,
                    prefix: prefix.to_string(),
                },
                1.0,
            );
        }
        query.minimum_should_match = Some(1);

        let hits = self
            .index
            .search(&SearchQuery::new(query.only_active(), limit))
            .await?;

        let needle = prefix.to_lowercase();
        let names = hits.hits.iter().map(|h| h.product.name.as_str());
        let categories = hits
            .hits
            .iter()
            .map(|h| h.product.category_name.as_str())
            .filter(|name| has_word_prefix(name, &needle));
        let vendors = hits
            .hits
            .iter()
            .map(|h| h.product.vendor_name.as_str())
            .filter(|name| has_word_prefix(name, &needle));

        let mut suggestions: Vec<String> = Vec::with_capacity(limit);
        for candidate in names.chain(categories).chain(vendors) {
            if suggestions.len() == limit {
                break;
            }
            if !candidate.is_empty() && !suggestions.iter().any(|s| s == candidate) {
                suggestions.push(candidate.to_string());
            }
        }
        Ok(suggestions)
    }
}

fn has_word_prefix(text: &str, needle: &str) -> bool {
    let text = text.to_lowercase();
    text.starts_with(needle) || text.contains(&format!(" {}", needle))
}

fn fallback(prefix: &str, limit: usize) -> Vec<String> {
    let needle = prefix.to_lowercase();
    FALLBACK_VOCABULARY
        .iter()
        .filter(|term| term.contains(needle.as_str()))
        .take(limit.min(MAX_FALLBACK_SUGGESTIONS))
        .map(|term| term.to_string())
        .collect()
}

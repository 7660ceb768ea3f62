use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;

use crate::autocomplete::AutocompleteEngine;
use crate::cache::{Cache, read_json, write_json};
use crate::config::{RecommendationSettings, SearchSettings};
use crate::error::{CatalogResult, with_timeout};
use crate::facets::FacetAggregator;
use crate::index::SearchIndex;
use crate::merger::RecommendationMerger;
use crate::models::{
    FacetSet, Pagination, ProductDocument, ProductId, RecommendationResult, SearchRequest,
    SearchResult, UserId,
};
use crate::query::{Field, NativeQuery, QueryBuilder, SearchQuery, SortClause};
use crate::repository::{CatalogRepository, OrderHistoryRepository};
use crate::similarity::SimilarityEngine;

pub const SEARCH_PREFIX: &str = "search:";
pub const AUTOCOMPLETE_PREFIX: &str = "autocomplete:";
pub const RELATED_PREFIX: &str = "related:";
pub const TRENDING_PREFIX: &str = "trending:";

/// Cache key for a search request: digest of its canonical JSON form
pub fn search_cache_key(request: &SearchRequest) -> CatalogResult<String> {
    let canonical = serde_json::to_vec(&request.canonical())?;
    let digest = Sha256::digest(&canonical);
    Ok(format!("{}{:x}", SEARCH_PREFIX, digest))
}

pub fn related_cache_key(product_id: ProductId, limit: usize) -> String {
    format!("{}{}:{}", RELATED_PREFIX, product_id, limit)
}

pub fn trending_cache_key(limit: usize) -> String {
    format!("{}{}", TRENDING_PREFIX, limit)
}

/// Search and recommendation entry point.
///
/// Owns the cache discipline: search, suggestions, anonymous related products
/// and trending lists are served from cache when possible. Only primary
/// search surfaces index failures; every other operation degrades.
#[derive(Clone)]
pub struct CatalogSearchService {
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn Cache>,
    facets: FacetAggregator,
    autocomplete: AutocompleteEngine,
    similarity: SimilarityEngine,
    merger: RecommendationMerger,
    search_settings: SearchSettings,
    recommendation_settings: RecommendationSettings,
}

impl CatalogSearchService {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn Cache>,
        orders: Arc<dyn OrderHistoryRepository>,
        catalog: Arc<dyn CatalogRepository>,
    ) -> Self {
        Self::with_settings(
            index,
            cache,
            orders,
            catalog,
            SearchSettings::default(),
            RecommendationSettings::default(),
        )
    }

    pub fn with_settings(
        index: Arc<dyn SearchIndex>,
        cache: Arc<dyn Cache>,
        orders: Arc<dyn OrderHistoryRepository>,
        catalog: Arc<dyn CatalogRepository>,
        search_settings: SearchSettings,
        recommendation_settings: RecommendationSettings,
    ) -> Self {
        let timeout = search_settings.subcall_timeout;
        Self {
            facets: FacetAggregator::new(index.clone(), timeout),
            autocomplete: AutocompleteEngine::new(
                index.clone(),
                cache.clone(),
                search_settings.autocomplete_cache_ttl,
                timeout,
            ),
            similarity: SimilarityEngine::new(
                index.clone(),
                orders,
                recommendation_settings.clone(),
                timeout,
            ),
            merger: RecommendationMerger::new(catalog),
            index,
            cache,
            search_settings,
            recommendation_settings,
        }
    }

    pub fn search_settings(&self) -> &SearchSettings {
        &self.search_settings
    }

    /// Cache-checked full-text search with optional facets
    #[instrument(skip(self, request), fields(query = %request.query, page = request.page))]
    pub async fn search(&self, request: &SearchRequest) -> CatalogResult<SearchResult> {
        request.validate(self.search_settings.max_page_size)?;

        let deadline = self.search_settings.subcall_timeout;
        let key = search_cache_key(request)?;
        if let Some(cached) = read_json::<SearchResult, _>(self.cache.as_ref(), &key, deadline).await
        {
            return Ok(cached);
        }

        let query = QueryBuilder::search_query(request);
        let documents = with_timeout(deadline, self.index.search(&query));

        let (hits, facets, degraded) = if request.include_facets {
            let facets = self.facets.try_facets(&request.query, &request.filters);
            match tokio::join!(documents, facets) {
                (hits, Ok(facets)) => (hits, Some(facets), false),
                (hits, Err(e)) => {
                    tracing::warn!(error = %e, "Facet aggregation failed, returning empty facets");
                    (hits, Some(FacetSet::default()), true)
                }
            }
        } else {
            (documents.await, None, false)
        };

        let hits = hits.inspect_err(|e| tracing::error!(error = %e, "Primary search failed"))?;

        let result = SearchResult {
            pagination: Pagination::new(request.page, request.page_size, hits.total),
            total: hits.total,
            products: hits.hits,
            facets,
        };

        tracing::debug!(total = result.total, cache_key = %key, degraded, "Search completed");
        if !degraded {
            write_json(
                self.cache.as_ref(),
                &key,
                &result,
                self.search_settings.cache_ttl,
                deadline,
            )
            .await;
        }
        Ok(result)
    }

    /// Prefix suggestions; never fails
    #[instrument(skip(self))]
    pub async fn suggest(&self, prefix: &str, limit: usize) -> Vec<String> {
        self.autocomplete.suggest(prefix, limit).await
    }

    /// Related products for a source product, optionally personalised.
    ///
    /// A missing or inactive source yields an empty list. Anonymous results
    /// are cached unless a strategy failed; personalised ones never are.
    #[instrument(skip(self))]
    pub async fn related_products(
        &self,
        product_id: ProductId,
        user_id: Option<UserId>,
        limit: usize,
    ) -> Vec<RecommendationResult> {
        if limit == 0 {
            return Vec::new();
        }

        let deadline = self.search_settings.subcall_timeout;
        let key = related_cache_key(product_id, limit);
        if user_id.is_none() {
            if let Some(cached) =
                read_json::<Vec<RecommendationResult>, _>(self.cache.as_ref(), &key, deadline).await
            {
                return cached;
            }
        }

        let Some(source) = self.active_source(product_id).await else {
            return Vec::new();
        };

        let candidates = self.similarity.candidates(&source, user_id, limit).await;
        let degraded = candidates.is_degraded();
        let hydrated = with_timeout(deadline, self.merger.merge(candidates.lists, limit)).await;
        let results = match hydrated {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to hydrate recommendations");
                return Vec::new();
            }
        };

        if user_id.is_none() && !degraded {
            write_json(
                self.cache.as_ref(),
                &key,
                &results,
                self.recommendation_settings.cache_ttl,
                deadline,
            )
            .await;
        }
        results
    }

    async fn active_source(&self, product_id: ProductId) -> Option<ProductDocument> {
        let lookup = with_timeout(
            self.search_settings.subcall_timeout,
            self.index.get(product_id),
        )
        .await;

        match lookup {
            Ok(Some(source)) if source.is_active() => Some(source),
            Ok(Some(_)) => {
                tracing::debug!(product_id, "Source product is not active");
                None
            }
            Ok(None) => {
                tracing::debug!(product_id, "Source product not found");
                None
            }
            Err(e) => {
                tracing::warn!(product_id, error = %e, "Failed to load source product");
                None
            }
        }
    }

    /// Most wished-for and best-selling active products
    #[instrument(skip(self))]
    pub async fn trending(&self, limit: usize) -> Vec<ProductDocument> {
        if limit == 0 {
            return Vec::new();
        }

        let deadline = self.search_settings.subcall_timeout;
        let key = trending_cache_key(limit);
        let cached = read_json::<Vec<ProductDocument>, _>(self.cache.as_ref(), &key, deadline).await;
        if let Some(cached) = cached {
            return cached;
        }

        let query = SearchQuery::new(NativeQuery::default().only_active(), limit).sorted_by(vec![
            SortClause::desc(Field::TotalWishlisted),
            SortClause::desc(Field::TotalSold),
            SortClause::desc(Field::AverageRating),
        ]);

        match with_timeout(deadline, self.index.search(&query)).await {
            Ok(hits) => {
                let products: Vec<ProductDocument> =
                    hits.hits.into_iter().map(|hit| hit.product).collect();
                write_json(
                    self.cache.as_ref(),
                    &key,
                    &products,
                    self.recommendation_settings.cache_ttl,
                    deadline,
                )
                .await;
                products
            }
            Err(e) => {
                tracing::warn!(error = %e, "Trending lookup failed");
                Vec::new()
            }
        }
    }

    /// Drop cached searches, suggestions and trending lists after the index changes
    #[instrument(skip(self))]
    pub async fn invalidate_search_cache(&self) -> CatalogResult<u64> {
        let mut deleted = 0;
        for prefix in [SEARCH_PREFIX, AUTOCOMPLETE_PREFIX, TRENDING_PREFIX] {
            deleted += self.cache.delete_by_prefix(prefix).await?;
        }
        tracing::info!(deleted, "Search cache invalidated");
        Ok(deleted)
    }

    /// Drop cached related-product lists for one product
    #[instrument(skip(self))]
    pub async fn invalidate_product(&self, product_id: ProductId) -> CatalogResult<u64> {
        let deleted = self
            .cache
            .delete_by_prefix(&format!("{}{}:", RELATED_PREFIX, product_id))
            .await?;
        tracing::debug!(product_id, deleted, "Related products cache invalidated");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{InMemoryCache, MockCache};
    use crate::error::CatalogError;
    use crate::index::{MockSearchIndex, SearchHits};
    use crate::models::{ProductStatus, ScoredProduct, SearchFilters, SortBy};
    use crate::repository::{MockCatalogRepository, MockOrderHistoryRepository};
    use chrono::Utc;

    fn doc(id: ProductId) -> ProductDocument {
        ProductDocument {
            id,
            vendor_id: 1,
            category_id: 1,
            name: format!("Product {}", id),
            description: String::new(),
            short_description: None,
            sku: format!("SKU-{}", id),
            price: 10.0,
            compare_at_price: None,
            stock_quantity: 1,
            status: ProductStatus::Active,
            is_featured: false,
            tags: vec![],
            images: vec![],
            category_name: String::new(),
            vendor_name: String::new(),
            average_rating: 0.0,
            total_reviews: 0,
            total_wishlisted: 0,
            total_sold: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn service(index: MockSearchIndex, cache: Arc<dyn Cache>) -> CatalogSearchService {
        CatalogSearchService::new(
            Arc::new(index),
            cache,
            Arc::new(MockOrderHistoryRepository::new()),
            Arc::new(MockCatalogRepository::new()),
        )
    }

    #[test]
    fn test_search_cache_key_is_canonical() {
        let a = SearchRequest {
            query: " shoes ".into(),
            filters: SearchFilters {
                category_ids: vec![2, 1],
                ..Default::default()
            },
            ..Default::default()
        };
        let b = SearchRequest {
            query: "shoes".into(),
            filters: SearchFilters {
                category_ids: vec![1, 2],
                ..Default::default()
            },
            ..Default::default()
        };
        let c = SearchRequest {
            sort: SortBy::PriceAsc,
            ..b.clone()
        };

        let key = search_cache_key(&a).unwrap();
        assert!(key.starts_with(SEARCH_PREFIX));
        assert_eq!(key.len(), SEARCH_PREFIX.len() + 64);
        assert_eq!(key, search_cache_key(&b).unwrap());
        assert_ne!(key, search_cache_key(&c).unwrap());
    }

    #[tokio::test]
    async fn test_cache_hit_makes_no_index_calls() {
        let mut index = MockSearchIndex::new();
        index.expect_search().times(1).returning(|_| {
            Ok(SearchHits {
                total: 1,
                hits: vec![ScoredProduct {
                    product: doc(1),
                    score: 1.0,
                }],
            })
        });
        index.expect_aggregate().never();

        let service = service(index, Arc::new(InMemoryCache::new()));
        let request = SearchRequest::new("shoes");

        let first = service.search(&request).await.unwrap();
        let second = service.search(&request).await.unwrap();
        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_index_outage_surfaces_from_search() {
        let mut index = MockSearchIndex::new();
        index
            .expect_search()
            .returning(|_| Err(CatalogError::Index("connection refused".into())));

        let service = service(index, Arc::new(InMemoryCache::new()));
        let err = service.search(&SearchRequest::new("shoes")).await.unwrap_err();
        assert!(matches!(err, CatalogError::Index(_)));
    }

    #[tokio::test]
    async fn test_invalid_request_is_rejected_before_io() {
        let mut index = MockSearchIndex::new();
        index.expect_search().never();
        let mut cache = MockCache::new();
        cache.expect_get().never();

        let service = service(index, Arc::new(cache));
        let request = SearchRequest {
            page: 0,
            ..Default::default()
        };
        let err = service.search(&request).await.unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unavailable_cache_is_bypassed() {
        let mut index = MockSearchIndex::new();
        index
            .expect_search()
            .times(2)
            .returning(|_| Ok(SearchHits::default()));

        let mut cache = MockCache::new();
        cache
            .expect_get()
            .returning(|_| Err(CatalogError::Cache("connection refused".into())));
        cache
            .expect_set()
            .returning(|_, _, _| Err(CatalogError::Cache("connection refused".into())));

        let service = service(index, Arc::new(cache));
        let request = SearchRequest::new("shoes");
        assert_eq!(service.search(&request).await.unwrap().total, 0);
        assert_eq!(service.search(&request).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_related_products_for_missing_source_is_empty() {
        let mut index = MockSearchIndex::new();
        index.expect_get().returning(|_| Ok(None));
        index.expect_search().never();

        let service = service(index, Arc::new(InMemoryCache::new()));
        assert!(service.related_products(42, None, 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_related_products_for_inactive_source_is_empty() {
        let mut index = MockSearchIndex::new();
        index.expect_get().returning(|id| {
            let mut product = doc(id);
            product.status = ProductStatus::Archived;
            Ok(Some(product))
        });
        index.expect_search().never();

        let service = service(index, Arc::new(InMemoryCache::new()));
        assert!(service.related_products(42, Some(1), 10).await.is_empty());
    }

    /// Catalog whose batch lookup never completes in time
    struct StalledCatalog;

    #[async_trait::async_trait]
    impl CatalogRepository for StalledCatalog {
        async fn find_active_by_ids(&self, _ids: &[ProductId]) -> CatalogResult<Vec<ProductDocument>> {
            tokio::time::sleep(std::time::Duration::from_secs(10)).await;
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_stalled_hydration_yields_empty_within_deadline() {
        let mut index = MockSearchIndex::new();
        index.expect_get().returning(|id| Ok(Some(doc(id))));
        index.expect_search().returning(|_| {
            Ok(SearchHits {
                total: 1,
                hits: vec![ScoredProduct {
                    product: doc(2),
                    score: 1.0,
                }],
            })
        });
        let mut orders = MockOrderHistoryRepository::new();
        orders.expect_buyers_of().returning(|_, _, _| Ok(vec![]));

        let cache = InMemoryCache::new();
        let service = CatalogSearchService::with_settings(
            Arc::new(index),
            Arc::new(cache.clone()),
            Arc::new(orders),
            Arc::new(StalledCatalog),
            SearchSettings {
                subcall_timeout: std::time::Duration::from_millis(100),
                ..Default::default()
            },
            RecommendationSettings::default(),
        );

        let started = std::time::Instant::now();
        assert!(service.related_products(1, None, 5).await.is_empty());
        assert!(started.elapsed() < std::time::Duration::from_secs(3));
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_search_cache_clears_prefixes() {
        let cache = InMemoryCache::new();
        cache.set("search:abc", vec![1], 60).await.unwrap();
        cache.set("autocomplete:sh:10", vec![1], 60).await.unwrap();
        cache.set("related:1:10", vec![1], 60).await.unwrap();

        let service = service(MockSearchIndex::new(), Arc::new(cache.clone()));
        assert_eq!(service.invalidate_search_cache().await.unwrap(), 2);
        assert_eq!(cache.len().await, 1);

        assert_eq!(service.invalidate_product(1).await.unwrap(), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_invalidate_product_is_exact_on_id() {
        let cache = InMemoryCache::new();
        cache.set("related:1:10", vec![1], 60).await.unwrap();
        cache.set("related:12:10", vec![1], 60).await.unwrap();

        let service = service(MockSearchIndex::new(), Arc::new(cache.clone()));
        assert_eq!(service.invalidate_product(1).await.unwrap(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_trending_is_cached() {
        let mut index = MockSearchIndex::new();
        index.expect_search().times(1).returning(|query| {
            assert_eq!(query.sort[0], SortClause::desc(Field::TotalWishlisted));
            Ok(SearchHits {
                total: 1,
                hits: vec![ScoredProduct {
                    product: doc(5),
                    score: 0.0,
                }],
            })
        });

        let service = service(index, Arc::new(InMemoryCache::new()));
        assert_eq!(service.trending(5).await[0].id, 5);
        assert_eq!(service.trending(5).await[0].id, 5);
    }
}

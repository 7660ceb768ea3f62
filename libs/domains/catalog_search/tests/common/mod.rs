//! Shared fixtures for catalog search integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use domain_catalog_search::index::{AggregationResults, SearchHits};
use domain_catalog_search::query::{AggregationRequest, SearchQuery};
use domain_catalog_search::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn product(id: ProductId, vendor_id: i64, category_id: i64, name: &str, price: f64) -> ProductDocument {
    let created = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    ProductDocument {
        id,
        vendor_id,
        category_id,
        name: name.to_string(),
        description: String::new(),
        short_description: None,
        sku: format!("SKU-{:04}", id),
        price,
        compare_at_price: None,
        stock_quantity: 10,
        status: ProductStatus::Active,
        is_featured: false,
        tags: vec![],
        images: vec![format!("https://cdn.example.com/p/{}.jpg", id)],
        category_name: String::new(),
        vendor_name: String::new(),
        average_rating: 4.0,
        total_reviews: 0,
        total_wishlisted: 0,
        total_sold: 0,
        created_at: created,
        updated_at: created,
    }
}

pub fn with_status(mut doc: ProductDocument, status: ProductStatus) -> ProductDocument {
    doc.status = status;
    doc
}

pub fn purchase(order_id: i64, user_id: UserId, product_id: ProductId) -> OrderLine {
    OrderLine {
        order_id,
        user_id,
        product_id,
        vendor_id: 0,
        category_id: 0,
        price: 25.0,
        quantity: 1,
        status: OrderStatus::Delivered,
        ordered_at: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(order_id),
    }
}

/// A small storefront spanning statuses, vendors and price buckets
pub fn storefront() -> Vec<ProductDocument> {
    let mut red = product(1, 10, 1, "Red Sneakers", 60.0);
    red.category_name = "Shoes".into();
    red.vendor_name = "Stride Co".into();
    red.tags = vec!["running".into(), "summer".into()];
    red.average_rating = 4.6;

    let mut blue = product(2, 10, 1, "Blue Sneakers", 45.0);
    blue.category_name = "Shoes".into();
    blue.vendor_name = "Stride Co".into();
    blue.tags = vec!["running".into()];
    blue.average_rating = 4.2;

    let mut boots = product(3, 11, 1, "Leather Boots", 189.0);
    boots.category_name = "Shoes".into();
    boots.vendor_name = "Oak and Hide".into();
    boots.tags = vec!["winter".into()];
    boots.average_rating = 4.8;

    let mut tee = product(4, 12, 2, "Cotton Tee", 19.0);
    tee.category_name = "Apparel".into();
    tee.vendor_name = "Basics".into();
    tee.tags = vec!["summer".into()];
    tee.average_rating = 3.2;

    let mut socks = product(5, 13, 3, "Running Socks", 12.0);
    socks.category_name = "Accessories".into();
    socks.vendor_name = "FootFirst".into();
    socks.stock_quantity = 0;

    let archived = with_status(product(6, 10, 1, "Retro Sneakers", 30.0), ProductStatus::Archived);
    let draft = with_status(product(7, 10, 1, "Prototype Sneakers", 300.0), ProductStatus::Draft);

    vec![red, blue, boots, tee, socks, archived, draft]
}

pub fn service_over(
    index: Arc<dyn SearchIndex>,
    orders: InMemoryOrderHistory,
) -> (CatalogSearchService, InMemoryCache) {
    let cache = InMemoryCache::new();
    let service = CatalogSearchService::new(
        index.clone(),
        Arc::new(cache.clone()),
        Arc::new(orders),
        Arc::new(IndexCatalog::new(index)),
    );
    (service, cache)
}

/// Service over arbitrary adapters with a short sub-call deadline
pub fn service_with(
    index: Arc<dyn SearchIndex>,
    cache: Arc<dyn Cache>,
    orders: Arc<dyn OrderHistoryRepository>,
    subcall_timeout: Duration,
) -> CatalogSearchService {
    CatalogSearchService::with_settings(
        index.clone(),
        cache,
        orders,
        Arc::new(IndexCatalog::new(index)),
        SearchSettings {
            subcall_timeout,
            ..Default::default()
        },
        RecommendationSettings::default(),
    )
}

/// Delegates to an inner index and counts every call
pub struct CountingIndex {
    pub inner: InMemorySearchIndex,
    pub calls: AtomicUsize,
}

impl CountingIndex {
    pub fn new(inner: InMemorySearchIndex) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchIndex for CountingIndex {
    async fn search(&self, query: &SearchQuery) -> CatalogResult<SearchHits> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.search(query).await
    }

    async fn aggregate(&self, request: &AggregationRequest) -> CatalogResult<AggregationResults> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.aggregate(request).await
    }

    async fn get(&self, id: ProductId) -> CatalogResult<Option<ProductDocument>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }
}

/// Serves documents but fails every aggregation
pub struct BrokenAggregations(pub InMemorySearchIndex);

#[async_trait]
impl SearchIndex for BrokenAggregations {
    async fn search(&self, query: &SearchQuery) -> CatalogResult<SearchHits> {
        self.0.search(query).await
    }

    async fn aggregate(&self, _request: &AggregationRequest) -> CatalogResult<AggregationResults> {
        Err(CatalogError::Index("aggregation shard failure".into()))
    }

    async fn get(&self, id: ProductId) -> CatalogResult<Option<ProductDocument>> {
        self.0.get(id).await
    }
}

/// Every call fails
pub struct UnreachableIndex;

#[async_trait]
impl SearchIndex for UnreachableIndex {
    async fn search(&self, _query: &SearchQuery) -> CatalogResult<SearchHits> {
        Err(CatalogError::Index("connection refused".into()))
    }

    async fn aggregate(&self, _request: &AggregationRequest) -> CatalogResult<AggregationResults> {
        Err(CatalogError::Index("connection refused".into()))
    }

    async fn get(&self, _id: ProductId) -> CatalogResult<Option<ProductDocument>> {
        Err(CatalogError::Index("connection refused".into()))
    }
}

/// Delays searches and aggregations before delegating
pub struct SlowIndex {
    pub inner: InMemorySearchIndex,
    pub search_delay: Duration,
    pub aggregate_delay: Duration,
}

#[async_trait]
impl SearchIndex for SlowIndex {
    async fn search(&self, query: &SearchQuery) -> CatalogResult<SearchHits> {
        tokio::time::sleep(self.search_delay).await;
        self.inner.search(query).await
    }

    async fn aggregate(&self, request: &AggregationRequest) -> CatalogResult<AggregationResults> {
        tokio::time::sleep(self.aggregate_delay).await;
        self.inner.aggregate(request).await
    }

    async fn get(&self, id: ProductId) -> CatalogResult<Option<ProductDocument>> {
        self.inner.get(id).await
    }
}

/// Order history whose co-buyer lookup stalls
pub struct StalledBuyers(pub InMemoryOrderHistory);

#[async_trait]
impl OrderHistoryRepository for StalledBuyers {
    async fn recent_purchases(&self, user_id: UserId, limit: usize) -> CatalogResult<Vec<OrderLine>> {
        self.0.recent_purchases(user_id, limit).await
    }

    async fn buyers_of(
        &self,
        _product_id: ProductId,
        _exclude_user: Option<UserId>,
        _limit: usize,
    ) -> CatalogResult<Vec<UserId>> {
        std::future::pending().await
    }

    async fn purchases_by_users(
        &self,
        user_ids: &[UserId],
        exclude_product: ProductId,
        limit: usize,
    ) -> CatalogResult<Vec<OrderLine>> {
        self.0.purchases_by_users(user_ids, exclude_product, limit).await
    }
}

/// Accepts connections but never answers
pub struct HungCache;

#[async_trait]
impl Cache for HungCache {
    async fn get(&self, _key: &str) -> CatalogResult<Option<Vec<u8>>> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl_seconds: u64) -> CatalogResult<()> {
        std::future::pending().await
    }

    async fn delete(&self, _key: &str) -> CatalogResult<()> {
        std::future::pending().await
    }

    async fn delete_by_prefix(&self, _prefix: &str) -> CatalogResult<u64> {
        std::future::pending().await
    }
}

//! Catalog Search Domain
//!
//! Product search, faceting, autocomplete and related-product recommendations
//! over an external search index, with Redis in front of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐
//! │  Handlers   │  ← HTTP endpoints
//! └──────┬──────┘
//!        │
//! ┌──────▼──────┐
//! │   Service   │  ← Cache discipline, orchestration
//! └──────┬──────┘
//!        │
//! ┌──────▼───────────────────────────────────┐
//! │ Facets · Autocomplete · Similarity/Merge │
//! └──────┬───────────────────────────────────┘
//!        │
//! ┌──────▼──────┐
//! │    Ports    │  ← SearchIndex, Cache, OrderHistory, Catalog
//! └──────┬──────┘
//!        │
//! ┌──────▼──────────────────────────────────┐
//! │ Elasticsearch · Redis · Postgres · Mem  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use domain_catalog_search::{
//!     cache::RedisCache,
//!     elasticsearch::{ElasticsearchIndex, ElasticsearchSettings},
//!     handlers,
//!     postgres::PgOrderHistory,
//!     repository::IndexCatalog,
//!     service::CatalogSearchService,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Arc::new(ElasticsearchIndex::new(ElasticsearchSettings::default())?);
//! let cache = Arc::new(RedisCache::connect("redis://localhost:6379").await?);
//! let db = sea_orm::Database::connect("postgres://localhost/orders").await?;
//!
//! let service = CatalogSearchService::new(
//!     index.clone(),
//!     cache,
//!     Arc::new(PgOrderHistory::new(db)),
//!     Arc::new(IndexCatalog::new(index)),
//! );
//!
//! let router = handlers::router(service);
//! # Ok(())
//! # }
//! ```

pub mod autocomplete;
pub mod cache;
pub mod config;
pub mod elasticsearch;
pub mod error;
pub mod facets;
pub mod handlers;
pub mod index;
pub mod memory;
pub mod merger;
pub mod models;
pub mod postgres;
pub mod query;
pub mod repository;
pub mod service;
pub mod similarity;

// Re-export commonly used types
pub use cache::{Cache, InMemoryCache, RedisCache};
pub use config::{RecommendationSettings, SearchSettings};
pub use error::{CatalogError, CatalogResult};
pub use handlers::ApiDoc;
pub use index::SearchIndex;
pub use memory::InMemorySearchIndex;
pub use models::{
    FacetBucket, FacetSet, OrderLine, OrderStatus, Pagination, ProductDocument, ProductId,
    ProductStatus, RecommendationResult, ScoredProduct, SearchFilters, SearchRequest,
    SearchResult, SimilarityCandidate, SortBy, Strategy, UserId,
};
pub use repository::{CatalogRepository, InMemoryOrderHistory, IndexCatalog, OrderHistoryRepository};
pub use service::CatalogSearchService;

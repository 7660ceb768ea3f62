use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::CatalogResult;
use crate::models::{FacetBucket, ProductDocument, ProductId, ScoredProduct};
use crate::query::{AggregationRequest, SearchQuery};

/// One page of matched documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHits {
    pub total: u64,
    pub hits: Vec<ScoredProduct>,
}

/// Buckets keyed by aggregation name
pub type AggregationResults = BTreeMap<String, Vec<FacetBucket>>;

/// Read-only port onto the external product search index.
///
/// The index is owned by the indexing pipeline; implementations never write to it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Run a document query
    async fn search(&self, query: &SearchQuery) -> CatalogResult<SearchHits>;

    /// Run a bucket-only aggregation query
    async fn aggregate(&self, request: &AggregationRequest) -> CatalogResult<AggregationResults>;

    /// Fetch a single document by id regardless of status
    async fn get(&self, id: ProductId) -> CatalogResult<Option<ProductDocument>>;
}

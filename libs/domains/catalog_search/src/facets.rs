use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::error::{CatalogResult, with_timeout};
use crate::index::{AggregationResults, SearchIndex};
use crate::models::{FacetSet, SearchFilters};
use crate::query::{Aggregation, AggregationKind, AggregationRequest, Field, QueryBuilder, RangeBucket};

const CATEGORIES: &str = "categories";
const VENDORS: &str = "vendors";
const PRICE_RANGES: &str = "price_ranges";
const RATING_RANGES: &str = "rating_ranges";
const TAGS: &str = "tags";

pub const PRICE_BUCKETS: [RangeBucket; 5] = [
    RangeBucket::new("0-50", None, Some(50.0)),
    RangeBucket::new("50-100", Some(50.0), Some(100.0)),
    RangeBucket::new("100-200", Some(100.0), Some(200.0)),
    RangeBucket::new("200-500", Some(200.0), Some(500.0)),
    RangeBucket::new("500+", Some(500.0), None),
];

pub const RATING_BUCKETS: [RangeBucket; 5] = [
    RangeBucket::new("0-3", None, Some(3.0)),
    RangeBucket::new("3-3.5", Some(3.0), Some(3.5)),
    RangeBucket::new("3.5-4", Some(3.5), Some(4.0)),
    RangeBucket::new("4-4.5", Some(4.0), Some(4.5)),
    RangeBucket::new("4.5+", Some(4.5), None),
];

/// Produces facet counts over the same query and filter context as a search.
///
/// Faceting is best-effort: any backend error or timeout yields an empty
/// [`FacetSet`] instead of failing the search it decorates.
#[derive(Clone)]
pub struct FacetAggregator {
    index: Arc<dyn SearchIndex>,
    timeout: Duration,
}

impl FacetAggregator {
    pub fn new(index: Arc<dyn SearchIndex>, timeout: Duration) -> Self {
        Self { index, timeout }
    }

    pub fn aggregation_request(query: &str, filters: &SearchFilters) -> AggregationRequest {
        AggregationRequest {
            query: QueryBuilder::build(query, filters),
            aggregations: vec![
                Aggregation {
                    name: CATEGORIES,
                    kind: AggregationKind::Terms {
                        field: Field::CategoryId,
                        size: 50,
                    },
                },
                Aggregation {
                    name: VENDORS,
                    kind: AggregationKind::Terms {
                        field: Field::VendorId,
                        size: 50,
                    },
                },
                Aggregation {
                    name: PRICE_RANGES,
                    kind: AggregationKind::Range {
                        field: Field::Price,
                        ranges: PRICE_BUCKETS.to_vec(),
                    },
                },
                Aggregation {
                    name: RATING_RANGES,
                    kind: AggregationKind::Range {
                        field: Field::AverageRating,
                        ranges: RATING_BUCKETS.to_vec(),
                    },
                },
                Aggregation {
                    name: TAGS,
                    kind: AggregationKind::Terms {
                        field: Field::Tags,
                        size: 20,
                    },
                },
            ],
        }
    }

    #[instrument(skip(self, filters))]
    pub async fn facets(&self, query: &str, filters: &SearchFilters) -> FacetSet {
        match self.try_facets(query, filters).await {
            Ok(facets) => facets,
            Err(e) => {
                tracing::warn!(error = %e, "Facet aggregation failed, returning empty facets");
                FacetSet::default()
            }
        }
    }

    /// Like [`Self::facets`] but reports the failure so callers can tell
    /// an empty result from a degraded one
    pub async fn try_facets(&self, query: &str, filters: &SearchFilters) -> CatalogResult<FacetSet> {
        let request = Self::aggregation_request(query, filters);
        let results = with_timeout(self.timeout, self.index.aggregate(&request)).await?;
        Ok(Self::into_facet_set(results))
    }

    fn into_facet_set(mut results: AggregationResults) -> FacetSet {
        let mut take = |name: &str| results.remove(name).unwrap_or_default();
        FacetSet {
            categories: take(CATEGORIES),
            vendors: take(VENDORS),
            price_ranges: take(PRICE_RANGES),
            rating_ranges: take(RATING_RANGES),
            tags: take(TAGS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::index::MockSearchIndex;
    use crate::models::FacetBucket;

    #[test]
    fn test_request_reuses_search_filters() {
        let filters = SearchFilters {
            vendor_ids: vec![7],
            ..Default::default()
        };
        let request = FacetAggregator::aggregation_request("shoes", &filters);
        assert_eq!(request.query, QueryBuilder::build("shoes", &filters));
        assert_eq!(request.aggregations.len(), 5);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert!(PRICE_BUCKETS[0].contains(49.99));
        assert!(PRICE_BUCKETS[1].contains(50.0));
        assert!(PRICE_BUCKETS[4].contains(10_000.0));
        assert!(RATING_BUCKETS[0].contains(2.9));
        assert!(RATING_BUCKETS[4].contains(4.5));
        assert!(!RATING_BUCKETS[3].contains(4.5));
    }

    #[tokio::test]
    async fn test_buckets_are_mapped_by_name() {
        let mut index = MockSearchIndex::new();
        index.expect_aggregate().times(1).returning(|_| {
            let mut results = AggregationResults::new();
            results.insert(CATEGORIES.into(), vec![FacetBucket::new("3", 12)]);
            results.insert(TAGS.into(), vec![FacetBucket::new("summer", 4)]);
            Ok(results)
        });

        let aggregator = FacetAggregator::new(Arc::new(index), Duration::from_secs(1));
        let facets = aggregator.facets("", &SearchFilters::default()).await;

        assert_eq!(facets.categories, vec![FacetBucket::new("3", 12)]);
        assert_eq!(facets.tags, vec![FacetBucket::new("summer", 4)]);
        assert!(facets.vendors.is_empty());
    }

    #[tokio::test]
    async fn test_failure_yields_empty_facets() {
        let mut index = MockSearchIndex::new();
        index
            .expect_aggregate()
            .returning(|_| Err(CatalogError::Index("cluster red".into())));

        let aggregator = FacetAggregator::new(Arc::new(index), Duration::from_secs(1));
        let facets = aggregator.facets("shoes", &SearchFilters::default()).await;
        assert!(facets.is_empty());

        let err = aggregator
            .try_facets("shoes", &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Index(_)));
    }
}

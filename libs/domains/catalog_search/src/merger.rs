use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CatalogResult;
use crate::models::{ProductId, RecommendationResult, SimilarityCandidate};
use crate::repository::CatalogRepository;

/// Combines per-strategy candidate lists into one ranked, hydrated list
#[derive(Clone)]
pub struct RecommendationMerger {
    catalog: Arc<dyn CatalogRepository>,
}

impl RecommendationMerger {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { catalog }
    }

    /// Max-wins deduplication by product, score descending, truncated to `limit`.
    ///
    /// Ties on score resolve by ascending product id, so the output does not
    /// depend on the order of the input lists.
    pub fn rank(lists: Vec<Vec<SimilarityCandidate>>, limit: usize) -> Vec<SimilarityCandidate> {
        let mut best: HashMap<ProductId, SimilarityCandidate> = HashMap::new();

        for candidate in lists.into_iter().flatten() {
            match best.get(&candidate.product_id) {
                Some(current) if !outranks(&candidate, current) => {}
                _ => {
                    best.insert(candidate.product_id, candidate);
                }
            }
        }

        let mut ranked: Vec<SimilarityCandidate> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked.truncate(limit);
        ranked
    }

    /// Rank, then hydrate survivors in one batch fetch.
    ///
    /// Candidates the catalog no longer returns (deleted or deactivated since
    /// scoring) are dropped.
    pub async fn merge(
        &self,
        lists: Vec<Vec<SimilarityCandidate>>,
        limit: usize,
    ) -> CatalogResult<Vec<RecommendationResult>> {
        let ranked = Self::rank(lists, limit);
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<ProductId> = ranked.iter().map(|c| c.product_id).collect();
        let mut documents: HashMap<ProductId, _> = self
            .catalog
            .find_active_by_ids(&ids)
            .await?
            .into_iter()
            .map(|doc| (doc.id, doc))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|candidate| {
                documents
                    .remove(&candidate.product_id)
                    .map(|product| RecommendationResult {
                        product,
                        recommendation_reason: candidate.reason().to_string(),
                        similarity_score: candidate.score,
                    })
            })
            .collect())
    }
}

/// Whether `candidate` should replace `current` for the same product
fn outranks(candidate: &SimilarityCandidate, current: &SimilarityCandidate) -> bool {
    candidate
        .score
        .total_cmp(&current.score)
        .then_with(|| current.strategy.cmp(&candidate.strategy))
        .then_with(|| current.rank.cmp(&candidate.rank))
        .is_gt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogError;
    use crate::models::{ProductDocument, ProductStatus, Strategy};
    use crate::repository::MockCatalogRepository;
    use chrono::Utc;

    fn candidate(product_id: ProductId, score: f64, strategy: Strategy, rank: usize) -> SimilarityCandidate {
        SimilarityCandidate {
            product_id,
            score,
            strategy,
            rank,
        }
    }

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

    #[test]
    fn test_duplicate_keeps_highest_score_and_its_reason() {
        let lists = vec![
            vec![candidate(7, 0.9, Strategy::ContentBased, 0)],
            vec![candidate(7, 0.4, Strategy::SameVendor, 0)],
        ];
        let ranked = RecommendationMerger::rank(lists, 10);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[0].reason(), "similar content and description");
    }

    #[test]
    fn test_scores_are_not_summed() {
        let lists = vec![
            vec![candidate(1, 0.5, Strategy::ContentBased, 0)],
            vec![candidate(1, 0.5, Strategy::Collaborative, 0)],
            vec![candidate(2, 0.6, Strategy::SameVendor, 0)],
        ];
        let ranked = RecommendationMerger::rank(lists, 10);
        let ids: Vec<_> = ranked.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(ranked[1].score, 0.5);
    }

    #[test]
    fn test_rank_is_order_independent_and_truncated() {
        let a = vec![
            candidate(3, 0.4, Strategy::SameVendor, 0),
            candidate(1, 0.4, Strategy::SameVendor, 1),
        ];
        let b = vec![
            candidate(2, 0.8, Strategy::Collaborative, 0),
            candidate(3, 0.7, Strategy::Collaborative, 1),
        ];

        let forward = RecommendationMerger::rank(vec![a.clone(), b.clone()], 2);
        let backward = RecommendationMerger::rank(vec![b, a], 2);
        assert_eq!(forward, backward);

        let ids: Vec<_> = forward.iter().map(|c| c.product_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_merge_hydrates_in_one_batch_and_drops_missing() {
        let mut catalog = MockCatalogRepository::new();
        catalog
            .expect_find_active_by_ids()
            .times(1)
            .withf(|ids| ids == [2, 1, 3])
            .returning(|_| Ok(vec![doc(1), doc(2)]));

        let merger = RecommendationMerger::new(Arc::new(catalog));
        let results = merger
            .merge(
                vec![vec![
                    candidate(2, 0.9, Strategy::Behavioral, 0),
                    candidate(1, 0.8, Strategy::Behavioral, 1),
                    candidate(3, 0.7, Strategy::Behavioral, 2),
                ]],
                10,
            )
            .await
            .unwrap();

        let ids: Vec<_> = results.iter().map(|r| r.product.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(results[0].recommendation_reason, "based on your shopping preferences");
        assert_eq!(results[0].similarity_score, 0.9);
    }

    #[tokio::test]
    async fn test_merge_without_candidates_skips_hydration() {
        let mut catalog = MockCatalogRepository::new();
        catalog.expect_find_active_by_ids().never();

        let merger = RecommendationMerger::new(Arc::new(catalog));
        assert!(merger.merge(vec![vec![], vec![]], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_propagates_hydration_failure() {
        let mut catalog = MockCatalogRepository::new();
        catalog
            .expect_find_active_by_ids()
            .returning(|_| Err(CatalogError::Catalog("index down".into())));

        let merger = RecommendationMerger::new(Arc::new(catalog));
        let result = merger
            .merge(vec![vec![candidate(1, 0.4, Strategy::SameVendor, 0)]], 10)
            .await;
        assert!(result.is_err());
    }
}

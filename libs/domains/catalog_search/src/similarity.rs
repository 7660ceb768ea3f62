//! The four similarity strategies behind related-product recommendations.
//!
//! Each strategy produces at most `2 × limit` candidates with scores on a
//! comparable `[0, 1]`-ish scale (behavioral may exceed 1 by its boost):
//!
//! - content-based: more-like-this over text fields, normalised by the top score
//! - behavioral: the user's recent purchases steer a boosted should-query
//! - collaborative: distinct co-buyers per product divided by buyers found
//! - same vendor: best sellers of the source's vendor at a fixed score
//!
//! A strategy that errors or exceeds its deadline contributes an empty list.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::config::RecommendationSettings;
use crate::error::{CatalogResult, with_timeout};
use crate::index::{SearchHits, SearchIndex};
use crate::models::{ProductDocument, ProductId, SimilarityCandidate, Strategy, UserId};
use crate::query::{Bounds, Clause, Field, NativeQuery, SearchQuery, SortClause};
use crate::repository::OrderHistoryRepository;

/// One candidate list per strategy from a single fan-out
#[derive(Debug, Default)]
pub struct StrategyCandidates {
    pub lists: Vec<Vec<SimilarityCandidate>>,
    /// Strategies that errored or ran past the deadline
    pub failed: Vec<Strategy>,
}

impl StrategyCandidates {
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct SimilarityEngine {
    index: Arc<dyn SearchIndex>,
    orders: Arc<dyn OrderHistoryRepository>,
    settings: RecommendationSettings,
    timeout: Duration,
}

impl SimilarityEngine {
    pub fn new(
        index: Arc<dyn SearchIndex>,
        orders: Arc<dyn OrderHistoryRepository>,
        settings: RecommendationSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            orders,
            settings,
            timeout,
        }
    }

    /// Run all strategies concurrently; one list per strategy
    #[instrument(skip(self, source), fields(product_id = source.id))]
    pub async fn candidates(
        &self,
        source: &ProductDocument,
        user_id: Option<UserId>,
        limit: usize,
    ) -> StrategyCandidates {
        let per_strategy = limit.saturating_mul(2);

        let (content, behavioral, collaborative, vendor) = tokio::join!(
            self.guarded(Strategy::ContentBased, self.content_based(source, per_strategy)),
            self.guarded(
                Strategy::Behavioral,
                self.behavioral(source, user_id, per_strategy)
            ),
            self.guarded(
                Strategy::Collaborative,
                self.collaborative(source, user_id, per_strategy)
            ),
            self.guarded(Strategy::SameVendor, self.same_vendor(source, per_strategy)),
        );

        let mut outcome = StrategyCandidates::default();
        for (strategy, result) in [
            (Strategy::ContentBased, content),
            (Strategy::Behavioral, behavioral),
            (Strategy::Collaborative, collaborative),
            (Strategy::SameVendor, vendor),
        ] {
            match result {
                Some(list) => outcome.lists.push(list),
                None => {
                    outcome.failed.push(strategy);
                    outcome.lists.push(Vec::new());
                }
            }
        }
        outcome
    }

    async fn guarded<F>(&self, strategy: Strategy, call: F) -> Option<Vec<SimilarityCandidate>>
    where
        F: Future<Output = CatalogResult<Vec<SimilarityCandidate>>>,
    {
        match with_timeout(self.timeout, call).await {
            Ok(candidates) => {
                tracing::debug!(%strategy, count = candidates.len(), "Strategy finished");
                Some(candidates)
            }
            Err(e) => {
                tracing::warn!(%strategy, error = %e, "Similarity strategy failed, skipping");
                None
            }
        }
    }

    pub async fn content_based(
        &self,
        source: &ProductDocument,
        limit: usize,
    ) -> CatalogResult<Vec<SimilarityCandidate>> {
        let mut query = NativeQuery::default()
            .with_must_not(Clause::term(Field::Id, source.id))
            .only_active();
        query.must.push(Clause::MoreLikeThis {
            fields: vec![
                Field::Name,
                Field::Description,
                Field::ShortDescription,
                Field::Tags,
            ],
            like: source.id,
            min_term_freq: 1,
            min_doc_freq: 1,
        });

        let hits = self.index.search(&SearchQuery::new(query, limit)).await?;
        Ok(normalised(hits, Strategy::ContentBased, 1.0))
    }

    pub async fn behavioral(
        &self,
        source: &ProductDocument,
        user_id: Option<UserId>,
        limit: usize,
    ) -> CatalogResult<Vec<SimilarityCandidate>> {
        let Some(user_id) = user_id else {
            return Ok(Vec::new());
        };

        let history = self
            .orders
            .recent_purchases(user_id, self.settings.user_history_limit)
            .await?;
        if history.is_empty() {
            return Ok(Vec::new());
        }

        let categories: BTreeSet<_> = std::iter::once(source.category_id)
            .chain(history.iter().map(|line| line.category_id))
            .collect();
        let vendors: BTreeSet<_> = std::iter::once(source.vendor_id)
            .chain(history.iter().map(|line| line.vendor_id))
            .collect();
        let excluded: BTreeSet<ProductId> = std::iter::once(source.id)
            .chain(history.iter().map(|line| line.product_id))
            .collect();

        let band = self.settings.price_band;
        let mut query = NativeQuery::default()
            .with_should(Clause::terms(Field::CategoryId, categories), 2.0)
            .with_should(Clause::terms(Field::VendorId, vendors), 1.5)
            .with_should(
                Clause::range(
                    Field::Price,
                    Bounds::between(Some((source.price - band).max(0.0)), Some(source.price + band)),
                ),
                1.0,
            )
            .with_must_not(Clause::terms(Field::Id, excluded))
            .only_active();
        query.minimum_should_match = Some(1);

        let hits = self.index.search(&SearchQuery::new(query, limit)).await?;
        Ok(normalised(
            hits,
            Strategy::Behavioral,
            self.settings.behavioral_boost,
        ))
    }

    pub async fn collaborative(
        &self,
        source: &ProductDocument,
        user_id: Option<UserId>,
        limit: usize,
    ) -> CatalogResult<Vec<SimilarityCandidate>> {
        let buyers = self
            .orders
            .buyers_of(source.id, user_id, self.settings.max_co_buyers)
            .await?;
        if buyers.is_empty() {
            return Ok(Vec::new());
        }

        let lines = self
            .orders
            .purchases_by_users(&buyers, source.id, self.settings.max_co_purchases)
            .await?;

        let mut co_buyers: HashMap<ProductId, HashSet<UserId>> = HashMap::new();
        for line in lines.iter().filter(|line| line.product_id != source.id) {
            co_buyers
                .entry(line.product_id)
                .or_default()
                .insert(line.user_id);
        }

        let mut counts: Vec<(ProductId, usize)> = co_buyers
            .into_iter()
            .map(|(product_id, users)| (product_id, users.len()))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let buyer_count = buyers.len() as f64;
        Ok(counts
            .into_iter()
            .take(limit)
            .enumerate()
            .map(|(rank, (product_id, count))| SimilarityCandidate {
                product_id,
                score: count as f64 / buyer_count,
                strategy: Strategy::Collaborative,
                rank,
            })
            .collect())
    }

    pub async fn same_vendor(
        &self,
        source: &ProductDocument,
        limit: usize,
    ) -> CatalogResult<Vec<SimilarityCandidate>> {
        let query = NativeQuery::default()
            .with_filter(Clause::term(Field::VendorId, source.vendor_id))
            .with_must_not(Clause::term(Field::Id, source.id))
            .only_active();
        let search = SearchQuery::new(query, limit).sorted_by(vec![
            SortClause::desc(Field::TotalSold),
            SortClause::desc(Field::AverageRating),
        ]);

        let hits = self.index.search(&search).await?;
        Ok(hits
            .hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| SimilarityCandidate {
                product_id: hit.product.id,
                score: self.settings.vendor_score,
                strategy: Strategy::SameVendor,
                rank,
            })
            .collect())
    }
}

/// Divide by the top score so lists from different queries are comparable
fn normalised(hits: SearchHits, strategy: Strategy, multiplier: f64) -> Vec<SimilarityCandidate> {
    let max = hits.hits.iter().map(|h| h.score).fold(0.0, f64::max);

    hits.hits
        .into_iter()
        .enumerate()
        .map(|(rank, hit)| {
            let base = if max > 0.0 { hit.score / max } else { 0.0 };
            SimilarityCandidate {
                product_id: hit.product.id,
                score: base * multiplier,
                strategy,
                rank,
            }
        })
        .collect()
}

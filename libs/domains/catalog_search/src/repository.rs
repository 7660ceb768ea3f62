use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::CatalogResult;
use crate::index::SearchIndex;
use crate::models::{OrderLine, ProductDocument, ProductId, UserId};
use crate::query::{Clause, Field, NativeQuery, SearchQuery};

/// Read-only view of fulfilled (shipped or delivered) order lines
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderHistoryRepository: Send + Sync {
    /// The user's most recent fulfilled order lines, newest first
    async fn recent_purchases(&self, user_id: UserId, limit: usize) -> CatalogResult<Vec<OrderLine>>;

    /// Distinct users who bought the product
    async fn buyers_of(
        &self,
        product_id: ProductId,
        exclude_user: Option<UserId>,
        limit: usize,
    ) -> CatalogResult<Vec<UserId>>;

    /// Fulfilled order lines of the given users, excluding one product
    async fn purchases_by_users(
        &self,
        user_ids: &[UserId],
        exclude_product: ProductId,
        limit: usize,
    ) -> CatalogResult<Vec<OrderLine>>;
}

/// Batch hydration of product documents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Active documents among `ids`; missing or inactive ids are omitted
    async fn find_active_by_ids(&self, ids: &[ProductId]) -> CatalogResult<Vec<ProductDocument>>;
}

/// In-memory order history (development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryOrderHistory {
    lines: Arc<RwLock<Vec<OrderLine>>>,
}

impl InMemoryOrderHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(lines: impl IntoIterator<Item = OrderLine>) -> Self {
        Self {
            lines: Arc::new(RwLock::new(lines.into_iter().collect())),
        }
    }

    pub async fn record(&self, line: OrderLine) {
        self.lines.write().await.push(line);
    }

    /// Fulfilled lines, newest first
    async fn fulfilled(&self) -> Vec<OrderLine> {
        let mut lines: Vec<OrderLine> = self
            .lines
            .read()
            .await
            .iter()
            .filter(|line| line.status.is_fulfilled())
            .cloned()
            .collect();
        lines.sort_by(|a, b| {
            b.ordered_at
                .cmp(&a.ordered_at)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        lines
    }
}

#[async_trait]
impl OrderHistoryRepository for InMemoryOrderHistory {
    async fn recent_purchases(&self, user_id: UserId, limit: usize) -> CatalogResult<Vec<OrderLine>> {
        Ok(self
            .fulfilled()
            .await
            .into_iter()
            .filter(|line| line.user_id == user_id)
            .take(limit)
            .collect())
    }

    async fn buyers_of(
        &self,
        product_id: ProductId,
        exclude_user: Option<UserId>,
        limit: usize,
    ) -> CatalogResult<Vec<UserId>> {
        let mut seen = HashSet::new();
        Ok(self
            .fulfilled()
            .await
            .into_iter()
            .filter(|line| line.product_id == product_id && Some(line.user_id) != exclude_user)
            .map(|line| line.user_id)
            .filter(|user| seen.insert(*user))
            .take(limit)
            .collect())
    }

    async fn purchases_by_users(
        &self,
        user_ids: &[UserId],
        exclude_product: ProductId,
        limit: usize,
    ) -> CatalogResult<Vec<OrderLine>> {
        let users: HashSet<UserId> = user_ids.iter().copied().collect();
        Ok(self
            .fulfilled()
            .await
            .into_iter()
            .filter(|line| users.contains(&line.user_id) && line.product_id != exclude_product)
            .take(limit)
            .collect())
    }
}

/// Hydrates documents from the search index in a single query
#[derive(Clone)]
pub struct IndexCatalog {
    index: Arc<dyn SearchIndex>,
}

impl IndexCatalog {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self { index }
    }
}

#[async_trait]
impl CatalogRepository for IndexCatalog {
    async fn find_active_by_ids(&self, ids: &[ProductId]) -> CatalogResult<Vec<ProductDocument>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = NativeQuery::default()
            .with_filter(Clause::terms(Field::Id, ids.iter().copied()))
            .only_active();
        let hits = self.index.search(&SearchQuery::new(query, ids.len())).await?;

        // Preserve the caller's id order
        let mut by_id: HashMap<ProductId, ProductDocument> = hits
            .hits
            .into_iter()
            .map(|hit| (hit.product.id, hit.product))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}

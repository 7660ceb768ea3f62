use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;

use crate::error::{CatalogError, CatalogResult};

pub type ProductId = i64;
pub type VendorId = i64;
pub type CategoryId = i64;
pub type UserId = i64;

/// Product lifecycle status as stored in the search index
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductStatus {
    Draft,
    /// Only active products are eligible for search and recommendations
    #[default]
    Active,
    Archived,
}

/// Denormalized, read-optimized projection of a product.
///
/// Written wholesale by the indexing pipeline; this crate only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProductDocument {
    pub id: ProductId,
    pub vendor_id: VendorId,
    pub category_id: CategoryId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub short_description: Option<String>,
    pub sku: String,
    pub price: f64,
    #[serde(default)]
    pub compare_at_price: Option<f64>,
    #[serde(default)]
    pub stock_quantity: i32,
    pub status: ProductStatus,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Image URLs in display order
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub vendor_name: String,
    /// 0-5, one decimal
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub total_reviews: i64,
    #[serde(default)]
    pub total_wishlisted: i64,
    #[serde(default)]
    pub total_sold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProductDocument {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

/// Structured constraints applied to a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchFilters {
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
    #[serde(default)]
    pub vendor_ids: Vec<VendorId>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    #[serde(default)]
    pub statuses: Vec<ProductStatus>,
    pub is_featured: Option<bool>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub in_stock: Option<bool>,
}

impl SearchFilters {
    /// Sorted, deduplicated copy so equivalent filters serialize identically
    pub fn canonical(&self) -> Self {
        let mut canonical = self.clone();
        canonical.category_ids.sort_unstable();
        canonical.category_ids.dedup();
        canonical.vendor_ids.sort_unstable();
        canonical.vendor_ids.dedup();
        canonical.statuses.sort_unstable();
        canonical.statuses.dedup();
        canonical.tags.sort();
        canonical.tags.dedup();
        canonical
    }
}

/// Result ordering
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    Default,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    PriceAsc,
    PriceDesc,
    RatingDesc,
    Newest,
    Popular,
}

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort: SortBy,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    #[serde(default)]
    pub include_facets: bool,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            filters: SearchFilters::default(),
            sort: SortBy::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            include_facets: false,
        }
    }
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.page_size as usize
    }

    /// Shape checks the query builder relies on; it never re-validates.
    pub fn validate(&self, max_page_size: u32) -> CatalogResult<()> {
        if self.page < 1 {
            return Err(CatalogError::Validation("page must be >= 1".into()));
        }
        if self.page_size < 1 || self.page_size > max_page_size {
            return Err(CatalogError::Validation(format!(
                "page_size must be between 1 and {}",
                max_page_size
            )));
        }

        let filters = &self.filters;
        for (name, price) in [("min_price", filters.min_price), ("max_price", filters.max_price)] {
            if price.is_some_and(|p| p < 0.0 || !p.is_finite()) {
                return Err(CatalogError::Validation(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        if let (Some(min), Some(max)) = (filters.min_price, filters.max_price) {
            if min > max {
                return Err(CatalogError::Validation(
                    "min_price must not exceed max_price".into(),
                ));
            }
        }
        if let Some(rating) = filters.min_rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(CatalogError::Validation(
                    "min_rating must be between 0 and 5".into(),
                ));
            }
        }
        Ok(())
    }

    /// Canonical form used for cache keys
    pub fn canonical(&self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            filters: self.filters.canonical(),
            ..self.clone()
        }
    }
}

/// A matched document with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ScoredProduct {
    #[serde(flatten)]
    pub product: ProductDocument,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub page_count: u64,
}

impl Pagination {
    pub fn new(page: u32, page_size: u32, total: u64) -> Self {
        let page_count = if page_size == 0 {
            0
        } else {
            total.div_ceil(page_size as u64)
        };
        Self {
            page,
            page_size,
            total,
            page_count,
        }
    }
}

/// One (key, count) pair within a facet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FacetBucket {
    pub key: String,
    pub count: u64,
}

impl FacetBucket {
    pub fn new(key: impl Into<String>, count: u64) -> Self {
        Self {
            key: key.into(),
            count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FacetSet {
    pub categories: Vec<FacetBucket>,
    pub vendors: Vec<FacetBucket>,
    pub price_ranges: Vec<FacetBucket>,
    pub rating_ranges: Vec<FacetBucket>,
    pub tags: Vec<FacetBucket>,
}

impl FacetSet {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
            && self.vendors.is_empty()
            && self.price_ranges.is_empty()
            && self.rating_ranges.is_empty()
            && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchResult {
    pub products: Vec<ScoredProduct>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetSet>,
    pub pagination: Pagination,
}

/// Which similarity signal produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    ContentBased,
    Behavioral,
    Collaborative,
    SameVendor,
}

impl Strategy {
    pub fn reason(&self) -> &'static str {
        match self {
            Strategy::ContentBased => "similar content and description",
            Strategy::Behavioral => "based on your shopping preferences",
            Strategy::Collaborative => "customers who bought this also bought",
            Strategy::SameVendor => "from the same vendor",
        }
    }
}

/// Scored candidate produced by one strategy call; never persisted
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityCandidate {
    pub product_id: ProductId,
    pub score: f64,
    pub strategy: Strategy,
    /// Position within the producing strategy's list
    pub rank: usize,
}

impl SimilarityCandidate {
    pub fn reason(&self) -> &'static str {
        self.strategy.reason()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct RecommendationResult {
    #[serde(flatten)]
    pub product: ProductDocument,
    pub recommendation_reason: String,
    pub similarity_score: f64,
}

/// Order status as exposed by the orders subsystem
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Shipped and delivered orders count as real purchases
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }
}

/// A purchased line item, read from order history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub order_id: i64,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub vendor_id: VendorId,
    pub category_id: CategoryId,
    pub price: f64,
    pub quantity: i32,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
}

//! HTTP handlers for the catalog search API

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use utoipa::{IntoParams, OpenApi};
use validator::Validate;

use crate::error::{CatalogError, CatalogResult, ErrorResponse};
use crate::models::{
    DEFAULT_PAGE_SIZE, FacetBucket, FacetSet, Pagination, ProductDocument, ProductId,
    ProductStatus, RecommendationResult, ScoredProduct, SearchFilters, SearchRequest,
    SearchResult, SortBy, UserId,
};
use crate::service::CatalogSearchService;

pub const DEFAULT_SUGGESTIONS: usize = 10;
pub const DEFAULT_RELATED: usize = 10;

/// OpenAPI documentation for the catalog search API
#[derive(OpenApi)]
#[openapi(
    paths(search_products, autocomplete, related_products, trending_products),
    components(schemas(
        SearchResult,
        ScoredProduct,
        ProductDocument,
        ProductStatus,
        FacetSet,
        FacetBucket,
        Pagination,
        RecommendationResult,
        SortBy,
        ErrorResponse
    )),
    tags(
        (name = "Search", description = "Product search and suggestions"),
        (name = "Recommendations", description = "Related and trending products")
    )
)]
pub struct ApiDoc;

/// Create the catalog search router
pub fn router(service: CatalogSearchService) -> Router {
    let shared_service = Arc::new(service);

    Router::new()
        .route("/search", get(search_products))
        .route("/autocomplete", get(autocomplete))
        .route("/products/{id}/related", get(related_products))
        .route("/trending", get(trending_products))
        .with_state(shared_service)
}

/// Query string for `GET /search`; list parameters are comma-separated
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchParams {
    /// Free-text query
    pub q: Option<String>,
    /// e.g. `1,2,3`
    pub category_ids: Option<String>,
    pub vendor_ids: Option<String>,
    #[validate(range(min = 0.0))]
    pub min_price: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_price: Option<f64>,
    #[validate(range(min = 0.0, max = 5.0))]
    pub min_rating: Option<f64>,
    /// e.g. `active,draft`
    pub status: Option<String>,
    pub is_featured: Option<bool>,
    pub tags: Option<String>,
    pub in_stock: Option<bool>,
    pub sort: Option<SortBy>,
    #[validate(range(min = 1))]
    pub page: Option<u32>,
    /// Upper bound is the service's configured maximum page size
    #[validate(range(min = 1))]
    pub page_size: Option<u32>,
    pub include_facets: Option<bool>,
}

impl SearchParams {
    pub fn into_request(self) -> CatalogResult<SearchRequest> {
        self.validate()?;

        Ok(SearchRequest {
            query: self.q.unwrap_or_default(),
            filters: SearchFilters {
                category_ids: parse_list("category_ids", self.category_ids.as_deref())?,
                vendor_ids: parse_list("vendor_ids", self.vendor_ids.as_deref())?,
                min_price: self.min_price,
                max_price: self.max_price,
                min_rating: self.min_rating,
                statuses: parse_list("status", self.status.as_deref())?,
                is_featured: self.is_featured,
                tags: parse_list("tags", self.tags.as_deref())?,
                in_stock: self.in_stock,
            },
            sort: self.sort.unwrap_or_default(),
            page: self.page.unwrap_or(1),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            include_facets: self.include_facets.unwrap_or(false),
        })
    }
}

fn parse_list<T: FromStr>(name: &str, raw: Option<&str>) -> CatalogResult<Vec<T>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse().map_err(|_| {
                CatalogError::Validation(format!("{}: invalid value '{}'", name, item))
            })
        })
        .collect()
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AutocompleteParams {
    /// Prefix typed so far; fewer than 2 characters yields no suggestions
    #[serde(default)]
    pub q: String,
    #[validate(range(min = 1, max = 20))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RelatedParams {
    /// Personalises results with the user's purchase history
    pub user_id: Option<UserId>,
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrendingParams {
    #[validate(range(min = 1, max = 50))]
    pub limit: Option<usize>,
}

/// Search active products
#[utoipa::path(
    get,
    path = "/search",
    tag = "Search",
    params(SearchParams),
    responses(
        (status = 200, description = "Matching products", body = SearchResult),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse),
        (status = 503, description = "Search backend unavailable", body = ErrorResponse)
    )
)]
async fn search_products(
    State(service): State<Arc<CatalogSearchService>>,
    Query(params): Query<SearchParams>,
) -> CatalogResult<Json<SearchResult>> {
    let request = params.into_request()?;
    let result = service.search(&request).await?;
    Ok(Json(result))
}

/// Suggest completions for a prefix
#[utoipa::path(
    get,
    path = "/autocomplete",
    tag = "Search",
    params(AutocompleteParams),
    responses(
        (status = 200, description = "Suggestions", body = Vec<String>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse)
    )
)]
async fn autocomplete(
    State(service): State<Arc<CatalogSearchService>>,
    Query(params): Query<AutocompleteParams>,
) -> CatalogResult<Json<Vec<String>>> {
    params.validate()?;
    let limit = params.limit.unwrap_or(DEFAULT_SUGGESTIONS);
    Ok(Json(service.suggest(&params.q, limit).await))
}

/// Products related to a product
#[utoipa::path(
    get,
    path = "/products/{id}/related",
    tag = "Recommendations",
    params(
        ("id" = i64, Path, description = "Source product id"),
        RelatedParams
    ),
    responses(
        (status = 200, description = "Recommendations, best first", body = Vec<RecommendationResult>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse)
    )
)]
async fn related_products(
    State(service): State<Arc<CatalogSearchService>>,
    Path(id): Path<ProductId>,
    Query(params): Query<RelatedParams>,
) -> CatalogResult<Json<Vec<RecommendationResult>>> {
    params.validate()?;
    let limit = params.limit.unwrap_or(DEFAULT_RELATED);
    Ok(Json(service.related_products(id, params.user_id, limit).await))
}

/// Trending active products
#[utoipa::path(
    get,
    path = "/trending",
    tag = "Recommendations",
    params(TrendingParams),
    responses(
        (status = 200, description = "Trending products", body = Vec<ProductDocument>),
        (status = 400, description = "Invalid query parameters", body = ErrorResponse)
    )
)]
async fn trending_products(
    State(service): State<Arc<CatalogSearchService>>,
    Query(params): Query<TrendingParams>,
) -> CatalogResult<Json<Vec<ProductDocument>>> {
    params.validate()?;
    let limit = params.limit.unwrap_or(DEFAULT_RELATED);
    Ok(Json(service.trending(limit).await))
}

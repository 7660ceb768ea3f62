//! Typed query representation and the builder that produces it.
//!
//! The search backend never sees caller input directly: requests are turned
//! into a [`NativeQuery`] here and a backend adapter serializes it to its own
//! wire format (see `elasticsearch.rs`).

use serde::Serialize;

use crate::models::{ProductId, ProductStatus, SearchFilters, SearchRequest, SortBy};

/// Indexed document fields addressable by queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Name,
    NameAutocomplete,
    Description,
    ShortDescription,
    CategoryName,
    CategoryNameAutocomplete,
    VendorName,
    VendorNameAutocomplete,
    Tags,
    Sku,
    CategoryId,
    VendorId,
    Price,
    AverageRating,
    Status,
    IsFeatured,
    StockQuantity,
    TotalWishlisted,
    TotalSold,
    CreatedAt,
}

impl Field {
    /// Path of the field in the index mapping
    pub fn path(&self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
            Field::NameAutocomplete => "name.autocomplete",
            Field::Description => "description",
            Field::ShortDescription => "short_description",
            Field::CategoryName => "category_name",
            Field::CategoryNameAutocomplete => "category_name.autocomplete",
            Field::VendorName => "vendor_name",
            Field::VendorNameAutocomplete => "vendor_name.autocomplete",
            Field::Tags => "tags",
            Field::Sku => "sku",
            Field::CategoryId => "category_id",
            Field::VendorId => "vendor_id",
            Field::Price => "price",
            Field::AverageRating => "average_rating",
            Field::Status => "status",
            Field::IsFeatured => "is_featured",
            Field::StockQuantity => "stock_quantity",
            Field::TotalWishlisted => "total_wishlisted",
            Field::TotalSold => "total_sold",
            Field::CreatedAt => "created_at",
        }
    }
}

/// Exact value for term-level clauses
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TermValue {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl From<i64> for TermValue {
    fn from(value: i64) -> Self {
        TermValue::Int(value)
    }
}

impl From<bool> for TermValue {
    fn from(value: bool) -> Self {
        TermValue::Bool(value)
    }
}

impl From<&str> for TermValue {
    fn from(value: &str) -> Self {
        TermValue::Str(value.to_string())
    }
}

impl From<String> for TermValue {
    fn from(value: String) -> Self {
        TermValue::Str(value)
    }
}

impl From<ProductStatus> for TermValue {
    fn from(value: ProductStatus) -> Self {
        TermValue::Str(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Or,
    And,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedField {
    pub field: Field,
    pub boost: f64,
}

impl WeightedField {
    pub fn new(field: Field, boost: f64) -> Self {
        Self { field, boost }
    }
}

/// Numeric bounds; unset sides are open
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Bounds {
    pub gt: Option<f64>,
    pub gte: Option<f64>,
    pub lt: Option<f64>,
    pub lte: Option<f64>,
}

impl Bounds {
    pub fn between(gte: Option<f64>, lte: Option<f64>) -> Self {
        Self {
            gte,
            lte,
            ..Default::default()
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.gt.is_none_or(|b| value > b)
            && self.gte.is_none_or(|b| value >= b)
            && self.lt.is_none_or(|b| value < b)
            && self.lte.is_none_or(|b| value <= b)
    }
}

/// One leaf clause of a query
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Scored full-text match over several weighted fields
    MultiMatch {
        query: String,
        fields: Vec<WeightedField>,
        fuzzy: bool,
        operator: Operator,
    },
    Term {
        field: Field,
        value: TermValue,
    },
    Terms {
        field: Field,
        values: Vec<TermValue>,
    },
    Range {
        field: Field,
        bounds: Bounds,
    },
    /// Documents whose text resembles an existing document
    MoreLikeThis {
        fields: Vec<Field>,
        like: ProductId,
        min_term_freq: u32,
        min_doc_freq: u32,
    },
    PhrasePrefix {
        field: Field,
        prefix: String,
    },
}

impl Clause {
    pub fn term(field: Field, value: impl Into<TermValue>) -> Self {
        Clause::Term {
            field,
            value: value.into(),
        }
    }

    pub fn terms<V: Into<TermValue>>(field: Field, values: impl IntoIterator<Item = V>) -> Self {
        Clause::Terms {
            field,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn range(field: Field, bounds: Bounds) -> Self {
        Clause::Range { field, bounds }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShouldClause {
    pub clause: Clause,
    pub boost: f64,
}

/// Boolean composition of clauses.
///
/// `must` and `should` contribute to the score, `filter` and `must_not` do not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeQuery {
    pub must: Vec<Clause>,
    pub filter: Vec<Clause>,
    pub should: Vec<ShouldClause>,
    pub must_not: Vec<Clause>,
    pub minimum_should_match: Option<u32>,
}

impl NativeQuery {
    pub fn with_filter(mut self, clause: Clause) -> Self {
        self.filter.push(clause);
        self
    }

    pub fn with_must_not(mut self, clause: Clause) -> Self {
        self.must_not.push(clause);
        self
    }

    pub fn with_should(mut self, clause: Clause, boost: f64) -> Self {
        self.should.push(ShouldClause { clause, boost });
        self
    }

    /// Status clause every public query carries
    pub fn only_active(self) -> Self {
        self.with_filter(Clause::term(Field::Status, ProductStatus::Active))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Score,
    Field(Field),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortClause {
    pub key: SortKey,
    pub order: SortOrder,
}

impl SortClause {
    pub fn score() -> Self {
        Self {
            key: SortKey::Score,
            order: SortOrder::Desc,
        }
    }

    pub fn asc(field: Field) -> Self {
        Self {
            key: SortKey::Field(field),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: Field) -> Self {
        Self {
            key: SortKey::Field(field),
            order: SortOrder::Desc,
        }
    }
}

/// A paged document query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: NativeQuery,
    pub sort: Vec<SortClause>,
    pub from: usize,
    pub size: usize,
}

impl SearchQuery {
    pub fn new(query: NativeQuery, size: usize) -> Self {
        Self {
            query,
            sort: vec![SortClause::score()],
            from: 0,
            size,
        }
    }

    pub fn sorted_by(mut self, sort: Vec<SortClause>) -> Self {
        self.sort = sort;
        self
    }
}

/// Fixed bucket of a range aggregation, `[from, to)`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBucket {
    pub key: &'static str,
    pub from: Option<f64>,
    pub to: Option<f64>,
}

impl RangeBucket {
    pub const fn new(key: &'static str, from: Option<f64>, to: Option<f64>) -> Self {
        Self { key, from, to }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.from.is_none_or(|f| value >= f) && self.to.is_none_or(|t| value < t)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregationKind {
    Terms { field: Field, size: usize },
    Range { field: Field, ranges: Vec<RangeBucket> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub name: &'static str,
    pub kind: AggregationKind,
}

/// Bucket-only query: no documents are returned
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub query: NativeQuery,
    pub aggregations: Vec<Aggregation>,
}

/// Translates typed search requests into [`NativeQuery`] values
pub struct QueryBuilder;

impl QueryBuilder {
    /// Full-text fields and their weights; name dominates
    pub fn text_fields() -> Vec<WeightedField> {
        vec![
            WeightedField::new(Field::Name, 3.0),
            WeightedField::new(Field::NameAutocomplete, 2.0),
            WeightedField::new(Field::Description, 1.0),
            WeightedField::new(Field::ShortDescription, 1.0),
            WeightedField::new(Field::CategoryName, 1.5),
            WeightedField::new(Field::VendorName, 1.0),
            WeightedField::new(Field::Tags, 1.5),
            WeightedField::new(Field::Sku, 1.0),
        ]
    }

    pub fn build(query: &str, filters: &SearchFilters) -> NativeQuery {
        let mut native = NativeQuery::default();

        let text = query.trim();
        if !text.is_empty() {
            native.must.push(Clause::MultiMatch {
                query: text.to_string(),
                fields: Self::text_fields(),
                fuzzy: true,
                operator: Operator::Or,
            });
        }

        if !filters.category_ids.is_empty() {
            native
                .filter
                .push(Clause::terms(Field::CategoryId, filters.category_ids.clone()));
        }
        if !filters.vendor_ids.is_empty() {
            native
                .filter
                .push(Clause::terms(Field::VendorId, filters.vendor_ids.clone()));
        }
        if filters.min_price.is_some() || filters.max_price.is_some() {
            native.filter.push(Clause::range(
                Field::Price,
                Bounds::between(filters.min_price, filters.max_price),
            ));
        }
        if let Some(min_rating) = filters.min_rating {
            native.filter.push(Clause::range(
                Field::AverageRating,
                Bounds::between(Some(min_rating), None),
            ));
        }
        if !filters.statuses.is_empty() {
            native
                .filter
                .push(Clause::terms(Field::Status, filters.statuses.clone()));
        }
        if let Some(featured) = filters.is_featured {
            native.filter.push(Clause::term(Field::IsFeatured, featured));
        }
        if !filters.tags.is_empty() {
            native
                .filter
                .push(Clause::terms(Field::Tags, filters.tags.clone()));
        }
        if filters.in_stock == Some(true) {
            native.filter.push(Clause::range(
                Field::StockQuantity,
                Bounds {
                    gt: Some(0.0),
                    ..Default::default()
                },
            ));
        }

        // Appended last and unconditionally: a status filter from the caller
        // can only narrow this, never widen it.
        native.only_active()
    }

    /// Sort clauses for a sort key; relevance is always a tie-breaker
    pub fn sort_clauses(sort: SortBy) -> Vec<SortClause> {
        match sort {
            SortBy::PriceAsc => vec![SortClause::asc(Field::Price), SortClause::score()],
            SortBy::PriceDesc => vec![SortClause::desc(Field::Price), SortClause::score()],
            SortBy::RatingDesc => vec![
                SortClause::desc(Field::AverageRating),
                SortClause::score(),
            ],
            SortBy::Newest => vec![SortClause::desc(Field::CreatedAt), SortClause::score()],
            SortBy::Popular => vec![
                SortClause::desc(Field::TotalWishlisted),
                SortClause::desc(Field::TotalSold),
                SortClause::score(),
            ],
            SortBy::Relevance => vec![SortClause::score(), SortClause::desc(Field::CreatedAt)],
        }
    }

    pub fn search_query(request: &SearchRequest) -> SearchQuery {
        SearchQuery {
            query: Self::build(&request.query, &request.filters),
            sort: Self::sort_clauses(request.sort),
            from: request.offset(),
            size: request.page_size as usize,
        }
    }
}

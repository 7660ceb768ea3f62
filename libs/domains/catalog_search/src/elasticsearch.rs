//! Elasticsearch adapter for [`SearchIndex`].
//!
//! Serializes the typed query representation into the Elasticsearch query
//! DSL and talks to the cluster over its REST API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

use crate::error::{CatalogError, CatalogResult};
use crate::index::{AggregationResults, SearchHits, SearchIndex};
use crate::models::{FacetBucket, ProductDocument, ProductId, ScoredProduct};
use crate::query::{
    AggregationKind, AggregationRequest, Bounds, Clause, NativeQuery, Operator, SearchQuery,
    SortKey, SortOrder,
};

/// Connection settings for the Elasticsearch adapter
#[derive(Debug, Clone)]
pub struct ElasticsearchSettings {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl Default for ElasticsearchSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "products".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct ElasticsearchIndex {
    client: Client,
    settings: ElasticsearchSettings,
}

impl ElasticsearchIndex {
    pub fn new(settings: ElasticsearchSettings) -> CatalogResult<Self> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.settings.url.trim_end_matches('/'),
            self.settings.index,
            path
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.settings.username {
            Some(user) => request.basic_auth(user, self.settings.password.as_ref()),
            None => request,
        }
    }

    async fn post_search(&self, body: &Value) -> CatalogResult<SearchResponse> {
        let response = self
            .authorize(self.client.post(self.url("_search")))
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<SearchResponse>().await?)
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    #[instrument(skip(self, query), fields(from = query.from, size = query.size))]
    async fn search(&self, query: &SearchQuery) -> CatalogResult<SearchHits> {
        let body = search_body(query, &self.settings.index);
        let response = self.post_search(&body).await?;

        let hits = response
            .hits
            .hits
            .into_iter()
            .map(|hit| ScoredProduct {
                product: hit.source,
                score: hit.score.unwrap_or(0.0),
            })
            .collect();

        Ok(SearchHits {
            total: response.hits.total.value,
            hits,
        })
    }

    #[instrument(skip(self, request), fields(aggregations = request.aggregations.len()))]
    async fn aggregate(&self, request: &AggregationRequest) -> CatalogResult<AggregationResults> {
        let body = aggregation_body(request, &self.settings.index);
        let response = self.post_search(&body).await?;

        let aggregations = response.aggregations.ok_or_else(|| {
            CatalogError::Index("aggregation response without aggregations".to_string())
        })?;

        Ok(aggregations
            .into_iter()
            .map(|(name, agg)| {
                let buckets = agg
                    .buckets
                    .into_iter()
                    .map(|b| FacetBucket::new(bucket_key(&b.key), b.doc_count))
                    .collect();
                (name, buckets)
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn get(&self, id: ProductId) -> CatalogResult<Option<ProductDocument>> {
        let response = self
            .authorize(self.client.get(self.url(&format!("_doc/{}", id))))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let document = response.error_for_status()?.json::<GetResponse>().await?;
        Ok(if document.found { document.source } else { None })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
    #[serde(default)]
    aggregations: Option<HashMap<String, AggregationBuckets>>,
}

#[derive(Debug, Deserialize)]
struct Hits {
    total: Total,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Total {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source")]
    source: ProductDocument,
}

#[derive(Debug, Deserialize)]
struct AggregationBuckets {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    key: Value,
    doc_count: u64,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    found: bool,
    #[serde(rename = "_source")]
    source: Option<ProductDocument>,
}

fn bucket_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Request body for a document query
pub fn search_body(query: &SearchQuery, index: &str) -> Value {
    let sort: Vec<Value> = query
        .sort
        .iter()
        .map(|clause| {
            let order = match clause.order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            let field = match clause.key {
                SortKey::Score => "_score",
                SortKey::Field(field) => field.path(),
            };
            json!({ field: { "order": order } })
        })
        .collect();

    json!({
        "query": query_json(&query.query, index),
        "sort": sort,
        "from": query.from,
        "size": query.size,
        "track_total_hits": true,
    })
}

/// Request body for a bucket-only aggregation query
pub fn aggregation_body(request: &AggregationRequest, index: &str) -> Value {
    let mut aggs = Map::new();
    for aggregation in &request.aggregations {
        let body = match &aggregation.kind {
            AggregationKind::Terms { field, size } => json!({
                "terms": { "field": field.path(), "size": size }
            }),
            AggregationKind::Range { field, ranges } => {
                let ranges: Vec<Value> = ranges
                    .iter()
                    .map(|range| {
                        let mut bucket = Map::new();
                        bucket.insert("key".into(), json!(range.key));
                        if let Some(from) = range.from {
                            bucket.insert("from".into(), json!(from));
                        }
                        if let Some(to) = range.to {
                            bucket.insert("to".into(), json!(to));
                        }
                        Value::Object(bucket)
                    })
                    .collect();
                json!({ "range": { "field": field.path(), "ranges": ranges } })
            }
        };
        aggs.insert(aggregation.name.to_string(), body);
    }

    json!({
        "size": 0,
        "query": query_json(&request.query, index),
        "aggs": aggs,
    })
}

/// `bool` query for a [`NativeQuery`]
pub fn query_json(query: &NativeQuery, index: &str) -> Value {
    let mut bool_query = Map::new();

    if !query.must.is_empty() {
        bool_query.insert(
            "must".into(),
            Value::Array(query.must.iter().map(|c| clause_json(c, index, None)).collect()),
        );
    }
    if !query.filter.is_empty() {
        bool_query.insert(
            "filter".into(),
            Value::Array(query.filter.iter().map(|c| clause_json(c, index, None)).collect()),
        );
    }
    if !query.should.is_empty() {
        bool_query.insert(
            "should".into(),
            Value::Array(
                query
                    .should
                    .iter()
                    .map(|s| clause_json(&s.clause, index, Some(s.boost)))
                    .collect(),
            ),
        );
    }
    if !query.must_not.is_empty() {
        bool_query.insert(
            "must_not".into(),
            Value::Array(
                query
                    .must_not
                    .iter()
                    .map(|c| clause_json(c, index, None))
                    .collect(),
            ),
        );
    }
    if let Some(minimum) = query.minimum_should_match {
        bool_query.insert("minimum_should_match".into(), json!(minimum));
    }

    json!({ "bool": bool_query })
}

/// Leaf clause, optionally boosted
pub fn clause_json(clause: &Clause, index: &str, boost: Option<f64>) -> Value {
    match clause {
        Clause::MultiMatch {
            query,
            fields,
            fuzzy,
            operator,
        } => {
            let fields: Vec<String> = fields
                .iter()
                .map(|wf| format!("{}^{}", wf.field.path(), wf.boost))
                .collect();
            let mut body = json!({
                "query": query,
                "fields": fields,
                "type": "best_fields",
                "operator": match operator {
                    Operator::Or => "or",
                    Operator::And => "and",
                },
            });
            if *fuzzy {
                body["fuzziness"] = json!("AUTO");
            }
            if let Some(boost) = boost {
                body["boost"] = json!(boost);
            }
            json!({ "multi_match": body })
        }
        Clause::Term { field, value } => {
            let mut body = json!({ "value": value });
            if let Some(boost) = boost {
                body["boost"] = json!(boost);
            }
            json!({ "term": { field.path(): body } })
        }
        Clause::Terms { field, values } => {
            let mut body = Map::new();
            body.insert(field.path().to_string(), json!(values));
            if let Some(boost) = boost {
                body.insert("boost".into(), json!(boost));
            }
            json!({ "terms": body })
        }
        Clause::Range { field, bounds } => {
            let mut body = bounds_json(bounds);
            if let Some(boost) = boost {
                body.insert("boost".into(), json!(boost));
            }
            json!({ "range": { field.path(): body } })
        }
        Clause::MoreLikeThis {
            fields,
            like,
            min_term_freq,
            min_doc_freq,
        } => {
            let fields: Vec<&str> = fields.iter().map(|f| f.path()).collect();
            let mut body = json!({
                "fields": fields,
                "like": [{ "_index": index, "_id": like.to_string() }],
                "min_term_freq": min_term_freq,
                "min_doc_freq": min_doc_freq,
            });
            if let Some(boost) = boost {
                body["boost"] = json!(boost);
            }
            json!({ "more_like_this": body })
        }
        Clause::PhrasePrefix { field, prefix } => {
            let mut body = json!({ "query": prefix });
            if let Some(boost) = boost {
                body["boost"] = json!(boost);
            }
            json!({ "match_phrase_prefix": { field.path(): body } })
        }
    }
}

fn bounds_json(bounds: &Bounds) -> Map<String, Value> {
    let mut body = Map::new();
    for (op, value) in [
        ("gt", bounds.gt),
        ("gte", bounds.gte),
        ("lt", bounds.lt),
        ("lte", bounds.lte),
    ] {
        if let Some(value) = value {
            body.insert(op.into(), json!(value));
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProductStatus, SearchFilters, SearchRequest, SortBy};
    use crate::query::{Field, QueryBuilder};

    #[test]
    fn test_multi_match_serialization() {
        let native = QueryBuilder::build("sneakers", &SearchFilters::default());
        let body = query_json(&native, "products");

        let multi_match = &body["bool"]["must"][0]["multi_match"];
        assert_eq!(multi_match["query"], "sneakers");
        assert_eq!(multi_match["fuzziness"], "AUTO");
        assert_eq!(multi_match["operator"], "or");
        assert_eq!(multi_match["fields"][0], "name^3");

        assert_eq!(
            body["bool"]["filter"][0],
            json!({ "term": { "status": { "value": "active" } } })
        );
    }

    #[test]
    fn test_filters_serialization() {
        let filters = SearchFilters {
            category_ids: vec![4, 2],
            min_price: Some(10.0),
            in_stock: Some(true),
            statuses: vec![ProductStatus::Active],
            ..Default::default()
        };
        let body = query_json(&QueryBuilder::build("", &filters), "products");
        let filter = body["bool"]["filter"].as_array().unwrap();

        assert_eq!(filter[0], json!({ "terms": { "category_id": [4, 2] } }));
        assert_eq!(filter[1], json!({ "range": { "price": { "gte": 10.0 } } }));
        assert_eq!(filter[2], json!({ "terms": { "status": ["active"] } }));
        assert_eq!(filter[3], json!({ "range": { "stock_quantity": { "gt": 0.0 } } }));
        assert!(body["bool"].get("must").is_none());
    }

    #[test]
    fn test_search_body_sort_and_paging() {
        let request = SearchRequest {
            query: "boots".into(),
            sort: SortBy::PriceAsc,
            page: 3,
            page_size: 10,
            ..Default::default()
        };
        let body = search_body(&QueryBuilder::search_query(&request), "products");

        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["sort"][0], json!({ "price": { "order": "asc" } }));
        assert_eq!(body["sort"][1], json!({ "_score": { "order": "desc" } }));
        assert_eq!(body["track_total_hits"], true);
    }

    #[test]
    fn test_boosted_should_and_must_not() {
        let native = NativeQuery::default()
            .with_should(Clause::terms(Field::CategoryId, [3i64]), 2.0)
            .with_must_not(Clause::terms(Field::Id, [1i64, 2]));
        let body = query_json(&native, "products");

        assert_eq!(
            body["bool"]["should"][0],
            json!({ "terms": { "category_id": [3], "boost": 2.0 } })
        );
        assert_eq!(
            body["bool"]["must_not"][0],
            json!({ "terms": { "id": [1, 2] } })
        );
    }

    #[test]
    fn test_more_like_this_references_source_document() {
        let clause = Clause::MoreLikeThis {
            fields: vec![Field::Name, Field::Tags],
            like: 42,
            min_term_freq: 1,
            min_doc_freq: 1,
        };
        let body = clause_json(&clause, "products", None);
        assert_eq!(
            body["more_like_this"]["like"],
            json!([{ "_index": "products", "_id": "42" }])
        );
        assert_eq!(body["more_like_this"]["fields"], json!(["name", "tags"]));
    }

    #[test]
    fn test_aggregation_body() {
        let request = crate::facets::FacetAggregator::aggregation_request(
            "",
            &SearchFilters::default(),
        );
        let body = aggregation_body(&request, "products");

        assert_eq!(body["size"], 0);
        assert_eq!(
            body["aggs"]["categories"],
            json!({ "terms": { "field": "category_id", "size": 50 } })
        );
        assert_eq!(
            body["aggs"]["price_ranges"]["range"]["ranges"][0],
            json!({ "key": "0-50", "to": 50.0 })
        );
        assert_eq!(
            body["aggs"]["price_ranges"]["range"]["ranges"][4],
            json!({ "key": "500+", "from": 500.0 })
        );
    }

    #[test]
    fn test_search_response_parsing() {
        let raw = json!({
            "hits": {
                "total": { "value": 1, "relation": "eq" },
                "hits": [{
                    "_index": "products",
                    "_id": "1",
                    "_score": 2.5,
                    "_source": {
                        "id": 1, "vendor_id": 2, "category_id": 3,
                        "name": "Red Sneakers", "sku": "RS-1", "price": 60.0,
                        "status": "active",
                        "created_at": "2024-01-01T00:00:00Z",
                        "updated_at": "2024-01-01T00:00:00Z"
                    }
                }]
            },
            "aggregations": {
                "categories": { "buckets": [{ "key": 3, "doc_count": 1 }] },
                "tags": { "buckets": [{ "key": "summer", "doc_count": 4 }] }
            }
        });
        let response: SearchResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(response.hits.total.value, 1);
        assert_eq!(response.hits.hits[0].score, Some(2.5));
        assert_eq!(response.hits.hits[0].source.name, "Red Sneakers");

        let aggregations = response.aggregations.unwrap();
        assert_eq!(bucket_key(&aggregations["categories"].buckets[0].key), "3");
        assert_eq!(bucket_key(&aggregations["tags"].buckets[0].key), "summer");
    }
}

//! In-memory search index for development and tests.
//!
//! Evaluates the typed query representation directly over a map of
//! documents. Scoring is a simplified stand-in for a real relevance model:
//! exact token hits score 1.0, fuzzy or prefix hits score less, and field
//! weights multiply the per-token score.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::CatalogResult;
use crate::index::{AggregationResults, SearchHits, SearchIndex};
use crate::models::{FacetBucket, ProductDocument, ProductId, ScoredProduct};
use crate::query::{
    AggregationKind, AggregationRequest, Clause, Field, NativeQuery, Operator, SearchQuery,
    SortKey, SortOrder, TermValue, WeightedField,
};

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "the", "this", "that", "to", "with", "your", "you",
];

/// In-memory implementation of [`SearchIndex`]
#[derive(Debug, Default, Clone)]
pub struct InMemorySearchIndex {
    documents: Arc<RwLock<BTreeMap<ProductId, ProductDocument>>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = ProductDocument>) -> Self {
        let map = documents.into_iter().map(|d| (d.id, d)).collect();
        Self {
            documents: Arc::new(RwLock::new(map)),
        }
    }

    /// Replace a document wholesale, as the indexing pipeline would
    pub async fn upsert(&self, document: ProductDocument) {
        self.documents.write().await.insert(document.id, document);
    }

    pub async fn remove(&self, id: ProductId) -> bool {
        self.documents.write().await.remove(&id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    fn matching<'a>(
        documents: &'a BTreeMap<ProductId, ProductDocument>,
        query: &NativeQuery,
    ) -> Vec<(&'a ProductDocument, f64)> {
        documents
            .values()
            .filter_map(|doc| evaluate(documents, doc, query).map(|score| (doc, score)))
            .collect()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn search(&self, query: &SearchQuery) -> CatalogResult<SearchHits> {
        let documents = self.documents.read().await;
        let mut matched = Self::matching(&documents, &query.query);

        matched.sort_by(|(a, a_score), (b, b_score)| {
            for clause in &query.sort {
                let ordering = match clause.key {
                    SortKey::Score => cmp_f64(Some(*a_score), Some(*b_score)),
                    SortKey::Field(field) => cmp_f64(numeric(a, field), numeric(b, field)),
                };
                let ordering = match clause.order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });

        let total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(query.from)
            .take(query.size)
            .map(|(doc, score)| ScoredProduct {
                product: doc.clone(),
                score,
            })
            .collect();

        Ok(SearchHits { total, hits })
    }

    async fn aggregate(&self, request: &AggregationRequest) -> CatalogResult<AggregationResults> {
        let documents = self.documents.read().await;
        let matched = Self::matching(&documents, &request.query);

        let mut results = AggregationResults::new();
        for aggregation in &request.aggregations {
            let buckets = match &aggregation.kind {
                AggregationKind::Terms { field, size } => {
                    let mut counts: HashMap<String, u64> = HashMap::new();
                    for (doc, _) in &matched {
                        for value in keyword_values(doc, *field) {
                            *counts.entry(term_key(&value)).or_default() += 1;
                        }
                    }
                    let mut buckets: Vec<FacetBucket> = counts
                        .into_iter()
                        .map(|(key, count)| FacetBucket::new(key, count))
                        .collect();
                    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.key.cmp(&b.key)));
                    buckets.truncate(*size);
                    buckets
                }
                AggregationKind::Range { field, ranges } => ranges
                    .iter()
                    .map(|range| {
                        let count = matched
                            .iter()
                            .filter(|(doc, _)| numeric(doc, *field).is_some_and(|v| range.contains(v)))
                            .count() as u64;
                        FacetBucket::new(range.key, count)
                    })
                    .collect(),
            };
            results.insert(aggregation.name.to_string(), buckets);
        }

        Ok(results)
    }

    async fn get(&self, id: ProductId) -> CatalogResult<Option<ProductDocument>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }
}

fn evaluate(
    documents: &BTreeMap<ProductId, ProductDocument>,
    doc: &ProductDocument,
    query: &NativeQuery,
) -> Option<f64> {
    if query
        .filter
        .iter()
        .any(|clause| clause_score(documents, doc, clause).is_none())
    {
        return None;
    }
    if query
        .must_not
        .iter()
        .any(|clause| clause_score(documents, doc, clause).is_some())
    {
        return None;
    }

    let mut score = 0.0;
    for clause in &query.must {
        score += clause_score(documents, doc, clause)?;
    }

    let mut should_matched = 0;
    for should in &query.should {
        if let Some(value) = clause_score(documents, doc, &should.clause) {
            should_matched += 1;
            score += value * should.boost;
        }
    }

    // A bool query made only of should clauses needs at least one of them
    let implicit_minimum = u32::from(
        query.must.is_empty() && query.filter.is_empty() && !query.should.is_empty(),
    );
    if should_matched < query.minimum_should_match.unwrap_or(implicit_minimum) {
        return None;
    }

    Some(score)
}

fn clause_score(
    documents: &BTreeMap<ProductId, ProductDocument>,
    doc: &ProductDocument,
    clause: &Clause,
) -> Option<f64> {
    match clause {
        Clause::MultiMatch {
            query,
            fields,
            fuzzy,
            operator,
        } => multi_match(doc, query, fields, *fuzzy, *operator),
        Clause::Term { field, value } => keyword_values(doc, *field)
            .contains(value)
            .then_some(1.0),
        Clause::Terms { field, values } => keyword_values(doc, *field)
            .iter()
            .any(|v| values.contains(v))
            .then_some(1.0),
        Clause::Range { field, bounds } => numeric(doc, *field)
            .is_some_and(|v| bounds.contains(v))
            .then_some(1.0),
        Clause::MoreLikeThis { fields, like, .. } => {
            if doc.id == *like {
                return None;
            }
            let source = documents.get(like)?;
            let source_terms = significant_terms(source, fields);
            let shared = significant_terms(doc, fields)
                .intersection(&source_terms)
                .count();
            (shared > 0).then_some(shared as f64)
        }
        Clause::PhrasePrefix { field, prefix } => {
            phrase_prefix(&tokenize(&text(doc, *field)), &tokenize(prefix)).then_some(1.0)
        }
    }
}

fn multi_match(
    doc: &ProductDocument,
    query: &str,
    fields: &[WeightedField],
    fuzzy: bool,
    operator: Operator,
) -> Option<f64> {
    let terms = tokenize(query);
    if terms.is_empty() {
        return None;
    }

    let field_tokens: Vec<(&WeightedField, Vec<String>)> = fields
        .iter()
        .map(|wf| (wf, tokenize(&text(doc, wf.field))))
        .collect();

    let mut total = 0.0;
    let mut matched = 0;
    for term in &terms {
        let best = field_tokens
            .iter()
            .filter_map(|(wf, tokens)| {
                token_score(term, tokens, fuzzy, is_autocomplete(wf.field)).map(|s| s * wf.boost)
            })
            .fold(0.0, f64::max);
        if best > 0.0 {
            matched += 1;
            total += best;
        }
    }

    let satisfied = match operator {
        Operator::Or => matched > 0,
        Operator::And => matched == terms.len(),
    };
    satisfied.then_some(total)
}

fn token_score(term: &str, tokens: &[String], fuzzy: bool, prefix: bool) -> Option<f64> {
    if tokens.iter().any(|t| t == term) {
        return Some(1.0);
    }
    if prefix && tokens.iter().any(|t| t.starts_with(term)) {
        return Some(0.8);
    }
    let max_edits = auto_fuzziness(term);
    if fuzzy && max_edits > 0 && tokens.iter().any(|t| edit_distance(t, term) <= max_edits) {
        return Some(0.5);
    }
    None
}

/// Edit budget by term length, as `fuzziness: AUTO` defines it
fn auto_fuzziness(term: &str) -> usize {
    match term.chars().count() {
        0..=2 => 0,
        3..=5 => 1,
        _ => 2,
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

fn phrase_prefix(tokens: &[String], phrase: &[String]) -> bool {
    let Some((last, head)) = phrase.split_last() else {
        return false;
    };
    if tokens.len() < phrase.len() {
        return false;
    }
    (0..=tokens.len() - phrase.len()).any(|start| {
        let window = &tokens[start..start + phrase.len()];
        window[..head.len()] == *head && window[head.len()].starts_with(last.as_str())
    })
}

fn significant_terms(doc: &ProductDocument, fields: &[Field]) -> HashSet<String> {
    fields
        .iter()
        .flat_map(|field| tokenize(&text(doc, *field)))
        .filter(|t| t.chars().count() >= 3 && !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_autocomplete(field: Field) -> bool {
    matches!(
        field,
        Field::NameAutocomplete | Field::CategoryNameAutocomplete | Field::VendorNameAutocomplete
    )
}

fn text(doc: &ProductDocument, field: Field) -> String {
    match field {
        Field::Name | Field::NameAutocomplete => doc.name.clone(),
        Field::Description => doc.description.clone(),
        Field::ShortDescription => doc.short_description.clone().unwrap_or_default(),
        Field::CategoryName | Field::CategoryNameAutocomplete => doc.category_name.clone(),
        Field::VendorName | Field::VendorNameAutocomplete => doc.vendor_name.clone(),
        Field::Tags => doc.tags.join(" "),
        Field::Sku => doc.sku.clone(),
        _ => String::new(),
    }
}

fn keyword_values(doc: &ProductDocument, field: Field) -> Vec<TermValue> {
    match field {
        Field::Id => vec![TermValue::Int(doc.id)],
        Field::CategoryId => vec![TermValue::Int(doc.category_id)],
        Field::VendorId => vec![TermValue::Int(doc.vendor_id)],
        Field::Status => vec![doc.status.into()],
        Field::IsFeatured => vec![TermValue::Bool(doc.is_featured)],
        Field::Tags => doc.tags.iter().cloned().map(TermValue::Str).collect(),
        Field::Sku => vec![TermValue::Str(doc.sku.clone())],
        Field::StockQuantity => vec![TermValue::Int(doc.stock_quantity as i64)],
        Field::TotalSold => vec![TermValue::Int(doc.total_sold)],
        Field::TotalWishlisted => vec![TermValue::Int(doc.total_wishlisted)],
        _ => Vec::new(),
    }
}

fn numeric(doc: &ProductDocument, field: Field) -> Option<f64> {
    match field {
        Field::Id => Some(doc.id as f64),
        Field::CategoryId => Some(doc.category_id as f64),
        Field::VendorId => Some(doc.vendor_id as f64),
        Field::Price => Some(doc.price),
        Field::AverageRating => Some(doc.average_rating),
        Field::StockQuantity => Some(doc.stock_quantity as f64),
        Field::TotalWishlisted => Some(doc.total_wishlisted as f64),
        Field::TotalSold => Some(doc.total_sold as f64),
        Field::CreatedAt => Some(doc.created_at.timestamp_millis() as f64),
        _ => None,
    }
}

fn term_key(value: &TermValue) -> String {
    match value {
        TermValue::Int(v) => v.to_string(),
        TermValue::Str(v) => v.clone(),
        TermValue::Bool(v) => v.to_string(),
    }
}

/// Missing values sort last in ascending order
fn cmp_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

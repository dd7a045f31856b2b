/// In-process search backend
///
/// Executes a [`StructuredQuery`] over a vector of catalog items and answers
/// with the same document shape Elasticsearch produces, including the nested
/// filter/terms aggregation layout. Used for local development and tests.
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{fields, CatalogItem, SortField, SortOrder},
    services::index::{
        query::{
            FacetRequest, Highlight, Matcher, SortKey, StructuredQuery, TermsFilter, TextMatch,
        },
        SearchIndex,
    },
};

/// Totals above this are reported as a lower bound, like Elasticsearch's
/// default `track_total_hits`
const TOTAL_HITS_CAP: usize = 10_000;

pub struct MemorySearchIndex {
    items: RwLock<Vec<CatalogItem>>,
}

impl MemorySearchIndex {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }
}

#[async_trait::async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn search(&self, query: &StructuredQuery) -> AppResult<Value> {
        let items = self.items.read().await;
        Ok(execute(&items, query))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

type Scored<'a> = (&'a CatalogItem, f64);

fn execute(items: &[CatalogItem], query: &StructuredQuery) -> Value {
    let restricted = items.iter().filter(|item| passes_restrictions(item, query));

    let mut matched: Vec<Scored> = match &query.matcher {
        Matcher::All => restricted.map(|item| (item, 1.0)).collect(),
        Matcher::Text(text) => restricted
            .filter_map(|item| text_score(item, text).map(|score| (item, score)))
            .collect(),
        Matcher::Vector(knn) => {
            let mut neighbours: Vec<Scored> = restricted
                .filter_map(|item| {
                    cosine(&item.embedding, &knn.vector).map(|c| (item, (1.0 + c) / 2.0))
                })
                .collect();
            neighbours.sort_by(|a, b| b.1.total_cmp(&a.1));
            neighbours.truncate(knn.k);
            neighbours
        }
    };

    for (item, score) in matched.iter_mut() {
        for boost in &query.boosts {
            let value = item.signal(boost.field).unwrap_or(0.0).max(0.0);
            *score += boost.factor * value.ln_1p();
        }
    }

    let aggregations: Map<String, Value> = query
        .facets
        .iter()
        .map(|facet| (facet.name.to_string(), facet_agg(&matched, query, facet)))
        .collect();

    let mut hits: Vec<Scored> = matched
        .into_iter()
        .filter(|(item, _)| query.filters.iter().all(|f| terms_match(item, f)))
        .collect();
    let total = hits.len();

    hits.sort_by(|a, b| compare_hits(a, b, &query.sort));

    let text = match &query.matcher {
        Matcher::Text(text) => Some(text),
        _ => None,
    };
    let page: Vec<Value> = hits
        .into_iter()
        .skip(query.from)
        .take(query.size)
        .map(|(item, score)| {
            let score = if query.scores_hits() {
                json!(score)
            } else {
                Value::Null
            };
            let mut hit = json!({
                "_id": item.item_id,
                "_score": score,
                "_source": item,
            });
            if let (Some(text), Some(highlight)) = (text, &query.highlight) {
                if let Some(fragments) = highlight_fields(item, text, highlight) {
                    hit["highlight"] = fragments;
                }
            }
            hit
        })
        .collect();

    let (value, relation) = if total > TOTAL_HITS_CAP {
        (TOTAL_HITS_CAP, "gte")
    } else {
        (total, "eq")
    };

    let mut response = json!({
        "took": 0,
        "hits": {
            "total": { "value": value, "relation": relation },
            "hits": page
        }
    });
    if !aggregations.is_empty() {
        response["aggregations"] = Value::Object(aggregations);
    }
    response
}

fn passes_restrictions(item: &CatalogItem, query: &StructuredQuery) -> bool {
    if query.exclude_ids.iter().any(|id| *id == item.item_id) {
        return false;
    }
    match query.year_range {
        Some(range) => item.release_year().is_some_and(|y| range.contains(y)),
        None => true,
    }
}

fn terms_match(item: &CatalogItem, filter: &TermsFilter) -> bool {
    filter
        .field
        .values_of(item)
        .iter()
        .any(|v| filter.values.iter().any(|wanted| wanted == v))
}

fn facet_agg(matched: &[Scored], query: &StructuredQuery, facet: &FacetRequest) -> Value {
    let scoped: Vec<&CatalogItem> = matched
        .iter()
        .map(|(item, _)| *item)
        .filter(|item| query.filters_excluding(facet.field).all(|f| terms_match(item, f)))
        .collect();

    let mut counts: HashMap<&str, u64> = HashMap::new();
    for item in &scoped {
        let distinct: BTreeSet<&str> = facet.field.values_of(item).into_iter().collect();
        for value in distinct {
            *counts.entry(value).or_default() += 1;
        }
    }

    let mut buckets: Vec<(&str, u64)> = counts.into_iter().collect();
    buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    buckets.truncate(facet.size);

    let buckets: Vec<Value> = buckets
        .into_iter()
        .map(|(key, count)| json!({ "key": key, "doc_count": count }))
        .collect();

    json!({
        "doc_count": scoped.len(),
        facet.name: { "buckets": buckets }
    })
}

fn compare_hits(a: &Scored, b: &Scored, keys: &[SortKey]) -> Ordering {
    if keys.is_empty() {
        return b.1.total_cmp(&a.1);
    }
    for key in keys {
        let ord = match key {
            SortKey::Score => b.1.total_cmp(&a.1),
            SortKey::Field { field, order } => compare_field(a.0, b.0, *field, *order),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn compare_field(
    a: &CatalogItem,
    b: &CatalogItem,
    field: SortField,
    order: SortOrder,
) -> Ordering {
    match field {
        SortField::Title => directed(a.title.cmp(&b.title), order),
        SortField::ReleaseDate => {
            missing_last(a.release_date, b.release_date, order, |x, y| x.cmp(y))
        }
        other => missing_last(
            a.signal(other.field_name()),
            b.signal(other.field_name()),
            order,
            |x, y| x.total_cmp(y),
        ),
    }
}

fn directed(ord: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

/// Documents without a value sort last in either direction
fn missing_last<T>(
    a: Option<T>,
    b: Option<T>,
    order: SortOrder,
    cmp: impl Fn(&T, &T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(cmp(&x, &y), order),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn field_texts<'a>(item: &'a CatalogItem, field: &str) -> Vec<&'a str> {
    match field {
        fields::TITLE => vec![item.title.as_str()],
        fields::DESCRIPTION => vec![item.description.as_str()],
        fields::CAST => item.cast.iter().map(String::as_str).collect(),
        fields::DIRECTOR => item.director.as_deref().into_iter().collect(),
        _ => Vec::new(),
    }
}

fn fuzzy_eq(query_token: &str, token: &str, text: &TextMatch) -> bool {
    if query_token == token {
        return true;
    }
    let max_edits = text.fuzziness.max_edits(query_token.chars().count());
    max_edits > 0 && levenshtein(query_token, token, max_edits) <= max_edits
}

/// Best-field score: the highest boosted count of matched query tokens
fn text_score(item: &CatalogItem, text: &TextMatch) -> Option<f64> {
    let query_tokens = tokens(&text.text);
    let best = text
        .fields
        .iter()
        .map(|weighted| {
            let field_tokens: Vec<String> = field_texts(item, weighted.field)
                .into_iter()
                .flat_map(tokens)
                .collect();
            let matched = query_tokens
                .iter()
                .filter(|q| field_tokens.iter().any(|t| fuzzy_eq(q, t, text)))
                .count();
            matched as f64 * f64::from(weighted.boost)
        })
        .fold(0.0, f64::max);

    (best > 0.0).then_some(best)
}

/// Edit distance, or `limit + 1` when the lengths alone already differ by
/// more than `limit`
fn levenshtein(a: &str, b: &str, limit: usize) -> usize {
    if a.chars().count().abs_diff(b.chars().count()) > limit {
        return limit + 1;
    }
    strsim::levenshtein(a, b)
}

fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

fn highlight_fields(
    item: &CatalogItem,
    text: &TextMatch,
    highlight: &Highlight,
) -> Option<Value> {
    let query_tokens = tokens(&text.text);
    let mut fragments = Map::new();

    for field in &highlight.fields {
        for value in field_texts(item, field) {
            let mut marked = false;
            let words: Vec<String> = value
                .split(' ')
                .map(|word| {
                    let core = word.trim_matches(|c: char| !c.is_alphanumeric());
                    let hit = !core.is_empty()
                        && query_tokens
                            .iter()
                            .any(|q| fuzzy_eq(q, &core.to_lowercase(), text));
                    if !hit {
                        return word.to_string();
                    }
                    marked = true;
                    let start = word.find(core).unwrap_or(0);
                    let end = start + core.len();
                    format!(
                        "{}{}{}{}{}",
                        &word[..start],
                        highlight.pre_tag,
                        core,
                        highlight.post_tag,
                        &word[end..]
                    )
                })
                .collect();
            if marked {
                fragments.insert(field.to_string(), json!([words.join(" ")]));
            }
        }
    }

    (!fragments.is_empty()).then_some(Value::Object(fragments))
}

//! Normalizes raw index responses into [`SearchResult`].
//!
//! Hit order is preserved exactly as the backend returned it. A hit whose
//! source cannot be decoded is skipped rather than failing the whole page.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::{
    error::{AppError, AppResult},
    models::{CatalogItem, FacetBucket, SearchHit, SearchResult, TotalHits},
};

#[derive(Deserialize)]
struct RawResponse {
    hits: RawHits,
    #[serde(default)]
    aggregations: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawHits {
    #[serde(default)]
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

/// Older clusters report a bare number, newer ones `{value, relation}`
#[derive(Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Count(u64),
    Tracked {
        value: u64,
        #[serde(default)]
        relation: Option<String>,
    },
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score", default)]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    highlight: Option<BTreeMap<String, Vec<String>>>,
}

/// Shapes a raw response document into a [`SearchResult`]
pub fn shape(raw: Value) -> AppResult<SearchResult> {
    let response: RawResponse = serde_json::from_value(raw).map_err(|e| {
        AppError::backend(
            "search_index.search",
            format!("Malformed search response: {}", e),
        )
    })?;

    let returned = response.hits.hits.len() as u64;
    let total = match response.hits.total {
        Some(RawTotal::Count(value)) => TotalHits { value, exact: true },
        Some(RawTotal::Tracked { value, relation }) => TotalHits {
            value,
            exact: relation.as_deref().unwrap_or("eq") == "eq",
        },
        None => TotalHits {
            value: returned,
            exact: true,
        },
    };

    let hits = response.hits.hits.into_iter().filter_map(shape_hit).collect();

    let facets = response
        .aggregations
        .iter()
        .filter_map(|(name, agg)| find_buckets(agg).map(|buckets| (name.clone(), buckets)))
        .map(|(name, buckets)| (name, buckets.iter().filter_map(bucket).collect()))
        .collect();

    Ok(SearchResult {
        total,
        hits,
        facets,
    })
}

fn shape_hit(hit: RawHit) -> Option<SearchHit> {
    let mut item: CatalogItem = match serde_json::from_value(hit.source) {
        Ok(item) => item,
        Err(e) => {
            tracing::warn!(item_id = %hit.id, error = %e, "Skipping undecodable search hit");
            return None;
        }
    };
    if item.item_id.is_empty() {
        item.item_id = hit.id.clone();
    }

    Some(SearchHit {
        item_id: hit.id,
        score: hit.score,
        item,
        highlight: hit.highlight.filter(|h| !h.is_empty()),
    })
}

/// Terms buckets may sit under any number of wrapping single-bucket
/// aggregations (a facet's `filter` agg, for instance)
fn find_buckets(agg: &Value) -> Option<&Vec<Value>> {
    let object = agg.as_object()?;
    if let Some(buckets) = object.get("buckets").and_then(Value::as_array) {
        return Some(buckets);
    }
    object
        .values()
        .filter(|v| v.is_object())
        .find_map(find_buckets)
}

fn bucket(raw: &Value) -> Option<FacetBucket> {
    let value = match raw.get("key_as_string").or_else(|| raw.get("key"))? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    let count = raw.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
    Some(FacetBucket { value, count })
}

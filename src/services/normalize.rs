//! Lenient normalization of raw search parameters.
//!
//! Malformed input is never rejected. Each rule below either drops the value
//! (it is then treated as absent) or substitutes a default:
//!
//! | input                                   | result                      |
//! |-----------------------------------------|-----------------------------|
//! | page missing, unparsable or < 1         | 1                           |
//! | size missing, unparsable or 0           | 10                          |
//! | size > 100                              | 100                         |
//! | filter value                            | split on `,`, trimmed       |
//! | empty / duplicate filter value          | dropped                     |
//! | value > 256 chars or control characters | dropped                     |
//! | filter on an unknown field              | dropped                     |
//! | unparsable year bound                   | absent                      |
//! | unknown sort field                      | relevance                   |
//! | `field` / `field:desc`                  | ascending / descending      |
//! | semantic `true`, `1`, `yes`, `on`       | true, anything else false   |
//! | whitespace-only query                   | absent                      |

use std::collections::BTreeMap;

use crate::models::{
    FilterField, Pagination, SearchParams, SearchRequest, SortField, SortMode, SortOrder,
};
use crate::models::search::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

const MAX_FILTER_VALUE_LEN: usize = 256;

/// Builds a [`SearchRequest`] from query-string parameters
pub fn search_request(params: &SearchParams) -> SearchRequest {
    let raw_filters = [
        ("genre", &params.genre),
        ("language", &params.language),
        ("content_rating", &params.content_rating),
        ("director", &params.director),
        ("cast", &params.cast),
    ];
    let filters = filter_map(
        raw_filters
            .into_iter()
            .filter_map(|(name, raw)| raw.as_deref().map(|raw| (name, raw.split(',')))),
    );

    SearchRequest {
        query: params
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string),
        semantic: params.semantic.as_deref().map(flag).unwrap_or(false),
        filters,
        year_from: params.year_from.as_deref().and_then(year),
        year_to: params.year_to.as_deref().and_then(year),
        sort: params.sort.as_deref().map(sort_mode).unwrap_or_default(),
        pagination: pagination(params.page.as_deref(), params.size.as_deref()),
    }
}

/// Filters keyed by field name. Unknown fields are dropped, as are fields
/// left without any usable value.
pub fn filter_map<'a, I, V>(raw: I) -> BTreeMap<FilterField, Vec<String>>
where
    I: IntoIterator<Item = (&'a str, V)>,
    V: IntoIterator,
    V::Item: AsRef<str>,
{
    let mut filters: BTreeMap<FilterField, Vec<String>> = BTreeMap::new();
    for (name, values) in raw {
        let Some(field) = FilterField::parse(name) else {
            tracing::debug!(field = %name, "Dropping filter on unknown field");
            continue;
        };
        let values = filter_values(values);
        if !values.is_empty() {
            filters.entry(field).or_default().extend(values);
        }
    }
    for values in filters.values_mut() {
        dedup_in_order(values);
    }
    filters
}

/// Cleans one field's values: trims, drops empty, oversized and control-character values,
/// removes duplicates while keeping first-seen order
pub fn filter_values<I>(values: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut cleaned: Vec<String> = values
        .into_iter()
        .filter_map(|v| {
            let v = v.as_ref().trim();
            let valid = !v.is_empty()
                && v.chars().count() <= MAX_FILTER_VALUE_LEN
                && !v.chars().any(char::is_control);
            valid.then(|| v.to_string())
        })
        .collect();
    dedup_in_order(&mut cleaned);
    cleaned
}

fn dedup_in_order(values: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    values.retain(|v| seen.insert(v.clone()));
}

fn flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn year(raw: &str) -> Option<i32> {
    raw.trim().parse::<i32>().ok().filter(|y| (1..=9999).contains(y))
}

fn sort_mode(raw: &str) -> SortMode {
    let (name, order) = match raw.trim().split_once(':') {
        Some((name, order)) => (name, order.trim().to_lowercase()),
        None => (raw.trim(), "asc".to_string()),
    };

    let order = match order.as_str() {
        "asc" => SortOrder::Asc,
        "desc" => SortOrder::Desc,
        _ => return SortMode::Relevance,
    };

    match SortField::parse(name) {
        Some(field) => SortMode::Field { field, order },
        None => SortMode::Relevance,
    }
}

pub fn pagination(page: Option<&str>, size: Option<&str>) -> Pagination {
    let page = page
        .and_then(|p| p.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1) as usize;
    let size = size
        .and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|s| *s >= 1)
        .unwrap_or(DEFAULT_PAGE_SIZE as i64) as usize;
    Pagination::new(page, size)
}

/// Result-count parameter for list endpoints: unparsable or 0 falls back to
/// `default`, anything above the page-size cap is capped
pub fn limit(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|n| *n >= 1)
        .map_or(default, |n| n as usize)
        .min(MAX_PAGE_SIZE)
}

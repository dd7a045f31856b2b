use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

use super::catalog::{fields, CatalogItem};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;
/// Deepest hit (`offset + size`) a page may reach
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// Categorical fields that accept term filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Genres,
    Language,
    ContentRating,
    Director,
    Cast,
}

impl FilterField {
    /// Index field the filter applies to
    pub fn field_name(&self) -> &'static str {
        match self {
            FilterField::Genres => fields::GENRES,
            FilterField::Language => fields::LANGUAGE,
            FilterField::ContentRating => fields::CONTENT_RATING,
            FilterField::Director => fields::DIRECTOR,
            FilterField::Cast => fields::CAST,
        }
    }

    /// Accepts both the index field name and the singular query-string name
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "genre" | "genres" => Some(FilterField::Genres),
            "language" | "languages" => Some(FilterField::Language),
            "content_rating" | "content_ratings" => Some(FilterField::ContentRating),
            "director" | "directors" => Some(FilterField::Director),
            "cast" => Some(FilterField::Cast),
            _ => None,
        }
    }

    /// Values an item carries for this field
    pub fn values_of<'a>(&self, item: &'a CatalogItem) -> Vec<&'a str> {
        match self {
            FilterField::Genres => item.genres.iter().map(String::as_str).collect(),
            FilterField::Cast => item.cast.iter().map(String::as_str).collect(),
            FilterField::Language => item.language.as_deref().into_iter().collect(),
            FilterField::ContentRating => item.content_rating.as_deref().into_iter().collect(),
            FilterField::Director => item.director.as_deref().into_iter().collect(),
        }
    }
}

impl Display for FilterField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.field_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Fields the index can sort on natively
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Title,
    ReleaseDate,
    PopularityScore,
    AverageRating,
    ImdbRating,
    Views,
}

impl SortField {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "title" => Some(SortField::Title),
            "release_date" | "year" => Some(SortField::ReleaseDate),
            "popularity_score" | "popularity" => Some(SortField::PopularityScore),
            "average_rating" | "rating" => Some(SortField::AverageRating),
            "imdb_rating" => Some(SortField::ImdbRating),
            "views" => Some(SortField::Views),
            _ => None,
        }
    }

    /// Index field to sort on. Titles sort on their keyword sub-field.
    pub fn field_name(&self) -> &'static str {
        match self {
            SortField::Title => fields::TITLE_KEYWORD,
            SortField::ReleaseDate => fields::RELEASE_DATE,
            SortField::PopularityScore => fields::POPULARITY_SCORE,
            SortField::AverageRating => fields::AVERAGE_RATING,
            SortField::ImdbRating => fields::IMDB_RATING,
            SortField::Views => fields::VIEWS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    /// Relevance score, then popularity
    #[default]
    Relevance,
    /// Index-native field sort, no relevance component
    Field { field: SortField, order: SortOrder },
}

/// 1-based page with a bounded, non-zero size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: usize,
    size: usize,
}

impl Pagination {
    /// Out-of-range values are clamped rather than rejected. The page is
    /// capped so that the last hit stays inside [`MAX_RESULT_WINDOW`].
    pub fn new(page: usize, size: usize) -> Self {
        let size = match size {
            0 => DEFAULT_PAGE_SIZE,
            s => s.min(MAX_PAGE_SIZE),
        };
        Self {
            page: page.clamp(1, MAX_RESULT_WINDOW / size),
            size,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.size)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, DEFAULT_PAGE_SIZE)
    }
}

/// Raw search parameters as they arrive from the query string.
///
/// Everything is optional text; `services::normalize` turns this into a
/// [`SearchRequest`]. Multi-valued filters are comma separated.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default, alias = "q")]
    pub query: Option<String>,
    #[serde(default)]
    pub semantic: Option<String>,
    #[serde(default, alias = "genres")]
    pub genre: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub content_rating: Option<String>,
    #[serde(default)]
    pub director: Option<String>,
    #[serde(default)]
    pub cast: Option<String>,
    #[serde(default)]
    pub year_from: Option<String>,
    #[serde(default)]
    pub year_to: Option<String>,
    #[serde(default)]
    pub sort: Option<String>,
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}

/// A normalized search request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub semantic: bool,
    /// Field → accepted values (any of)
    pub filters: BTreeMap<FilterField, Vec<String>>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    pub sort: SortMode,
    pub pagination: Pagination,
}

impl SearchRequest {
    /// Free text, if any non-whitespace text was given
    pub fn text(&self) -> Option<&str> {
        self.query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }

    /// Inclusive year range. Only applied when both bounds are present and ordered.
    pub fn year_range(&self) -> Option<(i32, i32)> {
        match (self.year_from, self.year_to) {
            (Some(from), Some(to)) if from <= to => Some((from, to)),
            _ => None,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_filter<I, S>(mut self, field: FilterField, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filters
            .insert(field, values.into_iter().map(Into::into).collect());
        self
    }
}

/// Total hit count; `exact` is false when the backend only reports a lower bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetBucket {
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub item_id: String,
    pub score: Option<f64>,
    pub item: CatalogItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub highlight: Option<BTreeMap<String, Vec<String>>>,
}

/// Backend-independent search response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub total: TotalHits,
    pub hits: Vec<SearchHit>,
    pub facets: BTreeMap<String, Vec<FacetBucket>>,
}

impl SearchResult {
    pub fn item_ids(&self) -> Vec<&str> {
        self.hits.iter().map(|h| h.item_id.as_str()).collect()
    }
}

//! Backend-neutral search request produced by the query planner.
//!
//! Backends translate this into their native query language (see
//! `elasticsearch::request_body`) or execute it directly (`MemorySearchIndex`).

use serde::Serialize;

use crate::models::{FilterField, SortField, SortOrder};

/// How documents are matched and scored
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Matcher {
    /// Every document, constant score
    #[default]
    All,
    Text(TextMatch),
    Vector(VectorMatch),
}

/// Multi-field fuzzy text match
#[derive(Debug, Clone, PartialEq)]
pub struct TextMatch {
    pub text: String,
    pub fields: Vec<WeightedField>,
    pub fuzziness: Fuzziness,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedField {
    pub field: &'static str,
    pub boost: f32,
}

impl WeightedField {
    pub fn new(field: &'static str, boost: f32) -> Self {
        Self { field, boost }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fuzziness {
    /// Edit tolerance grows with token length
    Auto,
}

impl Fuzziness {
    /// Maximum edit distance allowed for a token of `len` characters
    pub fn max_edits(&self, len: usize) -> usize {
        match self {
            Fuzziness::Auto => match len {
                0..=2 => 0,
                3..=5 => 1,
                _ => 2,
            },
        }
    }
}

/// Approximate nearest-neighbour search over a dense vector field (cosine)
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    pub field: &'static str,
    pub vector: Vec<f32>,
    /// Neighbours returned to the query phase
    pub k: usize,
    /// Candidates examined per shard
    pub num_candidates: usize,
}

/// "Any of" constraint on one categorical field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsFilter {
    pub field: FilterField,
    pub values: Vec<String>,
}

/// Inclusive release-year range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearRange {
    pub from: i32,
    pub to: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.from..=self.to).contains(&year)
    }
}

/// Adds `factor * log1p(field)` to the score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldValueBoost {
    pub field: &'static str,
    pub factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Score,
    Field { field: SortField, order: SortOrder },
}

/// A terms aggregation over one categorical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacetRequest {
    pub name: &'static str,
    pub field: FilterField,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub fields: Vec<&'static str>,
    pub pre_tag: String,
    pub post_tag: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructuredQuery {
    pub matcher: Matcher,
    /// Field filters, ANDed. Each facet ignores the filter on its own field.
    pub filters: Vec<TermsFilter>,
    pub year_range: Option<YearRange>,
    pub exclude_ids: Vec<String>,
    pub boosts: Vec<FieldValueBoost>,
    /// Empty means the backend's native relevance order
    pub sort: Vec<SortKey>,
    pub from: usize,
    pub size: usize,
    pub facets: Vec<FacetRequest>,
    pub highlight: Option<Highlight>,
}

impl StructuredQuery {
    pub fn vector(&self) -> Option<&VectorMatch> {
        match &self.matcher {
            Matcher::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn filter_on(&self, field: FilterField) -> Option<&TermsFilter> {
        self.filters.iter().find(|f| f.field == field)
    }

    /// Filters a facet over `field` is computed with
    pub fn filters_excluding(&self, field: FilterField) -> impl Iterator<Item = &TermsFilter> {
        self.filters.iter().filter(move |f| f.field != field)
    }

    /// Whether hits carry a relevance score
    pub fn scores_hits(&self) -> bool {
        self.sort.is_empty() || self.sort.contains(&SortKey::Score)
    }
}

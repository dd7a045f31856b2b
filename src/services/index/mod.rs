/// Search index abstraction
///
/// The planner emits a backend-neutral [`StructuredQuery`]; each index
/// executes it and hands back its raw response document, which the result
/// shaper normalizes. Swapping the backend does not change any caller.
use crate::error::AppResult;

pub mod elasticsearch;
pub mod memory;
pub mod query;

pub use elasticsearch::ElasticsearchIndex;
pub use memory::MemorySearchIndex;
pub use query::{
    FacetRequest, FieldValueBoost, Fuzziness, Highlight, Matcher, SortKey, StructuredQuery,
    TermsFilter, TextMatch, VectorMatch, WeightedField, YearRange,
};

/// Trait for search backends
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SearchIndex: Send + Sync {
    /// Executes a planned query
    ///
    /// Returns the raw response as a generic JSON document: `hits.total`,
    /// `hits.hits[]` (`_id`, `_score`, `_source`, `highlight`) and
    /// `aggregations`.
    async fn search(&self, query: &StructuredQuery) -> AppResult<serde_json::Value>;

    /// Backend name for logging and debugging
    fn name(&self) -> &'static str;
}

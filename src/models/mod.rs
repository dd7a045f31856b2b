pub mod catalog;
pub mod search;
pub mod trending;

pub use catalog::{fields, CatalogItem, EMBEDDING_DIMS};
pub use search::{
    FacetBucket, FilterField, Pagination, SearchHit, SearchParams, SearchRequest, SearchResult,
    SortField, SortMode, SortOrder, TotalHits,
};
pub use trending::{BucketId, CounterRow, TrendingEntry};

use std::sync::Arc;
use tracing::instrument;

use crate::{
    error::AppResult,
    models::{SearchRequest, SearchResult},
    services::{index::SearchIndex, planner::QueryPlanner, shaper},
};

/// Plans, executes and shapes catalog searches
pub struct SearchService {
    planner: QueryPlanner,
    index: Arc<dyn SearchIndex>,
}

impl SearchService {
    pub fn new(planner: QueryPlanner, index: Arc<dyn SearchIndex>) -> Self {
        Self { planner, index }
    }

    #[instrument(skip(self, request), fields(backend = self.index.name()))]
    pub async fn search(&self, request: &SearchRequest) -> AppResult<SearchResult> {
        let query = self.planner.plan(request).await?;
        let raw = self.index.search(&query).await?;
        let result = shaper::shape(raw)?;

        tracing::info!(
            total = result.total.value,
            returned = result.hits.len(),
            semantic = request.semantic,
            "Search completed"
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{CatalogItem, FilterField, Pagination};
    use crate::services::embedding::MockEmbedder;
    use crate::services::index::{MemorySearchIndex, MockSearchIndex};
    use crate::services::planner::DEFAULT_OVERFETCH;
    use chrono::NaiveDate;

    fn planner() -> QueryPlanner {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().never();
        QueryPlanner::new(Arc::new(embedder), DEFAULT_OVERFETCH)
    }

    fn movie(n: usize, genres: &[&str], language: &str, year: i32) -> CatalogItem {
        CatalogItem {
            item_id: format!("mov_{}", n),
            title: format!("Movie {}", n),
            genres: genres.iter().map(|g| g.to_string()).collect(),
            language: Some(language.to_string()),
            release_date: NaiveDate::from_ymd_opt(year, 6, 1),
            popularity_score: n as f64,
            ..Default::default()
        }
    }

    fn catalog() -> Vec<CatalogItem> {
        vec![
            movie(1, &["Action"], "English", 2009),
            movie(2, &["Action", "Drama"], "English", 2010),
            movie(3, &["Drama"], "French", 2011),
            movie(4, &["Comedy"], "English", 2012),
            movie(5, &["Action"], "French", 2013),
        ]
    }

    #[tokio::test]
    async fn test_filters_are_any_of_within_and_across_fields() {
        let service = SearchService::new(planner(), Arc::new(MemorySearchIndex::new(catalog())));

        let request = SearchRequest::default()
            .with_filter(FilterField::Genres, ["Action", "Drama"])
            .with_filter(FilterField::Language, ["English"]);
        let result = service.search(&request).await.unwrap();

        let mut ids = result.item_ids();
        ids.sort();
        assert_eq!(ids, vec!["mov_1", "mov_2"]);
        assert_eq!(result.total.value, 2);
    }

    #[tokio::test]
    async fn test_year_range_is_inclusive() {
        let service = SearchService::new(planner(), Arc::new(MemorySearchIndex::new(catalog())));

        let request = SearchRequest {
            year_from: Some(2010),
            year_to: Some(2012),
            ..Default::default()
        };
        let result = service.search(&request).await.unwrap();

        let mut ids = result.item_ids();
        ids.sort();
        assert_eq!(ids, vec!["mov_2", "mov_3", "mov_4"]);
    }

    #[tokio::test]
    async fn test_empty_query_facets_cover_catalog() {
        let service = SearchService::new(planner(), Arc::new(MemorySearchIndex::new(catalog())));

        let result = service.search(&SearchRequest::default()).await.unwrap();

        let languages: u64 = result.facets["language"].iter().map(|b| b.count).sum();
        assert_eq!(languages, 5);
        assert_eq!(result.total.value, 5);
        assert!(result.total.exact);
    }

    #[tokio::test]
    async fn test_default_sort_breaks_ties_on_popularity() {
        let service = SearchService::new(planner(), Arc::new(MemorySearchIndex::new(catalog())));

        let result = service.search(&SearchRequest::default()).await.unwrap();
        assert_eq!(
            result.item_ids(),
            vec!["mov_5", "mov_4", "mov_3", "mov_2", "mov_1"]
        );
    }

    #[tokio::test]
    async fn test_pages_do_not_overlap() {
        let items: Vec<CatalogItem> = (1..=25)
            .map(|n| movie(n, &["Drama"], "English", 2000))
            .collect();
        let service = SearchService::new(planner(), Arc::new(MemorySearchIndex::new(items)));

        let first = SearchRequest {
            pagination: Pagination::new(1, 10),
            ..Default::default()
        };
        let second = SearchRequest {
            pagination: Pagination::new(2, 10),
            ..Default::default()
        };
        let first = service.search(&first).await.unwrap();
        let second = service.search(&second).await.unwrap();

        assert_eq!(first.hits.len(), 10);
        assert_eq!(second.hits.len(), 10);
        assert!(first
            .item_ids()
            .iter()
            .all(|id| !second.item_ids().contains(id)));
        assert_eq!(second.total.value, 25);
    }

    #[tokio::test]
    async fn test_index_failure_is_surfaced() {
        let mut index = MockSearchIndex::new();
        index.expect_name().return_const("mock");
        index
            .expect_search()
            .returning(|_| Err(AppError::backend("search_index.search", "connection refused")));
        let service = SearchService::new(planner(), Arc::new(index));

        let err = tokio_test::assert_err!(service.search(&SearchRequest::default()).await);
        assert_eq!(err.operation(), Some("search_index.search"));
    }
}

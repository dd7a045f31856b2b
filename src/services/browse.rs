use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::{Cache, CacheKey},
    error::AppResult,
    models::{fields, CatalogItem, FilterField, Pagination, SearchResult, SortField, SortOrder},
    services::{
        index::{FacetRequest, FieldValueBoost, SearchIndex, SortKey, StructuredQuery, TermsFilter},
        normalize, shaper,
    },
};

const GENRE_LIST_SIZE: usize = 100;

/// Catalog browsing that needs no free text: the genre list, per-genre pages
/// and the signal-based popularity ranking
pub struct BrowseService {
    index: Arc<dyn SearchIndex>,
    cache: Option<Cache>,
    cache_ttl: u64,
}

impl BrowseService {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            cache: None,
            cache_ttl: 0,
        }
    }

    pub fn with_cache(mut self, cache: Cache, ttl_secs: u64) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl_secs;
        self
    }

    /// Every distinct genre, most common first
    pub async fn genres(&self) -> AppResult<Vec<String>> {
        crate::cached!(
            self.cache.as_ref(),
            CacheKey::Genres,
            self.cache_ttl,
            self.load_genres()
        )
    }

    async fn load_genres(&self) -> AppResult<Vec<String>> {
        let query = StructuredQuery {
            size: 0,
            facets: vec![FacetRequest {
                name: "genres",
                field: FilterField::Genres,
                size: GENRE_LIST_SIZE,
            }],
            ..Default::default()
        };

        let mut result = shaper::shape(self.index.search(&query).await?)?;
        let genres = result
            .facets
            .remove("genres")
            .unwrap_or_default()
            .into_iter()
            .map(|bucket| bucket.value)
            .collect();
        Ok(genres)
    }

    /// One page of a genre, most popular first. A blank or invalid genre
    /// applies no filter.
    #[instrument(skip(self, pagination), fields(page = pagination.page()))]
    pub async fn by_genre(&self, genre: &str, pagination: Pagination) -> AppResult<SearchResult> {
        let values = normalize::filter_values([genre]);
        let filters = if values.is_empty() {
            Vec::new()
        } else {
            vec![TermsFilter {
                field: FilterField::Genres,
                values,
            }]
        };
        let query = StructuredQuery {
            filters,
            sort: vec![
                SortKey::Field {
                    field: SortField::PopularityScore,
                    order: SortOrder::Desc,
                },
                SortKey::Score,
            ],
            from: pagination.offset(),
            size: pagination.size(),
            ..Default::default()
        };

        shaper::shape(self.index.search(&query).await?)
    }

    /// Items ranked by `0.5·log1p(views) + 0.5·log1p(average_rating)`
    pub async fn popular(&self, size: usize) -> AppResult<Vec<CatalogItem>> {
        let query = StructuredQuery {
            boosts: vec![
                FieldValueBoost {
                    field: fields::VIEWS,
                    factor: 0.5,
                },
                FieldValueBoost {
                    field: fields::AVERAGE_RATING,
                    factor: 0.5,
                },
            ],
            size,
            ..Default::default()
        };

        let result = shaper::shape(self.index.search(&query).await?)?;
        Ok(result.hits.into_iter().map(|hit| hit.item).collect())
    }
}

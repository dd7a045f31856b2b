use std::sync::Arc;
use tracing::instrument;

use crate::{
    db::{Cache, CacheKey, CatalogStore},
    error::AppResult,
    models::{CatalogItem, FilterField},
    services::{
        index::{SearchIndex, StructuredQuery, TermsFilter},
        normalize, shaper,
    },
};

pub const DEFAULT_RECOMMENDATIONS: usize = 5;

/// Content-based recommendations: items sharing at least one genre with the
/// seed, in the index's native relevance order. No rating or popularity
/// weighting is applied.
pub struct RecommendationEngine {
    catalog: Arc<dyn CatalogStore>,
    index: Arc<dyn SearchIndex>,
    cache: Option<Cache>,
    cache_ttl: u64,
}

impl RecommendationEngine {
    pub fn new(catalog: Arc<dyn CatalogStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self {
            catalog,
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

    /// Up to `k` items similar to `seed_id`, never including the seed itself.
    /// An unknown seed or a seed without genres yields an empty list.
    pub async fn recommend(&self, seed_id: &str, k: usize) -> AppResult<Vec<CatalogItem>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let key = CacheKey::Recommendations {
            item_id: seed_id.to_string(),
            k,
        };
        crate::cached!(self.cache.as_ref(), key, self.cache_ttl, self.compute(seed_id, k))
    }

    #[instrument(skip(self))]
    async fn compute(&self, seed_id: &str, k: usize) -> AppResult<Vec<CatalogItem>> {
        let Some(seed) = self.catalog.get_by_id(seed_id).await? else {
            tracing::debug!(seed_id = %seed_id, "Recommendation seed not in catalog");
            return Ok(Vec::new());
        };

        let genres = normalize::filter_values(&seed.genres);
        if genres.is_empty() {
            return Ok(Vec::new());
        }

        let query = StructuredQuery {
            filters: vec![TermsFilter {
                field: FilterField::Genres,
                values: genres,
            }],
            exclude_ids: vec![seed_id.to_string()],
            size: k,
            ..Default::default()
        };

        let result = shaper::shape(self.index.search(&query).await?)?;
        let items: Vec<CatalogItem> = result
            .hits
            .into_iter()
            .filter(|hit| hit.item_id != seed_id)
            .map(|hit| hit.item)
            .take(k)
            .collect();

        tracing::info!(seed_id = %seed_id, returned = items.len(), "Generated recommendations");
        Ok(items)
    }
}

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::instrument;

use crate::{
    db::catalog::CatalogStore,
    error::{AppResult, BackendContext},
    models::CatalogItem,
};

/// Creates a PostgreSQL connection pool and applies pending migrations
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

const ITEM_COLUMNS: &str = r#"item_id, title, description, release_date, runtime_minutes,
    budget, revenue, genres, production_companies, "cast", director, keywords,
    language, content_rating, streaming_url, trailer_url, poster_url,
    imdb_rating, popularity_score, average_rating, views"#;

/// Catalog records stored in the `catalog_items` table
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    #[instrument(skip(self))]
    async fn get_by_id(&self, item_id: &str) -> AppResult<Option<CatalogItem>> {
        let sql = format!("SELECT {} FROM catalog_items WHERE item_id = $1", ITEM_COLUMNS);
        sqlx::query_as::<_, CatalogItem>(&sql)
            .bind(item_id)
            .fetch_optional(&self.pool)
            .await
            .during("catalog.get_by_id")
    }

    async fn count(&self) -> AppResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_items")
            .fetch_one(&self.pool)
            .await
            .during("catalog.count")?;
        Ok(count.max(0) as u64)
    }
}

use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::{error::AppResult, models::CatalogItem};

/// Trait for the canonical catalog record store
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_by_id(&self, item_id: &str) -> AppResult<Option<CatalogItem>>;

    async fn count(&self) -> AppResult<u64>;
}

/// In-process catalog keyed by item id
#[derive(Default)]
pub struct MemoryCatalog {
    items: RwLock<HashMap<String, CatalogItem>>,
}

impl MemoryCatalog {
    pub fn new(items: impl IntoIterator<Item = CatalogItem>) -> Self {
        Self {
            items: RwLock::new(
                items
                    .into_iter()
                    .map(|item| (item.item_id.clone(), item))
                    .collect(),
            ),
        }
    }

    pub async fn insert(&self, item: CatalogItem) {
        self.items.write().await.insert(item.item_id.clone(), item);
    }
}

#[async_trait::async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_by_id(&self, item_id: &str) -> AppResult<Option<CatalogItem>> {
        Ok(self.items.read().await.get(item_id).cloned())
    }

    async fn count(&self) -> AppResult<u64> {
        Ok(self.items.read().await.len() as u64)
    }
}

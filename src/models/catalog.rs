use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Field names shared by the catalog table and the search index mapping.
pub mod fields {
    pub const ITEM_ID: &str = "item_id";
    pub const TITLE: &str = "title";
    pub const TITLE_KEYWORD: &str = "title.keyword";
    pub const DESCRIPTION: &str = "description";
    pub const RELEASE_DATE: &str = "release_date";
    pub const GENRES: &str = "genres";
    pub const CAST: &str = "cast";
    pub const DIRECTOR: &str = "director";
    pub const LANGUAGE: &str = "language";
    pub const CONTENT_RATING: &str = "content_rating";
    pub const IMDB_RATING: &str = "imdb_rating";
    pub const POPULARITY_SCORE: &str = "popularity_score";
    pub const AVERAGE_RATING: &str = "average_rating";
    pub const VIEWS: &str = "views";
    pub const EMBEDDING: &str = "embedding";
}

/// Dimension of item and query embeddings
pub const EMBEDDING_DIMS: usize = 384;

/// A movie in the catalog.
///
/// The relational store and the search index agree on `item_id`. Decoding is
/// lenient (every field has a default) because index documents may be sparse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(default)]
pub struct CatalogItem {
    pub item_id: String,
    pub title: String,
    pub description: String,
    pub release_date: Option<NaiveDate>,
    pub runtime_minutes: Option<i32>,
    pub budget: Option<f64>,
    pub revenue: Option<f64>,
    pub genres: Vec<String>,
    pub production_companies: Vec<String>,
    pub cast: Vec<String>,
    pub director: Option<String>,
    pub keywords: Vec<String>,
    pub language: Option<String>,
    pub content_rating: Option<String>,
    pub streaming_url: Option<String>,
    pub trailer_url: Option<String>,
    pub poster_url: Option<String>,
    pub imdb_rating: Option<f64>,
    pub popularity_score: f64,
    pub average_rating: f64,
    pub views: i64,
    /// Precomputed description embedding; lives in the search index only
    #[serde(skip_serializing)]
    #[sqlx(skip)]
    pub embedding: Vec<f32>,
}

impl CatalogItem {
    pub fn release_year(&self) -> Option<i32> {
        self.release_date.map(|d| d.year())
    }

    /// Numeric signal by index field name, used for sorting and boosting
    pub fn signal(&self, field: &str) -> Option<f64> {
        match field {
            fields::POPULARITY_SCORE => Some(self.popularity_score),
            fields::AVERAGE_RATING => Some(self.average_rating),
            fields::VIEWS => Some(self.views as f64),
            fields::IMDB_RATING => self.imdb_rating,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_is_not_serialized() {
        let item = CatalogItem {
            item_id: "mov_1".to_string(),
            title: "The Last Lost Kingdom".to_string(),
            embedding: vec![0.1; EMBEDDING_DIMS],
            ..Default::default()
        };

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["item_id"], "mov_1");
        assert!(json.get("embedding").is_none());
    }

    #[test]
    fn test_sparse_document_decodes_with_defaults() {
        let json = r#"{
            "item_id": "mov_9",
            "title": "Beyond the Golden Ocean",
            "release_date": "2014-03-07",
            "genres": ["Drama", "Adventure"]
        }"#;

        let item: CatalogItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.item_id, "mov_9");
        assert_eq!(item.release_year(), Some(2014));
        assert_eq!(item.genres, vec!["Drama", "Adventure"]);
        assert!(item.cast.is_empty());
        assert_eq!(item.views, 0);
    }

    #[test]
    fn test_signal_lookup() {
        let item = CatalogItem {
            popularity_score: 42.5,
            views: 1200,
            ..Default::default()
        };

        assert_eq!(item.signal(fields::POPULARITY_SCORE), Some(42.5));
        assert_eq!(item.signal(fields::VIEWS), Some(1200.0));
        assert_eq!(item.signal(fields::IMDB_RATING), None);
        assert_eq!(item.signal("budget"), None);
    }
}

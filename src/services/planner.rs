use std::sync::Arc;
use tracing::instrument;

use crate::{
    error::AppResult,
    models::{fields, FilterField, SearchRequest, SortField, SortMode, SortOrder},
    services::{
        embedding::{check_dimensions, Embedder},
        index::{
            FacetRequest, Fuzziness, Highlight, Matcher, SortKey, StructuredQuery, TermsFilter,
            TextMatch, VectorMatch, WeightedField, YearRange,
        },
        normalize,
    },
};

/// Facets requested with every search, whatever filters are active
pub const FACETS: [FacetRequest; 4] = [
    FacetRequest {
        name: "genres",
        field: FilterField::Genres,
        size: 20,
    },
    FacetRequest {
        name: "language",
        field: FilterField::Language,
        size: 10,
    },
    FacetRequest {
        name: "content_rating",
        field: FilterField::ContentRating,
        size: 10,
    },
    FacetRequest {
        name: "director",
        field: FilterField::Director,
        size: 20,
    },
];

pub const DEFAULT_OVERFETCH: usize = 10;

/// Upper bound Elasticsearch accepts for `k` and `num_candidates`
const MAX_KNN_CANDIDATES: usize = 10_000;

pub const HIGHLIGHT_PRE_TAG: &str = "<mark>";
pub const HIGHLIGHT_POST_TAG: &str = "</mark>";

/// Turns a normalized [`SearchRequest`] into a hybrid [`StructuredQuery`].
///
/// - no text: match everything
/// - text: fuzzy multi-field match (title boosted ×3)
/// - text + semantic: nearest-neighbour search on the query embedding,
///   over-fetching so post-filtering does not starve the page
pub struct QueryPlanner {
    embedder: Arc<dyn Embedder>,
    overfetch: usize,
}

impl QueryPlanner {
    pub fn new(embedder: Arc<dyn Embedder>, overfetch: usize) -> Self {
        Self {
            embedder,
            overfetch: overfetch.max(1),
        }
    }

    #[instrument(
        skip(self, request),
        fields(semantic = request.semantic, page = request.pagination.page())
    )]
    pub async fn plan(&self, request: &SearchRequest) -> AppResult<StructuredQuery> {
        let pagination = request.pagination;

        let matcher = match request.text() {
            None => Matcher::All,
            Some(text) if request.semantic => {
                let vector = check_dimensions(self.embedder.embed(text).await?)?;
                let window = pagination.offset().saturating_add(pagination.size());
                let k = window
                    .saturating_mul(self.overfetch)
                    .min(MAX_KNN_CANDIDATES);
                Matcher::Vector(VectorMatch {
                    field: fields::EMBEDDING,
                    vector,
                    k,
                    num_candidates: k.saturating_mul(2).min(MAX_KNN_CANDIDATES),
                })
            }
            Some(text) => Matcher::Text(TextMatch {
                text: text.to_string(),
                fields: lexical_fields(),
                fuzziness: Fuzziness::Auto,
            }),
        };

        let filters: Vec<TermsFilter> = request
            .filters
            .iter()
            .filter_map(|(field, values)| {
                let values = normalize::filter_values(values);
                (!values.is_empty()).then_some(TermsFilter {
                    field: *field,
                    values,
                })
            })
            .collect();

        let sort = match request.sort {
            SortMode::Relevance => vec![
                SortKey::Score,
                SortKey::Field {
                    field: SortField::PopularityScore,
                    order: SortOrder::Desc,
                },
            ],
            SortMode::Field { field, order } => vec![SortKey::Field { field, order }],
        };

        let highlight = request.text().map(|_| Highlight {
            fields: vec![fields::TITLE, fields::DESCRIPTION],
            pre_tag: HIGHLIGHT_PRE_TAG.to_string(),
            post_tag: HIGHLIGHT_POST_TAG.to_string(),
        });

        let query = StructuredQuery {
            matcher,
            filters,
            year_range: request
                .year_range()
                .map(|(from, to)| YearRange { from, to }),
            exclude_ids: Vec::new(),
            boosts: Vec::new(),
            sort,
            from: pagination.offset(),
            size: pagination.size(),
            facets: FACETS.to_vec(),
            highlight,
        };

        tracing::debug!(
            filters = query.filters.len(),
            year_range = query.year_range.is_some(),
            vector = query.vector().is_some(),
            "Planned search"
        );

        Ok(query)
    }
}

fn lexical_fields() -> Vec<WeightedField> {
    vec![
        WeightedField::new(fields::TITLE, 3.0),
        WeightedField::new(fields::DESCRIPTION, 1.0),
        WeightedField::new(fields::CAST, 1.0),
        WeightedField::new(fields::DIRECTOR, 1.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Pagination, EMBEDDING_DIMS};
    use crate::services::embedding::MockEmbedder;

    fn planner_without_embedder() -> QueryPlanner {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().never();
        QueryPlanner::new(Arc::new(embedder), DEFAULT_OVERFETCH)
    }

    #[tokio::test]
    async fn test_empty_request_matches_everything() {
        let query = planner_without_embedder()
            .plan(&SearchRequest::default())
            .await
            .unwrap();

        assert_eq!(query.matcher, Matcher::All);
        assert!(query.filters.is_empty());
        assert_eq!(query.year_range, None);
        assert_eq!(query.highlight, None);
        assert_eq!(query.from, 0);
        assert_eq!(query.size, 10);
    }

    #[tokio::test]
    async fn test_facets_always_requested() {
        let request = SearchRequest::default().with_filter(FilterField::Genres, ["Action"]);
        let query = planner_without_embedder().plan(&request).await.unwrap();

        let facets: Vec<(&str, usize)> = query.facets.iter().map(|f| (f.name, f.size)).collect();
        assert_eq!(
            facets,
            vec![
                ("genres", 20),
                ("language", 10),
                ("content_rating", 10),
                ("director", 20)
            ]
        );
    }

    #[tokio::test]
    async fn test_lexical_query_never_embeds() {
        let request = SearchRequest::default().with_query("lost kingdom");
        let query = planner_without_embedder().plan(&request).await.unwrap();

        match query.matcher {
            Matcher::Text(text) => {
                assert_eq!(text.text, "lost kingdom");
                assert_eq!(text.fuzziness, Fuzziness::Auto);
                assert_eq!(text.fields[0], WeightedField::new(fields::TITLE, 3.0));
                let names: Vec<&str> = text.fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["title", "description", "cast", "director"]);
            }
            other => panic!("expected text matcher, got {:?}", other),
        }

        let highlight = query.highlight.unwrap();
        assert_eq!(highlight.fields, vec!["title", "description"]);
        assert_eq!(highlight.pre_tag, "<mark>");
    }

    #[tokio::test]
    async fn test_semantic_query_embeds_once_with_384_dims() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().times(1).returning(|text| {
            assert_eq!(text, "lost kingdom");
            Ok(vec![0.25; EMBEDDING_DIMS])
        });
        let planner = QueryPlanner::new(Arc::new(embedder), DEFAULT_OVERFETCH);

        let mut request = SearchRequest::default().with_query("lost kingdom");
        request.semantic = true;

        let query = planner.plan(&request).await.unwrap();
        let knn = query.vector().unwrap();

        assert_eq!(knn.vector.len(), 384);
        assert_eq!(knn.field, "embedding");
        assert_eq!(knn.k, 100);
        assert!(knn.num_candidates >= knn.k);
        assert!(query.highlight.is_some());
    }

    #[tokio::test]
    async fn test_semantic_overfetch_covers_later_pages() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Ok(vec![0.1; EMBEDDING_DIMS]));
        let planner = QueryPlanner::new(Arc::new(embedder), 10);

        let mut request = SearchRequest::default().with_query("galaxy");
        request.semantic = true;
        request.pagination = Pagination::new(3, 20);

        let query = planner.plan(&request).await.unwrap();
        assert_eq!(query.vector().unwrap().k, 600);
        assert_eq!(query.from, 40);
    }

    #[tokio::test]
    async fn test_semantic_flag_without_text_never_embeds() {
        let mut request = SearchRequest::default();
        request.semantic = true;

        let query = planner_without_embedder().plan(&request).await.unwrap();
        assert_eq!(query.matcher, Matcher::All);
    }

    #[tokio::test]
    async fn test_embedder_failure_is_surfaced() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(AppError::backend("embedding.embed", "connection refused")));
        let planner = QueryPlanner::new(Arc::new(embedder), DEFAULT_OVERFETCH);

        let mut request = SearchRequest::default().with_query("lost kingdom");
        request.semantic = true;

        let err = planner.plan(&request).await.unwrap_err();
        assert_eq!(err.operation(), Some("embedding.embed"));
    }

    #[tokio::test]
    async fn test_wrong_dimension_vector_is_rejected() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().returning(|_| Ok(vec![0.1; 12]));
        let planner = QueryPlanner::new(Arc::new(embedder), DEFAULT_OVERFETCH);

        let mut request = SearchRequest::default().with_query("lost kingdom");
        request.semantic = true;

        assert!(planner.plan(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_multi_valued_filter_is_any_of_and_across_fields() {
        let request = SearchRequest::default()
            .with_filter(FilterField::Genres, ["Action", "Drama"])
            .with_filter(FilterField::Language, ["English"]);

        let query = planner_without_embedder().plan(&request).await.unwrap();

        assert_eq!(query.filters.len(), 2);
        assert_eq!(
            query.filter_on(FilterField::Genres).unwrap().values,
            vec!["Action", "Drama"]
        );
        assert_eq!(
            query.filter_on(FilterField::Language).unwrap().values,
            vec!["English"]
        );
    }

    #[tokio::test]
    async fn test_empty_filter_values_are_dropped() {
        let request = SearchRequest::default()
            .with_filter(FilterField::Director, ["  ", ""])
            .with_filter(FilterField::Genres, ["Horror"]);

        let query = planner_without_embedder().plan(&request).await.unwrap();

        assert!(query.filter_on(FilterField::Director).is_none());
        assert!(query.filter_on(FilterField::Genres).is_some());
    }

    #[tokio::test]
    async fn test_single_year_bound_yields_no_range() {
        let request = SearchRequest {
            year_from: Some(2010),
            ..Default::default()
        };
        let query = planner_without_embedder().plan(&request).await.unwrap();
        assert_eq!(query.year_range, None);

        let request = SearchRequest {
            year_to: Some(2010),
            ..Default::default()
        };
        let query = planner_without_embedder().plan(&request).await.unwrap();
        assert_eq!(query.year_range, None);
    }

    #[tokio::test]
    async fn test_both_year_bounds_yield_inclusive_range() {
        let request = SearchRequest {
            year_from: Some(2010),
            year_to: Some(2012),
            ..Default::default()
        };
        let query = planner_without_embedder().plan(&request).await.unwrap();
        assert_eq!(
            query.year_range,
            Some(YearRange {
                from: 2010,
                to: 2012
            })
        );
    }

    #[tokio::test]
    async fn test_default_sort_is_score_then_popularity() {
        let query = planner_without_embedder()
            .plan(&SearchRequest::default())
            .await
            .unwrap();

        assert_eq!(
            query.sort,
            vec![
                SortKey::Score,
                SortKey::Field {
                    field: SortField::PopularityScore,
                    order: SortOrder::Desc
                }
            ]
        );
    }

    #[tokio::test]
    async fn test_field_sort_drops_relevance() {
        let request = SearchRequest {
            sort: SortMode::Field {
                field: SortField::ReleaseDate,
                order: SortOrder::Asc,
            },
            ..Default::default()
        };
        let query = planner_without_embedder().plan(&request).await.unwrap();

        assert_eq!(
            query.sort,
            vec![SortKey::Field {
                field: SortField::ReleaseDate,
                order: SortOrder::Asc
            }]
        );
        assert!(!query.scores_hits());
    }
}

/// Elasticsearch backend
///
/// Talks to the cluster over its REST API. Planned queries are rendered into
/// the query DSL by [`request_body`]:
///
/// - lexical text → `multi_match` with `fuzziness: AUTO`
/// - semantic text → top-level `knn` on the `dense_vector` field
/// - field filters → `post_filter`, so each facet aggregation can drop the
///   filter on its own field
/// - year range and id exclusions → main query (or the `knn` pre-filter)
use reqwest::{Client as HttpClient, Method, RequestBuilder};
use serde_json::{json, Map, Value};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult, BackendContext},
    models::{fields, EMBEDDING_DIMS},
    services::index::{
        query::{FacetRequest, Matcher, SortKey, StructuredQuery, TermsFilter, TextMatch},
        SearchIndex,
    },
};

#[derive(Clone)]
pub struct ElasticsearchIndex {
    http_client: HttpClient,
    base_url: String,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl ElasticsearchIndex {
    pub fn new(
        base_url: String,
        index: String,
        username: Option<String>,
        password: Option<String>,
        accept_invalid_certs: bool,
    ) -> AppResult<Self> {
        let http_client = HttpClient::builder()
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .during("search_index.connect")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index,
            username,
            password,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}{}", self.base_url, self.index, path);
        let builder = self.http_client.request(method, url);
        match &self.username {
            Some(username) => builder.basic_auth(username, self.password.as_ref()),
            None => builder,
        }
    }

    /// Creates the catalog index with its mapping if it does not exist yet
    pub async fn ensure_index(&self) -> AppResult<()> {
        let exists = self
            .request(Method::HEAD, "")
            .send()
            .await
            .during("search_index.exists")?;

        if exists.status().is_success() {
            tracing::info!(index = %self.index, "Search index present");
            return Ok(());
        }

        let response = self
            .request(Method::PUT, "")
            .json(&index_mapping())
            .send()
            .await
            .during("search_index.create")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::backend(
                "search_index.create",
                format!("Elasticsearch returned status {}: {}", status, body),
            ));
        }

        tracing::info!(index = %self.index, "Search index created");
        Ok(())
    }
}

#[async_trait::async_trait]
impl SearchIndex for ElasticsearchIndex {
    #[instrument(skip(self, query), fields(index = %self.index))]
    async fn search(&self, query: &StructuredQuery) -> AppResult<Value> {
        let body = request_body(query);
        tracing::debug!(body = %body, "Search request");

        let response = self
            .request(Method::POST, "/_search")
            .json(&body)
            .send()
            .await
            .during("search_index.search")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::backend(
                "search_index.search",
                format!("Elasticsearch returned status {}: {}", status, body),
            ));
        }

        response.json().await.during("search_index.search")
    }

    fn name(&self) -> &'static str {
        "elasticsearch"
    }
}

/// Renders a planned query as an Elasticsearch `_search` body
pub fn request_body(query: &StructuredQuery) -> Value {
    let mut body = Map::new();
    body.insert("from".to_string(), json!(query.from));
    body.insert("size".to_string(), json!(query.size));
    body.insert(
        "_source".to_string(),
        json!({ "excludes": [fields::EMBEDDING] }),
    );

    let field_filters: Vec<Value> = query.filters.iter().map(terms_clause).collect();
    let post_filter = !query.facets.is_empty();

    let mut filter = Vec::new();
    // `||/y` rounds `lte` up to the last instant of the year
    if let Some(range) = query.year_range {
        filter.push(json!({
            "range": {
                fields::RELEASE_DATE: {
                    "gte": format!("{}||/y", range.from),
                    "lte": format!("{}||/y", range.to),
                    "format": "yyyy"
                }
            }
        }));
    }
    if !post_filter {
        filter.extend(field_filters.iter().cloned());
    }

    let mut must_not = Vec::new();
    if !query.exclude_ids.is_empty() {
        must_not.push(json!({ "terms": { fields::ITEM_ID: query.exclude_ids } }));
    }

    match &query.matcher {
        Matcher::Vector(knn) => {
            let mut clause = json!({
                "field": knn.field,
                "query_vector": knn.vector,
                "k": knn.k,
                "num_candidates": knn.num_candidates,
            });
            if !filter.is_empty() || !must_not.is_empty() {
                clause["filter"] = bool_clause(Vec::new(), filter, must_not);
            }
            body.insert("knn".to_string(), clause);
        }
        matcher => {
            let must = match matcher {
                Matcher::Text(text) => multi_match(text),
                _ => json!({ "match_all": {} }),
            };
            let mut main = bool_clause(vec![must], filter, must_not);

            if !query.boosts.is_empty() {
                let functions: Vec<Value> = query
                    .boosts
                    .iter()
                    .map(|b| {
                        // weight scales log1p(value); factor would scale inside the log
                        json!({
                            "field_value_factor": {
                                "field": b.field,
                                "modifier": "log1p",
                                "factor": 1,
                                "missing": 0
                            },
                            "weight": b.factor
                        })
                    })
                    .collect();
                main = json!({
                    "function_score": {
                        "query": main,
                        "functions": functions,
                        "score_mode": "sum",
                        "boost_mode": "sum"
                    }
                });
            }
            body.insert("query".to_string(), main);
        }
    }

    if post_filter && !field_filters.is_empty() {
        body.insert(
            "post_filter".to_string(),
            json!({ "bool": { "filter": field_filters } }),
        );
    }

    if !query.facets.is_empty() {
        let aggs: Map<String, Value> = query
            .facets
            .iter()
            .map(|facet| (facet.name.to_string(), facet_agg(query, facet)))
            .collect();
        body.insert("aggs".to_string(), Value::Object(aggs));
    }

    if !query.sort.is_empty() {
        let sort: Vec<Value> = query
            .sort
            .iter()
            .map(|key| match key {
                SortKey::Score => json!("_score"),
                SortKey::Field { field, order } => {
                    json!({ field.field_name(): { "order": order.as_str() } })
                }
            })
            .collect();
        body.insert("sort".to_string(), json!(sort));
    }

    if let Some(highlight) = &query.highlight {
        let highlight_fields: Map<String, Value> = highlight
            .fields
            .iter()
            .map(|f| (f.to_string(), json!({})))
            .collect();
        body.insert(
            "highlight".to_string(),
            json!({
                "fields": highlight_fields,
                "pre_tags": [highlight.pre_tag],
                "post_tags": [highlight.post_tag]
            }),
        );
    }

    Value::Object(body)
}

fn multi_match(text: &TextMatch) -> Value {
    let fields: Vec<String> = text
        .fields
        .iter()
        .map(|f| {
            if (f.boost - 1.0).abs() < f32::EPSILON {
                f.field.to_string()
            } else {
                format!("{}^{}", f.field, f.boost)
            }
        })
        .collect();

    json!({
        "multi_match": {
            "query": text.text,
            "fields": fields,
            "fuzziness": "AUTO"
        }
    })
}

fn terms_clause(filter: &TermsFilter) -> Value {
    json!({ "terms": { filter.field.field_name(): filter.values } })
}

fn bool_clause(must: Vec<Value>, filter: Vec<Value>, must_not: Vec<Value>) -> Value {
    let mut clause = Map::new();
    if !must.is_empty() {
        clause.insert("must".to_string(), json!(must));
    }
    if !filter.is_empty() {
        clause.insert("filter".to_string(), json!(filter));
    }
    if !must_not.is_empty() {
        clause.insert("must_not".to_string(), json!(must_not));
    }
    json!({ "bool": clause })
}

/// Terms aggregation wrapped in a filter aggregation carrying every field
/// filter except the facet's own
fn facet_agg(query: &StructuredQuery, facet: &FacetRequest) -> Value {
    let others: Vec<Value> = query.filters_excluding(facet.field).map(terms_clause).collect();
    let scope = if others.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "bool": { "filter": others } })
    };

    json!({
        "filter": scope,
        "aggs": {
            facet.name: {
                "terms": { "field": facet.field.field_name(), "size": facet.size }
            }
        }
    })
}

/// Index settings and mapping for the catalog
pub fn index_mapping() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1,
            "analysis": {
                "analyzer": {
                    "default": { "type": "standard" }
                }
            }
        },
        "mappings": {
            "properties": {
                fields::ITEM_ID: { "type": "keyword" },
                fields::TITLE: {
                    "type": "text",
                    "fields": {
                        "keyword": { "type": "keyword" },
                        "suggest": { "type": "completion" }
                    }
                },
                fields::DESCRIPTION: { "type": "text" },
                fields::RELEASE_DATE: { "type": "date" },
                fields::GENRES: { "type": "keyword" },
                fields::CAST: { "type": "keyword" },
                fields::DIRECTOR: { "type": "keyword" },
                "keywords": { "type": "keyword" },
                fields::LANGUAGE: { "type": "keyword" },
                fields::CONTENT_RATING: { "type": "keyword" },
                fields::IMDB_RATING: { "type": "float" },
                fields::POPULARITY_SCORE: { "type": "float" },
                fields::VIEWS: { "type": "long" },
                fields::AVERAGE_RATING: { "type": "float" },
                fields::EMBEDDING: {
                    "type": "dense_vector",
                    "dims": EMBEDDING_DIMS,
                    "index": true,
                    "similarity": "cosine"
                }
            }
        }
    })
}

//! Qdrant-backed vector index accessed over HTTP.

use super::types::{IndexEntry, IndexError, ScoredUnit};
use super::VectorIndex;
use crate::config::Config;
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

/// Vector index backed by one Qdrant collection.
///
/// Every point carries a `document_id` payload field, and both queries and
/// deletes are filtered on it, so results never cross document boundaries.
/// Tie-breaks on equal scores are applied client-side using the stored ordinal.
pub struct QdrantIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) collection: String,
    pub(crate) api_key: Option<String>,
    pub(crate) vector_size: u64,
}

impl QdrantIndex {
    /// Construct a client from loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self, IndexError> {
        let url = config
            .qdrant_url
            .as_deref()
            .ok_or_else(|| IndexError::Misconfigured("QDRANT_URL is required".into()))?;
        let collection = config
            .qdrant_collection_name
            .clone()
            .ok_or_else(|| IndexError::Misconfigured("QDRANT_COLLECTION_NAME is required".into()))?;

        let client = Client::builder().user_agent("medisum/0.1").build()?;
        let base_url = normalize_base_url(url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection = %collection,
            "Initialized Qdrant HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            collection,
            api_key: config.qdrant_api_key.clone(),
            vector_size: config.embedding_dimension as u64,
        })
    }

    /// Create the collection if missing and ensure the `document_id` payload index.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        if !self.collection_exists().await? {
            tracing::debug!(
                collection = %self.collection,
                vector_size = self.vector_size,
                "Creating collection"
            );
            let body = json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine"
                }
            });
            let response = self
                .request(Method::PUT, &format!("collections/{}", self.collection))?
                .json(&body)
                .send()
                .await?;
            self.ensure_success(response, || {
                tracing::debug!(collection = %self.collection, "Collection created");
            })
            .await?;
        }

        self.ensure_payload_indexes().await
    }

    async fn ensure_payload_indexes(&self) -> Result<(), IndexError> {
        let fields: [(&str, &str); 2] = [("document_id", "keyword"), ("ordinal", "integer")];

        for (field, schema) in fields {
            let body = json!({
                "field_name": field,
                "field_schema": schema,
            });

            let response = self
                .request(
                    Method::PUT,
                    &format!("collections/{}/index", self.collection),
                )?
                .json(&body)
                .send()
                .await?;

            if response.status().is_success() || response.status() == StatusCode::CONFLICT {
                tracing::debug!(collection = %self.collection, field, schema, "Payload index ensured");
            } else {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::warn!(collection = %self.collection, field, error = %error, "Failed to ensure payload index");
            }
        }

        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Collection existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, IndexError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        Ok(req)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Qdrant request failed");
            Err(error)
        }
    }

    fn document_filter(document_id: &str) -> Value {
        json!({
            "must": [
                {
                    "key": "document_id",
                    "match": { "value": document_id }
                }
            ]
        })
    }

    async fn delete_by_filter(&self, document_id: &str) -> Result<(), IndexError> {
        let body = json!({ "filter": Self::document_filter(document_id) });
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, document_id, "Document points deleted");
        })
        .await
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        // Replace-then-write keeps last-write-wins semantics per document.
        self.delete_by_filter(document_id).await?;

        if entries.is_empty() {
            return Ok(());
        }

        let serialized: Vec<_> = entries
            .into_iter()
            .map(|entry| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": entry.vector,
                    "payload": {
                        "document_id": document_id,
                        "unit_id": entry.unit_id,
                        "ordinal": entry.ordinal,
                        "source_field": entry.source_field,
                        "text": entry.text,
                    },
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(
                collection = %self.collection,
                document_id,
                points = point_count,
                "Points indexed"
            );
        })
        .await
    }

    async fn query(
        &self,
        document_id: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredUnit>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let body = json!({
            "query": vector,
            "limit": k,
            "with_payload": true,
            "filter": Self::document_filter(document_id),
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, document_id, error = %error, "Qdrant query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points, .. } => points,
        };

        let mut hits: Vec<(f32, usize, String)> = points
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                let unit_id = payload.get("unit_id")?.as_str()?.to_string();
                let ordinal = payload.get("ordinal")?.as_u64()? as usize;
                Some((point.score, ordinal, unit_id))
            })
            .collect();
        // Qdrant orders by score; reapply the stable ordinal tie-break locally.
        hits.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.1.cmp(&b.1))
        });

        Ok(hits
            .into_iter()
            .map(|(score, _, unit_id)| ScoredUnit { unit_id, score })
            .collect())
    }

    async fn delete(&self, document_id: &str) -> Result<(), IndexError> {
        self.delete_by_filter(document_id).await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

#[derive(Deserialize)]
struct QueryResponse {
    result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
struct QueryPoint {
    score: f32,
    #[serde(default)]
    payload: Option<serde_json::Map<String, Value>>,
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::vector::{VectorHit, VectorStore};
use crate::models::VectorRecord;

/// Vector store backed by a Qdrant server's REST API.
pub struct QdrantStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{path}", self.base_url));
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }
}

#[derive(Serialize)]
struct PointPayload<'a> {
    page_content: &'a str,
    source: &'a str,
}

#[derive(Serialize)]
struct Point<'a> {
    id: String,
    vector: &'a [f32],
    payload: PointPayload<'a>,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<StoredPayload>,
}

#[derive(Deserialize)]
struct StoredPayload {
    #[serde(default)]
    page_content: String,
    #[serde(default)]
    source: String,
}

async fn ensure_success(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("Qdrant {what} returned {status}: {body}");
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn create_or_replace_collection(&self, name: &str, dim: usize) -> Result<()> {
        let resp = self
            .request(reqwest::Method::DELETE, &format!("/collections/{name}"))
            .send()
            .await
            .with_context(|| format!("Failed to reach Qdrant at {}", self.base_url))?;
        // A missing collection is the normal first-run case
        if resp.status() != reqwest::StatusCode::NOT_FOUND {
            ensure_success(resp, "collection delete").await?;
        }

        let resp = self
            .request(reqwest::Method::PUT, &format!("/collections/{name}"))
            .json(&json!({ "vectors": { "size": dim, "distance": "Cosine" } }))
            .send()
            .await
            .with_context(|| format!("Failed to create Qdrant collection {name}"))?;
        ensure_success(resp, "collection create").await?;

        tracing::info!("Created Qdrant collection {name} (dim {dim})");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points: Vec<Point<'_>> = records
            .iter()
            .map(|r| Point {
                id: uuid::Uuid::new_v4().to_string(),
                vector: &r.embedding,
                payload: PointPayload {
                    page_content: &r.text,
                    source: &r.source_path,
                },
            })
            .collect();

        let resp = self
            .request(
                reqwest::Method::PUT,
                &format!("/collections/{collection}/points?wait=true"),
            )
            .json(&json!({ "points": points }))
            .send()
            .await
            .with_context(|| format!("Failed to upsert into Qdrant collection {collection}"))?;
        ensure_success(resp, "upsert").await?;
        Ok(())
    }

    async fn query_similar(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        let resp = self
            .request(
                reqwest::Method::POST,
                &format!("/collections/{collection}/points/search"),
            )
            .json(&json!({ "vector": vector, "limit": k, "with_payload": true }))
            .send()
            .await
            .with_context(|| format!("Failed to search Qdrant collection {collection}"))?;
        let resp = ensure_success(resp, "search").await?;

        let body: SearchResponse = resp
            .json()
            .await
            .context("Failed to parse Qdrant search response")?;

        Ok(body
            .result
            .into_iter()
            .filter_map(|p| {
                let payload = p.payload?;
                Some(VectorHit {
                    text: payload.page_content,
                    source_path: payload.source,
                    score: p.score,
                })
            })
            .collect())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::EmbeddingConfig;

/// Maximum characters to send per text to the embedding API.
/// Chunks are capped at 1 000 characters, so this only bites on
/// callers embedding raw documents.
const MAX_EMBED_CHARS: usize = 3_000;

/// Turns text into fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dimension(&self) -> usize;

    /// Embed a batch. The output is parallel with `texts`.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Cut `text` to its first `MAX_EMBED_CHARS` characters.
fn truncate_for_embedding(text: &str) -> &str {
    match text.char_indices().nth(MAX_EMBED_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Embedder backed by Ollama (`/api/embed`) or an OpenAI-compatible `/v1/embeddings`.
pub struct HttpEmbedder {
    client: reqwest::Client,
    config: EmbeddingConfig,
}

impl HttpEmbedder {
    pub fn new(client: reqwest::Client, config: EmbeddingConfig) -> Self {
        Self { client, config }
    }

    async fn embed_batch(&self, backend: Backend, batch: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut request = self
            .client
            .post(backend.endpoint(&self.config.base_url))
            .json(&backend.body(&self.config.model, batch));
        if let Some(key) = self.config.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .with_context(|| format!("Failed to call {} embed API", backend.label()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} embed API returned {status}: {body}", backend.label());
        }

        let reply: EmbedReply = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse {} embed response", backend.label()))?;
        Ok(reply.into_vectors())
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.config.dim
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let backend = Backend::for_provider(&self.config.provider)?;

        let inputs: Vec<&str> = texts.iter().map(|t| truncate_for_embedding(t)).collect();
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.config.batch_size.max(1)) {
            vectors.extend(self.embed_batch(backend, batch).await?);
        }

        check_shape(&vectors, texts.len(), self.config.dim)?;
        Ok(vectors)
    }
}

fn check_shape(embeddings: &[Vec<f32>], expected: usize, dim: usize) -> Result<()> {
    if embeddings.len() != expected {
        anyhow::bail!(
            "Embedding API returned {} vectors for {expected} inputs",
            embeddings.len()
        );
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != dim) {
        anyhow::bail!(
            "Embedding API returned a {}-dimensional vector, expected {dim}",
            bad.len()
        );
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Backend {
    Ollama,
    OpenAi,
}

impl Backend {
    fn for_provider(provider: &str) -> Result<Self> {
        match provider {
            "ollama" => Ok(Backend::Ollama),
            "openai" => Ok(Backend::OpenAi),
            other => anyhow::bail!("Unknown embedding provider: {other}"),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Backend::Ollama => "Ollama",
            Backend::OpenAi => "OpenAI",
        }
    }

    fn endpoint(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Backend::Ollama => format!("{base}/api/embed"),
            Backend::OpenAi => format!("{base}/v1/embeddings"),
        }
    }

    fn body(self, model: &str, batch: &[&str]) -> serde_json::Value {
        match self {
            // Ollama truncates over-long inputs itself instead of answering 400
            Backend::Ollama => json!({ "model": model, "input": batch, "truncate": true }),
            Backend::OpenAi => json!({ "model": model, "input": batch }),
        }
    }
}

/// Either reply shape: Ollama's `embeddings` list or OpenAI's `data` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedReply {
    Ollama { embeddings: Vec<Vec<f32>> },
    OpenAi { data: Vec<EmbedDatum> },
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

impl EmbedReply {
    fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            EmbedReply::Ollama { embeddings } => embeddings,
            EmbedReply::OpenAi { data } => data.into_iter().map(|d| d.embedding).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_keeps_short_text() {
        assert_eq!(truncate_for_embedding("fn main() {}"), "fn main() {}");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "é".repeat(4_000);
        let out = truncate_for_embedding(&text);
        assert_eq!(out.chars().count(), MAX_EMBED_CHARS);

        // A full-size chunk of 4-byte chars is well over the limit in bytes
        let chunk = "🦀".repeat(1_000);
        assert_eq!(truncate_for_embedding(&chunk), chunk);
    }

    #[test]
    fn test_check_shape_rejects_count_mismatch() {
        let err = check_shape(&[vec![0.0; 3]], 2, 3).unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 inputs"));
    }

    #[test]
    fn test_check_shape_rejects_dimension_mismatch() {
        let err = check_shape(&[vec![0.0; 3], vec![0.0; 4]], 2, 3).unwrap_err();
        assert!(err.to_string().contains("expected 3"));
    }

    #[test]
    fn test_reply_shapes() {
        let ollama: EmbedReply =
            serde_json::from_str(r#"{"model":"nomic-embed-text","embeddings":[[0.1,0.2]]}"#)
                .unwrap();
        assert_eq!(ollama.into_vectors(), vec![vec![0.1, 0.2]]);

        let openai: EmbedReply = serde_json::from_str(
            r#"{"object":"list","data":[{"index":0,"embedding":[0.5]},{"index":1,"embedding":[0.25]}]}"#,
        )
        .unwrap();
        assert_eq!(openai.into_vectors(), vec![vec![0.5], vec![0.25]]);
    }

    #[test]
    fn test_backend_endpoints_and_bodies() {
        assert_eq!(
            Backend::Ollama.endpoint("http://localhost:11434/"),
            "http://localhost:11434/api/embed"
        );
        assert_eq!(
            Backend::OpenAi.endpoint("https://api.openai.com"),
            "https://api.openai.com/v1/embeddings"
        );
        let body = Backend::Ollama.body("nomic-embed-text", &["a", "b"]);
        assert_eq!(body["truncate"], true);
        assert_eq!(body["input"][1], "b");
        assert!(Backend::OpenAi.body("m", &["a"]).get("truncate").is_none());
        assert!(Backend::for_provider("cohere").is_err());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_an_error() {
        let embedder = HttpEmbedder::new(
            reqwest::Client::new(),
            EmbeddingConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                ..EmbeddingConfig::default()
            },
        );
        assert!(embedder.embed(&["hello".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_batch_skips_network() {
        let embedder = HttpEmbedder::new(
            reqwest::Client::new(),
            EmbeddingConfig {
                base_url: "http://127.0.0.1:9".to_string(),
                ..EmbeddingConfig::default()
            },
        );
        assert!(embedder.embed(&[]).await.unwrap().is_empty());
    }
}

use axum::http::{HeaderValue, Method};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use readme_forge::api;
use readme_forge::config::Config;
use readme_forge::jobs::JobQueue;
use readme_forge::llm::{ChatModel, Embedder, HttpChatModel, HttpEmbedder};
use readme_forge::pipeline::ReadmeGenerator;
use readme_forge::search::{MemoryVectorStore, QdrantStore, VectorStore};
use readme_forge::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::from_env()?);
    tracing::info!("Scratch directory: {}", config.scratch_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!(
        "Embedding provider: {} ({}, dim {})",
        config.embedding.provider,
        config.embedding.model,
        config.embedding.dim
    );

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let store: Arc<dyn VectorStore> = match config.vector_store.url.as_deref() {
        Some(url) if config.vector_store.kind == "qdrant" => {
            tracing::info!("Vector store: Qdrant at {url}");
            Arc::new(QdrantStore::new(
                http_client.clone(),
                url,
                config.vector_store.api_key.clone(),
            ))
        }
        _ => {
            tracing::info!("Vector store: in-memory");
            Arc::new(MemoryVectorStore::new())
        }
    };
    let embedder: Arc<dyn Embedder> =
        Arc::new(HttpEmbedder::new(http_client.clone(), config.embedding.clone()));
    let chat: Arc<dyn ChatModel> = Arc::new(HttpChatModel::new(http_client, config.llm.clone()));

    let generator = Arc::new(ReadmeGenerator::new(config.clone(), store, embedder, chat));
    let jobs = JobQueue::new(
        generator,
        config.max_concurrent_jobs,
        Duration::from_secs(config.result_ttl_secs),
    );
    jobs.spawn_sweeper(Duration::from_secs(60));

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {o}");
                None
            }
        })
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let app = api::router(AppState::new(config.clone(), jobs)).layer(cors);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

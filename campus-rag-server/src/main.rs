use std::sync::Arc;

use campus_rag::gemini::{GeminiClient, GeminiEmbeddingProvider, GeminiGenerator};
use campus_rag::{IndexProvider, KnowledgeService, RagConfig, RagPipeline, RiskAnalyzer};
use campus_rag_server::{AppState, ServerConfig, run_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let host = std::env::var("CAMPUS_RAG_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("CAMPUS_RAG_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8099);

    let config = RagConfig::from_env()?;
    let client = GeminiClient::from_env()?;
    let embedder = Arc::new(GeminiEmbeddingProvider::from_client(client.clone()));
    let generator = Arc::new(GeminiGenerator::from_client(client));

    let provider = Arc::new(IndexProvider::from_config(&config, embedder.clone()));
    let pipeline = RagPipeline::from_config(&config, embedder, generator.clone());
    let risk = RiskAnalyzer::new(generator).with_timeout(config.generation_timeout);
    let knowledge = KnowledgeService::new(provider, pipeline, config);

    run_server(ServerConfig { host, port }, AppState::new(knowledge, risk)).await
}

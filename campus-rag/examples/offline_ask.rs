//! # Offline knowledge-base example
//!
//! Builds a small campus knowledge base, persists it, reloads it as a fresh
//! process would, and answers a few questions.
//!
//! Uses a deterministic `MockEmbeddingProvider` and an extractive
//! `FirstSentenceGenerator` so it runs with **zero API keys**.
//!
//! Run: `cargo run -p campus-rag --example offline_ask`

use std::sync::Arc;

use campus_rag::{
    EmbeddingProvider, IndexProvider, KnowledgeService, NOT_FOUND_SENTINEL, RagConfig,
    RagPipeline, TextGenerator,
};

// ---------------------------------------------------------------------------
// MockEmbeddingProvider: bag-of-words hashing, so shared words mean similarity
// ---------------------------------------------------------------------------

struct MockEmbeddingProvider {
    dimensions: usize,
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> campus_rag::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| w.len() > 3) {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
            emb[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        Ok(emb)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "demo/bag-of-words-128"
    }
}

// ---------------------------------------------------------------------------
// FirstSentenceGenerator: answers with the first sentence of the context
// ---------------------------------------------------------------------------

struct FirstSentenceGenerator;

#[async_trait::async_trait]
impl TextGenerator for FirstSentenceGenerator {
    async fn generate(&self, prompt: &str) -> campus_rag::Result<String> {
        let context = prompt
            .split_once("Context:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nQuestion:"))
            .map(|(context, _)| context.trim())
            .unwrap_or_default();
        Ok(match context.split_inclusive('.').next() {
            Some(sentence) if !sentence.trim().is_empty() => sentence.trim().to_string(),
            _ => NOT_FOUND_SENTINEL.to_string(),
        })
    }

    fn model_id(&self) -> &str {
        "demo/first-sentence"
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -- 1. Lay out a knowledge base on disk -------------------------------
    let workdir = tempfile::tempdir()?;
    let kb_dir = workdir.path().join("kb_texts");
    std::fs::create_dir_all(&kb_dir)?;
    std::fs::write(
        kb_dir.join("leave_policy.txt"),
        "Students get 10 days of medical leave per semester. Leave beyond that needs the dean's approval.",
    )?;
    std::fs::write(
        kb_dir.join("hostel.txt"),
        "Hostel fees are due in the first week of July. Rooms are shared by two students.",
    )?;
    std::fs::write(
        kb_dir.join("counselling.txt"),
        "Free counselling sessions are available every weekday afternoon at the wellness centre.",
    )?;

    let config = RagConfig::builder()
        .kb_dir(&kb_dir)
        .persist_dir(workdir.path().join("index"))
        .top_k(1)
        .build()?;

    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(MockEmbeddingProvider { dimensions: 128 });
    let generator: Arc<dyn TextGenerator> = Arc::new(FirstSentenceGenerator);

    // -- 2. First run builds and persists the index ------------------------
    let provider = IndexProvider::from_config(&config, embedder.clone());
    let index = provider.get().await?;
    println!("Built index with {} chunk(s) at {}", index.len(), config.persist_dir.display());

    // -- 3. A "restart" reloads it without re-reading kb_texts -------------
    let provider = Arc::new(IndexProvider::from_config(&config, embedder.clone()));
    let pipeline = RagPipeline::from_config(&config, embedder, generator);
    let service = KnowledgeService::new(provider, pipeline, config);

    for query in [
        "How many days of medical leave do students get?",
        "When are hostel fees due?",
        "Is counselling free?",
    ] {
        let response = service.answer(query, None).await?;
        println!("\nQ: {query}");
        println!("A: {} (grounded: {})", response.answer, response.grounded);
        for source in &response.sources {
            println!("   from {} | {}", source.source, source.content_preview);
        }
    }

    println!("\nDone.");
    Ok(())
}

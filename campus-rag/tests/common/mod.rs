//! Deterministic test doubles shared by the integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use campus_rag::{
    DirectoryLoader, Document, DocumentSource, EmbeddingProvider, IndexBuilder, IndexProvider,
    IndexStore, NOT_FOUND_SENTINEL, RagError, Result, TextGenerator, WholeDocumentChunker,
};

pub const DIMS: usize = 64;
pub const COLLECTION: &str = "university_kb";

/// Bag-of-words embedder: each lowercase token is hashed into one of
/// [`DIMS`] buckets, so texts sharing words are similar.
#[derive(Debug)]
pub struct KeywordEmbedder {
    model_id: String,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self::named("mock/keywords")
    }

    pub fn named(model_id: &str) -> Self {
        Self { model_id: model_id.to_string(), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; DIMS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(str::to_lowercase)
        {
            let bucket = token
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ u64::from(b)).wrapping_mul(0x100_0000_01b3));
            v[(bucket % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// An embedder that never answers within a test's timeout.
pub struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(vec![0.0; DIMS])
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model_id(&self) -> &str {
        "mock/stalled"
    }
}

/// Always replies with the same text and records every prompt.
pub struct FixedGenerator {
    reply: String,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl FixedGenerator {
    pub fn new(reply: &str) -> Self {
        Self { reply: reply.to_string(), prompts: std::sync::Mutex::new(Vec::new()) }
    }

    pub fn not_found() -> Self {
        Self::new(NOT_FOUND_SENTINEL)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FixedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }

    fn model_id(&self) -> &str {
        "mock/fixed"
    }
}

/// Answers with the context section of the prompt, or the not-found
/// sentinel when the context is empty.
pub struct ContextEchoGenerator;

#[async_trait]
impl TextGenerator for ContextEchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let context = prompt
            .split_once("Context:\n")
            .and_then(|(_, rest)| rest.split_once("\n\nQuestion:"))
            .map(|(context, _)| context.trim())
            .unwrap_or_default();
        if context.is_empty() {
            Ok(NOT_FOUND_SENTINEL.to_string())
        } else {
            Ok(context.to_string())
        }
    }

    fn model_id(&self) -> &str {
        "mock/echo"
    }
}

/// A generator that never answers within a test's timeout.
pub struct StalledGenerator;

#[async_trait]
impl TextGenerator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(NOT_FOUND_SENTINEL.to_string())
    }

    fn model_id(&self) -> &str {
        "mock/stalled"
    }
}

/// A generator whose upstream is down.
pub struct FailingGenerator;

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(RagError::SynthesisError { provider: "mock/failing".into(), message: "503".into() })
    }

    fn model_id(&self) -> &str {
        "mock/failing"
    }
}

/// Wraps a [`DirectoryLoader`] and counts how often it is asked to load.
pub struct CountingLoader {
    inner: DirectoryLoader,
    pub loads: AtomicUsize,
}

impl CountingLoader {
    pub fn new(dir: &Path) -> Self {
        Self { inner: DirectoryLoader::new(dir), loads: AtomicUsize::new(0) }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl DocumentSource for CountingLoader {
    fn load(&self) -> Result<Vec<Document>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load()
    }
}

/// A provider over `kb_dir` persisting to `persist_dir`, whole-document chunks.
pub fn provider(
    kb_dir: &Path,
    persist_dir: &Path,
    embedder: Arc<dyn EmbeddingProvider>,
) -> (IndexProvider, Arc<CountingLoader>) {
    let loader = Arc::new(CountingLoader::new(kb_dir));
    let builder = IndexBuilder::new(
        embedder,
        Arc::new(WholeDocumentChunker),
        IndexStore::new(persist_dir, COLLECTION),
    );
    (IndexProvider::new(builder, loader.clone()), loader)
}

/// Write `files` as `(name, text)` pairs into `dir`.
pub fn write_kb(dir: &Path, files: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (name, text) in files {
        std::fs::write(dir.join(name), text).unwrap();
    }
}

pub fn university_kb() -> Vec<(&'static str, &'static str)> {
    vec![
        ("leave_policy.txt", "Students get 10 days of medical leave per semester."),
        ("hostel.txt", "Hostel rooms are shared by two students and fees are due in July."),
        ("scholarships.txt", "Merit scholarships cover full tuition for the top five percent."),
        ("counselling.txt", "Free counselling sessions are available every weekday afternoon."),
        ("library.txt", "The library opens at eight and closes at midnight during exams."),
    ]
}

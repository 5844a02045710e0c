//! Index lifecycle: load versus build, single-flight initialization, and
//! recovery after a failed build.

mod common;

use std::sync::Arc;
use std::time::Duration;

use campus_rag::{
    IndexBuilder, IndexProvider, IndexStore, ProviderState, RagConfig, RagError,
    WholeDocumentChunker,
};
use common::{COLLECTION, KeywordEmbedder, StalledEmbedder, provider, university_kb, write_kb};

#[tokio::test]
async fn second_get_reuses_the_index_without_rereading_documents() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &university_kb());
    let embedder = Arc::new(KeywordEmbedder::new());
    let (provider, loader) = provider(&kb, &temp.path().join("index"), embedder.clone());

    assert_eq!(provider.state(), ProviderState::Uninitialized);
    assert!(!provider.is_ready());

    let first = provider.get().await.unwrap();
    let calls_after_build = embedder.calls();
    let second = provider.get().await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.len(), 5);
    assert_eq!(loader.loads(), 1);
    assert_eq!(embedder.calls(), calls_after_build);
    assert_eq!(provider.state(), ProviderState::Ready);
    assert!(provider.is_ready());
}

#[tokio::test]
async fn empty_kb_fails_then_succeeds_once_a_file_appears() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    std::fs::create_dir_all(&kb).unwrap();
    let persist = temp.path().join("index");
    let (provider, loader) = provider(&kb, &persist, Arc::new(KeywordEmbedder::new()));

    let err = provider.get().await.unwrap_err();
    assert!(matches!(err, RagError::NoDocumentsFound { .. }), "got {err:?}");
    assert_eq!(provider.state(), ProviderState::Uninitialized);
    assert!(!provider.is_ready());
    assert!(!persist.exists());

    write_kb(&kb, &[("fees.txt", "Tuition fees are due on the first of August.")]);
    let index = provider.get().await.unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(provider.state(), ProviderState::Ready);
    assert_eq!(loader.loads(), 2);
}

#[tokio::test]
async fn persisted_index_is_loaded_without_touching_the_loader() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    let persist = temp.path().join("index");
    write_kb(&kb, &university_kb());

    let (builder_run, _) = provider(&kb, &persist, Arc::new(KeywordEmbedder::new()));
    builder_run.get().await.unwrap();
    assert!(persist.exists());

    let embedder = Arc::new(KeywordEmbedder::new());
    let (restarted, loader) = provider(&kb, &persist, embedder.clone());
    let index = restarted.get().await.unwrap();

    assert_eq!(loader.loads(), 0);
    assert_eq!(embedder.calls(), 0);
    assert_eq!(index.len(), 5);
    assert_eq!(index.embedding_model(), "mock/keywords");
}

#[tokio::test]
async fn persisted_index_wins_even_if_the_kb_changed() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    let persist = temp.path().join("index");
    write_kb(&kb, &university_kb());
    provider(&kb, &persist, Arc::new(KeywordEmbedder::new())).0.get().await.unwrap();

    write_kb(&kb, &[("new_rule.txt", "Attendance below seventy five percent bars exams.")]);
    let (restarted, loader) = provider(&kb, &persist, Arc::new(KeywordEmbedder::new()));

    assert_eq!(restarted.get().await.unwrap().len(), 5);
    assert_eq!(loader.loads(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_calls_build_exactly_once() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &university_kb());
    let embedder = Arc::new(KeywordEmbedder::new());
    let (provider, loader) = provider(&kb, &temp.path().join("index"), embedder.clone());
    let provider = Arc::new(provider);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.get().await })
        })
        .collect();

    let mut indexes = Vec::new();
    for handle in handles {
        indexes.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(loader.loads(), 1);
    assert_eq!(embedder.calls(), 5);
    assert!(indexes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test]
async fn dropping_a_build_in_progress_leaves_the_provider_retryable() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &university_kb());
    let (provider, loader) = provider(&kb, &temp.path().join("index"), Arc::new(StalledEmbedder));
    let provider = Arc::new(provider);

    let building = tokio::spawn({
        let provider = Arc::clone(&provider);
        async move { provider.get().await }
    });
    for _ in 0..200 {
        if provider.state() == ProviderState::Building && loader.loads() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(provider.state(), ProviderState::Building);

    building.abort();
    assert!(building.await.unwrap_err().is_cancelled());

    assert_eq!(provider.state(), ProviderState::Uninitialized);
    assert!(!provider.is_ready());
}

#[tokio::test]
async fn a_different_embedding_model_is_refused_on_load() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    let persist = temp.path().join("index");
    write_kb(&kb, &university_kb());
    provider(&kb, &persist, Arc::new(KeywordEmbedder::named("mock/v1"))).0.get().await.unwrap();

    let (restarted, loader) = provider(&kb, &persist, Arc::new(KeywordEmbedder::named("mock/v2")));
    let err = restarted.get().await.unwrap_err();

    match err {
        RagError::EmbeddingMismatch { persisted, current, .. } => {
            assert_eq!(persisted, "mock/v1");
            assert_eq!(current, "mock/v2");
        }
        other => panic!("expected EmbeddingMismatch, got {other:?}"),
    }
    assert_eq!(loader.loads(), 0);
    assert_eq!(restarted.state(), ProviderState::Uninitialized);
}

#[tokio::test]
async fn rebuild_replaces_a_persisted_index() {
    let temp = tempfile::tempdir().unwrap();
    let persist = temp.path().join("index");
    let store = IndexStore::new(&persist, COLLECTION);
    let builder =
        IndexBuilder::new(Arc::new(KeywordEmbedder::new()), Arc::new(WholeDocumentChunker), store);

    let docs = |texts: &[(&str, &str)]| {
        texts
            .iter()
            .map(|(name, text)| campus_rag::Document::from_file_name(name, *text))
            .collect::<Vec<_>>()
    };
    builder.build(&docs(&university_kb())).await.unwrap();
    builder.build(&docs(&[("only.txt", "Just one document now.")])).await.unwrap();

    let reloaded = builder.load().await.unwrap();
    assert_eq!(reloaded.len(), 1);
}

#[tokio::test]
async fn from_config_wires_directories_and_chunking() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &[("long.txt", "Rule one applies. Rule two applies. Rule three applies.")]);
    let config = RagConfig::builder()
        .kb_dir(&kb)
        .persist_dir(temp.path().join("index"))
        .chunk_size(20)
        .build()
        .unwrap();

    let provider = IndexProvider::from_config(&config, Arc::new(KeywordEmbedder::new()));
    let index = provider.get().await.unwrap();

    assert!(index.len() > 1);
    assert_eq!(index.collection(), "university_kb");
    assert!(temp.path().join("index").join("university_kb.json").exists());
}

//! Query-time behaviour: retrieval bounds, context order, grounding, and
//! citations, end to end through the service.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use campus_rag::{
    AnswerSynthesizer, CONTEXT_DELIMITER, Document, IndexBuilder, IndexStore, KnowledgeService,
    NOT_FOUND_SENTINEL, RagConfig, RagError, RagPipeline, Retriever, Synthesis,
    WholeDocumentChunker, assemble,
};
use common::{
    COLLECTION, ContextEchoGenerator, FailingGenerator, FixedGenerator, KeywordEmbedder,
    StalledEmbedder, StalledGenerator, provider, university_kb, write_kb,
};
use proptest::prelude::*;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn build_index(dir: &std::path::Path, files: &[(&str, &str)]) -> campus_rag::Index {
    let builder = IndexBuilder::new(
        Arc::new(KeywordEmbedder::new()),
        Arc::new(WholeDocumentChunker),
        IndexStore::new(dir.join("index"), COLLECTION),
    );
    let documents: Vec<Document> =
        files.iter().map(|(name, text)| Document::from_file_name(name, *text)).collect();
    builder.build(&documents).await.unwrap()
}

fn retriever() -> Retriever {
    Retriever::new(Arc::new(KeywordEmbedder::new()), TIMEOUT)
}

mod prop_retrieval {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn retrieves_min_of_k_and_index_size(
            doc_count in 1usize..8,
            k in 0usize..12,
            query in "[a-z]{3,8}( [a-z]{3,8}){0,4}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (retrieved, total) = rt.block_on(async {
                let temp = tempfile::tempdir().unwrap();
                let files: Vec<(String, String)> = (0..doc_count)
                    .map(|i| (format!("doc_{i}.txt"), format!("policy number {i} covers topic {i}")))
                    .collect();
                let refs: Vec<(&str, &str)> =
                    files.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
                let index = build_index(temp.path(), &refs).await;
                let retrieved = retriever().retrieve(&index, &query, k).await.unwrap();
                (retrieved, index.len())
            });

            prop_assert_eq!(retrieved.len(), k.min(total));
            let ranks: Vec<usize> = retrieved.iter().map(|r| r.rank).collect();
            prop_assert_eq!(ranks, (1..=retrieved.len()).collect::<Vec<_>>());
            for window in retrieved.iter().collect::<Vec<_>>().windows(2) {
                prop_assert!(window[0].score >= window[1].score);
            }
        }

        #[test]
        fn context_preserves_retrieval_order(
            k in 1usize..6,
            query in "(leave|hostel|library|fees|counselling|tuition)( [a-z]{3,8}){0,3}",
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (texts, context) = rt.block_on(async {
                let temp = tempfile::tempdir().unwrap();
                let index = build_index(temp.path(), &university_kb()).await;
                let retrieved = retriever().retrieve(&index, &query, k).await.unwrap();
                let texts: Vec<String> = retrieved.texts().map(str::to_string).collect();
                (texts, assemble(&retrieved))
            });

            let split: Vec<&str> = context.split(CONTEXT_DELIMITER).collect();
            prop_assert_eq!(split, texts.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}

#[tokio::test]
async fn k_zero_skips_the_embedding_call() {
    let temp = tempfile::tempdir().unwrap();
    let index = build_index(temp.path(), &university_kb()).await;
    let embedder = Arc::new(KeywordEmbedder::new());

    let retrieved =
        Retriever::new(embedder.clone(), TIMEOUT).retrieve(&index, "leave", 0).await.unwrap();

    assert!(retrieved.is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn query_embedding_timeout_is_an_embedding_error() {
    let temp = tempfile::tempdir().unwrap();
    let index = build_index(temp.path(), &university_kb()).await;

    let err = Retriever::new(Arc::new(StalledEmbedder), Duration::from_millis(20))
        .retrieve(&index, "leave", 3)
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::EmbeddingError { .. }), "got {err:?}");
}

#[tokio::test]
async fn build_embedding_timeout_fails_without_persisting() {
    let temp = tempfile::tempdir().unwrap();
    let builder = IndexBuilder::new(
        Arc::new(StalledEmbedder),
        Arc::new(WholeDocumentChunker),
        IndexStore::new(temp.path().join("index"), COLLECTION),
    )
    .with_embed_timeout(Duration::from_millis(20));
    let documents: Vec<Document> = university_kb()
        .iter()
        .map(|(name, text)| Document::from_file_name(name, *text))
        .collect();

    let err = builder.build(&documents).await.unwrap_err();

    assert!(matches!(err, RagError::EmbeddingError { .. }), "got {err:?}");
    assert!(!builder.store().exists().await);
}

#[tokio::test]
async fn generation_timeout_is_a_synthesis_error() {
    let synthesizer = AnswerSynthesizer::new(Arc::new(StalledGenerator), Duration::from_millis(20));

    let err = synthesizer
        .synthesize("Students get 10 days of medical leave.", "How much leave do I get?")
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::SynthesisError { .. }), "got {err:?}");
}

#[tokio::test]
async fn unanswerable_question_yields_the_sentinel() {
    let generator = Arc::new(FixedGenerator::not_found());
    let synthesizer = AnswerSynthesizer::new(generator.clone(), TIMEOUT);

    let synthesis = synthesizer
        .synthesize("The library opens at eight.", "Who won the 1998 football world cup?")
        .await
        .unwrap();

    assert_eq!(synthesis, Synthesis::NotGrounded);
    assert_eq!(synthesis.as_text(), NOT_FOUND_SENTINEL);
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The library opens at eight."));
    assert!(prompts[0].contains("Who won the 1998 football world cup?"));
}

#[tokio::test]
async fn generator_failures_are_synthesis_errors() {
    let failing = AnswerSynthesizer::new(Arc::new(FailingGenerator), TIMEOUT);
    let err = failing.synthesize("ctx", "q").await.unwrap_err();
    assert!(matches!(err, RagError::SynthesisError { .. }));

    let empty = AnswerSynthesizer::new(Arc::new(FixedGenerator::new("   ")), TIMEOUT);
    let err = empty.synthesize("ctx", "q").await.unwrap_err();
    assert!(matches!(err, RagError::MalformedUpstreamOutput { .. }));
}

#[tokio::test]
async fn every_citation_names_an_ingested_file() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &university_kb());
    let ingested: HashSet<String> = std::fs::read_dir(&kb)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();

    let (provider, _) = provider(&kb, &temp.path().join("index"), Arc::new(KeywordEmbedder::new()));
    let index = provider.get().await.unwrap();

    for query in ["medical leave", "hostel fees July", "scholarship tuition", "anything at all"] {
        let retrieved = retriever().retrieve(&index, query, 5).await.unwrap();
        assert_eq!(retrieved.len(), 5);
        for chunk in retrieved.chunks() {
            assert!(ingested.contains(&chunk.source), "unknown source {}", chunk.source);
            assert_eq!(format!("{}.txt", chunk.doc_id), chunk.source);
        }
    }
}

#[tokio::test]
async fn pipeline_builder_requires_both_stages() {
    let err = RagPipeline::builder().retriever(retriever()).build().err().unwrap();
    assert!(matches!(err, RagError::ConfigError(_)));
}

fn service(kb: &std::path::Path, persist: &std::path::Path) -> KnowledgeService {
    let config = RagConfig::builder()
        .kb_dir(kb)
        .persist_dir(persist)
        .context_preview_chars(30)
        .source_preview_chars(12)
        .build()
        .unwrap();
    let embedder = Arc::new(KeywordEmbedder::new());
    let (provider, _) = provider(kb, persist, embedder.clone());
    let pipeline = RagPipeline::builder()
        .retriever(Retriever::new(embedder, TIMEOUT))
        .synthesizer(AnswerSynthesizer::new(Arc::new(ContextEchoGenerator), TIMEOUT))
        .build()
        .unwrap();
    KnowledgeService::new(Arc::new(provider), pipeline, config)
}

#[tokio::test]
async fn single_policy_question_is_answered_from_that_file() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &[("leave_policy.txt", "Students get 10 days of medical leave per semester.")]);
    let service = service(&kb, &temp.path().join("index"));
    assert!(!service.health().initialized);

    let response =
        service.answer("How many medical leave days do students get?", Some(1)).await.unwrap();

    assert!(service.health().initialized);
    assert!(response.grounded);
    assert!(response.answer.contains("10"), "answer was {:?}", response.answer);
    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].source, "leave_policy.txt");
    assert_eq!(response.sources[0].doc_id, "leave_policy");
    assert_eq!(response.sources[0].content_preview, "Students get");
    assert_eq!(response.combined_context, "Students get 10 days of medica");
}

#[tokio::test]
async fn service_defaults_k_and_rejects_blank_queries() {
    let temp = tempfile::tempdir().unwrap();
    let kb = temp.path().join("kb_texts");
    write_kb(&kb, &university_kb());
    let service = service(&kb, &temp.path().join("index"));

    let err = service.answer("   ", None).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidRequest(_)));
    assert!(!service.health().initialized);

    let response = service.answer("library exams", None).await.unwrap();
    assert_eq!(response.sources.len(), 3);

    let response = service.answer("library exams", Some(0)).await.unwrap();
    assert!(response.sources.is_empty());
    assert!(!response.grounded);
    assert_eq!(response.answer, NOT_FOUND_SENTINEL);
}

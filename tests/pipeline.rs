mod common;

use std::fs;

use common::{HashingEncoder, aero_docs, example_docs, hashing_model, open_engine, paths};
use cranbert::{
    CorpusDir, Document, DocumentSource, EmbeddingDb, Engine, Error, LexicalDb, LexicalIndex,
    ModelManager, SemanticIndex,
    eval::{self, EvalParams},
    search::SearchParams,
};

#[test]
fn persisted_indexes_load_bit_exact() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path(), &aero_docs());
    let p = paths(tmp.path());

    let lexical = LexicalIndex::load(&p.lexical).unwrap();
    assert_eq!(lexical.documents(), engine.lexical().documents());
    assert_eq!(lexical.model(), engine.lexical().model());
    assert_eq!(lexical.matrix(), engine.lexical().matrix());

    let semantic = SemanticIndex::load(&p.semantic).unwrap();
    assert_eq!(semantic.doc_ids(), engine.semantic().doc_ids());
    assert_eq!(semantic.matrix(), engine.semantic().matrix());
    assert_eq!(semantic.encoder_id(), common::HASHING_MODEL);
}

#[test]
fn reopened_engine_ranks_identically() {
    let tmp = tempfile::tempdir().unwrap();
    let params = SearchParams::new(6, 0.5).unwrap();
    let query = "incompressible boundary layer on a flat plate";

    let first = open_engine(tmp.path(), &aero_docs())
        .search(query, params)
        .unwrap();
    // Documents passed on reopen are ignored since both artifacts exist.
    let second = open_engine(tmp.path(), &Vec::new())
        .search(query, params)
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn stats_describe_stored_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path(), &example_docs());
    let p = paths(tmp.path());

    let lexical = LexicalDb::open_existing(&p.lexical)
        .unwrap()
        .stats()
        .unwrap()
        .unwrap();
    assert_eq!(lexical.documents, 3);
    assert_eq!(lexical.terms, engine.lexical().model().n_terms());

    let semantic = EmbeddingDb::open_existing(&p.semantic)
        .unwrap()
        .stats()
        .unwrap()
        .unwrap();
    assert_eq!(semantic.documents, 3);
    assert_eq!(semantic.dimension, 16);
    assert_eq!(semantic.encoder_id, common::HASHING_MODEL);
}

#[test]
fn missing_lexical_artifact_is_rebuilt_from_source() {
    let tmp = tempfile::tempdir().unwrap();
    let params = SearchParams::new(3, 0.5).unwrap();
    let before = open_engine(tmp.path(), &example_docs())
        .search("wing stress", params)
        .unwrap();

    fs::remove_file(paths(tmp.path()).lexical).unwrap();
    let after = open_engine(tmp.path(), &example_docs())
        .search("wing stress", params)
        .unwrap();

    assert_eq!(before, after);
}

#[test]
fn reordered_embedding_rows_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = open_engine(tmp.path(), &example_docs());
    let p = paths(tmp.path());

    let mut ids = engine.semantic().doc_ids().to_vec();
    ids.reverse();
    EmbeddingDb::create(&p.semantic)
        .unwrap()
        .save(common::HASHING_MODEL, &ids, engine.semantic().matrix())
        .unwrap();

    let err = Engine::open(&p, &example_docs(), hashing_model(), false).unwrap_err();
    assert!(matches!(err, Error::IndexMisalignment { .. }), "{err:?}");
}

#[test]
fn embedding_row_count_mismatch_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    open_engine(tmp.path(), &example_docs());
    let p = paths(tmp.path());

    let mut model = hashing_model();
    let shorter = example_docs()[..2].to_vec();
    let partial = SemanticIndex::from_documents(&shorter, &mut model, false).unwrap();
    EmbeddingDb::create(&p.semantic)
        .unwrap()
        .save(common::HASHING_MODEL, partial.doc_ids(), partial.matrix())
        .unwrap();

    let err = Engine::open(&p, &example_docs(), hashing_model(), false).unwrap_err();
    assert!(matches!(err, Error::IndexMisalignment { .. }), "{err:?}");
}

#[test]
fn querying_with_a_different_encoder_fails() {
    let tmp = tempfile::tempdir().unwrap();
    open_engine(tmp.path(), &example_docs());

    let other = ModelManager::with_encoder(Box::new(HashingEncoder::named("test/other")));
    let mut engine = Engine::open(&paths(tmp.path()), &example_docs(), other, false).unwrap();

    let err = engine
        .search("turbine", SearchParams::new(2, 0.5).unwrap())
        .unwrap_err();
    match err {
        Error::EncoderMismatch { indexed, requested } => {
            assert_eq!(indexed, common::HASHING_MODEL);
            assert_eq!(requested, "test/other");
        }
        other => panic!("expected encoder mismatch, got {other:?}"),
    }
}

#[test]
fn rebuild_replaces_stored_corpus() {
    let tmp = tempfile::tempdir().unwrap();
    open_engine(tmp.path(), &example_docs());

    let engine =
        Engine::rebuild(&paths(tmp.path()), &aero_docs(), hashing_model(), false).unwrap();
    assert_eq!(engine.lexical().len(), 6);

    let reloaded = LexicalIndex::load(&paths(tmp.path()).lexical).unwrap();
    assert_eq!(reloaded.len(), 6);
    assert_eq!(
        SemanticIndex::load(&paths(tmp.path()).semantic).unwrap().len(),
        6
    );
}

#[test]
fn empty_corpus_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let empty: Vec<Document> = Vec::new();
    let err = Engine::open(&paths(tmp.path()), &empty, hashing_model(), false).unwrap_err();
    assert!(matches!(err, Error::EmptyCorpus { .. }), "{err:?}");
}

fn write_corpus(dir: &std::path::Path) -> CorpusDir {
    let corpus: String = example_docs()
        .iter()
        .map(|d| serde_json::to_string(d).unwrap() + "\n")
        .collect();
    fs::write(dir.join("corpus.jsonl"), corpus).unwrap();
    fs::write(
        dir.join("queries.jsonl"),
        concat!(
            "{\"qid\": \"1\", \"query\": \"turbine stress\"}\n",
            "{\"qid\": \"2\", \"query\": \"boundary layer\"}\n",
            "{\"qid\": \"3\", \"query\": \"nobody judged this\"}\n",
        ),
    )
    .unwrap();
    fs::write(
        dir.join("qrels.jsonl"),
        concat!(
            "{\"qid\": \"1\", \"docid\": \"1\", \"relevance\": 2}\n",
            "{\"qid\": \"1\", \"docid\": \"3\", \"relevance\": 3}\n",
            "{\"qid\": \"2\", \"docid\": \"2\", \"relevance\": 1}\n",
        ),
    )
    .unwrap();
    CorpusDir::open(dir)
}

#[test]
fn evaluates_benchmark_queries_from_corpus_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus_root = tmp.path().join("cranfield");
    fs::create_dir(&corpus_root).unwrap();
    let corpus = write_corpus(&corpus_root);

    assert_eq!(corpus.load_documents().unwrap(), example_docs());
    let queries = corpus.load_queries().unwrap();
    let judgments = corpus.load_judgments().unwrap();
    assert_eq!(queries.len(), 3);
    assert_eq!(judgments.len(), 2);

    let mut engine =
        Engine::open(&paths(tmp.path()), &corpus, hashing_model(), false).unwrap();
    let report = eval::evaluate(
        &mut engine,
        &queries,
        &judgments,
        EvalParams {
            k: 2,
            lambda: 0.0,
            feedback: false,
        },
    )
    .unwrap();

    assert_eq!(report.queries.len(), 2);
    assert_eq!(report.skipped, vec!["Q3".to_string()]);
    let q1 = &report.queries[0];
    assert_eq!(q1.qid, "Q1");
    assert_eq!(q1.precision, 1.0);
    assert!((q1.ndcg - 1.0).abs() < 1e-12);
    assert_eq!(q1.average_precision, 1.0);

    let q2 = &report.queries[1];
    assert_eq!(q2.qid, "Q2");
    assert_eq!(q2.precision, 0.5);
    assert_eq!(q2.average_precision, 1.0);

    assert!((report.mean_precision - 0.75).abs() < 1e-12);
    assert!((report.map - 1.0).abs() < 1e-12);
}

#[test]
fn oracle_feedback_does_not_hurt_map() {
    let tmp = tempfile::tempdir().unwrap();
    let corpus = write_corpus(tmp.path());
    let queries = corpus.load_queries().unwrap();
    let judgments = corpus.load_judgments().unwrap();
    let mut engine =
        Engine::open(&paths(tmp.path()), &corpus, hashing_model(), false).unwrap();

    let params = EvalParams {
        k: 3,
        lambda: 0.0,
        feedback: true,
    };
    let report = eval::evaluate(&mut engine, &queries, &judgments, params).unwrap();
    assert!(report.feedback);
    assert!((report.map - 1.0).abs() < 1e-12, "map {}", report.map);
}

#[test]
fn evaluation_without_judgments_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let mut engine = open_engine(tmp.path(), &example_docs());
    let err = eval::evaluate(
        &mut engine,
        &[],
        &cranbert::Judgments::new(),
        EvalParams::default(),
    )
    .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{err:?}");
}

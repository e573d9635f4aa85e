//! cranbert - hybrid retrieval over the Cranfield collection.
//!
//! Every document is indexed twice: as an L2-normalized TF-IDF vector over
//! stemmed unigrams and bigrams, and as a sentence embedding produced by a
//! BERT encoder running on [candle](https://github.com/huggingface/candle).
//! Queries are scored against both and the cosine similarities are blended
//! with a single weight `lambda`. Rocchio relevance feedback moves both query
//! vectors toward documents the user marked relevant, and an evaluator
//! reports P@k, nDCG@k and MAP over the benchmark judgments.
//!
//! # Quick start
//!
//! ```no_run
//! use cranbert::{CorpusDir, DataDir, Engine, IndexPaths, ModelManager};
//! use cranbert::search::SearchParams;
//!
//! let data_dir = DataDir::resolve(None).unwrap();
//! let corpus = CorpusDir::open(&data_dir.corpus_dir(None));
//! let paths = IndexPaths::from_data_dir(&data_dir);
//!
//! let mut engine =
//!     Engine::open(&paths, &corpus, ModelManager::new(), true).unwrap();
//! let params = SearchParams::new(10, 0.5).unwrap();
//!
//! for r in engine.search("boundary layer transition", params).unwrap() {
//!     println!("{} {:.3} {}", r.rank, r.fused_score, r.title);
//! }
//! ```

pub mod cli;
pub mod config_db;
pub mod corpus;
pub mod data_dir;
pub mod embedding;
pub mod embedding_db;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod eval;
pub mod feedback;
pub mod lexical;
pub mod lexical_db;
pub mod model_manager;
pub mod normalize;
pub mod search;
pub mod semantic;
pub mod vector;

pub use config_db::ConfigDb;
pub use corpus::{CorpusDir, Document, DocumentSource, Judgments, Query};
pub use data_dir::DataDir;
pub use embedding_db::EmbeddingDb;
pub use encoder::{Encoder, SentenceEncoder};
pub use engine::{Engine, IndexPaths};
pub use error::{Error, Result};
pub use lexical::LexicalIndex;
pub use lexical_db::LexicalDb;
pub use model_manager::ModelManager;
pub use semantic::SemanticIndex;

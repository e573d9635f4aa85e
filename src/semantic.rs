//! Dense sentence-embedding index.
//!
//! One unit-length vector per document, built from `title + ". " + text` by
//! the encoder held in a [`ModelManager`]. The encoder id is stored with the
//! matrix; query vectors must come from the same encoder.

use std::path::Path;

use tracing::info;

use crate::{
    corpus::{Document, DocumentSource},
    embedding::encode_documents,
    embedding_db::EmbeddingDb,
    error::{Error, Result},
    lexical::LexicalIndex,
    model_manager::ModelManager,
    vector::DenseMatrix,
};

#[derive(Debug, Clone)]
pub struct SemanticIndex {
    matrix: DenseMatrix,
    doc_ids: Vec<String>,
    encoder_id: String,
}

impl SemanticIndex {
    /// Encode `documents` in memory without persisting anything.
    pub fn from_documents(
        documents: &[Document],
        model: &mut ModelManager,
        progress: bool,
    ) -> Result<Self> {
        let matrix = encode_documents(model, documents, progress)?;
        info!(
            documents = matrix.n_rows(),
            dimension = matrix.dim(),
            encoder = model.model_id(),
            "encoded documents"
        );
        Self::from_parts(
            model.model_id().to_string(),
            documents.iter().map(|d| d.id.clone()).collect(),
            matrix,
        )
    }

    pub fn from_parts(
        encoder_id: String,
        doc_ids: Vec<String>,
        matrix: DenseMatrix,
    ) -> Result<Self> {
        if doc_ids.len() != matrix.n_rows() {
            return Err(Error::IndexMisalignment {
                reason: format!(
                    "embedding matrix has {} rows but {} document ids",
                    matrix.n_rows(),
                    doc_ids.len()
                ),
            });
        }
        Ok(Self {
            matrix,
            doc_ids,
            encoder_id,
        })
    }

    /// Encode the lexical index's document table and persist the matrix to
    /// `path`. Sharing the table keeps both indexes on the same row order.
    pub fn build(
        path: &Path,
        lexical: &LexicalIndex,
        model: &mut ModelManager,
        progress: bool,
    ) -> Result<Self> {
        let index = Self::from_documents(lexical.documents(), model, progress)?;
        EmbeddingDb::create(path)?.save(
            &index.encoder_id,
            &index.doc_ids,
            &index.matrix,
        )?;
        info!(path = %path.display(), "saved semantic index");
        Ok(index)
    }

    /// Build against the document table stored at `lexical_path`, building
    /// the lexical index from `source` first when it does not exist yet.
    pub fn build_from_source<S: DocumentSource + ?Sized>(
        path: &Path,
        lexical_path: &Path,
        source: &S,
        model: &mut ModelManager,
        progress: bool,
    ) -> Result<Self> {
        let lexical = LexicalIndex::load_or_build(lexical_path, source)?;
        Self::build(path, &lexical, model, progress)
    }

    /// Load a persisted matrix. The encoder itself is loaded lazily by the
    /// [`ModelManager`] on the first query.
    pub fn load(path: &Path) -> Result<Self> {
        let stored = EmbeddingDb::open_existing(path)?.load()?;
        info!(
            documents = stored.matrix.n_rows(),
            dimension = stored.matrix.dim(),
            encoder = %stored.encoder_id,
            "loaded semantic index"
        );
        Self::from_parts(stored.encoder_id, stored.doc_ids, stored.matrix)
    }

    /// Load from `path`, encoding the lexical document table when the
    /// artifact is missing. Any other load failure propagates.
    pub fn load_or_build(
        path: &Path,
        lexical: &LexicalIndex,
        model: &mut ModelManager,
        progress: bool,
    ) -> Result<Self> {
        match Self::load(path) {
            Ok(index) => Ok(index),
            Err(err) if err.is_missing_artifact() => {
                info!(%err, "building semantic index");
                Self::build(path, lexical, model, progress)
            }
            Err(err) => Err(err),
        }
    }

    /// Fail unless `model` is the encoder this index was built with.
    pub fn check_encoder(&self, model: &ModelManager) -> Result<()> {
        if model.model_id() != self.encoder_id {
            return Err(Error::EncoderMismatch {
                indexed: self.encoder_id.clone(),
                requested: model.model_id().to_string(),
            });
        }
        Ok(())
    }

    /// Encode the raw query text (no normalization).
    pub fn query_vector(
        &self,
        text: &str,
        model: &mut ModelManager,
    ) -> Result<Vec<f32>> {
        self.check_encoder(model)?;
        let vector = model.encode_query(text)?;
        if vector.len() != self.matrix.dim() {
            return Err(Error::CorruptArtifact {
                artifact: "semantic",
                reason: format!(
                    "query vector has {} dimensions, index has {}",
                    vector.len(),
                    self.matrix.dim()
                ),
            });
        }
        Ok(vector)
    }

    /// Cosine similarity of `query` with every document, in row order.
    pub fn scores(&self, query: &[f32]) -> Vec<f32> {
        self.matrix.cosine_scores(query)
    }

    /// Verify this index lines up row for row with `documents`.
    pub fn check_alignment(&self, documents: &[Document]) -> Result<()> {
        if self.doc_ids.len() != documents.len() {
            return Err(Error::IndexMisalignment {
                reason: format!(
                    "lexical index has {} documents, semantic index has {}",
                    documents.len(),
                    self.doc_ids.len()
                ),
            });
        }
        if let Some((row, (doc, id))) = documents
            .iter()
            .zip(&self.doc_ids)
            .enumerate()
            .find(|(_, (doc, id))| doc.id != **id)
        {
            return Err(Error::IndexMisalignment {
                reason: format!(
                    "row {row} is document '{}' lexically but '{id}' semantically",
                    doc.id
                ),
            });
        }
        Ok(())
    }

    pub fn matrix(&self) -> &DenseMatrix {
        &self.matrix
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    pub fn encoder_id(&self) -> &str {
        &self.encoder_id
    }

    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    pub fn len(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Encoder;

    /// Two-dimensional encoder: [contains "wing", contains "flow"].
    struct Keywords;

    impl Encoder for Keywords {
        fn model_id(&self) -> &str {
            "test/keywords"
        }

        fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        f32::from(u8::from(t.contains("wing"))),
                        f32::from(u8::from(t.contains("flow"))),
                    ]
                })
                .collect())
        }
    }

    fn lexical() -> LexicalIndex {
        LexicalIndex::from_documents(
            vec![
                Document::new("a", "Wing", "swept planform"),
                Document::new("b", "Flow", "laminar separation"),
            ],
            "test",
        )
        .unwrap()
    }

    #[test]
    fn semantic_text_includes_title() {
        let mut model = ModelManager::with_encoder(Box::new(Keywords));
        let index =
            SemanticIndex::from_documents(lexical().documents(), &mut model, false)
                .unwrap();

        assert_eq!(index.matrix().row(0), &[1.0, 0.0]);
        assert_eq!(index.matrix().row(1), &[0.0, 1.0]);
        assert_eq!(index.encoder_id(), "test/keywords");
    }

    #[test]
    fn query_scores_follow_encoder() {
        let mut model = ModelManager::with_encoder(Box::new(Keywords));
        let index =
            SemanticIndex::from_documents(lexical().documents(), &mut model, false)
                .unwrap();

        let q = index.query_vector("flow over a wing", &mut model).unwrap();
        let scores = index.scores(&q);
        assert!((scores[0] - scores[1]).abs() < 1e-6);

        let q = index.query_vector("wing", &mut model).unwrap();
        assert_eq!(index.scores(&q), vec![1.0, 0.0]);
    }

    #[test]
    fn different_encoder_is_rejected() {
        let mut model = ModelManager::with_encoder(Box::new(Keywords));
        let index =
            SemanticIndex::from_documents(lexical().documents(), &mut model, false)
                .unwrap();

        let mut other = ModelManager::with_model_id("other/model".into());
        let err = index.query_vector("wing", &mut other).unwrap_err();
        assert!(matches!(err, Error::EncoderMismatch { .. }));
        assert!(!other.is_loaded(), "mismatch is detected before loading");
    }

    #[test]
    fn alignment_checks_length_and_order() {
        let lex = lexical();
        let mut model = ModelManager::with_encoder(Box::new(Keywords));
        let index =
            SemanticIndex::from_documents(lex.documents(), &mut model, false)
                .unwrap();
        index.check_alignment(lex.documents()).unwrap();

        let mut swapped = lex.documents().to_vec();
        swapped.swap(0, 1);
        assert!(matches!(
            index.check_alignment(&swapped),
            Err(Error::IndexMisalignment { .. })
        ));
        assert!(matches!(
            index.check_alignment(&swapped[..1]),
            Err(Error::IndexMisalignment { .. })
        ));
    }

    #[test]
    fn load_or_build_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("embeddings.redb");
        let lex = lexical();
        let mut model = ModelManager::with_encoder(Box::new(Keywords));

        assert!(SemanticIndex::load(&path).unwrap_err().is_missing_artifact());
        let built =
            SemanticIndex::load_or_build(&path, &lex, &mut model, false).unwrap();
        let loaded = SemanticIndex::load(&path).unwrap();

        assert_eq!(loaded.matrix(), built.matrix());
        assert_eq!(loaded.doc_ids(), built.doc_ids());
        assert_eq!(loaded.encoder_id(), built.encoder_id());
    }

    #[test]
    fn build_from_source_creates_lexical_table_first() {
        let tmp = tempfile::tempdir().unwrap();
        let lexical_path = tmp.path().join("lexical.redb");
        let path = tmp.path().join("embeddings.redb");
        let docs = lexical().documents().to_vec();
        let mut model = ModelManager::with_encoder(Box::new(Keywords));

        let index = SemanticIndex::build_from_source(
            &path,
            &lexical_path,
            &docs,
            &mut model,
            false,
        )
        .unwrap();

        assert!(lexical_path.exists());
        let lex = LexicalIndex::load(&lexical_path).unwrap();
        index.check_alignment(lex.documents()).unwrap();
    }
}

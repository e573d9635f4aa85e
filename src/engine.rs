use std::path::PathBuf;

use tracing::{info, warn};

use crate::{
    corpus::DocumentSource,
    data_dir::DataDir,
    error::{Error, Result},
    feedback::{Feedback, FeedbackOutcome, RocchioWeights, feedback_rank},
    lexical::LexicalIndex,
    model_manager::ModelManager,
    search::{RankedResult, SearchParams, check_alignment, score_and_rank},
    semantic::SemanticIndex,
};

/// Where the two index artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPaths {
    pub lexical: PathBuf,
    pub semantic: PathBuf,
}

impl IndexPaths {
    pub fn from_data_dir(data_dir: &DataDir) -> Self {
        Self {
            lexical: data_dir.lexical_db(),
            semantic: data_dir.embeddings_db(),
        }
    }
}

/// Both indexes plus the encoder, loaded once and reused for every query.
#[derive(Debug)]
pub struct Engine {
    lexical: LexicalIndex,
    semantic: SemanticIndex,
    model: ModelManager,
}

impl Engine {
    /// Wrap already built indexes, checking that they are row-aligned.
    pub fn new(
        lexical: LexicalIndex,
        semantic: SemanticIndex,
        model: ModelManager,
    ) -> Result<Self> {
        check_alignment(&lexical, &semantic)?;
        Ok(Self {
            lexical,
            semantic,
            model,
        })
    }

    /// Load both indexes, building whichever is missing. The semantic index
    /// is always built from the lexical index's document table.
    ///
    /// Building a missing semantic index needs a working encoder, even when
    /// every later query runs with `lambda = 0`. On a fresh data directory
    /// an unavailable encoder fails here with [`Error::EncoderUnavailable`]
    /// after the lexical index has been persisted. Once the embeddings exist,
    /// `open` succeeds without touching the encoder.
    pub fn open<S: DocumentSource + ?Sized>(
        paths: &IndexPaths,
        source: &S,
        mut model: ModelManager,
        progress: bool,
    ) -> Result<Self> {
        let lexical = LexicalIndex::load_or_build(&paths.lexical, source)?;
        let semantic = SemanticIndex::load_or_build(
            &paths.semantic,
            &lexical,
            &mut model,
            progress,
        )?;
        Self::new(lexical, semantic, model)
    }

    /// Rebuild both indexes from `source`, replacing the stored artifacts.
    pub fn rebuild<S: DocumentSource + ?Sized>(
        paths: &IndexPaths,
        source: &S,
        mut model: ModelManager,
        progress: bool,
    ) -> Result<Self> {
        info!("rebuilding lexical and semantic indexes");
        let lexical = LexicalIndex::build(&paths.lexical, source)?;
        let semantic =
            SemanticIndex::build(&paths.semantic, &lexical, &mut model, progress)?;
        Self::new(lexical, semantic, model)
    }

    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    pub fn semantic(&self) -> &SemanticIndex {
        &self.semantic
    }

    pub fn model(&self) -> &ModelManager {
        &self.model
    }

    /// Encode the query, or `None` when the encoder cannot be loaded and
    /// `lambda` is 0 so semantic scores do not matter.
    fn semantic_query(
        &mut self,
        query: &str,
        lambda: f32,
    ) -> Result<Option<Vec<f32>>> {
        match self.semantic.query_vector(query, &mut self.model) {
            Ok(qv) => Ok(Some(qv)),
            Err(Error::EncoderUnavailable(reason)) if lambda == 0.0 => {
                warn!(
                    %reason,
                    "sentence encoder unavailable, ranking lexically with semantic scores of 0"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn search(
        &mut self,
        query: &str,
        params: SearchParams,
    ) -> Result<Vec<RankedResult>> {
        params.validate()?;
        let lexical_qv = self.lexical.query_vector(query);
        let semantic_qv = self.semantic_query(query, params.lambda)?;
        score_and_rank(
            &self.lexical,
            &self.semantic,
            &lexical_qv,
            semantic_qv.as_deref(),
            params,
        )
    }

    pub fn feedback_search(
        &mut self,
        query: &str,
        feedback: &Feedback,
        params: SearchParams,
        weights: RocchioWeights,
    ) -> Result<FeedbackOutcome> {
        params.validate()?;
        let lexical_qv = self.lexical.query_vector(query);
        let semantic_qv = self.semantic_query(query, params.lambda)?;
        feedback_rank(
            &self.lexical,
            &self.semantic,
            &lexical_qv,
            semantic_qv.as_deref(),
            feedback,
            params,
            weights,
        )
    }
}

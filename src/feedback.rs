//! Rocchio relevance feedback.
//!
//! In each vector space independently:
//!
//! ```text
//! q' = alpha * q + beta * mean(relevant) - gamma * mean(non_relevant)
//! ```
//!
//! A mean over no documents is left out. The dense vector is rescaled to
//! unit length afterwards; the sparse one is not. The updated pair is then
//! ranked against the whole corpus with the same fusion as plain search.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    lexical::LexicalIndex,
    model_manager::ModelManager,
    search::{RankedResult, SearchParams, score_and_rank},
    semantic::SemanticIndex,
    vector::{DenseMatrix, SparseMatrix, SparseVector, l2_norm},
};

pub const DEFAULT_ALPHA: f32 = 1.0;
pub const DEFAULT_BETA: f32 = 0.8;
pub const DEFAULT_GAMMA: f32 = 0.0;

/// Added to the norm before rescaling the dense query vector.
pub const NORM_EPSILON: f32 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RocchioWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl Default for RocchioWeights {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            beta: DEFAULT_BETA,
            gamma: DEFAULT_GAMMA,
        }
    }
}

impl RocchioWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in
            [("alpha", self.alpha), ("beta", self.beta), ("gamma", self.gamma)]
        {
            if !value.is_finite() {
                return Err(Error::InvalidArgument(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Document ids the user marked, by judgment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Feedback {
    pub relevant: Vec<String>,
    pub non_relevant: Vec<String>,
}

impl Feedback {
    pub fn relevant<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            relevant: ids.into_iter().map(Into::into).collect(),
            non_relevant: Vec::new(),
        }
    }
}

/// Ranked results after feedback, plus the ids that matched no document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackOutcome {
    pub results: Vec<RankedResult>,
    pub skipped_ids: Vec<String>,
}

/// Row indices of `ids`, deduplicated in input order. Ids not in the
/// document table are logged and returned separately.
pub fn resolve_rows(
    lexical: &LexicalIndex,
    ids: &[String],
) -> (Vec<usize>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    let mut skipped = Vec::new();

    for id in ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        match lexical.row_of(id) {
            Some(row) => rows.push(row),
            None => {
                warn!(id = %id, "feedback document not in index, skipping");
                skipped.push(id.clone());
            }
        }
    }

    (rows, skipped)
}

/// Rocchio update of a sparse lexical query vector. Not normalized.
pub fn rocchio_sparse(
    query: &SparseVector,
    matrix: &SparseMatrix,
    relevant: &[usize],
    non_relevant: &[usize],
    weights: RocchioWeights,
) -> SparseVector {
    let mut updated = query.scaled(weights.alpha);
    if let Some(centroid) = matrix.centroid(relevant) {
        updated = updated.add_scaled(weights.beta, centroid.as_row());
    }
    if let Some(centroid) = matrix.centroid(non_relevant) {
        updated = updated.add_scaled(-weights.gamma, centroid.as_row());
    }
    updated
}

/// Rocchio update of a dense semantic query vector, rescaled to unit
/// length.
pub fn rocchio_dense(
    query: &[f32],
    matrix: &DenseMatrix,
    relevant: &[usize],
    non_relevant: &[usize],
    weights: RocchioWeights,
) -> Vec<f32> {
    let mut updated: Vec<f32> = query.iter().map(|v| weights.alpha * v).collect();
    if let Some(centroid) = matrix.centroid(relevant) {
        for (u, c) in updated.iter_mut().zip(&centroid) {
            *u += weights.beta * c;
        }
    }
    if let Some(centroid) = matrix.centroid(non_relevant) {
        for (u, c) in updated.iter_mut().zip(&centroid) {
            *u -= weights.gamma * c;
        }
    }

    let norm = l2_norm(&updated) + NORM_EPSILON;
    for u in &mut updated {
        *u /= norm;
    }
    updated
}

/// Apply feedback to already computed query vectors and re-rank the whole
/// corpus.
///
/// `semantic_qv` may be `None` only when `params.lambda == 0`; see
/// [`score_and_rank`].
#[allow(clippy::too_many_arguments)]
pub fn feedback_rank(
    lexical: &LexicalIndex,
    semantic: &SemanticIndex,
    lexical_qv: &SparseVector,
    semantic_qv: Option<&[f32]>,
    feedback: &Feedback,
    params: SearchParams,
    weights: RocchioWeights,
) -> Result<FeedbackOutcome> {
    params.validate()?;
    weights.validate()?;

    let (relevant, mut skipped_ids) = resolve_rows(lexical, &feedback.relevant);
    let (non_relevant, skipped_non) =
        resolve_rows(lexical, &feedback.non_relevant);
    skipped_ids.extend(skipped_non);

    debug!(
        relevant = relevant.len(),
        non_relevant = non_relevant.len(),
        skipped = skipped_ids.len(),
        "applying rocchio feedback"
    );

    let lexical_updated = rocchio_sparse(
        lexical_qv,
        lexical.matrix(),
        &relevant,
        &non_relevant,
        weights,
    );
    let semantic_updated = semantic_qv.map(|qv| {
        rocchio_dense(qv, semantic.matrix(), &relevant, &non_relevant, weights)
    });

    let results = score_and_rank(
        lexical,
        semantic,
        &lexical_updated,
        semantic_updated.as_deref(),
        params,
    )?;

    Ok(FeedbackOutcome {
        results,
        skipped_ids,
    })
}

/// Encode `query`, move it toward the marked documents and re-rank.
pub fn feedback_search(
    lexical: &LexicalIndex,
    semantic: &SemanticIndex,
    model: &mut ModelManager,
    query: &str,
    feedback: &Feedback,
    params: SearchParams,
    weights: RocchioWeights,
) -> Result<FeedbackOutcome> {
    let lexical_qv = lexical.query_vector(query);
    let semantic_qv = semantic.query_vector(query, model)?;
    feedback_rank(
        lexical,
        semantic,
        &lexical_qv,
        Some(&semantic_qv),
        feedback,
        params,
        weights,
    )
}

//! Hybrid ranking: convex fusion of lexical and semantic cosine scores.
//!
//! ```text
//! fused[i] = lambda * semantic[i] + (1 - lambda) * lexical[i]
//! ```
//!
//! The top `topk` rows by fused score are returned in descending order, ties
//! kept in document row order.

use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::{
    corpus::Document,
    error::{Error, Result},
    lexical::LexicalIndex,
    model_manager::ModelManager,
    semantic::SemanticIndex,
    vector::SparseVector,
};

pub const DEFAULT_TOPK: usize = 10;
pub const DEFAULT_LAMBDA: f32 = 0.5;

/// How many results to return and how to weigh the two scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchParams {
    pub topk: usize,
    /// Weight of the semantic score, in `[0, 1]`.
    pub lambda: f32,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            topk: DEFAULT_TOPK,
            lambda: DEFAULT_LAMBDA,
        }
    }
}

impl SearchParams {
    pub fn new(topk: usize, lambda: f32) -> Result<Self> {
        let params = Self { topk, lambda };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.topk == 0 {
            return Err(Error::InvalidArgument(
                "topk must be greater than zero".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(Error::InvalidArgument(format!(
                "lambda must be within [0, 1], got {}",
                self.lambda
            )));
        }
        Ok(())
    }
}

/// One ranked document with all three scores.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub rank: usize,
    pub id: String,
    pub title: String,
    pub text: String,
    pub fused_score: f32,
    pub lexical_score: f32,
    pub semantic_score: f32,
}

/// Verify that both indexes were built from the same document table, row
/// for row.
pub fn check_alignment(
    lexical: &LexicalIndex,
    semantic: &SemanticIndex,
) -> Result<()> {
    semantic.check_alignment(lexical.documents())
}

/// Fuse two equally long score vectors.
pub fn fuse(lexical: &[f32], semantic: &[f32], lambda: f32) -> Vec<f32> {
    lexical
        .iter()
        .zip(semantic)
        .map(|(&lex, &sem)| lambda * sem + (1.0 - lambda) * lex)
        .collect()
}

/// Indices of the `k` largest scores, descending, ties in index order.
pub fn top_k(scores: &[f32], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal)
    });
    order.truncate(k);
    order
}

/// Fuse per-document scores and return the best `params.topk` documents.
///
/// This is the single ranking step shared by plain search and feedback.
pub fn rank(
    documents: &[Document],
    lexical_scores: &[f32],
    semantic_scores: &[f32],
    params: SearchParams,
) -> Result<Vec<RankedResult>> {
    params.validate()?;
    if lexical_scores.len() != documents.len()
        || semantic_scores.len() != documents.len()
    {
        return Err(Error::IndexMisalignment {
            reason: format!(
                "{} documents but {} lexical and {} semantic scores",
                documents.len(),
                lexical_scores.len(),
                semantic_scores.len()
            ),
        });
    }

    let fused = fuse(lexical_scores, semantic_scores, params.lambda);
    Ok(top_k(&fused, params.topk)
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let doc = &documents[row];
            RankedResult {
                rank: i + 1,
                id: doc.id.clone(),
                title: doc.title.clone(),
                text: doc.text.clone(),
                fused_score: fused[row],
                lexical_score: lexical_scores[row],
                semantic_score: semantic_scores[row],
            }
        })
        .collect())
}

/// Score both query vectors against the full corpus and rank.
///
/// Without a semantic query vector every semantic score is 0, which is only
/// accepted for `lambda == 0`.
pub fn score_and_rank(
    lexical: &LexicalIndex,
    semantic: &SemanticIndex,
    lexical_qv: &SparseVector,
    semantic_qv: Option<&[f32]>,
    params: SearchParams,
) -> Result<Vec<RankedResult>> {
    params.validate()?;
    check_alignment(lexical, semantic)?;

    let semantic_scores = match semantic_qv {
        Some(qv) => semantic.scores(qv),
        None if params.lambda == 0.0 => vec![0.0; lexical.len()],
        None => {
            return Err(Error::InvalidArgument(format!(
                "a semantic query vector is required for lambda {}",
                params.lambda
            )));
        }
    };

    rank(
        lexical.documents(),
        &lexical.scores(lexical_qv),
        &semantic_scores,
        params,
    )
}

/// Rank the whole corpus against `query`.
pub fn search(
    lexical: &LexicalIndex,
    semantic: &SemanticIndex,
    model: &mut ModelManager,
    query: &str,
    params: SearchParams,
) -> Result<Vec<RankedResult>> {
    params.validate()?;
    check_alignment(lexical, semantic)?;

    let lexical_qv = lexical.query_vector(query);
    let semantic_qv = semantic.query_vector(query, model)?;
    debug!(
        query,
        lexical_terms = lexical_qv.nnz(),
        lambda = params.lambda,
        "scoring query"
    );

    score_and_rank(lexical, semantic, &lexical_qv, Some(&semantic_qv), params)
}

/// Format results for human-readable terminal output.
pub fn format_human(results: &[RankedResult]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for r in results {
        println!(
            "{:>3}. [{:.3}] lex {:.3} sem {:.3}  #{}",
            r.rank, r.fused_score, r.lexical_score, r.semantic_score, r.id
        );
        if !r.title.is_empty() {
            println!("     {}", r.title);
        }
    }
    println!("\n{} result(s)", results.len());
}

#[derive(Serialize)]
struct JsonResults<'a> {
    query: &'a str,
    lambda: f32,
    result_count: usize,
    results: &'a [RankedResult],
}

/// Format results as JSON output.
pub fn format_json(
    results: &[RankedResult],
    query: &str,
    lambda: f32,
) -> Result<()> {
    let out = JsonResults {
        query,
        lambda,
        result_count: results.len(),
        results,
    };
    println!("{}", serde_json::to_string(&out)?);
    Ok(())
}

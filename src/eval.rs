//! Ranking-quality metrics with binary relevance, and a runner that scores
//! every judged query of the benchmark set.
//!
//! `precision_at_k` always divides by `k`, even when fewer than `k` ids were
//! retrieved, so short result lists are penalized.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    corpus::{Judgments, Query},
    engine::Engine,
    error::{Error, Result},
    feedback::{Feedback, RocchioWeights},
    search::SearchParams,
};

fn hits<'a, S: AsRef<str> + 'a>(
    retrieved: impl IntoIterator<Item = &'a S>,
    relevant: &HashSet<String>,
) -> usize {
    retrieved
        .into_iter()
        .filter(|id| relevant.contains(id.as_ref()))
        .count()
}

/// Relevant ids among the first `k`, divided by `k`. Zero when `k` is zero.
pub fn precision_at_k<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &HashSet<String>,
    k: usize,
) -> f64 {
    if k == 0 {
        return 0.0;
    }
    hits(retrieved.iter().take(k), relevant) as f64 / k as f64
}

/// Fraction of the relevant set found among the first `k`. Zero when the
/// relevant set is empty.
pub fn recall_at_k<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &HashSet<String>,
    k: usize,
) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    hits(retrieved.iter().take(k), relevant) as f64 / relevant.len() as f64
}

/// Sum of the precision at each relevant rank over the whole list, divided
/// by `|relevant|`. Zero when nothing relevant was retrieved.
pub fn average_precision<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &HashSet<String>,
) -> f64 {
    let mut found = 0usize;
    let mut sum = 0.0;
    for (i, id) in retrieved.iter().enumerate() {
        if relevant.contains(id.as_ref()) {
            found += 1;
            sum += found as f64 / (i + 1) as f64;
        }
    }
    if found == 0 {
        return 0.0;
    }
    sum / relevant.len() as f64
}

/// One over the rank of the first relevant id, or zero.
pub fn reciprocal_rank<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &HashSet<String>,
) -> f64 {
    retrieved
        .iter()
        .position(|id| relevant.contains(id.as_ref()))
        .map_or(0.0, |i| 1.0 / (i + 1) as f64)
}

/// Rank 1 counts in full; rank `i > 1` is divided by `log2(i)`.
fn discount(rank: usize) -> f64 {
    if rank == 1 { 1.0 } else { (rank as f64).log2() }
}

fn dcg(relevances: impl Iterator<Item = f64>) -> f64 {
    relevances
        .enumerate()
        .map(|(i, rel)| rel / discount(i + 1))
        .sum()
}

/// Binary-relevance discounted cumulative gain over the first `k` ids.
pub fn dcg_at_k<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &HashSet<String>,
    k: usize,
) -> f64 {
    dcg(retrieved.iter().take(k).map(|id| {
        if relevant.contains(id.as_ref()) { 1.0 } else { 0.0 }
    }))
}

/// DCG normalized by the DCG of `min(|relevant|, k)` relevant ids followed
/// by non-relevant ones. Zero when the relevant set is empty.
pub fn ndcg_at_k<S: AsRef<str>>(
    retrieved: &[S],
    relevant: &HashSet<String>,
    k: usize,
) -> f64 {
    let ideal = dcg(std::iter::repeat_n(1.0, relevant.len().min(k)));
    if ideal == 0.0 {
        return 0.0;
    }
    dcg_at_k(retrieved, relevant, k) / ideal
}

/// How the benchmark queries are run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvalParams {
    pub k: usize,
    pub lambda: f32,
    /// Re-rank with Rocchio feedback using each query's judged documents.
    pub feedback: bool,
}

impl Default for EvalParams {
    fn default() -> Self {
        let search = SearchParams::default();
        Self {
            k: search.topk,
            lambda: search.lambda,
            feedback: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryEvaluation {
    pub qid: String,
    pub precision: f64,
    pub ndcg: f64,
    pub average_precision: f64,
    pub recall: f64,
    pub reciprocal_rank: f64,
}

impl QueryEvaluation {
    pub fn compute<S: AsRef<str>>(
        qid: &str,
        retrieved: &[S],
        relevant: &HashSet<String>,
        k: usize,
    ) -> Self {
        Self {
            qid: qid.to_string(),
            precision: precision_at_k(retrieved, relevant, k),
            ndcg: ndcg_at_k(retrieved, relevant, k),
            average_precision: average_precision(retrieved, relevant),
            recall: recall_at_k(retrieved, relevant, k),
            reciprocal_rank: reciprocal_rank(retrieved, relevant),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvalReport {
    pub k: usize,
    pub lambda: f32,
    pub feedback: bool,
    pub queries: Vec<QueryEvaluation>,
    /// Query ids left out of the means because they have no judgments.
    pub skipped: Vec<String>,
    pub mean_precision: f64,
    pub mean_ndcg: f64,
    pub map: f64,
    pub mean_recall: f64,
    pub mrr: f64,
}

impl EvalReport {
    pub fn from_queries(
        params: EvalParams,
        queries: Vec<QueryEvaluation>,
        skipped: Vec<String>,
    ) -> Self {
        let mean = |f: fn(&QueryEvaluation) -> f64| {
            if queries.is_empty() {
                0.0
            } else {
                queries.iter().map(f).sum::<f64>() / queries.len() as f64
            }
        };
        Self {
            k: params.k,
            lambda: params.lambda,
            feedback: params.feedback,
            mean_precision: mean(|q| q.precision),
            mean_ndcg: mean(|q| q.ndcg),
            map: mean(|q| q.average_precision),
            mean_recall: mean(|q| q.recall),
            mrr: mean(|q| q.reciprocal_rank),
            queries,
            skipped,
        }
    }
}

/// Run every query that has judgments and score its top `k` results.
pub fn evaluate(
    engine: &mut Engine,
    queries: &[Query],
    judgments: &Judgments,
    params: EvalParams,
) -> Result<EvalReport> {
    let search = SearchParams::new(params.k, params.lambda)?;
    if judgments.is_empty() {
        return Err(Error::NotFound {
            kind: "relevance judgments",
            name: "qrels".into(),
        });
    }

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for query in queries {
        let Some(relevant) = judgments.relevant(&query.qid) else {
            debug!(qid = %query.qid, "no judgments, skipping query");
            skipped.push(query.qid.clone());
            continue;
        };

        let results = if params.feedback {
            let mut ids: Vec<&String> = relevant.iter().collect();
            ids.sort();
            let feedback = Feedback::relevant(ids.into_iter().cloned());
            engine
                .feedback_search(
                    &query.query,
                    &feedback,
                    search,
                    RocchioWeights::default(),
                )?
                .results
        } else {
            engine.search(&query.query, search)?
        };

        let retrieved: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        let row = QueryEvaluation::compute(&query.qid, &retrieved, relevant, params.k);
        debug!(
            qid = %row.qid,
            precision = row.precision,
            ndcg = row.ndcg,
            ap = row.average_precision,
            "evaluated query"
        );
        rows.push(row);
    }

    let report = EvalReport::from_queries(params, rows, skipped);
    info!(
        queries = report.queries.len(),
        skipped = report.skipped.len(),
        mean_precision = report.mean_precision,
        mean_ndcg = report.mean_ndcg,
        map = report.map,
        "evaluation finished"
    );
    Ok(report)
}

/// Format a report for human-readable terminal output.
pub fn format_human(report: &EvalReport) {
    println!("{:<8} {:>8} {:>8} {:>8}", "qid", "P@k", "nDCG@k", "AP");
    for q in &report.queries {
        println!(
            "{:<8} {:>8.4} {:>8.4} {:>8.4}",
            q.qid, q.precision, q.ndcg, q.average_precision
        );
    }
    println!();
    println!(
        "k={} lambda={} feedback={} queries={} skipped={} (no judgments)",
        report.k,
        report.lambda,
        report.feedback,
        report.queries.len(),
        report.skipped.len()
    );
    println!("Mean P@{}    {:.4}", report.k, report.mean_precision);
    println!("Mean nDCG@{} {:.4}", report.k, report.mean_ndcg);
    println!("MAP          {:.4}", report.map);
    println!("Mean R@{}    {:.4}", report.k, report.mean_recall);
    println!("MRR          {:.4}", report.mrr);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn cranfield_example_precision_and_ap() {
        let relevant = set(&["1", "3"]);
        let retrieved = ["2", "1", "3"];

        assert!((precision_at_k(&retrieved, &relevant, 3) - 2.0 / 3.0).abs() < 1e-12);
        let ap = average_precision(&retrieved, &relevant);
        assert!((ap - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-12);
        assert!((ap - 0.583_333).abs() < 1e-6);
    }

    #[test]
    fn precision_divides_by_k_for_short_lists() {
        let relevant = set(&["a"]);
        assert_eq!(precision_at_k(&["a"], &relevant, 10), 0.1);
        assert_eq!(precision_at_k(&["a"], &relevant, 0), 0.0);
    }

    #[test]
    fn precision_extremes() {
        let relevant = set(&["a", "b", "c"]);
        assert_eq!(precision_at_k(&["a", "b", "x"], &relevant, 2), 1.0);
        assert_eq!(precision_at_k(&["x", "y", "a"], &relevant, 2), 0.0);
    }

    #[test]
    fn average_precision_counts_unretrieved_relevant() {
        let relevant = set(&["a", "b", "c", "d"]);
        assert_eq!(average_precision(&["a"], &relevant), 0.25);
        assert_eq!(average_precision(&["x"], &relevant), 0.0);
        assert_eq!(average_precision::<&str>(&[], &set(&[])), 0.0);
    }

    #[test]
    fn dcg_leaves_rank_one_undiscounted() {
        let relevant = set(&["a", "b"]);
        assert_eq!(dcg_at_k(&["a"], &relevant, 5), 1.0);
        // rank 2 is divided by log2(2) = 1
        assert_eq!(dcg_at_k(&["x", "a"], &relevant, 5), 1.0);
        assert!((dcg_at_k(&["x", "y", "a"], &relevant, 5) - 1.0 / 3f64.log2()).abs() < 1e-12);
        assert_eq!(dcg_at_k(&["x", "y", "a"], &relevant, 2), 0.0);
    }

    #[test]
    fn ndcg_is_one_for_perfect_order_and_zero_without_judgments() {
        let relevant = set(&["a", "b"]);
        assert_eq!(ndcg_at_k(&["a", "b", "x"], &relevant, 3), 1.0);
        assert_eq!(ndcg_at_k(&["b", "a"], &relevant, 1), 1.0);
        assert!(ndcg_at_k(&["x", "a", "b"], &relevant, 3) < 1.0);
        assert_eq!(ndcg_at_k(&["a"], &set(&[]), 3), 0.0);
    }

    #[test]
    fn recall_and_reciprocal_rank() {
        let relevant = set(&["a", "b"]);
        assert_eq!(recall_at_k(&["a", "x", "b"], &relevant, 2), 0.5);
        assert_eq!(recall_at_k(&["a"], &set(&[]), 2), 0.0);
        assert_eq!(reciprocal_rank(&["x", "y", "b"], &relevant), 1.0 / 3.0);
        assert_eq!(reciprocal_rank(&["x"], &relevant), 0.0);
    }

    #[test]
    fn report_means() {
        let params = EvalParams::default();
        let rows = vec![
            QueryEvaluation::compute("Q1", &["a"], &set(&["a"]), 1),
            QueryEvaluation::compute("Q2", &["x"], &set(&["a"]), 1),
        ];
        let report = EvalReport::from_queries(params, rows, vec!["Q3".into()]);
        assert_eq!(report.mean_precision, 0.5);
        assert_eq!(report.map, 0.5);
        assert_eq!(report.mrr, 0.5);
        assert_eq!(report.queries.len(), 2);
        assert_eq!(report.skipped, vec!["Q3".to_string()]);

        let empty = EvalReport::from_queries(params, Vec::new(), Vec::new());
        assert_eq!(empty.map, 0.0);
    }

    proptest! {
        #[test]
        fn precision_is_a_fraction(
            retrieved in prop::collection::vec("[a-e]", 0..12),
            relevant in prop::collection::hash_set("[a-e]", 0..5),
            k in 1usize..15,
        ) {
            let p = precision_at_k(&retrieved, &relevant, k);
            prop_assert!((0.0..=1.0).contains(&p));
        }

        #[test]
        fn ndcg_is_one_when_relevant_come_first(
            n_relevant in 1usize..8,
            n_other in 0usize..8,
            k_offset in 0usize..8,
        ) {
            let relevant: HashSet<String> =
                (0..n_relevant).map(|i| format!("r{i}")).collect();
            let mut retrieved: Vec<String> =
                (0..n_relevant).map(|i| format!("r{i}")).collect();
            retrieved.extend((0..n_other).map(|i| format!("n{i}")));

            let k = 1 + k_offset % n_relevant;
            let ndcg = ndcg_at_k(&retrieved, &relevant, k);
            prop_assert!((ndcg - 1.0).abs() < 1e-12);
        }
    }
}

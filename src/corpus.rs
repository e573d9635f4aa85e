//! Normalized Cranfield tables: documents, queries and relevance judgments.
//!
//! Conversion of the raw `cran.all.1400` / `cran.qry` / `cranqrel` files is
//! done upstream; this module reads the normalized JSONL files that
//! conversion produces and hands out ordered, validated tables.

use std::{
    collections::{BTreeMap, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const CORPUS_FILE: &str = "corpus.jsonl";
pub const QUERIES_FILE: &str = "queries.jsonl";
pub const QRELS_FILE: &str = "qrels.jsonl";

/// One abstract of the collection. Identity is `id`; the position in the
/// document table is the row index shared by both indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            text: text.into(),
        }
    }

    /// The raw text the sentence encoder sees: `title + ". " + text`.
    pub fn semantic_text(&self) -> String {
        format!("{}. {}", self.title, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub qid: String,
    pub query: String,
}

/// Ground truth: query id -> set of relevant document ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Judgments {
    by_query: BTreeMap<String, HashSet<String>>,
}

impl Judgments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, qid: impl Into<String>, doc_id: impl Into<String>) {
        self.by_query
            .entry(qid.into())
            .or_default()
            .insert(doc_id.into());
    }

    /// Relevant documents for a query, if the query has any judgments.
    pub fn relevant(&self, qid: &str) -> Option<&HashSet<String>> {
        self.by_query.get(qid)
    }

    pub fn query_ids(&self) -> impl Iterator<Item = &str> {
        self.by_query.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_query.is_empty()
    }
}

impl<Q: Into<String>, D: Into<String>> FromIterator<(Q, D)> for Judgments {
    fn from_iter<I: IntoIterator<Item = (Q, D)>>(iter: I) -> Self {
        let mut judgments = Judgments::new();
        for (qid, doc_id) in iter {
            judgments.insert(qid, doc_id);
        }
        judgments
    }
}

/// Anything that can hand over the ordered document table.
///
/// Implementations must return the same rows in the same order on every
/// call within a build, since both indexes consume it.
pub trait DocumentSource {
    /// Name used in error messages to identify the data source.
    fn name(&self) -> String;

    fn load_documents(&self) -> Result<Vec<Document>>;
}

impl DocumentSource for [Document] {
    fn name(&self) -> String {
        "in-memory document table".to_string()
    }

    fn load_documents(&self) -> Result<Vec<Document>> {
        Ok(self.to_vec())
    }
}

impl DocumentSource for Vec<Document> {
    fn name(&self) -> String {
        self.as_slice().name()
    }

    fn load_documents(&self) -> Result<Vec<Document>> {
        self.as_slice().load_documents()
    }
}

/// Reject tables where two rows share an id.
pub fn check_unique_ids(documents: &[Document]) -> Result<()> {
    let mut seen = HashSet::with_capacity(documents.len());
    for doc in documents {
        if !seen.insert(doc.id.as_str()) {
            return Err(Error::Config(format!(
                "duplicate document id '{}' in document table",
                doc.id
            )));
        }
    }
    Ok(())
}

/// A directory containing `corpus.jsonl`, `queries.jsonl` and `qrels.jsonl`.
#[derive(Debug, Clone)]
pub struct CorpusDir {
    root: PathBuf,
}

impl CorpusDir {
    pub fn open(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load queries in file order.
    ///
    /// When `queries.jsonl` is absent but judgments exist, queries are
    /// synthesized from the judged query ids with empty text.
    pub fn load_queries(&self) -> Result<Vec<Query>> {
        let rows = read_jsonl(&self.root.join(QUERIES_FILE))?;
        let queries: Vec<Query> = rows
            .iter()
            .filter_map(|row| {
                let qid = field_string(row, &["qid", "id"])?;
                let query =
                    field_string(row, &["query", "text"]).unwrap_or_default();
                Some(Query {
                    qid: normalize_qid(&qid),
                    query,
                })
            })
            .collect();

        if !queries.is_empty() {
            return Ok(queries);
        }

        let judgments = self.load_judgments()?;
        Ok(judgments
            .query_ids()
            .map(|qid| Query {
                qid: qid.to_string(),
                query: String::new(),
            })
            .collect())
    }

    /// Load relevance judgments. Relevance grades are ignored: every judged
    /// pair counts as relevant.
    pub fn load_judgments(&self) -> Result<Judgments> {
        let rows = read_jsonl(&self.root.join(QRELS_FILE))?;
        let mut judgments = Judgments::new();

        for row in &rows {
            let Some(qid) = field_string(row, &["qid", "query_id"]) else {
                continue;
            };
            let qid = normalize_qid(&qid);

            if let Some(Value::Array(relevant)) = row.get("relevant") {
                for doc_id in relevant.iter().filter_map(value_to_string) {
                    judgments.insert(qid.clone(), doc_id);
                }
                continue;
            }

            if let Some(doc_id) =
                field_string(row, &["docid", "doc_id", "doc", "document"])
            {
                judgments.insert(qid, doc_id);
            }
        }

        Ok(judgments)
    }
}

impl DocumentSource for CorpusDir {
    fn name(&self) -> String {
        self.root.join(CORPUS_FILE).display().to_string()
    }

    fn load_documents(&self) -> Result<Vec<Document>> {
        let path = self.root.join(CORPUS_FILE);
        if !path.exists() {
            return Err(Error::NotFound {
                kind: "corpus file",
                name: path.display().to_string(),
            });
        }

        let documents: Vec<Document> = read_jsonl(&path)?
            .iter()
            .filter_map(|row| {
                let id = field_string(row, &["id", "docid", "doc_id"])?;
                Some(Document {
                    id,
                    title: field_string(row, &["title"]).unwrap_or_default(),
                    text: field_string(row, &["text", "body"])
                        .unwrap_or_default(),
                })
            })
            .collect();

        check_unique_ids(&documents)?;
        tracing::debug!(
            count = documents.len(),
            path = %path.display(),
            "loaded document table"
        );
        Ok(documents)
    }
}

/// Numeric query ids are written as `Q<n>` so queries and qrels agree.
fn normalize_qid(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("Q{trimmed}")
    } else {
        trimmed.to_string()
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_string(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| row.get(*key).and_then(value_to_string))
}

/// Read a JSON-lines file. A missing file reads as empty; blank and
/// malformed lines are skipped.
fn read_jsonl(path: &Path) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let mut rows = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => rows.push(value),
            Ok(_) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping non-object JSON line"
                );
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = lineno + 1,
                    "skipping malformed JSON line: {e}"
                );
            }
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn semantic_text_joins_title_and_body() {
        let doc = Document::new("1", "Wing flutter", "An analysis.");
        assert_eq!(doc.semantic_text(), "Wing flutter. An analysis.");
    }

    #[test]
    fn load_documents_preserves_file_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            CORPUS_FILE,
            "{\"id\": \"2\", \"title\": \"b\", \"text\": \"second\"}\n\
             \n\
             {\"id\": 1, \"title\": \"a\"}\n\
             not json at all\n\
             {\"id\": \"3\", \"title\": null, \"text\": \"third\"}\n",
        );

        let docs = CorpusDir::open(tmp.path()).load_documents().unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);
        assert_eq!(docs[1].text, "");
        assert_eq!(docs[2].title, "");
    }

    #[test]
    fn missing_corpus_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = CorpusDir::open(tmp.path()).load_documents().unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let docs = vec![
            Document::new("1", "", "a"),
            Document::new("1", "", "b"),
        ];
        assert!(matches!(check_unique_ids(&docs), Err(Error::Config(_))));
    }

    #[test]
    fn qrels_accept_aggregated_and_per_line_forms() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            QRELS_FILE,
            "{\"qid\": \"Q1\", \"relevant\": [\"184\", 29]}\n\
             {\"qid\": \"1\", \"docid\": \"184\", \"score\": 2}\n\
             {\"qid\": 2, \"docid\": \"12\", \"score\": 3}\n",
        );

        let judgments = CorpusDir::open(tmp.path()).load_judgments().unwrap();
        assert_eq!(judgments.len(), 2);

        let q1 = judgments.relevant("Q1").unwrap();
        assert_eq!(q1.len(), 2);
        assert!(q1.contains("184") && q1.contains("29"));
        assert!(judgments.relevant("Q2").unwrap().contains("12"));
    }

    #[test]
    fn queries_fall_back_to_judged_ids() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            QRELS_FILE,
            "{\"qid\": \"Q2\", \"docid\": \"5\"}\n{\"qid\": \"Q1\", \"docid\": \"7\"}\n",
        );

        let queries = CorpusDir::open(tmp.path()).load_queries().unwrap();
        let qids: Vec<_> = queries.iter().map(|q| q.qid.as_str()).collect();
        assert_eq!(qids, vec!["Q1", "Q2"]);
        assert!(queries.iter().all(|q| q.query.is_empty()));
    }

    #[test]
    fn numeric_query_ids_are_prefixed() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            QUERIES_FILE,
            "{\"qid\": 1, \"query\": \"what similarity laws\"}\n\
             {\"qid\": \"Q2\", \"query\": \"boundary layer\"}\n",
        );

        let queries = CorpusDir::open(tmp.path()).load_queries().unwrap();
        assert_eq!(queries[0].qid, "Q1");
        assert_eq!(queries[1].qid, "Q2");
        assert_eq!(queries[1].query, "boundary layer");
    }
}

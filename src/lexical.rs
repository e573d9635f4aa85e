//! TF-IDF lexical index.
//!
//! Documents are normalized with [`crate::normalize::normalize`], split into
//! unigrams and bigrams, and weighted with raw term frequency times smoothed
//! inverse document frequency:
//!
//! ```text
//! idf(t) = ln((1 + N) / (1 + df(t))) + 1
//! ```
//!
//! Every document row and every query vector is L2-normalized. Columns are
//! assigned in lexicographic term order, so the same corpus always yields the
//! same matrix.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use tracing::info;

use crate::corpus::{Document, DocumentSource, check_unique_ids};
use crate::error::{Error, Result};
use crate::lexical_db::LexicalDb;
use crate::normalize::normalize;
use crate::vector::{SparseMatrix, SparseVector};

/// Stop list applied when forming TF-IDF terms (the scikit-learn English
/// list). Broader than the normalizer's list, so words such as `thin` or
/// `system` that survive stemming never become vocabulary columns.
pub const VECTORIZER_STOPWORDS: &[&str] = &[
    "a", "about", "above", "across", "after", "afterwards", "again", "against",
    "all", "almost", "alone", "along", "already", "also", "although", "always",
    "am", "among", "amongst", "amoungst", "amount", "an", "and", "another",
    "any", "anyhow", "anyone", "anything", "anyway", "anywhere", "are",
    "around", "as", "at", "back", "be", "became", "because", "become",
    "becomes", "becoming", "been", "before", "beforehand", "behind", "being",
    "below", "beside", "besides", "between", "beyond", "bill", "both",
    "bottom", "but", "by", "call", "can", "cannot", "cant", "co", "con",
    "could", "couldnt", "cry", "de", "describe", "detail", "do", "done",
    "down", "due", "during", "each", "eg", "eight", "either", "eleven", "else",
    "elsewhere", "empty", "enough", "etc", "even", "ever", "every", "everyone",
    "everything", "everywhere", "except", "few", "fifteen", "fifty", "fill",
    "find", "fire", "first", "five", "for", "former", "formerly", "forty",
    "found", "four", "from", "front", "full", "further", "get", "give", "go",
    "had", "has", "hasnt", "have", "he", "hence", "her", "here", "hereafter",
    "hereby", "herein", "hereupon", "hers", "herself", "him", "himself", "his",
    "how", "however", "hundred", "i", "ie", "if", "in", "inc", "indeed",
    "interest", "into", "is", "it", "its", "itself", "keep", "last", "latter",
    "latterly", "least", "less", "ltd", "made", "many", "may", "me",
    "meanwhile", "might", "mill", "mine", "more", "moreover", "most", "mostly",
    "move", "much", "must", "my", "myself", "name", "namely", "neither",
    "never", "nevertheless", "next", "nine", "no", "nobody", "none", "noone",
    "nor", "not", "nothing", "now", "nowhere", "of", "off", "often", "on",
    "once", "one", "only", "onto", "or", "other", "others", "otherwise", "our",
    "ours", "ourselves", "out", "over", "own", "part", "per", "perhaps",
    "please", "put", "rather", "re", "same", "see", "seem", "seemed",
    "seeming", "seems", "serious", "several", "she", "should", "show", "side",
    "since", "sincere", "six", "sixty", "so", "some", "somehow", "someone",
    "something", "sometime", "sometimes", "somewhere", "still", "such",
    "system", "take", "ten", "than", "that", "the", "their", "them",
    "themselves", "then", "thence", "there", "thereafter", "thereby",
    "therefore", "therein", "thereupon", "these", "they", "thick", "thin",
    "third", "this", "those", "though", "three", "through", "throughout",
    "thru", "thus", "to", "together", "too", "top", "toward", "towards",
    "twelve", "twenty", "two", "un", "under", "until", "up", "upon", "us",
    "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
    "whence", "whenever", "where", "whereafter", "whereas", "whereby",
    "wherein", "whereupon", "wherever", "whether", "which", "while", "whither",
    "who", "whoever", "whole", "whom", "whose", "why", "will", "with",
    "within", "without", "would", "yet", "you", "your", "yours", "yourself",
    "yourselves",
];

/// Returns true for words in [`VECTORIZER_STOPWORDS`].
pub fn is_vectorizer_stopword(token: &str) -> bool {
    VECTORIZER_STOPWORDS.binary_search(&token).is_ok()
}

/// Split an already normalized string into unigram and bigram terms.
///
/// Tokens shorter than two characters and stopwords are dropped before
/// bigrams are formed, so a bigram joins the two surviving neighbours.
pub fn analyze(normalized: &str) -> Vec<String> {
    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .filter(|t| t.len() >= 2 && !is_vectorizer_stopword(t))
        .collect();

    let mut terms: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    terms.extend(tokens.windows(2).map(|w| format!("{} {}", w[0], w[1])));
    terms
}

fn term_counts(normalized: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for term in analyze(normalized) {
        *counts.entry(term).or_insert(0) += 1;
    }
    counts
}

/// Fitted vocabulary and IDF weights.
#[derive(Debug, Clone, PartialEq)]
pub struct TfidfModel {
    /// Terms in column order (lexicographic).
    terms: Vec<String>,
    columns: HashMap<String, u32>,
    idf: Vec<f32>,
}

impl TfidfModel {
    /// Fit on normalized texts and return the model with the weighted
    /// document matrix. `None` when no text yields a single term.
    pub fn fit_transform<S: AsRef<str>>(
        texts: &[S],
    ) -> Option<(Self, SparseMatrix)> {
        let counts: Vec<HashMap<String, u32>> =
            texts.iter().map(|t| term_counts(t.as_ref())).collect();

        let mut df: BTreeMap<&str, usize> = BTreeMap::new();
        for doc in &counts {
            for term in doc.keys() {
                *df.entry(term.as_str()).or_insert(0) += 1;
            }
        }
        if df.is_empty() {
            return None;
        }

        let n_docs = texts.len() as f64;
        let terms: Vec<String> = df.keys().map(|t| t.to_string()).collect();
        let idf: Vec<f32> = df
            .values()
            .map(|&d| (((1.0 + n_docs) / (1.0 + d as f64)).ln() + 1.0) as f32)
            .collect();

        let model = Self::from_parts(terms, idf).ok()?;
        let rows = counts.iter().map(|c| model.weigh(c)).collect();
        let matrix = SparseMatrix::from_rows(model.n_terms(), rows);
        Some((model, matrix))
    }

    /// Reassemble a model from its persisted terms (in column order) and
    /// IDF weights.
    pub fn from_parts(terms: Vec<String>, idf: Vec<f32>) -> Result<Self> {
        if terms.len() != idf.len() {
            return Err(Error::CorruptArtifact {
                artifact: "lexical",
                reason: format!(
                    "{} terms but {} idf weights",
                    terms.len(),
                    idf.len()
                ),
            });
        }
        let columns = terms
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i as u32))
            .collect();
        Ok(Self {
            terms,
            columns,
            idf,
        })
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn idf(&self) -> &[f32] {
        &self.idf
    }

    pub fn column(&self, term: &str) -> Option<u32> {
        self.columns.get(term).copied()
    }

    /// Weigh a normalized string. Out-of-vocabulary terms are ignored.
    pub fn transform(&self, normalized: &str) -> SparseVector {
        self.weigh(&term_counts(normalized))
    }

    fn weigh(&self, counts: &HashMap<String, u32>) -> SparseVector {
        SparseVector::from_pairs(counts.iter().filter_map(|(term, &count)| {
            let col = self.column(term)?;
            Some((col, count as f32 * self.idf[col as usize]))
        }))
        .l2_normalized()
    }
}

/// Fitted model, document-term matrix and the document table whose order
/// defines the matrix rows.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    model: TfidfModel,
    matrix: SparseMatrix,
    documents: Vec<Document>,
    rows_by_id: HashMap<String, usize>,
}

impl LexicalIndex {
    /// Fit an in-memory index over `documents` without persisting it.
    pub fn from_documents(
        documents: Vec<Document>,
        source_name: &str,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(Error::EmptyCorpus {
                source_name: source_name.to_string(),
            });
        }
        check_unique_ids(&documents)?;

        let texts: Vec<String> =
            documents.iter().map(|d| normalize(&d.text)).collect();
        let (model, matrix) = TfidfModel::fit_transform(&texts).ok_or_else(
            || Error::EmptyCorpus {
                source_name: source_name.to_string(),
            },
        )?;

        info!(
            documents = documents.len(),
            terms = model.n_terms(),
            nnz = matrix.nnz(),
            "fitted tf-idf model"
        );

        Self::from_parts(model, matrix, documents)
    }

    /// Assemble an index from loaded parts, checking that the matrix has
    /// one row per document.
    pub fn from_parts(
        model: TfidfModel,
        matrix: SparseMatrix,
        documents: Vec<Document>,
    ) -> Result<Self> {
        if matrix.n_rows() != documents.len() {
            return Err(Error::IndexMisalignment {
                reason: format!(
                    "lexical matrix has {} rows but the document table has {}",
                    matrix.n_rows(),
                    documents.len()
                ),
            });
        }
        if matrix.n_cols() != model.n_terms() {
            return Err(Error::CorruptArtifact {
                artifact: "lexical",
                reason: format!(
                    "matrix has {} columns but the vocabulary has {} terms",
                    matrix.n_cols(),
                    model.n_terms()
                ),
            });
        }

        let rows_by_id = documents
            .iter()
            .enumerate()
            .map(|(i, d)| (d.id.clone(), i))
            .collect();

        Ok(Self {
            model,
            matrix,
            documents,
            rows_by_id,
        })
    }

    /// Fit over every document from `source` and persist the result to
    /// `path`, replacing whatever was stored there.
    pub fn build<S: DocumentSource + ?Sized>(
        path: &Path,
        source: &S,
    ) -> Result<Self> {
        let documents = source.load_documents()?;
        let index = Self::from_documents(documents, &source.name())?;
        LexicalDb::create(path)?.save(&index)?;
        info!(path = %path.display(), "saved lexical index");
        Ok(index)
    }

    /// Load a persisted index. Fails with [`Error::MissingArtifact`] when
    /// nothing complete is stored at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let index = LexicalDb::open_existing(path)?.load()?;
        info!(
            documents = index.len(),
            terms = index.model.n_terms(),
            "loaded lexical index"
        );
        Ok(index)
    }

    /// Load from `path`, building from `source` when the artifact is
    /// missing. Any other load failure propagates.
    pub fn load_or_build<S: DocumentSource + ?Sized>(
        path: &Path,
        source: &S,
    ) -> Result<Self> {
        match Self::load(path) {
            Ok(index) => Ok(index),
            Err(err) if err.is_missing_artifact() => {
                info!(%err, "building lexical index");
                Self::build(path, source)
            }
            Err(err) => Err(err),
        }
    }

    /// Apply the fitted model to `normalize(text)`.
    pub fn query_vector(&self, text: &str) -> SparseVector {
        self.model.transform(&normalize(text))
    }

    /// Cosine similarity of `query` with every document, in row order.
    pub fn scores(&self, query: &SparseVector) -> Vec<f32> {
        self.matrix.cosine_scores(query)
    }

    pub fn model(&self) -> &TfidfModel {
        &self.model
    }

    pub fn matrix(&self) -> &SparseMatrix {
        &self.matrix
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Row index of the document with `id`.
    pub fn row_of(&self, id: &str) -> Option<usize> {
        self.rows_by_id.get(id).copied()
    }
}

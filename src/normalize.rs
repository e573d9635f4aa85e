//! Text normalization for the lexical path.
//!
//! `normalize` lowercases, replaces everything outside `[a-z0-9\s]` with a
//! space, splits on whitespace, drops stopwords and single-character tokens,
//! stems the survivors with the English Snowball stemmer and joins them with
//! single spaces. The semantic path never goes through here.

use std::cell::RefCell;

use tantivy::tokenizer::{
    Language,
    Stemmer,
    StopWordFilter,
    TextAnalyzer,
    TokenStream,
    WhitespaceTokenizer,
};

/// English stopwords (the NLTK list, minus contractions, which cannot
/// survive punctuation stripping).
pub const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you",
    "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "her", "hers", "herself", "it", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this",
    "that", "these", "those", "am", "is", "are", "was", "were", "be", "been",
    "being", "have", "has", "had", "having", "do", "does", "did", "doing",
    "a", "an", "the", "and", "but", "if", "or", "because", "as", "until",
    "while", "of", "at", "by", "for", "with", "about", "against", "between",
    "into", "through", "during", "before", "after", "above", "below", "to",
    "from", "up", "down", "in", "out", "on", "off", "over", "under", "again",
    "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "any", "both", "each", "few", "more", "most", "other", "some",
    "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too",
    "very", "s", "t", "can", "will", "just", "don", "should", "now", "d",
    "ll", "m", "o", "re", "ve", "y", "ain", "aren", "couldn", "didn",
    "doesn", "hadn", "hasn", "haven", "isn", "ma", "mightn", "mustn",
    "needn", "shan", "shouldn", "wasn", "weren", "won", "wouldn",
];

thread_local! {
    static ANALYZER: RefCell<TextAnalyzer> = RefCell::new(build_analyzer());
}

fn build_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(WhitespaceTokenizer::default())
        .filter(StopWordFilter::remove(
            STOPWORDS.iter().map(|w| w.to_string()),
        ))
        .filter(Stemmer::new(Language::English))
        .build()
}

/// Normalize `text` into a space-separated string of stemmed tokens.
///
/// Total and deterministic: empty or punctuation-only input yields an empty
/// string.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace()
            {
                c
            } else {
                ' '
            }
        })
        .collect();

    // Length filtering happens before stemming; the analyzer then removes
    // stopwords and stems.
    let candidates = cleaned
        .split_whitespace()
        .filter(|t| t.len() > 1)
        .collect::<Vec<_>>()
        .join(" ");
    if candidates.is_empty() {
        return String::new();
    }

    ANALYZER.with(|analyzer| {
        let mut analyzer = analyzer.borrow_mut();
        let mut stream = analyzer.token_stream(&candidates);
        let mut tokens = Vec::new();
        while stream.advance() {
            tokens.push(stream.token().text.clone());
        }
        tokens.join(" ")
    })
}

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "CRANBERT_DATA_DIR";
pub const CORPUS_DIR_ENV_VAR: &str = "CRANBERT_CORPUS_DIR";

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The CRANBERT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/cranbert/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("cranbert")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// Fitted TF-IDF model, sparse document matrix and document table.
    pub fn lexical_db(&self) -> PathBuf {
        self.root.join("lexical.redb")
    }

    pub fn embeddings_db(&self) -> PathBuf {
        self.root.join("embeddings.redb")
    }

    /// Directory holding the normalized `corpus.jsonl`, `queries.jsonl` and
    /// `qrels.jsonl` files.
    ///
    /// Resolved from an explicit path, then CRANBERT_CORPUS_DIR, then
    /// `<root>/cranfield`.
    pub fn corpus_dir(&self, explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(CORPUS_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            self.root.join("cranfield")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
        assert_eq!(dir.lexical_db(), tmp.path().join("lexical.redb"));
        assert_eq!(dir.embeddings_db(), tmp.path().join("embeddings.redb"));
    }

    #[test]
    fn resolve_creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve(Some(&nested)).unwrap();

        assert!(dir.root().is_dir());
    }

    #[test]
    fn explicit_corpus_dir_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let explicit = tmp.path().join("elsewhere");

        assert_eq!(dir.corpus_dir(Some(&explicit)), explicit);
    }
}

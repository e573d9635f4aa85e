use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("no document in {source_name} yields any indexable token")]
    EmptyCorpus { source_name: String },

    #[error("lexical and semantic indexes are misaligned: {reason}")]
    IndexMisalignment { reason: String },

    #[error("{artifact} artifact missing at {}", path.display())]
    MissingArtifact { artifact: &'static str, path: PathBuf },

    #[error("{artifact} artifact is corrupt: {reason}")]
    CorruptArtifact {
        artifact: &'static str,
        reason: String,
    },

    #[error("sentence encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error(
        "index was built with encoder '{indexed}' but queries use '{requested}'; rebuild the index"
    )]
    EncoderMismatch { indexed: String, requested: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// True for conditions that `load_or_build` recovers from by rebuilding.
    pub fn is_missing_artifact(&self) -> bool {
        matches!(self, Error::MissingArtifact { .. })
    }
}

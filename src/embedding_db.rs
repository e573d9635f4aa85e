use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    error::{Error, Result},
    lexical_db::{meta_usize, open_table_or_missing},
    vector::DenseMatrix,
};

const EMBEDDINGS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("embeddings");
const DOC_IDS: TableDefinition<u64, &str> = TableDefinition::new("doc_ids");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const ARTIFACT: &str = "semantic";

const ENCODER_KEY: &str = "encoder_id";
const DIMENSION_KEY: &str = "dimension";
const DOCUMENT_COUNT_KEY: &str = "document_count";

/// Stores the dense document embedding matrix, one row per document keyed
/// by row index, together with the document id of every row and the id of
/// the encoder that produced it.
///
/// Each `embeddings` entry is D * 4 bytes of f32 values; D is recorded once
/// in `meta`.
pub struct EmbeddingDb {
    db: Database,
    path: PathBuf,
}

/// Everything persisted for the semantic index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbeddings {
    pub encoder_id: String,
    pub doc_ids: Vec<String>,
    pub matrix: DenseMatrix,
}

/// Summary of a stored embedding matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingStats {
    pub encoder_id: String,
    pub documents: usize,
    pub dimension: usize,
}

impl EmbeddingDb {
    /// Open or create an embeddings database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use cranbert::EmbeddingDb;
    ///
    /// let db = EmbeddingDb::create(&tmp.path().join("embeddings.redb")).unwrap();
    /// assert!(db.stats().unwrap().is_none());
    /// ```
    pub fn create(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing file. A missing file is [`Error::MissingArtifact`].
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingArtifact {
                artifact: ARTIFACT,
                path: path.to_path_buf(),
            });
        }
        let db = Database::open(path)?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Replace the stored matrix in a single transaction.
    ///
    /// Uses `insert_reserve` for zero-copy writes.
    pub fn save(
        &self,
        encoder_id: &str,
        doc_ids: &[String],
        matrix: &DenseMatrix,
    ) -> Result<()> {
        if doc_ids.len() != matrix.n_rows() {
            return Err(Error::IndexMisalignment {
                reason: format!(
                    "{} document ids for {} embedding rows",
                    doc_ids.len(),
                    matrix.n_rows()
                ),
            });
        }

        let row_bytes = matrix.dim() * std::mem::size_of::<f32>();

        let txn = self.db.begin_write()?;
        txn.delete_table(EMBEDDINGS)?;
        txn.delete_table(DOC_IDS)?;
        txn.delete_table(META)?;
        {
            let mut embeddings = txn.open_table(EMBEDDINGS)?;
            let mut ids = txn.open_table(DOC_IDS)?;
            for (row, doc_id) in doc_ids.iter().enumerate() {
                let mut guard = embeddings.insert_reserve(row as u64, row_bytes)?;
                guard
                    .as_mut()
                    .copy_from_slice(bytemuck::cast_slice(matrix.row(row)));
                drop(guard);
                ids.insert(row as u64, doc_id.as_str())?;
            }

            let mut meta = txn.open_table(META)?;
            let dimension = matrix.dim().to_string();
            let documents = matrix.n_rows().to_string();
            meta.insert(ENCODER_KEY, encoder_id)?;
            meta.insert(DIMENSION_KEY, dimension.as_str())?;
            meta.insert(DOCUMENT_COUNT_KEY, documents.as_str())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Summary of the stored matrix, or `None` when nothing is stored.
    pub fn stats(&self) -> Result<Option<EmbeddingStats>> {
        let txn = self.db.begin_read()?;
        let meta = match open_table_or_missing(&txn, META, ARTIFACT, &self.path)
        {
            Ok(meta) => meta,
            Err(err) if err.is_missing_artifact() => return Ok(None),
            Err(err) => return Err(err),
        };
        let Some(encoder_id) = meta.get(ENCODER_KEY)? else {
            return Ok(None);
        };
        Ok(Some(EmbeddingStats {
            encoder_id: encoder_id.value().to_string(),
            documents: meta_usize(&meta, DOCUMENT_COUNT_KEY, ARTIFACT)?,
            dimension: meta_usize(&meta, DIMENSION_KEY, ARTIFACT)?,
        }))
    }

    /// Read the full matrix back, bit for bit.
    pub fn load(&self) -> Result<StoredEmbeddings> {
        let Some(stats) = self.stats()? else {
            return Err(Error::MissingArtifact {
                artifact: ARTIFACT,
                path: self.path.clone(),
            });
        };

        let txn = self.db.begin_read()?;
        let embeddings =
            open_table_or_missing(&txn, EMBEDDINGS, ARTIFACT, &self.path)?;
        let ids = open_table_or_missing(&txn, DOC_IDS, ARTIFACT, &self.path)?;

        let row_bytes = stats.dimension * std::mem::size_of::<f32>();
        let mut data = Vec::with_capacity(stats.documents * stats.dimension);
        let mut rows = 0usize;
        for entry in embeddings.iter()? {
            let (key, value) = entry?;
            let bytes = value.value();
            if key.value() != rows as u64 || bytes.len() != row_bytes {
                return Err(corrupt(format!(
                    "embedding row {} is missing or has {} bytes",
                    rows,
                    bytes.len()
                )));
            }
            data.extend(bytemuck::pod_collect_to_vec::<u8, f32>(bytes));
            rows += 1;
        }

        let mut doc_ids = Vec::with_capacity(rows);
        for (expected, entry) in ids.iter()?.enumerate() {
            let (key, value) = entry?;
            if key.value() != expected as u64 {
                return Err(corrupt(format!("document id {expected} is missing")));
            }
            doc_ids.push(value.value().to_string());
        }

        if rows != stats.documents || doc_ids.len() != rows {
            return Err(Error::IndexMisalignment {
                reason: format!(
                    "embedding matrix has {} rows and {} document ids, expected {}",
                    rows,
                    doc_ids.len(),
                    stats.documents
                ),
            });
        }

        Ok(StoredEmbeddings {
            encoder_id: stats.encoder_id,
            doc_ids,
            matrix: DenseMatrix::from_flat(rows, stats.dimension, data)?,
        })
    }
}

impl std::fmt::Debug for EmbeddingDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

fn corrupt(reason: String) -> Error {
    Error::CorruptArtifact {
        artifact: ARTIFACT,
        reason,
    }
}

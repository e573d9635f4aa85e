use std::path::{Path, PathBuf};

use redb::{
    Database,
    ReadOnlyTable,
    ReadTransaction,
    ReadableDatabase,
    ReadableTable,
    TableDefinition,
};

use crate::corpus::Document;
use crate::error::{Error, Result};
use crate::lexical::{LexicalIndex, TfidfModel};
use crate::vector::{SparseMatrix, SparseVector};

const DOCUMENTS: TableDefinition<u64, &str> = TableDefinition::new("documents");
const VOCABULARY: TableDefinition<&str, u32> =
    TableDefinition::new("vocabulary");
const ROWS: TableDefinition<u64, &[u8]> = TableDefinition::new("rows");
const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

const ARTIFACT: &str = "lexical";

const IDF_KEY: &str = "idf";
const COMPLETE_KEY: &str = "complete";
const DOCUMENT_COUNT_KEY: &str = "document_count";
const TERM_COUNT_KEY: &str = "term_count";

/// Persisted lexical index: document table, vocabulary, IDF weights and the
/// document-term matrix, all written in a single transaction.
///
/// Row format in the `rows` table:
/// - 4 bytes: non-zero count K (u32 LE)
/// - K * 4 bytes: column indices (u32)
/// - K * 4 bytes: weights (f32)
pub struct LexicalDb {
    db: Database,
    path: PathBuf,
}

/// Counts recorded alongside a complete lexical artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexicalStats {
    pub documents: usize,
    pub terms: usize,
}

impl LexicalDb {
    /// Open for writing, creating the file if needed.
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
            return Err(missing(path));
        }
        let db = Database::open(path)?;
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Replace everything stored with `index`.
    pub fn save(&self, index: &LexicalIndex) -> Result<()> {
        let model = index.model();
        let matrix = index.matrix();

        let txn = self.db.begin_write()?;
        txn.delete_table(DOCUMENTS)?;
        txn.delete_table(VOCABULARY)?;
        txn.delete_table(ROWS)?;
        txn.delete_table(BLOBS)?;
        txn.delete_table(META)?;
        {
            let mut documents = txn.open_table(DOCUMENTS)?;
            for (row, doc) in index.documents().iter().enumerate() {
                let json = serde_json::to_string(doc)?;
                documents.insert(row as u64, json.as_str())?;
            }

            let mut vocabulary = txn.open_table(VOCABULARY)?;
            for (col, term) in model.terms().iter().enumerate() {
                vocabulary.insert(term.as_str(), col as u32)?;
            }

            let mut rows = txn.open_table(ROWS)?;
            for (i, row) in matrix.rows().enumerate() {
                let bytes = encode_row(row.indices, row.values);
                rows.insert(i as u64, bytes.as_slice())?;
            }

            let mut blobs = txn.open_table(BLOBS)?;
            let idf: &[u8] = bytemuck::cast_slice(model.idf());
            blobs.insert(IDF_KEY, idf)?;

            let mut meta = txn.open_table(META)?;
            let document_count = index.len().to_string();
            let term_count = model.n_terms().to_string();
            meta.insert(DOCUMENT_COUNT_KEY, document_count.as_str())?;
            meta.insert(TERM_COUNT_KEY, term_count.as_str())?;
            meta.insert(COMPLETE_KEY, "1")?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Counts of the stored artifact, or `None` when it is incomplete.
    pub fn stats(&self) -> Result<Option<LexicalStats>> {
        let txn = self.db.begin_read()?;
        match read_stats(&txn, &self.path) {
            Ok(stats) => Ok(Some(stats)),
            Err(err) if err.is_missing_artifact() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Read the whole artifact back. Either every part loads or an error is
    /// returned.
    pub fn load(&self) -> Result<LexicalIndex> {
        let txn = self.db.begin_read()?;
        let stats = read_stats(&txn, &self.path)?;

        let documents = read_documents(&txn, &self.path)?;
        if documents.len() != stats.documents {
            return Err(corrupt(format!(
                "document table has {} rows, expected {}",
                documents.len(),
                stats.documents
            )));
        }

        let terms = read_vocabulary(&txn, &self.path, stats.terms)?;

        let blobs = open_table_or_missing(&txn, BLOBS, ARTIFACT, &self.path)?;
        let idf: Vec<f32> = match blobs.get(IDF_KEY)? {
            Some(guard) => {
                let bytes = guard.value();
                if bytes.len() % 4 != 0 {
                    return Err(corrupt("idf blob is not a whole number of f32s"));
                }
                bytemuck::pod_collect_to_vec(bytes)
            }
            None => return Err(missing(&self.path)),
        };
        let model = TfidfModel::from_parts(terms, idf)?;

        let rows_table = open_table_or_missing(&txn, ROWS, ARTIFACT, &self.path)?;
        let mut rows = Vec::with_capacity(stats.documents);
        for (expected, entry) in rows_table.iter()?.enumerate() {
            let (key, value) = entry?;
            if key.value() != expected as u64 {
                return Err(corrupt(format!(
                    "matrix row {} is missing",
                    expected
                )));
            }
            rows.push(decode_row(value.value(), stats.terms)?);
        }
        let matrix = SparseMatrix::from_rows(stats.terms, rows);

        LexicalIndex::from_parts(model, matrix, documents)
    }
}

impl std::fmt::Debug for LexicalDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexicalDb")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Open a table in a read transaction, mapping an absent table to
/// [`Error::MissingArtifact`].
pub(crate) fn open_table_or_missing<K, V>(
    txn: &ReadTransaction,
    table: TableDefinition<'_, K, V>,
    artifact: &'static str,
    path: &Path,
) -> Result<ReadOnlyTable<K, V>>
where
    K: redb::Key + 'static,
    V: redb::Value + 'static,
{
    match txn.open_table(table) {
        Ok(table) => Ok(table),
        Err(redb::TableError::TableDoesNotExist(_)) => {
            Err(Error::MissingArtifact {
                artifact,
                path: path.to_path_buf(),
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Parse a numeric `meta` entry.
pub(crate) fn meta_usize(
    meta: &ReadOnlyTable<&'static str, &'static str>,
    key: &str,
    artifact: &'static str,
) -> Result<usize> {
    let Some(guard) = meta.get(key)? else {
        return Err(Error::CorruptArtifact {
            artifact,
            reason: format!("missing '{key}' entry"),
        });
    };
    let raw = guard.value();
    let count = raw.parse::<usize>().map_err(|_| Error::CorruptArtifact {
        artifact,
        reason: format!("'{key}' is not a count: {raw}"),
    })?;
    Ok(count)
}

fn read_stats(txn: &ReadTransaction, path: &Path) -> Result<LexicalStats> {
    let meta = open_table_or_missing(txn, META, ARTIFACT, path)?;
    if meta.get(COMPLETE_KEY)?.is_none() {
        return Err(missing(path));
    }
    Ok(LexicalStats {
        documents: meta_usize(&meta, DOCUMENT_COUNT_KEY, ARTIFACT)?,
        terms: meta_usize(&meta, TERM_COUNT_KEY, ARTIFACT)?,
    })
}

fn read_documents(txn: &ReadTransaction, path: &Path) -> Result<Vec<Document>> {
    let table = open_table_or_missing(txn, DOCUMENTS, ARTIFACT, path)?;
    let mut documents = Vec::new();
    for (expected, entry) in table.iter()?.enumerate() {
        let (key, value) = entry?;
        if key.value() != expected as u64 {
            return Err(corrupt(format!("document row {expected} is missing")));
        }
        documents.push(serde_json::from_str(value.value())?);
    }
    Ok(documents)
}

fn read_vocabulary(
    txn: &ReadTransaction,
    path: &Path,
    n_terms: usize,
) -> Result<Vec<String>> {
    let table = open_table_or_missing(txn, VOCABULARY, ARTIFACT, path)?;
    let mut terms: Vec<Option<String>> = vec![None; n_terms];
    for entry in table.iter()? {
        let (term, col) = entry?;
        let slot = terms.get_mut(col.value() as usize).ok_or_else(|| {
            corrupt(format!("column {} out of range", col.value()))
        })?;
        if slot.replace(term.value().to_string()).is_some() {
            return Err(corrupt(format!("column {} assigned twice", col.value())));
        }
    }
    terms
        .into_iter()
        .enumerate()
        .map(|(col, term)| {
            term.ok_or_else(|| corrupt(format!("column {col} has no term")))
        })
        .collect()
}

fn encode_row(indices: &[u32], values: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(4 + 8 * indices.len());
    bytes.extend_from_slice(&(indices.len() as u32).to_le_bytes());
    bytes.extend_from_slice(bytemuck::cast_slice(indices));
    bytes.extend_from_slice(bytemuck::cast_slice(values));
    bytes
}

fn decode_row(bytes: &[u8], n_terms: usize) -> Result<SparseVector> {
    let header: [u8; 4] = bytes
        .get(0..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| corrupt("matrix row shorter than its header"))?;
    let nnz = u32::from_le_bytes(header) as usize;

    if bytes.len() != 4 + 8 * nnz {
        return Err(corrupt(format!(
            "matrix row has {} bytes, expected {}",
            bytes.len(),
            4 + 8 * nnz
        )));
    }

    let indices: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[4..4 + 4 * nnz]);
    let values: Vec<f32> = bytemuck::pod_collect_to_vec(&bytes[4 + 4 * nnz..]);

    if indices.last().is_some_and(|&c| c as usize >= n_terms) {
        return Err(corrupt("matrix row references a column past the vocabulary"));
    }
    SparseVector::from_sorted(indices, values)
        .ok_or_else(|| corrupt("matrix row indices are not strictly increasing"))
}

fn missing(path: &Path) -> Error {
    Error::MissingArtifact {
        artifact: ARTIFACT,
        path: path.to_path_buf(),
    }
}

fn corrupt(reason: impl Into<String>) -> Error {
    Error::CorruptArtifact {
        artifact: ARTIFACT,
        reason: reason.into(),
    }
}

use kdam::{BarExt, tqdm};

use crate::{
    corpus::Document,
    error::{Error, Result},
    model_manager::ModelManager,
    vector::DenseMatrix,
};

/// Documents sent to the encoder per forward pass.
pub const BATCH_SIZE: usize = 32;

/// Encode every document's `title + ". " + text` into one matrix row, in
/// document order.
///
/// Shows a progress bar on stderr unless `progress` is false.
pub fn encode_documents(
    model: &mut ModelManager,
    documents: &[Document],
    progress: bool,
) -> Result<DenseMatrix> {
    let mut bar = tqdm!(
        total = documents.len(),
        desc = "Encoding",
        unit = " docs",
        disable = !progress
    );

    let mut rows: Vec<Vec<f32>> = Vec::with_capacity(documents.len());
    for batch in documents.chunks(BATCH_SIZE) {
        let texts: Vec<String> =
            batch.iter().map(Document::semantic_text).collect();
        rows.extend(model.encode(&texts)?);
        bar.update(batch.len())?;
    }
    if progress {
        eprintln!();
    }

    let matrix = DenseMatrix::from_rows(rows)?;
    if matrix.n_rows() > 0 && matrix.dim() == 0 {
        return Err(Error::EncoderUnavailable(
            "encoder produced zero-dimensional vectors".into(),
        ));
    }
    Ok(matrix)
}

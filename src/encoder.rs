//! Sentence encoders.
//!
//! [`SentenceEncoder`] runs a sentence-transformers BERT checkpoint with
//! candle: tokens are mean-pooled under the attention mask and the result is
//! L2-normalized, so every output vector has unit length.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::api::sync::Api;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Longest input, in tokens, fed to the model. Longer texts are truncated.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

/// Anything that turns texts into fixed-dimension dense vectors.
pub trait Encoder {
    /// Identifier recorded with every embedding matrix built by this encoder.
    fn model_id(&self) -> &str;

    /// Encode `texts`, returning one vector per input in input order.
    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Select the best available compute device.
///
/// Uses CUDA when compiled with the `cuda` feature, Metal when compiled with
/// the `metal` feature, and falls back to CPU otherwise.
fn default_device() -> Device {
    #[cfg(feature = "cuda")]
    {
        if let Ok(device) = Device::new_cuda(0) {
            return device;
        }
    }

    #[cfg(feature = "metal")]
    {
        if let Ok(device) = Device::new_metal(0) {
            return device;
        }
    }

    Device::Cpu
}

fn unavailable<E: std::fmt::Display>(
    context: &'static str,
) -> impl FnOnce(E) -> Error {
    move |e| Error::EncoderUnavailable(format!("{context}: {e}"))
}

/// BERT sentence encoder downloaded from the HuggingFace Hub.
pub struct SentenceEncoder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dimension: usize,
}

impl SentenceEncoder {
    /// Download (or reuse the cached) `config.json`, `tokenizer.json` and
    /// `model.safetensors` for `model_id` and load them.
    pub fn load(model_id: &str) -> Result<Self> {
        let device = default_device();
        info!(model = model_id, ?device, "loading sentence encoder");

        let api = Api::new().map_err(unavailable("hub client"))?;
        let repo = api.model(model_id.to_string());

        let config_path =
            repo.get("config.json").map_err(unavailable("config download"))?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(unavailable("tokenizer download"))?;
        let weights_path = repo
            .get("model.safetensors")
            .map_err(unavailable("weights download"))?;

        let config: Config = serde_json::from_str(
            &std::fs::read_to_string(config_path)
                .map_err(unavailable("config read"))?,
        )
        .map_err(unavailable("config parse"))?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(unavailable("tokenizer load"))?;
        tokenizer.with_padding(Some(PaddingParams::default()));
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(unavailable("tokenizer truncation"))?;

        // SAFETY: the weights file is a read-only cache entry that is not
        // modified while mapped.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(
                &[weights_path],
                DType::F32,
                &device,
            )
        }
        .map_err(unavailable("weights load"))?;
        let model =
            BertModel::load(vb, &config).map_err(unavailable("model load"))?;

        Ok(Self {
            model,
            tokenizer,
            device,
            model_id: model_id.to_string(),
            dimension: config.hidden_size,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn forward(&self, texts: &[String]) -> candle_core::Result<Tensor> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(candle_core::Error::msg)?;

        let ids = encodings
            .iter()
            .map(|e| Tensor::new(e.get_ids(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let masks = encodings
            .iter()
            .map(|e| Tensor::new(e.get_attention_mask(), &self.device))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let input_ids = Tensor::stack(&ids, 0)?;
        let attention_mask = Tensor::stack(&masks, 0)?;
        let token_type_ids = input_ids.zeros_like()?;

        // [batch, tokens, hidden]
        let hidden = self.model.forward(
            &input_ids,
            &token_type_ids,
            Some(&attention_mask),
        )?;

        let mask = attention_mask.to_dtype(DType::F32)?.unsqueeze(2)?;
        let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
        let counts = mask.sum(1)?;
        let pooled = summed.broadcast_div(&counts)?;

        let norms = pooled.sqr()?.sum_keepdim(1)?.sqrt()?;
        pooled.broadcast_div(&norms)
    }
}

impl Encoder for SentenceEncoder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(batch = texts.len(), "encoding");
        self.forward(texts)
            .and_then(|t| t.to_vec2::<f32>())
            .map_err(unavailable("inference"))
    }
}

impl std::fmt::Debug for SentenceEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentenceEncoder")
            .field("model_id", &self.model_id)
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

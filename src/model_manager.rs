use tracing::info;

use crate::{
    config_db::{ConfigDb, MODEL_SETTING},
    encoder::{Encoder, SentenceEncoder},
    error::{Error, Result},
};

pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const MODEL_ENV_VAR: &str = "CRANBERT_MODEL";

/// Where the active model id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ModelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelSource::Flag => "--model",
            ModelSource::Env => MODEL_ENV_VAR,
            ModelSource::Config => "config",
            ModelSource::Default => "default",
        }
    }
}

/// Resolve the encoder model id from, in order of priority:
/// 1. An explicit id (from --model)
/// 2. The CRANBERT_MODEL environment variable
/// 3. The `model_name` setting in the config database
/// 4. [`DEFAULT_MODEL_ID`]
pub fn resolve_model_id(
    explicit: Option<&str>,
    config: &ConfigDb,
) -> Result<(String, ModelSource)> {
    if let Some(id) = explicit {
        return Ok((id.to_string(), ModelSource::Flag));
    }
    if let Ok(id) = std::env::var(MODEL_ENV_VAR) {
        return Ok((id, ModelSource::Env));
    }
    if let Some(id) = config.get_setting(MODEL_SETTING)? {
        return Ok((id, ModelSource::Config));
    }
    Ok((DEFAULT_MODEL_ID.to_string(), ModelSource::Default))
}

/// Owns the sentence encoder, loading it on first use and reusing it for
/// every later call.
pub struct ModelManager {
    encoder: Option<Box<dyn Encoder>>,
    model_id: String,
}

impl Default for ModelManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelManager {
    /// Creates a new `ModelManager` whose model id comes from the
    /// `CRANBERT_MODEL` environment variable, or the default model.
    ///
    /// Nothing is loaded until the first call to `encode`.
    pub fn new() -> Self {
        let model_id = std::env::var(MODEL_ENV_VAR)
            .unwrap_or_else(|_| DEFAULT_MODEL_ID.to_string());
        Self::with_model_id(model_id)
    }

    /// Creates a `ModelManager` with an explicit model ID, bypassing
    /// environment variable resolution.
    pub fn with_model_id(model_id: String) -> Self {
        Self {
            encoder: None,
            model_id,
        }
    }

    /// Wrap an already constructed encoder.
    pub fn with_encoder(encoder: Box<dyn Encoder>) -> Self {
        Self {
            model_id: encoder.model_id().to_string(),
            encoder: Some(encoder),
        }
    }

    /// Returns the model ID that will be (or has been) loaded.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Returns `true` if the encoder has already been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        self.encoder.is_some()
    }

    fn ensure_loaded(&mut self) -> Result<&mut Box<dyn Encoder>> {
        if self.encoder.is_none() {
            let encoder = SentenceEncoder::load(&self.model_id)?;
            info!(
                model = %self.model_id,
                dimension = encoder.dimension(),
                "sentence encoder ready"
            );
            self.encoder = Some(Box::new(encoder));
        }

        self.encoder.as_mut().ok_or_else(|| {
            Error::EncoderUnavailable(format!(
                "encoder {} failed to initialize",
                self.model_id
            ))
        })
    }

    /// Encode a batch of raw texts.
    pub fn encode(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encoder = self.ensure_loaded()?;
        let vectors = encoder.encode(texts)?;
        if vectors.len() != texts.len() {
            return Err(Error::EncoderUnavailable(format!(
                "encoder returned {} vectors for {} texts",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }

    /// Encode a single raw query string.
    pub fn encode_query(&mut self, query: &str) -> Result<Vec<f32>> {
        let mut vectors = self.encode(&[query.to_string()])?;
        vectors.pop().ok_or_else(|| {
            Error::EncoderUnavailable("encoder returned no vector".into())
        })
    }
}

impl std::fmt::Debug for ModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelManager")
            .field("model_id", &self.model_id)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use thiserror::Error;
use tracing::{debug, info};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::transcription::download::ModelKind;

/// Errors from loading or running a whisper model.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Model file missing or unreadable
    #[error("failed to load whisper model from {path}: {source}")]
    ModelLoad {
        path: String,
        source: anyhow::Error,
    },

    /// Inference state could not be created
    #[error("failed to create whisper state")]
    StateCreation,

    /// Inference itself failed
    #[error("failed to transcribe audio")]
    Inference(#[from] anyhow::Error),
}

/// A loaded whisper model.
pub struct WhisperEngine {
    ctx: Arc<Mutex<WhisperContext>>,
}

impl std::fmt::Debug for WhisperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperEngine").finish_non_exhaustive()
    }
}

impl WhisperEngine {
    /// Load a model file into memory.
    ///
    /// # Errors
    /// Returns [`EngineError::ModelLoad`] if the file is missing, invalid,
    /// or its path is not valid UTF-8.
    pub fn load(model_path: &Path) -> Result<Self, EngineError> {
        info!(path = %model_path.display(), "loading whisper model");

        let path_str = model_path
            .to_str()
            .ok_or_else(|| EngineError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("model path contains invalid UTF-8"),
            })?;

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(path_str, params).map_err(|e| {
            EngineError::ModelLoad {
                path: model_path.display().to_string(),
                source: anyhow::anyhow!("{e:?}"),
            }
        })?;

        info!("whisper model loaded");
        Ok(Self {
            ctx: Arc::new(Mutex::new(ctx)),
        })
    }

    /// Transcribe 16 kHz mono samples to text.
    ///
    /// `language` is a two-letter code; "auto" or empty means auto-detect.
    ///
    /// # Errors
    /// Returns an error if inference fails or the context mutex is
    /// poisoned.
    pub fn transcribe(&self, samples: &[f32], language: &str) -> Result<String, EngineError> {
        debug!(samples = samples.len(), language, "starting transcription");

        let mut state = self
            .ctx
            .lock()
            .map_err(|e| anyhow::anyhow!("whisper context mutex poisoned: {e}"))?
            .create_state()
            .map_err(|_| EngineError::StateCreation)?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_translate(false);
        params.set_language(normalize_language(language));

        let start = std::time::Instant::now();
        state
            .full(params, samples)
            .context("whisper inference failed")?;

        let mut text = String::new();
        for segment in state.as_iter() {
            text.push_str(&segment.to_string());
        }
        let text = text.trim().to_owned();

        info!(
            segments = state.full_n_segments(),
            text_len = text.len(),
            inference_ms = start.elapsed().as_millis(),
            "transcription completed"
        );
        Ok(text)
    }
}

// SAFETY: the WhisperContext lives behind Arc<Mutex<>>, so all access is
// serialized; whisper.cpp contexts are safe to use from any thread under
// external synchronization.
#[allow(unsafe_code)]
unsafe impl Send for WhisperEngine {}
#[allow(unsafe_code)]
unsafe impl Sync for WhisperEngine {}

/// "auto" and empty both mean auto-detection (a `None` language).
fn normalize_language(language: &str) -> Option<&str> {
    let trimmed = language.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(trimmed)
    }
}

/// Single-slot engine cache.
///
/// Whisper models are hundreds of megabytes; only the most recently used
/// one stays resident. Switching models drops the old engine first.
pub struct EngineCache {
    slot: Option<(ModelKind, Arc<WhisperEngine>)>,
}

impl EngineCache {
    #[must_use]
    pub const fn new() -> Self {
        Self { slot: None }
    }

    #[must_use]
    pub fn cached_kind(&self) -> Option<ModelKind> {
        self.slot.as_ref().map(|(kind, _)| *kind)
    }

    /// Return the cached engine for `model`, loading it from `path` on a
    /// miss. A different cached model is evicted before the new load, so
    /// two models are never resident at once.
    ///
    /// # Errors
    /// Propagates [`EngineError::ModelLoad`]; the cache is left empty on
    /// failure.
    pub fn get_or_load(
        &mut self,
        model: ModelKind,
        path: &Path,
    ) -> Result<Arc<WhisperEngine>, EngineError> {
        if let Some((kind, engine)) = &self.slot {
            if *kind == model {
                return Ok(Arc::clone(engine));
            }
            debug!(evicted = kind.name(), loading = model.name(), "swapping cached engine");
        }
        self.slot = None;

        let engine = Arc::new(WhisperEngine::load(path)?);
        self.slot = Some((model, Arc::clone(&engine)));
        Ok(engine)
    }

    /// Drop the cached engine, freeing its memory.
    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

impl Default for EngineCache {
    fn default() -> Self {
        Self::new()
    }
}

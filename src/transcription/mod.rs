/// Model catalog, on-disk store, and downloads
pub mod download;
/// Whisper inference and the single-slot engine cache
pub mod engine;

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::audio::capture::LevelCallback;
use crate::audio::AudioRecorder;

pub use download::{meets_expected_size, ModelKind, ModelStore};
pub use engine::{EngineCache, EngineError, WhisperEngine};

/// Failures of the dictation pipeline, phrased for toast messages.
#[derive(Debug, Error)]
pub enum SpeechError {
    /// Recording could not start, usually a microphone permission problem
    #[error("microphone unavailable - check permission in System Settings")]
    Microphone(#[source] anyhow::Error),

    /// Transcription requested before the model was fetched
    #[error("{model} model is not downloaded yet")]
    ModelNotDownloaded { model: &'static str },

    /// Downloading the selected model failed
    #[error("failed to download {model} model: {source}")]
    ModelDownload {
        model: &'static str,
        source: anyhow::Error,
    },

    /// Model file exists but could not be loaded or run
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Coordinates the record / transcribe cycle for speech-to-text.
///
/// Holds the recorder, the model store, and the engine cache. The recorder
/// is tied to the main thread (the capture stream is not `Send`), so the
/// split is: [`take_recording`] and [`prepare_engine`] run on the main
/// thread, and the returned engine handle carries the inference itself onto
/// a worker.
///
/// [`take_recording`]: SpeechTranscriber::take_recording
/// [`prepare_engine`]: SpeechTranscriber::prepare_engine
pub struct SpeechTranscriber {
    store: ModelStore,
    cache: EngineCache,
    recorder: AudioRecorder,
}

impl SpeechTranscriber {
    #[must_use]
    pub fn new(models_dir: PathBuf) -> Self {
        Self {
            store: ModelStore::new(models_dir),
            cache: EngineCache::new(),
            recorder: AudioRecorder::new(),
        }
    }

    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    #[must_use]
    pub fn is_model_downloaded(&self, model: ModelKind) -> bool {
        self.store.is_downloaded(model)
    }

    /// Store handle, cloneable for background downloads.
    #[must_use]
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// Start capturing microphone input.
    ///
    /// # Errors
    /// Returns [`SpeechError::Microphone`] when the input device is
    /// unavailable or permission was denied.
    pub fn start_recording(&mut self, on_level: LevelCallback) -> Result<(), SpeechError> {
        self.recorder.start(on_level).map_err(SpeechError::Microphone)
    }

    /// Discard the active recording without transcribing.
    pub fn cancel_recording(&mut self) {
        self.recorder.cancel();
    }

    /// Stop recording and hand back the captured 16 kHz mono samples.
    ///
    /// Returns `None` when no recording was active.
    pub fn take_recording(&mut self) -> Option<Vec<f32>> {
        let samples = self.recorder.stop();
        if samples.is_none() {
            warn!("stop requested with no active recording");
        }
        samples
    }

    /// Load (or fetch from cache) the engine for `model`. The returned
    /// handle is `Send + Sync`, so inference can run on a worker thread
    /// while the transcriber stays on the main thread.
    ///
    /// The model must already be on disk; the caller downloads ahead of
    /// starting a recording.
    ///
    /// # Errors
    /// Returns [`SpeechError::ModelNotDownloaded`] for a missing model and
    /// [`SpeechError::Engine`] for load failures.
    pub fn prepare_engine(&mut self, model: ModelKind) -> Result<Arc<WhisperEngine>, SpeechError> {
        if !self.store.is_downloaded(model) {
            return Err(SpeechError::ModelNotDownloaded {
                model: model.name(),
            });
        }
        let path = self.store.model_path(model);
        Ok(self.cache.get_or_load(model, &path)?)
    }

    /// Model kind currently held by the engine cache, if any.
    #[must_use]
    pub fn cached_model(&self) -> Option<ModelKind> {
        self.cache.cached_kind()
    }

    /// Drop the cached engine when it holds `model`, so the next
    /// transcription loads the fresh file. Called after a re-download.
    pub fn invalidate_model(&mut self, model: ModelKind) {
        if self.cache.cached_kind() == Some(model) {
            self.cache.invalidate();
        }
    }

    /// Free the cached engine, e.g. after the user switches models.
    pub fn release_engine(&mut self) {
        self.cache.invalidate();
    }
}

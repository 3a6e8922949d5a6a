use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

/// A downloaded file at least this fraction of the advertised size counts
/// as complete; the advertised sizes are rounded.
const SIZE_TOLERANCE: f64 = 0.95;

/// Whisper model variants offered in the tray menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    Tiny,
    Base,
    Small,
    Medium,
}

impl ModelKind {
    pub const ALL: [Self; 4] = [Self::Tiny, Self::Base, Self::Small, Self::Medium];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Tiny => "tiny",
            Self::Base => "base",
            Self::Small => "small",
            Self::Medium => "medium",
        }
    }

    /// Advertised download size, used for progress and the completeness
    /// check.
    #[must_use]
    pub const fn size_mb(self) -> u64 {
        match self {
            Self::Tiny => 39,
            Self::Base => 74,
            Self::Small => 244,
            Self::Medium => 769,
        }
    }

    #[must_use]
    pub fn filename(self) -> String {
        format!("ggml-{}.bin", self.name())
    }

    #[must_use]
    pub fn url(self) -> String {
        format!("{}/{}", MODEL_BASE_URL, self.filename())
    }

    /// Parse a config value like "base"; unknown names fall back to Base.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == name)
            .unwrap_or(Self::Base)
    }
}

/// True when `actual_bytes` is close enough to the advertised size to count
/// as a complete download.
#[must_use]
pub fn meets_expected_size(actual_bytes: u64, expected_mb: u64) -> bool {
    let expected_bytes = expected_mb * 1024 * 1024;
    #[allow(clippy::cast_precision_loss)]
    {
        actual_bytes as f64 >= expected_bytes as f64 * SIZE_TOLERANCE
    }
}

/// On-disk store of whisper model files.
#[derive(Clone)]
pub struct ModelStore {
    models_dir: PathBuf,
}

impl ModelStore {
    #[must_use]
    pub fn new(models_dir: PathBuf) -> Self {
        Self { models_dir }
    }

    #[must_use]
    pub fn model_path(&self, model: ModelKind) -> PathBuf {
        self.models_dir.join(model.filename())
    }

    /// A model counts as downloaded when the file exists and is at least
    /// 95% of the advertised size; partial files from interrupted
    /// downloads fail this and get re-fetched.
    #[must_use]
    pub fn is_downloaded(&self, model: ModelKind) -> bool {
        let path = self.model_path(model);
        match fs::metadata(&path) {
            Ok(meta) => meets_expected_size(meta.len(), model.size_mb()),
            Err(_) => false,
        }
    }

    /// Download a model file, reporting progress as a fraction in 0..=1.
    ///
    /// Streams into a `.tmp` sibling and renames on completion, so an
    /// interrupted download never leaves a plausible-looking model file.
    ///
    /// # Errors
    /// Returns an error on network failure, a non-success HTTP status, or
    /// any filesystem failure; the temp file is removed on error.
    pub fn download(
        &self,
        model: ModelKind,
        mut on_progress: impl FnMut(f64),
    ) -> Result<PathBuf> {
        let final_path = self.model_path(model);
        let temp_path = final_path.with_extension("bin.tmp");
        let url = model.url();

        fs::create_dir_all(&self.models_dir).context("failed to create models directory")?;

        info!(model = model.name(), url = %url, "downloading whisper model");

        let result = self.stream_to_temp(&url, &temp_path, model, &mut on_progress);
        if let Err(e) = result {
            if temp_path.exists() {
                if let Err(cleanup) = fs::remove_file(&temp_path) {
                    warn!(error = %cleanup, "failed to remove partial download");
                }
            }
            return Err(e);
        }

        fs::rename(&temp_path, &final_path).with_context(|| {
            format!(
                "failed to move {} to {}",
                temp_path.display(),
                final_path.display()
            )
        })?;

        info!(model = model.name(), path = %final_path.display(), "model downloaded");
        Ok(final_path)
    }

    fn stream_to_temp(
        &self,
        url: &str,
        temp_path: &Path,
        model: ModelKind,
        on_progress: &mut impl FnMut(f64),
    ) -> Result<()> {
        let mut response = reqwest::blocking::get(url)
            .with_context(|| format!("failed to download model from {url}"))?;

        if !response.status().is_success() {
            anyhow::bail!("download failed with status {}: {}", response.status(), url);
        }

        let total_bytes = response
            .content_length()
            .unwrap_or(model.size_mb() * 1024 * 1024);

        let mut file = fs::File::create(temp_path)
            .with_context(|| format!("failed to create temp file at {}", temp_path.display()))?;

        let mut buf = [0u8; 64 * 1024];
        let mut written: u64 = 0;
        loop {
            let n = response.read(&mut buf).context("download stream error")?;
            if n == 0 {
                break;
            }
            file.write_all(&buf[..n]).context("failed to write model data")?;
            written += n as u64;
            if total_bytes > 0 {
                #[allow(clippy::cast_precision_loss)]
                on_progress((written as f64 / total_bytes as f64).min(1.0));
            }
        }
        file.flush().context("failed to flush model file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_follow_ggml_convention() {
        assert_eq!(ModelKind::Tiny.filename(), "ggml-tiny.bin");
        assert_eq!(ModelKind::Base.filename(), "ggml-base.bin");
        assert_eq!(ModelKind::Small.filename(), "ggml-small.bin");
        assert_eq!(ModelKind::Medium.filename(), "ggml-medium.bin");
    }

    #[test]
    fn urls_point_at_huggingface() {
        assert_eq!(
            ModelKind::Base.url(),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-base.bin"
        );
    }

    #[test]
    fn from_name_roundtrip_and_fallback() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_name(kind.name()), kind);
        }
        assert_eq!(ModelKind::from_name("enormous"), ModelKind::Base);
        assert_eq!(ModelKind::from_name(""), ModelKind::Base);
    }

    #[test]
    fn size_predicate_accepts_full_and_near_full() {
        let expected_mb = 74;
        let full = 74 * 1024 * 1024;
        assert!(meets_expected_size(full, expected_mb));
        // 96% of expected passes the 95% tolerance
        assert!(meets_expected_size(full * 96 / 100, expected_mb));
    }

    #[test]
    fn size_predicate_rejects_partial() {
        let expected_mb = 74;
        let full = 74 * 1024 * 1024;
        assert!(!meets_expected_size(full / 2, expected_mb));
        assert!(!meets_expected_size(0, expected_mb));
        assert!(!meets_expected_size(full * 90 / 100, expected_mb));
    }

    #[test]
    fn missing_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        assert!(!store.is_downloaded(ModelKind::Tiny));
    }

    #[test]
    fn undersized_file_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        fs::write(store.model_path(ModelKind::Tiny), b"stub").unwrap();
        assert!(!store.is_downloaded(ModelKind::Tiny));
    }

    #[test]
    fn full_sized_file_is_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        let path = store.model_path(ModelKind::Tiny);
        let file = fs::File::create(&path).unwrap();
        file.set_len(39 * 1024 * 1024).unwrap();
        assert!(store.is_downloaded(ModelKind::Tiny));
    }

    #[test]
    fn model_path_lives_under_models_dir() {
        let store = ModelStore::new(PathBuf::from("/tmp/vox-models"));
        assert_eq!(
            store.model_path(ModelKind::Small),
            PathBuf::from("/tmp/vox-models/ggml-small.bin")
        );
    }

    #[test]
    #[ignore = "requires network access and downloads a large file"]
    fn download_tiny_model() {
        let dir = tempfile::tempdir().unwrap();
        let store = ModelStore::new(dir.path().to_path_buf());
        let path = store.download(ModelKind::Tiny, |_| {}).unwrap();
        assert!(path.exists());
        assert!(store.is_downloaded(ModelKind::Tiny));
    }
}

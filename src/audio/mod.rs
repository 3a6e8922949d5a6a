/// Microphone capture and sample conversion
pub mod capture;

pub use capture::{wav_bytes, AudioRecorder};

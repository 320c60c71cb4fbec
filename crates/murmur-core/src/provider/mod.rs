//! Inference engine seam.
//!
//! ```text
//! BackendLoader                    TranscriptionBackend
//!   └── LocalLoader ──load()──►      ├── LocalWhisper   (GGML file)
//!                                    └── LocalParakeet  (ONNX directory)
//! ```
//!
//! The concrete engines live behind the `local-transcription` feature. Without
//! it, [`LocalLoader`] reports a load error for every model so the rest of the
//! core stays usable (catalog, downloads, tests with in-memory engines).

#[cfg(feature = "local-transcription")]
mod local_parakeet;
#[cfg(feature = "local-transcription")]
mod local_whisper;

use std::path::Path;

use crate::error::Result;
use crate::model::{EngineKind, ModelDescriptor};
use crate::transcription::Segment;

/// Sample rate every backend consumes.
pub const SAMPLE_RATE: u32 = 16_000;

/// Per-call inference options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferenceOptions {
    /// ISO language code, `None` for automatic identification
    pub language: Option<String>,
    pub translate: bool,
}

/// Engine output for one chunk, timestamps relative to the chunk start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkOutput {
    pub text: String,
    pub segments: Vec<Segment>,
}

/// A loaded inference engine.
pub trait TranscriptionBackend: Send {
    fn engine(&self) -> EngineKind;

    /// Transcribe 16kHz mono samples.
    fn transcribe(&mut self, samples: Vec<f32>, options: &InferenceOptions) -> Result<ChunkOutput>;

    /// Release engine resources before the backend is dropped.
    fn unload(&mut self) {}
}

/// Turns an installed model into a [`TranscriptionBackend`].
pub trait BackendLoader: Send + Sync {
    /// Load the model at `path`. Called on the blocking pool.
    fn load(&self, model: &ModelDescriptor, path: &Path) -> Result<Box<dyn TranscriptionBackend>>;
}

/// Loader for the bundled Whisper and Parakeet engines.
#[derive(Debug, Default, Clone)]
pub struct LocalLoader;

impl BackendLoader for LocalLoader {
    #[cfg(feature = "local-transcription")]
    fn load(&self, model: &ModelDescriptor, path: &Path) -> Result<Box<dyn TranscriptionBackend>> {
        match model.engine {
            EngineKind::Whisper => Ok(Box::new(local_whisper::LocalWhisper::load(path)?)),
            EngineKind::Parakeet => Ok(Box::new(local_parakeet::LocalParakeet::load(path)?)),
        }
    }

    #[cfg(not(feature = "local-transcription"))]
    fn load(&self, model: &ModelDescriptor, _path: &Path) -> Result<Box<dyn TranscriptionBackend>> {
        Err(crate::error::Error::Load(format!(
            "{} requires the 'local-transcription' feature",
            model.engine.display_name()
        )))
    }
}

//! Whisper via transcribe-rs (whisper.cpp GGML models)

use std::path::Path;
use transcribe_rs::TranscriptionEngine;
use transcribe_rs::engines::whisper::{WhisperEngine, WhisperInferenceParams};

use super::{ChunkOutput, InferenceOptions, TranscriptionBackend};
use crate::error::{Error, Result};
use crate::model::EngineKind;
use crate::transcription::Segment;

pub struct LocalWhisper {
    engine: WhisperEngine,
}

impl LocalWhisper {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Load(format!(
                "Whisper model not found at: {}",
                path.display()
            )));
        }

        let mut engine = WhisperEngine::new();
        engine
            .load_model(path)
            .map_err(|e| Error::Load(format!("failed to load Whisper model: {e}")))?;
        tracing::debug!("Whisper model loaded from {}", path.display());
        Ok(Self { engine })
    }
}

impl TranscriptionBackend for LocalWhisper {
    fn engine(&self) -> EngineKind {
        EngineKind::Whisper
    }

    fn transcribe(&mut self, samples: Vec<f32>, options: &InferenceOptions) -> Result<ChunkOutput> {
        let params = WhisperInferenceParams {
            language: options.language.clone(),
            translate: options.translate,
            ..Default::default()
        };

        let result = self
            .engine
            .transcribe_samples(samples, Some(params))
            .map_err(|e| Error::Transcription(format!("Whisper transcription failed: {e}")))?;

        Ok(ChunkOutput {
            text: result.text,
            segments: result
                .segments
                .unwrap_or_default()
                .into_iter()
                .map(|s| Segment::new(s.start as f64, s.end as f64, s.text))
                .collect(),
        })
    }

    fn unload(&mut self) {
        self.engine.unload_model();
    }
}

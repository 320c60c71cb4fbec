//! Parakeet via transcribe-rs (ONNX model directories)
//!
//! ONNX Runtime runs out of memory on long inputs, so audio longer than
//! ~90 seconds is split before inference. Session chunks are far shorter,
//! this only matters for callers that hand over whole recordings.

use std::path::Path;
use transcribe_rs::TranscriptionEngine;
use transcribe_rs::engines::parakeet::{
    ParakeetEngine, ParakeetInferenceParams, ParakeetModelParams, TimestampGranularity,
};

use super::{ChunkOutput, InferenceOptions, SAMPLE_RATE, TranscriptionBackend};
use crate::error::{Error, Result};
use crate::model::EngineKind;
use crate::transcription::Segment;

const MAX_SAMPLES: usize = 90 * SAMPLE_RATE as usize;

pub struct LocalParakeet {
    engine: ParakeetEngine,
}

impl LocalParakeet {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(Error::Load(format!(
                "Parakeet model directory not found at: {}",
                path.display()
            )));
        }

        let mut engine = ParakeetEngine::new();
        engine
            .load_model_with_params(path, ParakeetModelParams::int8())
            .map_err(|e| Error::Load(format!("failed to load Parakeet model: {e}")))?;
        tracing::debug!("Parakeet model loaded from {}", path.display());
        Ok(Self { engine })
    }

    fn run(&mut self, samples: Vec<f32>, offset: f64) -> Result<ChunkOutput> {
        let params = ParakeetInferenceParams {
            timestamp_granularity: TimestampGranularity::Segment,
            ..Default::default()
        };
        let result = self
            .engine
            .transcribe_samples(samples, Some(params))
            .map_err(|e| Error::Transcription(format!("Parakeet transcription failed: {e}")))?;

        Ok(ChunkOutput {
            text: result.text,
            segments: result
                .segments
                .unwrap_or_default()
                .into_iter()
                .map(|s| Segment::new(s.start as f64 + offset, s.end as f64 + offset, s.text))
                .collect(),
        })
    }
}

impl TranscriptionBackend for LocalParakeet {
    fn engine(&self) -> EngineKind {
        EngineKind::Parakeet
    }

    fn transcribe(&mut self, samples: Vec<f32>, options: &InferenceOptions) -> Result<ChunkOutput> {
        if options.translate {
            tracing::warn!("Parakeet cannot translate, transcribing only");
        }
        if samples.len() <= MAX_SAMPLES {
            return self.run(samples, 0.0);
        }

        let mut output = ChunkOutput::default();
        for (i, piece) in samples.chunks(MAX_SAMPLES).enumerate() {
            let offset = (i * MAX_SAMPLES) as f64 / SAMPLE_RATE as f64;
            let part = self.run(piece.to_vec(), offset)?;
            if !output.text.is_empty() && !part.text.is_empty() {
                output.text.push(' ');
            }
            output.text.push_str(part.text.trim());
            output.segments.extend(part.segments);
        }
        Ok(output)
    }

    fn unload(&mut self) {
        self.engine.unload_model();
    }
}

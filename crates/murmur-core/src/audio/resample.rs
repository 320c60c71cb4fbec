//! Audio resampling to the 16kHz mono input every engine expects.

use crate::error::{Error, Result};
use crate::provider::SAMPLE_RATE;

/// Resample interleaved audio to 16kHz mono.
///
/// # Arguments
/// * `samples` - Interleaved input samples
/// * `source_rate` - Source sample rate in Hz
/// * `channels` - Number of channels in input
pub fn resample_to_16k(samples: &[f32], source_rate: u32, channels: u16) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    let mono = if channels > 1 {
        to_mono(samples, channels)
    } else {
        samples.to_vec()
    };

    if source_rate == SAMPLE_RATE || mono.is_empty() {
        return Ok(mono);
    }
    if source_rate == 0 {
        return Err(Error::SourceUnavailable("audio reports a sample rate of 0".to_string()));
    }

    let mut resampler = FftFixedIn::<f32>::new(
        source_rate as usize,
        SAMPLE_RATE as usize,
        1024, // chunk size
        2,    // sub-chunks
        1,    // channels (mono)
    )
    .map_err(|e| Error::SourceUnavailable(format!("failed to create resampler: {e}")))?;

    let expected = (mono.len() as u64 * SAMPLE_RATE as u64 / source_rate as u64) as usize;
    let chunk_size = resampler.input_frames_max();
    let mut output = Vec::with_capacity(expected + chunk_size);

    for chunk in mono.chunks(chunk_size) {
        let mut padded = chunk.to_vec();
        if padded.len() < chunk_size {
            padded.resize(chunk_size, 0.0);
        }
        let result = resampler
            .process(&[padded], None)
            .map_err(|e| Error::SourceUnavailable(format!("resampling failed: {e}")))?;
        output.extend_from_slice(&result[0]);
    }

    // Drop the tail produced by zero padding.
    output.truncate(expected);
    Ok(output)
}

/// Average interleaved channels into one.
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    samples
        .chunks(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

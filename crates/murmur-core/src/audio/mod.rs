//! Audio decoding collaborator.
//!
//! Sessions only need 16kHz mono f32 samples. WAV files are read with hound;
//! every other container is converted to WAV by an external `ffmpeg` first.

pub mod resample;

use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};
use crate::provider::SAMPLE_RATE;

pub use resample::{resample_to_16k, to_mono};

/// Extensions handed to ffmpeg for conversion.
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "ogg", "flac", "webm", "aac", "opus", "mp4", "mkv", "mov",
];

/// Decodes an audio source into 16kHz mono samples.
pub trait AudioDecoder: Send + Sync {
    /// Called on the blocking pool. Failures map to [`Error::SourceUnavailable`].
    fn decode(&self, path: &Path) -> Result<Vec<f32>>;
}

/// Decoder for files on disk.
#[derive(Debug, Default, Clone)]
pub struct FileDecoder;

impl AudioDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<f32>> {
        if !path.is_file() {
            return Err(Error::SourceUnavailable(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "wav" | "wave" => read_wav(path),
            ext if CONVERTIBLE_EXTENSIONS.contains(&ext) => convert_and_read(path),
            _ => Err(Error::SourceUnavailable(format!(
                "Unsupported audio format: '{}'. Supported: wav, {}",
                extension,
                CONVERTIBLE_EXTENSIONS.join(", ")
            ))),
        }
    }
}

/// Read a WAV file and resample to 16kHz mono.
pub fn read_wav(path: &Path) -> Result<Vec<f32>> {
    let unavailable = |e: hound::Error| {
        Error::SourceUnavailable(format!("failed to read {}: {e}", path.display()))
    };
    let mut reader = hound::WavReader::open(path).map_err(unavailable)?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(unavailable)?,
        hound::SampleFormat::Int => {
            let bits = spec.bits_per_sample.clamp(1, 32);
            let max_val = (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(unavailable)?
        }
    };

    tracing::debug!(
        "Read {} samples from {} ({} Hz, {} ch)",
        samples.len(),
        path.display(),
        spec.sample_rate,
        spec.channels
    );
    resample_to_16k(&samples, spec.sample_rate, spec.channels)
}

/// Convert an audio file to 16kHz mono WAV with ffmpeg, then read it.
fn convert_and_read(input: &Path) -> Result<Vec<f32>> {
    let temp = tempfile::Builder::new()
        .prefix("murmur_convert_")
        .suffix(".wav")
        .tempfile()?;

    tracing::debug!("Converting {} with ffmpeg", input.display());
    let output = Command::new("ffmpeg")
        .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(input)
        .args(["-ar", &SAMPLE_RATE.to_string(), "-ac", "1", "-c:a", "pcm_s16le"])
        .arg(temp.path())
        .output()
        .map_err(|e| {
            Error::SourceUnavailable(format!(
                "failed to execute ffmpeg ({e}). Make sure ffmpeg is installed."
            ))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::SourceUnavailable(format!(
            "ffmpeg conversion failed: {}",
            stderr.trim()
        )));
    }

    read_wav(temp.path())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, samples: &[i16]) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_reads_16k_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, 16_000, 1, &[0, 16384, -16384, i16::MAX]);

        let samples = FileDecoder.decode(&path).unwrap();

        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 1e-4);
        assert!((samples[2] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_stereo_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 16_000, 2, &[16384, 0, 16384, 0]);

        let samples = FileDecoder.decode(&path).unwrap();

        assert_eq!(samples.len(), 2);
        assert!((samples[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let err = FileDecoder
            .decode(Path::new("/definitely/not/here.wav"))
            .unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();
        let err = FileDecoder.decode(&path).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }

    #[test]
    fn test_garbage_wav_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.wav");
        std::fs::write(&path, "RIFF nope").unwrap();
        let err = FileDecoder.decode(&path).unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
    }
}

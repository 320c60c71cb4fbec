//! `murmur transcribe <file>`

use anyhow::Result;
use murmur_core::{Error, Murmur, Transcript, TranscriptionOptions, to_srt};
use std::path::PathBuf;

use crate::app::{AppContext, ensure_ffmpeg_installed};
use crate::args::OutputFormat;

pub struct TranscribeArgs {
    pub file: PathBuf,
    pub language: Option<String>,
    pub translate: bool,
    pub model: Option<String>,
    pub format: OutputFormat,
}

pub async fn run(ctx: &AppContext, args: TranscribeArgs) -> Result<()> {
    if !args.file.is_file() {
        anyhow::bail!("File not found: {}", args.file.display());
    }
    ensure_ffmpeg_installed(&args.file)?;

    let murmur = ctx.open()?;
    if let Some(model) = &args.model {
        murmur.set_active_model(model).await?;
    }

    let options = TranscriptionOptions::new(
        args.language.unwrap_or_else(|| ctx.settings.language.clone()),
        args.translate || ctx.settings.translate_to_english,
    );

    match run_session(&murmur, args.file, options).await {
        Ok(transcript) => print_transcript(&transcript, args.format),
        Err(Error::Cancelled) => {
            eprintln!("Transcription cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Run the session, cancelling it on Ctrl+C.
async fn run_session(
    murmur: &Murmur,
    file: PathBuf,
    options: TranscriptionOptions,
) -> murmur_core::Result<Transcript> {
    let session = murmur.transcribe_file(file, options);
    tokio::pin!(session);

    tokio::select! {
        result = &mut session => result,
        _ = tokio::signal::ctrl_c() => {
            if !murmur.cancel_transcription() {
                eprintln!("Waiting for the model to finish loading...");
            }
            session.await
        }
    }
}

fn print_transcript(transcript: &Transcript, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", transcript.text),
        OutputFormat::Srt => print!("{}", to_srt(&transcript.segments)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(transcript)?),
    }
    Ok(())
}

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "murmur")]
#[command(version)]
#[command(about = "Local speech-to-text: manage models and transcribe audio files")]
pub struct Cli {
    /// Print debug logs (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Data directory for settings, the model catalog and downloads
    /// (default: $MURMUR_DATA_DIR or the platform data directory)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage transcription models
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },

    /// Transcribe an audio file
    Transcribe {
        /// Audio file (wav, or anything ffmpeg can read)
        file: PathBuf,

        /// Language code, or "auto" for detection
        #[arg(short, long)]
        language: Option<String>,

        /// Translate speech to English
        #[arg(short, long)]
        translate: bool,

        /// Model to activate before transcribing
        #[arg(short, long)]
        model: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Show the selected and loaded model
    Status,

    /// Show or change settings
    Config {
        /// Idle time before the model is unloaded (never, immediately, 2m, 5m, 10m, 15m, 1h)
        #[arg(long)]
        unload_timeout: Option<String>,

        /// Default language ("auto" for detection)
        #[arg(long)]
        language: Option<String>,

        /// Seconds of audio per inference chunk
        #[arg(long)]
        chunk_seconds: Option<u32>,

        /// Activate models automatically after download
        #[arg(long)]
        auto_activate: Option<bool>,

        /// Comma-separated preferred spellings ("" clears the list)
        #[arg(long)]
        custom_words: Option<String>,

        /// How loosely recognized words may match a custom word (0.0 to 1.0)
        #[arg(long)]
        word_threshold: Option<f64>,

        /// Print the current settings
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum ModelsAction {
    /// List all models and their status
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Register a model by URL
    Register {
        url: String,

        /// Display name (defaults to the file name)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Download (and extract) a model
    Download { id: String },

    /// Delete a downloaded model
    Delete { id: String },

    /// Load a model and make it active
    Use { id: String },

    /// Unload the active model
    Unload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Srt,
    Json,
}

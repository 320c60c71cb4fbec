mod app;
mod args;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use app::AppContext;
use args::{Cli, Commands};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "murmur_core=debug,murmur_cli=debug,warn"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let ctx = AppContext::load(cli.data_dir)?;
    match cli.command {
        Commands::Models { action } => commands::models::run(&ctx, action).await,
        Commands::Transcribe {
            file,
            language,
            translate,
            model,
            format,
        } => {
            commands::transcribe::run(
                &ctx,
                commands::transcribe::TranscribeArgs {
                    file,
                    language,
                    translate,
                    model,
                    format,
                },
            )
            .await
        }
        Commands::Status => commands::status::run(&ctx),
        Commands::Config {
            unload_timeout,
            language,
            chunk_seconds,
            auto_activate,
            custom_words,
            word_threshold,
            show,
        } => commands::config::run(
            ctx,
            commands::config::ConfigChanges {
                unload_timeout,
                language,
                chunk_seconds,
                auto_activate,
                custom_words,
                word_threshold,
                show,
            },
        ),
    }
}

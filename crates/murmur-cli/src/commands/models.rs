//! `murmur models` subcommands.

use anyhow::Result;
use murmur_core::{Error, ModelView, Murmur};

use crate::app::{AppContext, spawn_progress_printer};
use crate::args::ModelsAction;

pub async fn run(ctx: &AppContext, action: ModelsAction) -> Result<()> {
    let murmur = ctx.open()?;
    match action {
        ModelsAction::List { json } => list(&murmur, json),
        ModelsAction::Register { url, name } => {
            let id = murmur.register_model(&url, name.as_deref())?;
            println!("{id}");
            Ok(())
        }
        ModelsAction::Download { id } => download(&murmur, &id).await,
        ModelsAction::Delete { id } => {
            murmur.delete_model(&id)?;
            println!("Deleted {id}");
            Ok(())
        }
        ModelsAction::Use { id } => {
            murmur.set_active_model(&id).await?;
            println!("Active model: {id}");
            Ok(())
        }
        ModelsAction::Unload => {
            if murmur.unload_model()? {
                println!("Model unloaded");
            } else {
                println!("No model loaded");
            }
            Ok(())
        }
    }
}

fn list(murmur: &Murmur, json: bool) -> Result<()> {
    let models = murmur.list_models();
    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    let selected = murmur.get_current_model();
    println!(
        "  {:<24} {:<28} {:<10} {:>8}  STATUS",
        "ID", "NAME", "ENGINE", "SIZE"
    );
    for model in &models {
        let marker = if selected.as_deref() == Some(model.descriptor.id.as_str()) {
            '*'
        } else {
            ' '
        };
        println!(
            "{marker} {:<24} {:<28} {:<10} {:>8}  {}",
            model.descriptor.id,
            model.descriptor.display_name,
            model.descriptor.engine.as_str(),
            size(model),
            model.status,
        );
    }
    Ok(())
}

fn size(model: &ModelView) -> String {
    model
        .descriptor
        .size_mb
        .map(|mb| format!("{mb} MB"))
        .unwrap_or_else(|| "-".to_string())
}

async fn download(murmur: &Murmur, id: &str) -> Result<()> {
    let printer = spawn_progress_printer(murmur.subscribe());
    let download = murmur.download_model(id);
    tokio::pin!(download);

    let result = tokio::select! {
        result = &mut download => result,
        _ = tokio::signal::ctrl_c() => {
            murmur.cancel_download(id);
            download.await
        }
    };
    printer.abort();

    match result {
        Ok(()) => {
            println!("{id} is ready to use");
            Ok(())
        }
        Err(Error::Cancelled) => {
            eprintln!("Download of {id} cancelled");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

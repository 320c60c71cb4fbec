use anyhow::Result;
use murmur_core::model::DEFAULT_MODEL;

use crate::app::AppContext;

pub fn run(ctx: &AppContext) -> Result<()> {
    let murmur = ctx.open()?;
    let models = murmur.list_models();
    let downloaded = models.iter().filter(|m| m.is_downloaded).count();

    println!("Data directory:  {}", ctx.data_dir.display());
    println!("Models:          {}", murmur.models_dir().display());
    match murmur.get_current_model() {
        Some(id) => println!("Selected model:  {id}"),
        None => println!(
            "Selected model:  (none, try `murmur models download {DEFAULT_MODEL}`)"
        ),
    }
    println!("Downloaded:      {downloaded} of {}", models.len());
    println!("Unload timeout:  {}", ctx.settings.model_unload_timeout);
    println!("Language:        {}", ctx.settings.language);
    Ok(())
}

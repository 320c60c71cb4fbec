use anyhow::{Result, anyhow};
use murmur_core::ModelUnloadTimeout;

use crate::app::AppContext;

pub struct ConfigChanges {
    pub unload_timeout: Option<String>,
    pub language: Option<String>,
    pub chunk_seconds: Option<u32>,
    pub auto_activate: Option<bool>,
    pub custom_words: Option<String>,
    pub word_threshold: Option<f64>,
    pub show: bool,
}

pub fn run(mut ctx: AppContext, changes: ConfigChanges) -> Result<()> {
    let mut changed = false;

    if let Some(timeout) = changes.unload_timeout {
        let timeout: ModelUnloadTimeout = timeout.parse().map_err(|e: String| anyhow!(e))?;
        ctx.settings.model_unload_timeout = timeout;
        changed = true;
    }
    if let Some(language) = changes.language {
        ctx.settings.language = language.trim().to_string();
        changed = true;
    }
    if let Some(seconds) = changes.chunk_seconds {
        if seconds == 0 {
            return Err(anyhow!("chunk seconds must be at least 1"));
        }
        ctx.settings.chunk_seconds = seconds;
        changed = true;
    }
    if let Some(auto_activate) = changes.auto_activate {
        ctx.settings.auto_activate = auto_activate;
        changed = true;
    }
    if let Some(words) = changes.custom_words {
        ctx.settings.custom_words = parse_word_list(&words);
        changed = true;
    }
    if let Some(threshold) = changes.word_threshold {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!("word threshold must be between 0.0 and 1.0"));
        }
        ctx.settings.word_correction_threshold = threshold;
        changed = true;
    }

    if changed {
        ctx.settings.save_to(&ctx.settings_path())?;
        println!("Settings saved to {}", ctx.settings_path().display());
    }
    if changes.show || !changed {
        println!("{}", serde_json::to_string_pretty(&ctx.settings)?);
    }
    Ok(())
}

fn parse_word_list(words: &str) -> Vec<String> {
    words
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_word_list() {
        assert_eq!(
            parse_word_list(" Tauri, Open AI ,,"),
            vec!["Tauri".to_string(), "Open AI".to_string()]
        );
        assert!(parse_word_list("").is_empty());
    }
}

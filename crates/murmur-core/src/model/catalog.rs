//! Persisted model catalog.
//!
//! Holds built-in and user-registered descriptors, which models have assets
//! on disk, and the last confirmed selection. Stored as JSON; in-flight
//! downloads and engine state are never written here.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::types::{EngineKind, ModelDescriptor};
use super::{parakeet, whisper};
use crate::error::{Error, Result};

/// Prefix of ids minted for registered models.
pub const CUSTOM_PREFIX: &str = "custom-";

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz", ".tar"];

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogFile {
    #[serde(default)]
    custom_models: Vec<ModelDescriptor>,
    #[serde(default)]
    downloaded: BTreeMap<String, PathBuf>,
    #[serde(default)]
    selected_model: Option<String>,
}

#[derive(Debug)]
pub struct Catalog {
    path: Option<PathBuf>,
    models_dir: PathBuf,
    models: Vec<ModelDescriptor>,
    downloaded: BTreeMap<String, PathBuf>,
    selected: Option<String>,
}

impl Catalog {
    /// Catalog that is never written to disk.
    pub fn in_memory(models_dir: impl Into<PathBuf>) -> Self {
        let mut catalog = Self {
            path: None,
            models_dir: models_dir.into(),
            models: builtin_models(),
            downloaded: BTreeMap::new(),
            selected: None,
        };
        catalog.reconcile();
        catalog
    }

    /// Load the catalog at `path`, falling back to built-ins when the file is
    /// missing or unreadable. Download flags are verified against the disk.
    pub fn load(path: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<CatalogFile>(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable catalog {}: {e}", path.display());
                CatalogFile::default()
            }),
            Err(_) => CatalogFile::default(),
        };

        let mut models = builtin_models();
        for custom in file.custom_models {
            if models.iter().any(|m| m.id == custom.id) {
                tracing::warn!("Skipping duplicate catalog entry {}", custom.id);
                continue;
            }
            models.push(ModelDescriptor {
                is_custom: true,
                ..custom
            });
        }

        let mut catalog = Self {
            path: Some(path),
            models_dir: models_dir.into(),
            models,
            downloaded: file.downloaded,
            selected: file.selected_model,
        };
        catalog.reconcile();
        catalog
    }

    /// Drop download flags whose files vanished and adopt assets found on disk.
    fn reconcile(&mut self) {
        let ids: Vec<String> = self.models.iter().map(|m| m.id.clone()).collect();
        self.downloaded
            .retain(|id, path| ids.contains(id) && path.exists());

        for model in &self.models {
            if self.downloaded.contains_key(&model.id) {
                continue;
            }
            let installed = self.install_path(model);
            let present = if model.is_archive {
                installed.is_dir()
            } else {
                installed.is_file()
            };
            if present {
                tracing::debug!("Found {} on disk at {}", model.id, installed.display());
                self.downloaded.insert(model.id.clone(), installed);
            }
        }

        if let Some(id) = &self.selected
            && !self.downloaded.contains_key(id)
        {
            self.selected = None;
        }
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = CatalogFile {
            custom_models: self.models.iter().filter(|m| m.is_custom).cloned().collect(),
            downloaded: self.downloaded.clone(),
            selected_model: self.selected.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn list(&self) -> &[ModelDescriptor] {
        &self.models
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn require(&self, id: &str) -> Result<&ModelDescriptor> {
        self.get(id).ok_or_else(|| Error::NotFound(id.to_string()))
    }

    pub fn is_downloaded(&self, id: &str) -> bool {
        self.downloaded.contains_key(id)
    }

    /// Path the engine loads: the file for single-file models, the extracted
    /// directory for archives.
    pub fn local_path(&self, id: &str) -> Option<&Path> {
        self.downloaded.get(id).map(PathBuf::as_path)
    }

    /// Where the downloaded asset itself lands.
    pub fn asset_path(&self, model: &ModelDescriptor) -> PathBuf {
        self.models_dir.join(&model.asset_filename)
    }

    /// Where the usable model lives once installed.
    pub fn install_path(&self, model: &ModelDescriptor) -> PathBuf {
        if model.is_archive {
            self.models_dir.join(&model.id)
        } else {
            self.asset_path(model)
        }
    }

    pub fn mark_downloaded(&mut self, id: &str, path: PathBuf) {
        self.downloaded.insert(id.to_string(), path);
    }

    pub fn clear_downloaded(&mut self, id: &str) {
        self.downloaded.remove(id);
        if self.selected.as_deref() == Some(id) {
            self.selected = None;
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn set_selected(&mut self, id: Option<&str>) {
        self.selected = id.map(str::to_string);
    }

    /// Register a model by URL. Returns the id and whether it was new.
    /// Registering the same URL again returns the existing id.
    pub fn register(&mut self, url: &str, name: Option<&str>) -> Result<(String, bool)> {
        let descriptor = describe_custom(url, name)?;
        let id = descriptor.id.clone();
        if self.get(&id).is_some() {
            return Ok((id, false));
        }
        tracing::info!("Registered {} ({})", descriptor.display_name, descriptor.url);
        self.models.push(descriptor);
        Ok((id, true))
    }

    /// Remove a registered model. Built-in models stay in the catalog.
    pub fn remove_custom(&mut self, id: &str) -> bool {
        let before = self.models.len();
        self.models.retain(|m| !(m.is_custom && m.id == id));
        let removed = self.models.len() != before;
        if removed {
            self.clear_downloaded(id);
        }
        removed
    }
}

fn builtin_models() -> Vec<ModelDescriptor> {
    let mut models = whisper::descriptors();
    models.extend(parakeet::descriptors());
    models
}

/// Stable id for a registered URL.
pub fn custom_id(normalized_url: &str) -> String {
    let digest = Sha256::digest(normalized_url.as_bytes());
    let hex: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    format!("{CUSTOM_PREFIX}{hex}")
}

/// Validate and normalize a model URL.
pub fn normalize_url(url: &str) -> Result<reqwest::Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("model URL is empty".to_string()));
    }
    let parsed = reqwest::Url::parse(trimmed)
        .map_err(|e| Error::InvalidInput(format!("invalid model URL '{trimmed}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::InvalidInput(format!(
            "unsupported URL scheme '{}', expected http or https",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidInput(format!("model URL '{trimmed}' has no host")));
    }
    Ok(parsed)
}

fn is_archive_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    ARCHIVE_SUFFIXES.iter().any(|s| lower.ends_with(s))
}

fn file_stem(name: &str) -> &str {
    let lower = name.to_lowercase();
    for suffix in ARCHIVE_SUFFIXES.iter().chain([".bin", ".gguf", ".onnx"].iter()) {
        if lower.ends_with(suffix) {
            return &name[..name.len() - suffix.len()];
        }
    }
    name
}

fn sanitize_filename(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn describe_custom(url: &str, name: Option<&str>) -> Result<ModelDescriptor> {
    let parsed = normalize_url(url)?;
    let normalized = parsed.as_str().trim_end_matches('/').to_string();
    let id = custom_id(&normalized);

    let filename = parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map(sanitize_filename)
        .filter(|s| !s.trim_matches('.').is_empty())
        .unwrap_or_else(|| "model.bin".to_string());

    let is_archive = is_archive_name(&filename);
    let engine = if is_archive {
        EngineKind::Parakeet
    } else {
        EngineKind::Whisper
    };
    let display_name = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(&filename).to_string());

    Ok(ModelDescriptor {
        asset_filename: format!("{id}-{filename}"),
        description: format!(
            "Custom {} model from {}",
            engine.display_name(),
            parsed.host_str().unwrap_or_default()
        ),
        id,
        display_name,
        is_archive,
        engine,
        url: normalized,
        size_mb: None,
        accuracy: 0,
        is_custom: true,
    })
}

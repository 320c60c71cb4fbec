//! Archive extraction for directory-based models.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

fn staging_dir(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".extracting");
    PathBuf::from(name)
}

fn open_archive(archive: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
    let file = File::open(archive)
        .map_err(|e| Error::Extraction(format!("cannot open {}: {e}", archive.display())))?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let reader: Box<dyn Read> = if name.ends_with(".tar") {
        Box::new(file)
    } else {
        Box::new(GzDecoder::new(file))
    };
    Ok(tar::Archive::new(reader))
}

/// Unpack `archive` so that the model directory ends up at `target`.
///
/// Entries are unpacked into a sibling `*.extracting` directory first. When
/// the archive holds a single top-level directory, that directory becomes
/// `target`; otherwise the staging directory itself does. Nothing is left
/// behind on failure.
pub fn extract_archive(archive: &Path, target: &Path) -> Result<()> {
    let staging = staging_dir(target);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    let result = unpack_into(archive, &staging).and_then(|()| promote(&staging, target));
    if result.is_err() {
        let _ = fs::remove_dir_all(&staging);
    }
    result.map_err(|e| match e {
        Error::Extraction(_) => e,
        other => Error::Extraction(other.to_string()),
    })
}

fn unpack_into(archive: &Path, staging: &Path) -> Result<()> {
    let mut tar = open_archive(archive)?;
    tar.unpack(staging)
        .map_err(|e| Error::Extraction(format!("{}: {e}", archive.display())))?;

    let mut entries = fs::read_dir(staging)?;
    if entries.next().is_none() {
        return Err(Error::Extraction(format!(
            "{} contains no files",
            archive.display()
        )));
    }
    Ok(())
}

fn promote(staging: &Path, target: &Path) -> Result<()> {
    let entries: Vec<PathBuf> = fs::read_dir(staging)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();

    if target.exists() {
        fs::remove_dir_all(target)?;
    }

    match entries.as_slice() {
        [single] if single.is_dir() => {
            fs::rename(single, target)?;
            fs::remove_dir_all(staging)?;
        }
        _ => fs::rename(staging, target)?,
    }
    Ok(())
}

/// Run [`extract_archive`] on the blocking pool.
pub async fn extract_archive_async(archive: PathBuf, target: PathBuf) -> Result<()> {
    tokio::task::spawn_blocking(move || extract_archive(&archive, &target))
        .await
        .map_err(|e| Error::Extraction(format!("extraction task failed: {e}")))?
}

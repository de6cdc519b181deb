//! filesystem helpers for staged, atomic replacement
//!
//! writes never target a live path directly: content goes to a temporary
//! sibling in the same directory, then a rename makes it visible. a rename
//! that fails across storage boundaries falls back to copy-then-delete of
//! the source.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// temp-file path next to `target`, for same-directory atomic rename
pub(crate) fn temp_sibling(target: &Path) -> PathBuf {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let stem = target
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!(".{}.{}.tmp", stem, uuid::Uuid::new_v4()))
}

/// write `content` to `path` atomically
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    let tmp = temp_sibling(path);
    {
        let mut file = File::create(&tmp).with_path(&tmp)?;
        file.write_all(content).with_path(&tmp)?;
        file.sync_all().with_path(&tmp)?;
    }
    fs::rename(&tmp, path).with_path(path)?;
    Ok(())
}

/// move a verified staged file into its live path
///
/// the staged file is first brought into the live directory as a temporary
/// sibling (rename, or copy across filesystems), fsynced, then renamed over
/// the live path, so partial bytes are never observable there.
pub(crate) fn promote(staged: &Path, live: &Path) -> Result<()> {
    if let Some(parent) = live.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    let tmp = temp_sibling(live);
    if fs::rename(staged, &tmp).is_err() {
        fs::copy(staged, &tmp).with_path(&tmp)?;
        fs::remove_file(staged).with_path(staged)?;
    }
    let file = File::open(&tmp).with_path(&tmp)?;
    file.sync_all().with_path(&tmp)?;
    fs::rename(&tmp, live).with_path(live)?;
    Ok(())
}

/// move `live` to `<backup_root>/<rel>`, replacing any previous backup
pub(crate) fn backup(live: &Path, rel: &str, backup_root: &Path) -> Result<PathBuf> {
    let dest = backup_root.join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).with_path(parent)?;
    }
    if dest.exists() {
        fs::remove_file(&dest).with_path(&dest)?;
    }
    if fs::rename(live, &dest).is_err() {
        fs::copy(live, &dest).with_path(&dest)?;
        fs::remove_file(live).with_path(live)?;
    }
    Ok(dest)
}

/// remove a live file, moving it under the backup root first when one is
/// configured; the backup move is what commits the removal
pub(crate) fn remove_live(live: &Path, rel: &str, backup_root: Option<&Path>) -> Result<()> {
    match backup_root {
        Some(root) => {
            backup(live, rel, root)?;
        }
        None => fs::remove_file(live).with_path(live)?,
    }
    Ok(())
}

/// true when `artifact` is missing or older than `src`
pub(crate) fn is_stale(src: &Path, artifact: &Path) -> Result<bool> {
    let artifact_meta = match fs::metadata(artifact) {
        Ok(meta) => meta,
        Err(_) => return Ok(true),
    };
    let src_mtime = fs::metadata(src)
        .with_path(src)?
        .modified()
        .with_path(src)?;
    let artifact_mtime = artifact_meta.modified().with_path(artifact)?;
    Ok(src_mtime > artifact_mtime)
}

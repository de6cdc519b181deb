//! building the per-session work plan

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::catalog::{Catalog, VersionRecord};
use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::ops::resolve::{resolve, Resolution};
use crate::progress::{DOWNLOAD_WEIGHT, PATCH_WEIGHT, UNPACK_WEIGHT};

/// one file routed to a full archive download
#[derive(Clone, Debug)]
pub struct DownloadItem {
    /// catalog name of the file
    pub name: String,
    /// relative path inside the live tree (actual on-disk casing)
    pub rel: String,
    /// version to download
    pub target: VersionRecord,
}

/// one file routed through a patch chain
#[derive(Clone, Debug)]
pub struct PatchItem {
    pub name: String,
    pub rel: String,
    /// versions from the local match through latest
    pub chain: Vec<VersionRecord>,
}

/// work plan for one sync session; every relevant file lands in exactly
/// one bucket
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// already at the latest version
    pub skipped: Vec<String>,
    pub downloads: Vec<DownloadItem>,
    pub patches: Vec<PatchItem>,
    /// relative paths to remove from the live tree
    pub deletes: Vec<String>,
    /// archive bytes to transfer
    pub download_bytes: u64,
    /// patch bytes to transfer and apply
    pub patch_bytes: u64,
}

impl SyncPlan {
    /// weighted work units for proportional progress reporting
    pub fn total_work(&self) -> u64 {
        DOWNLOAD_WEIGHT * (self.download_bytes + self.patch_bytes)
            + UNPACK_WEIGHT * self.download_bytes
            + PATCH_WEIGHT * self.patch_bytes
    }

    /// number of actions that change the live tree
    pub fn action_count(&self) -> usize {
        self.downloads.len() + self.patches.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.action_count() == 0
    }
}

/// classify every catalog file against the local tree
///
/// a file is considered when it exists locally or is `forced`; `to_delete`
/// wins over everything else and only applies to files actually present.
pub fn plan(catalog: &Catalog, live_dir: &Path) -> Result<SyncPlan> {
    let local = local_index(live_dir)?;
    let mut plan = SyncPlan::default();

    for file in catalog.files() {
        let key = file.name.to_lowercase();
        let rel = local.get(&key).cloned();

        if file.to_delete {
            if let Some(rel) = rel {
                plan.deletes.push(rel);
            }
            continue;
        }
        if rel.is_none() && !file.forced {
            continue;
        }
        let rel = rel.unwrap_or_else(|| file.name.clone());

        let current = local_checksum(&live_dir.join(&rel))?;
        match resolve(file, current.as_ref()) {
            Resolution::UpToDate => plan.skipped.push(rel),
            Resolution::Chain(chain) => {
                for version in &chain[..chain.len() - 1] {
                    plan.patch_bytes += version.patch_size;
                }
                plan.patches.push(PatchItem {
                    name: file.name.clone(),
                    rel,
                    chain,
                });
            }
            Resolution::NoChain => {
                let Some(latest) = file.latest() else {
                    debug!(file = %file.name, "catalog entry has no versions, skipping");
                    continue;
                };
                plan.download_bytes += latest.archive_size;
                plan.downloads.push(DownloadItem {
                    name: file.name.clone(),
                    rel,
                    target: latest.clone(),
                });
            }
        }
    }

    debug!(
        downloads = plan.downloads.len(),
        patches = plan.patches.len(),
        deletes = plan.deletes.len(),
        skipped = plan.skipped.len(),
        "plan ready"
    );
    Ok(plan)
}

/// map of lowercased relative path to actual on-disk relative path
fn local_index(live_dir: &Path) -> Result<HashMap<String, String>> {
    let mut index = HashMap::new();
    if !live_dir.is_dir() {
        return Ok(index);
    }
    for entry in WalkDir::new(live_dir) {
        let entry = entry.map_err(|e| Error::Io {
            path: live_dir.to_path_buf(),
            source: e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("walkdir error")),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(live_dir)
            .map_err(|_| Error::Io {
                path: entry.path().to_path_buf(),
                source: std::io::Error::other("path outside live tree"),
            })?
            .to_string_lossy()
            .replace('\\', "/");
        index.insert(rel.to_lowercase(), rel);
    }
    Ok(index)
}

/// checksum of the live file; absent or zero-length files count as absent
fn local_checksum(path: &Path) -> Result<Option<Checksum>> {
    match std::fs::metadata(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io {
            path: path.to_path_buf(),
            source: e,
        }),
        Ok(meta) if meta.len() == 0 => Ok(None),
        Ok(_) => Checksum::of_file(path).map(Some),
    }
}

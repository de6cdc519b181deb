//! server-side batch builder
//!
//! scans the depot's release tree into a catalog, attaches original
//! versions, applies the no-force / to-delete lists, generates the missing
//! patches and archive companions, and writes the catalog document plus
//! the bootstrap pack. runs as a single writer against an exclusively
//! owned depot.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::archive;
use crate::catalog::{patch_rel_path, save_catalog, Catalog, FileRecord, VersionRecord};
use crate::checksum::{cached_checksum, sidecar_path, Checksum};
use crate::depot::{Depot, ORIGINALS_DIR, RELEASES_DIR};
use crate::error::{Error, IoResultExt, Result};
use crate::patch;

/// compression level of the bootstrap pack
const PACK_LEVEL: i32 = 19;

/// counters for one build run
#[derive(Debug, Default)]
pub struct BuildReport {
    pub files: usize,
    pub versions: usize,
    pub patches_built: usize,
    pub patches_removed: usize,
    pub archives_built: usize,
}

/// build the depot: catalog, patches, archives, bootstrap pack
pub fn build(depot: &Depot, name: &str) -> Result<BuildReport> {
    let mut report = BuildReport::default();

    let mut catalog = scan_releases(depot, name, &mut report)?;
    scan_originals(depot, &mut catalog, &mut report)?;
    apply_flag_lists(depot, &mut catalog)?;
    build_patches(depot, &mut catalog, &mut report)?;
    build_archives(depot, &mut catalog, &mut report)?;
    write_pack(depot, &catalog)?;

    let catalog_path = depot.catalog_path();
    save_catalog(&catalog, &catalog_path)?;
    let sum = Checksum::of_file(&catalog_path)?;
    let side = sidecar_path(&catalog_path);
    fs::write(&side, sum.to_hex()).with_path(&side)?;

    report.files = catalog.len();
    info!(
        files = report.files,
        versions = report.versions,
        patches = report.patches_built,
        archives = report.archives_built,
        "build complete"
    );
    Ok(report)
}

/// depot-relative path string with forward slashes
fn rel_string(path: &Path, root: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| Error::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other("path outside scanned root"),
    })?;
    Ok(rel.to_string_lossy().replace('\\', "/"))
}

/// generated companions that never enter the catalog
fn is_helper_file(rel: &str) -> bool {
    rel.ends_with(crate::archive::ARCHIVE_SUFFIX)
        || rel.ends_with(crate::checksum::CHECKSUM_SUFFIX)
        || rel.ends_with(".patch")
}

fn scan_releases(depot: &Depot, name: &str, report: &mut BuildReport) -> Result<Catalog> {
    let releases = depot.release_dirs()?;
    let Some(latest) = releases.last() else {
        return Err(Error::NoReleases(depot.path().to_path_buf()));
    };

    let mut catalog = Catalog::new(name, format!("{}/{}", RELEASES_DIR, latest));

    for dir in &releases {
        let version_id = format!("{}/{}", RELEASES_DIR, dir);
        let root = depot.releases_path().join(dir);
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|e| Error::Io {
                path: root.clone(),
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("walkdir error")),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = rel_string(entry.path(), &root)?;
            if is_helper_file(&rel) {
                continue;
            }

            let sum = cached_checksum(entry.path())?;
            let mut record = FileRecord::new(&rel);
            record.forced = true;
            let file = catalog.add_file(record);
            file.add_version(VersionRecord::new(version_id.clone(), sum))?;
            report.versions += 1;
        }
        debug!(release = %version_id, "scanned");
    }
    Ok(catalog)
}

/// attach original-media checksums to files the releases already know
fn scan_originals(depot: &Depot, catalog: &mut Catalog, report: &mut BuildReport) -> Result<()> {
    let names: Vec<String> = catalog.files().map(|f| f.name.clone()).collect();
    for dir in depot.original_dirs()? {
        let version_id = format!("{}/{}", ORIGINALS_DIR, dir);
        let root = depot.originals_path().join(&dir);
        for name in &names {
            let path = root.join(name);
            if !path.is_file() {
                continue;
            }
            let sum = cached_checksum(&path)?;
            if let Some(file) = catalog.file_mut(name) {
                file.add_original(VersionRecord::new(version_id.clone(), sum))?;
                report.versions += 1;
            }
        }
    }
    Ok(())
}

/// apply the no-force and to-delete filename lists
///
/// a to-delete name unknown to the catalog is added with only the delete
/// flag set.
fn apply_flag_lists(depot: &Depot, catalog: &mut Catalog) -> Result<()> {
    let no_force = depot.no_force_path();
    if no_force.is_file() {
        for line in fs::read_to_string(&no_force).with_path(&no_force)?.lines() {
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            if let Some(file) = catalog.file_mut(name) {
                file.forced = false;
            }
        }
    }

    let to_delete = depot.to_delete_path();
    if to_delete.is_file() {
        for line in fs::read_to_string(&to_delete).with_path(&to_delete)?.lines() {
            let name = line.trim();
            if name.is_empty() {
                continue;
            }
            let record = FileRecord::new(name);
            catalog.add_file(record).to_delete = true;
        }
    }
    Ok(())
}

/// generate the patch between `from` and `to` if absent, returning its
/// checksum and size
fn ensure_patch(
    depot: &Depot,
    name: &str,
    from: &VersionRecord,
    to: &VersionRecord,
    report: &mut BuildReport,
) -> Result<(Checksum, u64)> {
    let path = depot.patches_path().join(patch_rel_path(name, from, to));
    if !path.exists() {
        let old_path = depot.path().join(&from.version).join(name);
        let new_path = depot.path().join(&to.version).join(name);
        let old = fs::read(&old_path).with_path(&old_path)?;
        let new = fs::read(&new_path).with_path(&new_path)?;
        let data = patch::encode(&old, &new)?;
        crate::fs::write_atomic(&path, &data)?;
        report.patches_built += 1;
        debug!(patch = %path.display(), "built");
    }
    let sum = cached_checksum(&path)?;
    let size = fs::metadata(&path).with_path(&path)?.len();
    Ok((sum, size))
}

/// one patch per consecutive successive pair, one per original straight to
/// latest; superseded original patches are deleted
fn build_patches(depot: &Depot, catalog: &mut Catalog, report: &mut BuildReport) -> Result<()> {
    for file in catalog.files_mut() {
        if file.to_delete {
            continue;
        }
        let name = file.name.clone();
        let successive = file.successive().to_vec();
        let Some(latest) = successive.last().cloned() else {
            continue;
        };

        for pair in successive.windows(2) {
            let (sum, size) = ensure_patch(depot, &name, &pair[0], &pair[1], report)?;
            file.set_patch(&pair[0].version, sum, size)?;
        }

        let originals = file.originals().to_vec();
        for original in &originals {
            let (sum, size) = ensure_patch(depot, &name, original, &latest, report)?;
            file.set_patch(&original.version, sum, size)?;

            for superseded in &successive[..successive.len() - 1] {
                let stale = depot
                    .patches_path()
                    .join(patch_rel_path(&name, original, superseded));
                if stale.exists() {
                    fs::remove_file(&stale).with_path(&stale)?;
                    fs::remove_file(sidecar_path(&stale)).ok();
                    report.patches_removed += 1;
                }
            }
        }
    }
    Ok(())
}

/// refresh the compressed companion of every latest version, rebuilding
/// only when the source is newer than the cached artifact
fn build_archives(depot: &Depot, catalog: &mut Catalog, report: &mut BuildReport) -> Result<()> {
    for file in catalog.files_mut() {
        if file.to_delete {
            continue;
        }
        let name = file.name.clone();
        let Some(latest) = file.latest().cloned() else {
            continue;
        };

        let src = depot.path().join(&latest.version).join(&name);
        let arch = archive::archive_path(&src);
        if crate::fs::is_stale(&src, &arch)? {
            archive::compress_file(&src, &arch)?;
            report.archives_built += 1;
            debug!(archive = %arch.display(), "compressed");
        }
        let sum = cached_checksum(&arch)?;
        let size = fs::metadata(&arch).with_path(&arch)?.len();
        file.set_archive(&latest.version, sum, size)?;
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct PackEntry {
    name: String,
    data: Vec<u8>,
}

/// combined archive of every non-deleted latest file, for first installs
fn write_pack(depot: &Depot, catalog: &Catalog) -> Result<()> {
    let mut entries = Vec::new();
    for file in catalog.files() {
        if file.to_delete {
            continue;
        }
        let Some(latest) = file.latest() else {
            continue;
        };
        let path = depot.path().join(&latest.version).join(&file.name);
        entries.push(PackEntry {
            name: file.name.clone(),
            data: fs::read(&path).with_path(&path)?,
        });
    }

    let mut cbor = Vec::new();
    ciborium::into_writer(&entries, &mut cbor)?;
    let compressed = zstd::encode_all(&cbor[..], PACK_LEVEL).map_err(|e| Error::Io {
        path: depot.pack_path(),
        source: e,
    })?;
    crate::fs::write_atomic(&depot.pack_path(), &compressed)
}

/// read a bootstrap pack back into (name, content) pairs
pub fn read_pack(path: &Path) -> Result<Vec<(String, Vec<u8>)>> {
    let compressed = fs::read(path).with_path(path)?;
    let cbor = zstd::decode_all(&compressed[..]).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let entries: Vec<PackEntry> = ciborium::from_reader(&cbor[..])?;
    Ok(entries.into_iter().map(|e| (e.name, e.data)).collect())
}

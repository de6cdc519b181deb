use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::CATALOG_NAME;
use crate::error::{Error, IoResultExt, Result};

/// directory of release subtrees, one per release, ascending order
pub const RELEASES_DIR: &str = "releases";
/// directory of pristine-media subtrees
pub const ORIGINALS_DIR: &str = "originals";
/// directory of generated patch files
pub const PATCHES_DIR: &str = "patches";
/// list of filenames that must not be forced onto clients
pub const NO_FORCE_LIST: &str = "no-force";
/// list of filenames clients must remove
pub const TO_DELETE_LIST: &str = "to-delete";
/// combined archive of every latest file, for first-time installs
pub const PACK_NAME: &str = "bootstrap.pack";

/// the server-side storage root
///
/// one subdirectory per release under `releases/`, pristine media under
/// `originals/`, generated patches under `patches/`, each mirroring the
/// live tree's relative paths. the builder owns this exclusively.
pub struct Depot {
    path: PathBuf,
}

impl Depot {
    /// create the expected directory layout
    pub fn init(path: &Path) -> Result<Self> {
        fs::create_dir_all(path.join(RELEASES_DIR)).with_path(path)?;
        fs::create_dir_all(path.join(ORIGINALS_DIR)).with_path(path)?;
        fs::create_dir_all(path.join(PATCHES_DIR)).with_path(path)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// open an existing depot root
    pub fn open(path: &Path) -> Result<Self> {
        if !path.join(RELEASES_DIR).is_dir() {
            return Err(Error::NoDepot(path.to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// depot root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn releases_path(&self) -> PathBuf {
        self.path.join(RELEASES_DIR)
    }

    pub fn originals_path(&self) -> PathBuf {
        self.path.join(ORIGINALS_DIR)
    }

    pub fn patches_path(&self) -> PathBuf {
        self.path.join(PATCHES_DIR)
    }

    /// path of the serialized catalog document
    pub fn catalog_path(&self) -> PathBuf {
        self.path.join(CATALOG_NAME)
    }

    pub fn no_force_path(&self) -> PathBuf {
        self.path.join(NO_FORCE_LIST)
    }

    pub fn to_delete_path(&self) -> PathBuf {
        self.path.join(TO_DELETE_LIST)
    }

    pub fn pack_path(&self) -> PathBuf {
        self.path.join(PACK_NAME)
    }

    /// release directory names in ascending identifier order
    pub fn release_dirs(&self) -> Result<Vec<String>> {
        let root = self.releases_path();
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&root).with_path(&root)? {
            let entry = entry.with_path(&root)?;
            if entry.file_type().with_path(&root)?.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// subdirectory names under originals, ascending
    pub fn original_dirs(&self) -> Result<Vec<String>> {
        let root = self.originals_path();
        let mut dirs = Vec::new();
        if !root.is_dir() {
            return Ok(dirs);
        }
        for entry in fs::read_dir(&root).with_path(&root)? {
            let entry = entry.with_path(&root)?;
            if entry.file_type().with_path(&root)?.is_dir() {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

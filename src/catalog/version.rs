use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;

/// one recorded version of a file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    /// release identifier, e.g. `releases/2019-06`
    pub version: String,

    /// digest of the raw file at this version
    pub checksum: Checksum,

    /// digest of the compressed downloadable companion
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub archive_checksum: Option<Checksum>,

    /// byte size of the compressed companion
    #[serde(default)]
    pub archive_size: u64,

    /// digest of the patch leading out of this version: for a successive
    /// version the patch to the next version, for an original the patch
    /// straight to latest
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub patch_checksum: Option<Checksum>,

    /// byte size of that patch
    #[serde(default)]
    pub patch_size: u64,

    /// sourced from pristine shipped media rather than a release
    #[serde(default)]
    pub is_original: bool,
}

impl VersionRecord {
    pub fn new(version: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            version: version.into(),
            checksum,
            archive_checksum: None,
            archive_size: 0,
            patch_checksum: None,
            patch_size: 0,
            is_original: false,
        }
    }

    /// last path segment of the version identifier
    pub fn base_name(&self) -> &str {
        self.version
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.version)
    }
}

/// relative path under the patches root of the patch transforming `file`
/// at version `from` into version `to`
///
/// only the base name of each version identifier appears, and the whole
/// name is lowercased to match the case-insensitive file identity.
pub fn patch_rel_path(file: &str, from: &VersionRecord, to: &VersionRecord) -> String {
    format!("{}.{}.{}.patch", file, from.base_name(), to.base_name()).to_lowercase()
}

use serde::{Deserialize, Serialize};

use crate::catalog::VersionRecord;
use crate::checksum::Checksum;
use crate::error::{Error, Result};

/// version history of one logical file
///
/// successive versions are kept strictly sorted by version identifier with
/// no duplicates; original versions live in their own sorted list. all
/// lookups walk the owned vectors, so there is no secondary index that
/// could go stale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    /// relative path; identity is case-insensitive
    pub name: String,

    /// process even when absent locally
    #[serde(default)]
    pub forced: bool,

    /// remove from the live tree; wins over `forced`
    #[serde(default)]
    pub to_delete: bool,

    successive: Vec<VersionRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    originals: Vec<VersionRecord>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            forced: false,
            to_delete: false,
            successive: vec![],
            originals: vec![],
        }
    }

    /// successive versions in ascending identifier order
    pub fn successive(&self) -> &[VersionRecord] {
        &self.successive
    }

    /// original versions in ascending identifier order
    pub fn originals(&self) -> &[VersionRecord] {
        &self.originals
    }

    /// latest successive version, if any
    pub fn latest(&self) -> Option<&VersionRecord> {
        self.successive.last()
    }

    /// successive and original version count
    pub fn version_count(&self) -> usize {
        self.successive.len() + self.originals.len()
    }

    /// add a successive version, keeping the sorted order
    pub fn add_version(&mut self, version: VersionRecord) -> Result<()> {
        match self
            .successive
            .binary_search_by(|v| v.version.as_str().cmp(&version.version))
        {
            Ok(_) => Err(Error::DuplicateVersion {
                file: self.name.clone(),
                version: version.version,
            }),
            Err(idx) => {
                self.successive.insert(idx, version);
                Ok(())
            }
        }
    }

    /// add an original version, keeping the sorted order
    pub fn add_original(&mut self, mut version: VersionRecord) -> Result<()> {
        version.is_original = true;
        match self
            .originals
            .binary_search_by(|v| v.version.as_str().cmp(&version.version))
        {
            Ok(_) => Err(Error::DuplicateVersion {
                file: self.name.clone(),
                version: version.version,
            }),
            Err(idx) => {
                self.originals.insert(idx, version);
                Ok(())
            }
        }
    }

    /// version with this identifier, successive or original
    pub fn version_by_id(&self, id: &str) -> Option<&VersionRecord> {
        if let Ok(i) = self
            .successive
            .binary_search_by(|v| v.version.as_str().cmp(id))
        {
            return Some(&self.successive[i]);
        }
        if let Ok(i) = self
            .originals
            .binary_search_by(|v| v.version.as_str().cmp(id))
        {
            return Some(&self.originals[i]);
        }
        None
    }

    /// version whose raw checksum matches
    ///
    /// successive versions are searched first, then originals in
    /// version-name order; the first match wins, which makes the result
    /// deterministic even when several originals share a checksum.
    pub fn version_by_checksum(&self, sum: &Checksum) -> Option<&VersionRecord> {
        self.successive
            .iter()
            .find(|v| v.checksum == *sum)
            .or_else(|| self.originals.iter().find(|v| v.checksum == *sum))
    }

    /// record the patch leading out of the given version
    pub fn set_patch(&mut self, version: &str, checksum: Checksum, size: u64) -> Result<()> {
        let name = self.name.clone();
        let v = self
            .version_mut(version)
            .ok_or_else(|| Error::VersionNotFound {
                file: name,
                version: version.to_string(),
            })?;
        v.patch_checksum = Some(checksum);
        v.patch_size = size;
        Ok(())
    }

    /// record the compressed companion of the given version
    pub fn set_archive(&mut self, version: &str, checksum: Checksum, size: u64) -> Result<()> {
        let name = self.name.clone();
        let v = self
            .version_mut(version)
            .ok_or_else(|| Error::VersionNotFound {
                file: name,
                version: version.to_string(),
            })?;
        v.archive_checksum = Some(checksum);
        v.archive_size = size;
        Ok(())
    }

    fn version_mut(&mut self, id: &str) -> Option<&mut VersionRecord> {
        if let Ok(i) = self
            .successive
            .binary_search_by(|v| v.version.as_str().cmp(id))
        {
            return Some(&mut self.successive[i]);
        }
        if let Ok(i) = self
            .originals
            .binary_search_by(|v| v.version.as_str().cmp(id))
        {
            return Some(&mut self.originals[i]);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(id: &str, content: &[u8]) -> VersionRecord {
        VersionRecord::new(id, Checksum::of_bytes(content))
    }

    #[test]
    fn test_add_version_keeps_order() {
        let mut file = FileRecord::new("a.dat");
        file.add_version(version("releases/r3", b"3")).unwrap();
        file.add_version(version("releases/r1", b"1")).unwrap();
        file.add_version(version("releases/r2", b"2")).unwrap();

        let ids: Vec<_> = file.successive().iter().map(|v| v.version.as_str()).collect();
        assert_eq!(ids, ["releases/r1", "releases/r2", "releases/r3"]);
        assert_eq!(file.latest().unwrap().version, "releases/r3");
    }

    #[test]
    fn test_add_duplicate_version() {
        let mut file = FileRecord::new("a.dat");
        file.add_version(version("releases/r1", b"1")).unwrap();
        let result = file.add_version(version("releases/r1", b"other"));
        assert!(matches!(result, Err(Error::DuplicateVersion { .. })));
        assert_eq!(file.successive().len(), 1);
    }

    #[test]
    fn test_originals_separate_from_successive() {
        let mut file = FileRecord::new("a.dat");
        file.add_version(version("releases/r1", b"1")).unwrap();
        file.add_original(version("originals/cd1", b"cd")).unwrap();

        assert_eq!(file.successive().len(), 1);
        assert_eq!(file.originals().len(), 1);
        assert!(file.originals()[0].is_original);
        // latest never comes from the originals
        assert_eq!(file.latest().unwrap().version, "releases/r1");
    }

    #[test]
    fn test_version_by_checksum_prefers_successive() {
        let mut file = FileRecord::new("a.dat");
        file.add_version(version("releases/r1", b"same")).unwrap();
        file.add_original(version("originals/cd1", b"same")).unwrap();

        let hit = file
            .version_by_checksum(&Checksum::of_bytes(b"same"))
            .unwrap();
        assert_eq!(hit.version, "releases/r1");
        assert!(!hit.is_original);
    }

    #[test]
    fn test_version_by_checksum_original_tiebreak() {
        let mut file = FileRecord::new("a.dat");
        file.add_original(version("originals/cd2", b"same")).unwrap();
        file.add_original(version("originals/cd1", b"same")).unwrap();

        // earliest original by name wins, deterministically
        let hit = file
            .version_by_checksum(&Checksum::of_bytes(b"same"))
            .unwrap();
        assert_eq!(hit.version, "originals/cd1");
    }

    #[test]
    fn test_version_by_id() {
        let mut file = FileRecord::new("a.dat");
        file.add_version(version("releases/r1", b"1")).unwrap();
        file.add_original(version("originals/cd1", b"cd")).unwrap();

        assert!(file.version_by_id("releases/r1").is_some());
        assert!(file.version_by_id("originals/cd1").is_some());
        assert!(file.version_by_id("releases/r9").is_none());
    }

    #[test]
    fn test_set_patch_and_archive() {
        let mut file = FileRecord::new("a.dat");
        file.add_version(version("releases/r1", b"1")).unwrap();

        let sum = Checksum::of_bytes(b"patch");
        file.set_patch("releases/r1", sum, 42).unwrap();
        let v = file.version_by_id("releases/r1").unwrap();
        assert_eq!(v.patch_checksum, Some(sum));
        assert_eq!(v.patch_size, 42);

        let sum = Checksum::of_bytes(b"archive");
        file.set_archive("releases/r1", sum, 7).unwrap();
        let v = file.version_by_id("releases/r1").unwrap();
        assert_eq!(v.archive_checksum, Some(sum));
        assert_eq!(v.archive_size, 7);

        assert!(matches!(
            file.set_patch("releases/r9", sum, 0),
            Err(Error::VersionNotFound { .. })
        ));
    }
}

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};

/// suffix of the cached digest sidecar next to a source file
pub const CHECKSUM_SUFFIX: &str = ".sum";

/// SHA-256 digest identifying one exact byte content of a file
///
/// rendered everywhere as a lowercase 64-character hex string; that string
/// is also the sidecar file format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Checksum([u8; 32]);

impl Checksum {
    /// create from raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidChecksumHex(s.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidChecksumHex(s.to_string()));
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// convert to lowercase hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// digest of an in-memory buffer
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// digest of a file's contents, streamed
    pub fn of_file(path: &Path) -> Result<Self> {
        let mut file = File::open(path).with_path(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).with_path(path)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self(hasher.finalize().into()))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", &self.to_hex()[..12])
    }
}

impl Serialize for Checksum {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Checksum {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// path of the digest sidecar belonging to `path`
pub fn sidecar_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(CHECKSUM_SUFFIX);
    PathBuf::from(name)
}

/// checksum of a file, cached in its `.sum` sidecar
///
/// the sidecar is trusted while it is at least as new as the source file;
/// otherwise the digest is recomputed and the sidecar rewritten.
pub fn cached_checksum(path: &Path) -> Result<Checksum> {
    let side = sidecar_path(path);
    let src_mtime = fs::metadata(path)
        .with_path(path)?
        .modified()
        .with_path(path)?;

    if let Ok(meta) = fs::metadata(&side) {
        if let Ok(side_mtime) = meta.modified() {
            if side_mtime >= src_mtime {
                let text = fs::read_to_string(&side).with_path(&side)?;
                if let Ok(sum) = Checksum::from_hex(text.trim()) {
                    return Ok(sum);
                }
                // unreadable sidecar content: fall through and recompute
            }
        }
    }

    let sum = Checksum::of_file(path)?;
    fs::write(&side, sum.to_hex()).with_path(&side)?;
    Ok(sum)
}

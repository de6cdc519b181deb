use std::path::PathBuf;

use crate::checksum::Checksum;

/// error type for shardsync operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("depot not found at {0}")]
    NoDepot(PathBuf),

    #[error("no release directories under {0}")]
    NoReleases(PathBuf),

    #[error("catalog not found at {0}")]
    CatalogNotFound(PathBuf),

    #[error("file not in catalog: {0}")]
    FileNotFound(String),

    #[error("version {version} not recorded for file {file}")]
    VersionNotFound { file: String, version: String },

    #[error("duplicate version {version} for file {file}")]
    DuplicateVersion { file: String, version: String },

    #[error("bad patch magic")]
    BadPatchMagic,

    #[error("corrupt patch: {0}")]
    CorruptPatch(&'static str),

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: Checksum,
        actual: Checksum,
    },

    #[error("invalid checksum hex: {0}")]
    InvalidChecksumHex(String),

    #[error("remote file not found: {0}")]
    RemoteNotFound(String),

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("worker pool setup failed: {0}")]
    Pool(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cbor serialization error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("cbor deserialization error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config serialization error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}

//! fetching depot files onto the client
//!
//! the real network layer (HTTP with range requests) is an external
//! collaborator; the trait below is the seam it plugs into, and the local
//! mirror implementation ships in-tree for tooling and tests.

mod local;

pub use local::LocalTransport;

use std::path::Path;

use crate::error::Result;

/// byte source for a remote depot
///
/// `fetch` brings the remote file at the depot-relative path `remote` into
/// `dest`. a nonzero `offset` resumes a partial transfer: bytes before the
/// offset are kept and the remainder is appended. implementations that
/// cannot resume must restart from zero and overwrite. returns the final
/// byte length of `dest`.
///
/// callers must never trust resumed bytes by size alone; the completed
/// file is checksum-verified before use.
pub trait Transport: Sync {
    fn fetch(&self, remote: &str, dest: &Path, offset: u64) -> Result<u64>;
}

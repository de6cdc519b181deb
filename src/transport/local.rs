//! local mirror transport

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, IoResultExt, Result};
use crate::transport::Transport;

/// transport reading from a depot mirrored on a local filesystem
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Transport for LocalTransport {
    fn fetch(&self, remote: &str, dest: &Path, offset: u64) -> Result<u64> {
        let src_path = self.root.join(remote);
        let mut src = File::open(&src_path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::RemoteNotFound(remote.to_string())
            } else {
                Error::Io {
                    path: src_path.clone(),
                    source: e,
                }
            }
        })?;
        let src_len = src.metadata().with_path(&src_path)?.len();

        // an offset past the source makes no sense; restart from zero
        let offset = if offset > src_len { 0 } else { offset };
        if offset > 0 {
            debug!(remote, offset, "resuming transfer");
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_path(parent)?;
        }
        let mut dst = OpenOptions::new()
            .create(true)
            .write(true)
            .open(dest)
            .with_path(dest)?;
        dst.set_len(offset).with_path(dest)?;
        dst.seek(SeekFrom::Start(offset)).with_path(dest)?;
        src.seek(SeekFrom::Start(offset)).with_path(&src_path)?;

        io::copy(&mut src, &mut dst).with_path(dest)?;
        dst.sync_all().with_path(dest)?;
        Ok(src_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fetch_full() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("mirror");
        fs::create_dir_all(root.join("releases/r1")).unwrap();
        fs::write(root.join("releases/r1/a.dat"), b"payload bytes").unwrap();

        let transport = LocalTransport::new(&root);
        let dest = dir.path().join("staging/a.dat");
        let len = transport.fetch("releases/r1/a.dat", &dest, 0).unwrap();

        assert_eq!(len, 13);
        assert_eq!(fs::read(&dest).unwrap(), b"payload bytes");
    }

    #[test]
    fn test_fetch_resumes_from_offset() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("mirror");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("big.bin"), b"0123456789").unwrap();

        let transport = LocalTransport::new(&root);
        let dest = dir.path().join("big.bin");

        // simulate an interrupted transfer: first half already present
        fs::write(&dest, b"01234").unwrap();
        let len = transport.fetch("big.bin", &dest, 5).unwrap();

        assert_eq!(len, 10);
        assert_eq!(fs::read(&dest).unwrap(), b"0123456789");
    }

    #[test]
    fn test_fetch_offset_past_source_restarts() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("mirror");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("small.bin"), b"abc").unwrap();

        let transport = LocalTransport::new(&root);
        let dest = dir.path().join("small.bin");
        fs::write(&dest, b"stale local bytes longer than source").unwrap();

        transport.fetch("small.bin", &dest, 36).unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"abc");
    }

    #[test]
    fn test_fetch_missing_remote() {
        let dir = tempdir().unwrap();
        let transport = LocalTransport::new(dir.path());
        let dest = dir.path().join("out");

        let result = transport.fetch("releases/r1/missing.dat", &dest, 0);
        assert!(matches!(result, Err(Error::RemoteNotFound(_))));
    }
}

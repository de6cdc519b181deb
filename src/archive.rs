//! compressed companions
//!
//! any file's downloadable form is the file with the archive suffix
//! appended, holding a whole-file zstd stream.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, Result};

/// suffix appended to a filename for its compressed companion
pub const ARCHIVE_SUFFIX: &str = ".zst";

/// compression level for archive companions
const LEVEL: i32 = 19;

/// path of the compressed companion belonging to `path`
pub fn archive_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(ARCHIVE_SUFFIX);
    PathBuf::from(name)
}

/// compress `src` into `dst`, returning the compressed size
pub fn compress_file(src: &Path, dst: &Path) -> Result<u64> {
    let reader = BufReader::new(File::open(src).with_path(src)?);
    let mut writer = BufWriter::new(File::create(dst).with_path(dst)?);
    zstd::stream::copy_encode(reader, &mut writer, LEVEL).with_path(dst)?;
    let file = writer.into_inner().map_err(|e| crate::Error::Io {
        path: dst.to_path_buf(),
        source: e.into_error(),
    })?;
    file.sync_all().with_path(dst)?;
    Ok(fs::metadata(dst).with_path(dst)?.len())
}

/// decompress `src` into `dst`, returning the decompressed size
pub fn decompress_file(src: &Path, dst: &Path) -> Result<u64> {
    let reader = BufReader::new(File::open(src).with_path(src)?);
    let mut writer = BufWriter::new(File::create(dst).with_path(dst)?);
    zstd::stream::copy_decode(reader, &mut writer).with_path(src)?;
    let file = writer.into_inner().map_err(|e| crate::Error::Io {
        path: dst.to_path_buf(),
        source: e.into_error(),
    })?;
    file.sync_all().with_path(dst)?;
    Ok(fs::metadata(dst).with_path(dst)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_archive_path() {
        assert_eq!(
            archive_path(Path::new("dir/map.bin")),
            PathBuf::from("dir/map.bin.zst")
        );
    }

    #[test]
    fn test_compress_decompress_roundtrip() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("data.bin");
        let arch = dir.path().join("data.bin.zst");
        let back = dir.path().join("restored.bin");

        let content = b"compressible compressible compressible".repeat(100);
        fs::write(&src, &content).unwrap();

        let compressed_size = compress_file(&src, &arch).unwrap();
        assert_eq!(compressed_size, fs::metadata(&arch).unwrap().len());
        assert!(compressed_size < content.len() as u64);

        let restored_size = decompress_file(&arch, &back).unwrap();
        assert_eq!(restored_size, content.len() as u64);
        assert_eq!(fs::read(&back).unwrap(), content);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("junk.zst");
        let dst = dir.path().join("out.bin");
        fs::write(&src, b"this is not a zstd stream").unwrap();

        assert!(decompress_file(&src, &dst).is_err());
    }
}

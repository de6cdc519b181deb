use std::fs;
use std::path::{Path, PathBuf};

use crate::catalog::Catalog;
use crate::error::{Error, Result};

/// file name of the serialized catalog document at the depot root
pub const CATALOG_NAME: &str = "catalog";

/// serialize the catalog to CBOR, compress, and write atomically
///
/// the document is written as a single unit; partial writes are never
/// visible because the bytes land in a temporary sibling first.
pub fn save_catalog(catalog: &Catalog, path: &Path) -> Result<()> {
    let mut cbor = Vec::new();
    ciborium::into_writer(catalog, &mut cbor)?;

    let compressed = zstd::encode_all(&cbor[..], 3).map_err(|e| Error::Io {
        path: PathBuf::from("<zstd>"),
        source: e,
    })?;

    crate::fs::write_atomic(path, &compressed)
}

/// load a catalog document written by [`save_catalog`]
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let compressed = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::CatalogNotFound(path.to_path_buf())
        } else {
            Error::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    let cbor = zstd::decode_all(&compressed[..]).map_err(|e| Error::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let catalog: Catalog = ciborium::from_reader(&cbor[..])?;
    Ok(catalog)
}

//! shardsync - incremental binary-asset updater
//!
//! distributes updates to a large tree of binary game-asset files from a
//! depot to clients sitting at arbitrary prior versions, transferring
//! binary diffs instead of whole files wherever a patch chain exists.
//!
//! # Core concepts
//!
//! - **Catalog**: the depot-authoritative record of every file's version
//!   history, checksums and patch/archive sizes (CBOR + zstd document)
//! - **Chain**: the ordered versions whose consecutive patches transform a
//!   file at a known checksum into the latest version
//! - **Depot**: the server storage root (`releases/`, `originals/`,
//!   `patches/`) the builder maintains
//! - **Staging**: temp-directory home of every not-yet-verified byte; live
//!   paths only ever change through checksum-verified atomic renames
//!
//! # Example usage
//!
//! ```no_run
//! use shardsync::{ops, Config, Depot};
//! use shardsync::ops::{CancelToken, SessionOptions};
//! use shardsync::transport::LocalTransport;
//! use std::path::Path;
//!
//! // server side: turn a release tree into catalog + patches + archives
//! let depot = Depot::open(Path::new("/srv/depot")).unwrap();
//! ops::build(&depot, "game assets").unwrap();
//!
//! // client side: one full sync session
//! let config = Config::load(Path::new("shardsync.toml")).unwrap();
//! let transport = LocalTransport::new(&config.remote);
//! let outcome = ops::sync(
//!     &config,
//!     &transport,
//!     &SessionOptions::default(),
//!     &CancelToken::new(),
//! )
//! .unwrap();
//! println!("{:?}", outcome);
//! ```

mod archive;
mod checksum;
mod config;
mod depot;
mod error;
mod fs;
mod progress;

pub mod catalog;
pub mod ops;
pub mod patch;
pub mod transport;

pub use archive::{archive_path, compress_file, decompress_file, ARCHIVE_SUFFIX};
pub use checksum::{cached_checksum, sidecar_path, Checksum, CHECKSUM_SUFFIX};
pub use config::Config;
pub use depot::Depot;
pub use error::{Error, IoResultExt, Result};
pub use progress::{Progress, DOWNLOAD_WEIGHT, PATCH_WEIGHT, UNPACK_WEIGHT};

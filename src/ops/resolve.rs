//! chain resolution: which patches take a local file to the latest version

use crate::catalog::{FileRecord, VersionRecord};
use crate::checksum::Checksum;

/// outcome of resolving a file against its catalog record
///
/// these are ordinary, expected outcomes. `NoChain` routes the file to a
/// full download; it is not an error.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// local bytes already match the latest version
    UpToDate,
    /// apply the patch between each consecutive pair, in order; the last
    /// element is always the latest version
    Chain(Vec<VersionRecord>),
    /// no patch path exists from the local bytes
    NoChain,
}

/// resolve the cheapest patch path from the local checksum to latest
///
/// successive versions are searched first: a match yields the chain from
/// the matched version through every later version, none skipped. failing
/// that, originals are searched in version-name order, and a match yields
/// the two-element chain using the precomputed original-to-latest patch.
/// an absent file (`current` = None) never matches anything.
pub fn resolve(file: &FileRecord, current: Option<&Checksum>) -> Resolution {
    let Some(latest) = file.latest() else {
        return Resolution::NoChain;
    };
    let Some(current) = current else {
        return Resolution::NoChain;
    };
    if *current == latest.checksum {
        return Resolution::UpToDate;
    }

    let successive = file.successive();
    if let Some(start) = successive.iter().position(|v| v.checksum == *current) {
        return Resolution::Chain(successive[start..].to_vec());
    }

    if let Some(original) = file.originals().iter().find(|v| v.checksum == *current) {
        return Resolution::Chain(vec![original.clone(), latest.clone()]);
    }

    Resolution::NoChain
}

//! high-level operations: building the depot and synchronizing clients

mod build;
mod execute;
mod plan;
mod resolve;
mod sync;

pub use build::{build, read_pack, BuildReport};
pub use execute::{execute, CancelToken, SyncReport};
pub use plan::{plan, DownloadItem, PatchItem, SyncPlan};
pub use resolve::{resolve, Resolution};
pub use sync::{sync, SessionOptions, SessionOutcome};

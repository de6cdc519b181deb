//! one client synchronization session
//!
//! fetches the catalog document, short-circuits when nothing changed since
//! the last clean session, otherwise plans and executes. session state
//! (staged downloads, the previous catalog, the working marker) lives in
//! the configured temp directory.

use std::fs;

use tracing::info;

use crate::catalog::{load_catalog, CATALOG_NAME};
use crate::checksum::Checksum;
use crate::config::Config;
use crate::error::{IoResultExt, Result};
use crate::ops::execute::{execute, fetch_verified, CancelToken, SyncReport};
use crate::ops::plan::{plan, SyncPlan};
use crate::progress::Progress;
use crate::transport::Transport;

/// marker created at session start and removed only after a problem-free
/// finish; while present, the unchanged-catalog short-circuit is disabled
const WORKING_MARKER: &str = "working";

#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    /// plan and report without touching the live tree
    pub pretend: bool,
    /// examine everything even when the catalog is unchanged
    pub force_check: bool,
}

/// how a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// catalog unchanged since the last clean session; nothing examined
    Unchanged,
    /// pretend mode: the plan that would have run
    Planned(SyncPlan),
    /// executed; per-file results in the report
    Completed { plan: SyncPlan, report: SyncReport },
}

/// run a whole client session against the configured remote
pub fn sync(
    config: &Config,
    transport: &dyn Transport,
    options: &SessionOptions,
    cancel: &CancelToken,
) -> Result<SessionOutcome> {
    fs::create_dir_all(&config.temp_dir).with_path(&config.temp_dir)?;

    // the digest sidecar is tiny; always fetch it fresh
    let sum_rel = format!("{}{}", CATALOG_NAME, crate::checksum::CHECKSUM_SUFFIX);
    let sum_staged = config.temp_dir.join(&sum_rel);
    fs::remove_file(&sum_staged).ok();
    transport.fetch(&sum_rel, &sum_staged, 0)?;
    let text = fs::read_to_string(&sum_staged).with_path(&sum_staged)?;
    let expected = Checksum::from_hex(text.trim())?;

    let catalog_staged = config.temp_dir.join(CATALOG_NAME);
    fetch_verified(transport, cancel, CATALOG_NAME, &catalog_staged, Some(&expected))?;

    let last_catalog = catalog_staged.with_extension("last");
    let working = config.temp_dir.join(WORKING_MARKER);
    if !options.force_check && !working.exists() && last_catalog.is_file() {
        if Checksum::of_file(&last_catalog)? == expected {
            info!("catalog unchanged since last session");
            return Ok(SessionOutcome::Unchanged);
        }
    }

    let catalog = load_catalog(&catalog_staged)?;
    info!(catalog = %catalog.name, latest = %catalog.latest_release, files = catalog.len(), "catalog loaded");

    let session_plan = plan(&catalog, &config.live_dir)?;
    if options.pretend {
        return Ok(SessionOutcome::Planned(session_plan));
    }

    fs::write(&working, b"").with_path(&working)?;
    let progress = Progress::new(session_plan.total_work());
    let report = execute(&session_plan, config, transport, cancel, &progress)?;

    if report.is_clean() {
        // remember this catalog for the next session's short-circuit
        fs::rename(&catalog_staged, &last_catalog).with_path(&last_catalog)?;
        fs::remove_file(&working).with_path(&working)?;
    }

    Ok(SessionOutcome::Completed {
        plan: session_plan,
        report,
    })
}

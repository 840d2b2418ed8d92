use crate::api::{InPageExecutor, RequestExecutor};
use crate::browser::BrowserSession;
use crate::catalog::fetch_catalog;
use crate::config::ExportConfig;
use crate::model::SessionSummary;
use crate::store::{self, SyncState};
use crate::sync::{self, SyncDecision, SyncObserver, SyncReport};
use eyre::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// The main entry point for the export.
/// Loads the previous export, logs in through the browser, syncs, writes.
pub fn execute(config: &ExportConfig) -> Result<()> {
    let cache = store::load_sync_state(&config.output);

    let session = BrowserSession::start(&config.browser)?;
    session.open(&config.base_url)?;
    session.wait_for_login(&config.ready_selector, config.login_timeout)?;

    let mut executor = InPageExecutor::new(&session, &session);
    let report = run_sync(&mut executor, &cache, &config.output, &ProgressObserver::new())?;

    println!(
        "Data saved for {} sessions ({} cached, {} fetched, {} stale, {} skipped).",
        report.records.len(),
        report.cache_hits,
        report.fetched + report.refreshed,
        report.stale_fallbacks,
        report.skipped,
    );
    Ok(())
}

/// Fetch the catalog, sync every session against `cache` and write the
/// result to `output`.
///
/// A catalog failure returns before anything is written.
pub fn run_sync<E>(
    executor: &mut E,
    cache: &SyncState,
    output: &Path,
    observer: &dyn SyncObserver,
) -> Result<SyncReport>
where
    E: RequestExecutor + ?Sized,
{
    let catalog = fetch_catalog(executor).wrap_err("Failed to fetch the chat session list")?;
    println!("Found {} chat sessions. Fetching messages...", catalog.len());

    let report = sync::sync_sessions(executor, &catalog, cache, observer);

    store::save_output(output, &report.records)
        .wrap_err_with(|| format!("Failed to save {}", output.display()))?;
    Ok(report)
}

/// Progress bar over the catalog; decisions are logged above it.
pub struct ProgressObserver {
    pb: ProgressBar,
}

impl ProgressObserver {
    pub fn new() -> Self {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
        );
        Self { pb }
    }

    /// No bar drawn; decisions are still logged.
    pub fn hidden() -> Self {
        Self {
            pb: ProgressBar::hidden(),
        }
    }
}

impl Default for ProgressObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncObserver for ProgressObserver {
    fn on_start(&self, total: usize) {
        self.pb.set_length(total as u64);
    }

    fn on_decision(
        &self,
        position: usize,
        total: usize,
        summary: &SessionSummary,
        decision: &SyncDecision,
    ) {
        self.pb
            .suspend(|| sync::log_decision(position, total, summary, decision));
        self.pb.inc(1);
    }

    fn on_finish(&self) {
        self.pb.finish_and_clear();
    }
}

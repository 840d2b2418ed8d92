//! Incremental sync: decide per catalog entry whether the cached record is
//! still current or the session must be downloaded again.

use crate::api::{ApiError, HISTORY_MESSAGES_PATH, RequestExecutor};
use crate::model::{SessionRecord, SessionSummary};
use crate::store::SyncState;

/// What happened to one catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
    /// Entry had no id; not exported.
    MissingId,
    /// Cached record is at least as new as the server's; reused as is.
    CacheHit,
    /// Not cached before; downloaded.
    Fetched,
    /// Cached record was older than the server's; downloaded again.
    Refreshed,
    /// Download failed; the older cached record is kept.
    StaleFallback(ApiError),
    /// Download failed and nothing was cached; not exported this run.
    Skipped(ApiError),
}

impl SyncDecision {
    pub fn label(&self) -> &'static str {
        match self {
            SyncDecision::MissingId => "missing_id",
            SyncDecision::CacheHit => "cache_hit",
            SyncDecision::Fetched => "fetched",
            SyncDecision::Refreshed => "refreshed",
            SyncDecision::StaleFallback(_) => "stale_fallback",
            SyncDecision::Skipped(_) => "skipped",
        }
    }
}

/// Receives every decision as it is made.
pub trait SyncObserver {
    fn on_start(&self, _total: usize) {}

    /// `position` is 1-based within a catalog of `total` entries.
    fn on_decision(
        &self,
        position: usize,
        total: usize,
        summary: &SessionSummary,
        decision: &SyncDecision,
    );

    fn on_finish(&self) {}
}

/// Emit the decision as a log event.
pub fn log_decision(position: usize, total: usize, summary: &SessionSummary, decision: &SyncDecision) {
    let session = summary.id().unwrap_or("<none>");
    let action = decision.label();
    match decision {
        SyncDecision::MissingId => {
            tracing::debug!(position, total, action, "catalog entry has no id, ignoring")
        }
        SyncDecision::CacheHit | SyncDecision::Fetched | SyncDecision::Refreshed => {
            tracing::info!(position, total, session, action, "session synced")
        }
        SyncDecision::StaleFallback(e) => {
            tracing::warn!(position, total, session, action, error = %e, "fetch failed, keeping cached copy")
        }
        SyncDecision::Skipped(e) => {
            tracing::warn!(position, total, session, action, error = %e, "fetch failed, session left out of this export")
        }
    }
}

/// The merged output plus how it was assembled.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub records: Vec<SessionRecord>,
    pub cache_hits: usize,
    pub fetched: usize,
    pub refreshed: usize,
    pub stale_fallbacks: usize,
    pub skipped: usize,
    pub missing_id: usize,
}

impl SyncReport {
    fn record(&mut self, decision: &SyncDecision) {
        match decision {
            SyncDecision::MissingId => self.missing_id += 1,
            SyncDecision::CacheHit => self.cache_hits += 1,
            SyncDecision::Fetched => self.fetched += 1,
            SyncDecision::Refreshed => self.refreshed += 1,
            SyncDecision::StaleFallback(_) => self.stale_fallbacks += 1,
            SyncDecision::Skipped(_) => self.skipped += 1,
        }
    }
}

/// `true` when the cached copy is provably current: both timestamps are
/// present and the server's is not newer.
fn is_current(summary: &SessionSummary, cached: &SessionRecord) -> bool {
    match (summary.updated_at, cached.updated_at()) {
        (Some(server), Some(local)) => server <= local,
        _ => false,
    }
}

fn fetch_record<E>(executor: &mut E, session_id: &str) -> Result<SessionRecord, ApiError>
where
    E: RequestExecutor + ?Sized,
{
    let biz = executor.get(
        HISTORY_MESSAGES_PATH,
        &[("chat_session_id", session_id.to_string())],
    )?;
    let record = SessionRecord::new(biz);
    match record.session_id() {
        Some(id) if id == session_id => Ok(record),
        Some(other) => Err(ApiError::Malformed(format!(
            "asked for session {session_id}, got {other}"
        ))),
        None => Err(ApiError::Malformed("response has no chat_session.id".into())),
    }
}

/// Build the output set for `catalog`, one record per entry with an id,
/// in catalog order.
///
/// Fetch failures never abort the run: a cached record, even an outdated
/// one, is kept in its place; without one the session is left out.
pub fn sync_sessions<E>(
    executor: &mut E,
    catalog: &[SessionSummary],
    cache: &SyncState,
    observer: &dyn SyncObserver,
) -> SyncReport
where
    E: RequestExecutor + ?Sized,
{
    let total = catalog.len();
    let mut report = SyncReport::default();
    observer.on_start(total);

    for (idx, summary) in catalog.iter().enumerate() {
        let (decision, record) = sync_one(executor, summary, cache);
        observer.on_decision(idx + 1, total, summary, &decision);
        report.record(&decision);
        if let Some(record) = record {
            report.records.push(record);
        }
    }

    observer.on_finish();
    report
}

fn sync_one<E>(
    executor: &mut E,
    summary: &SessionSummary,
    cache: &SyncState,
) -> (SyncDecision, Option<SessionRecord>)
where
    E: RequestExecutor + ?Sized,
{
    let Some(id) = summary.id() else {
        return (SyncDecision::MissingId, None);
    };
    let cached = cache.get(id);

    if let Some(cached) = cached
        && is_current(summary, cached)
    {
        return (SyncDecision::CacheHit, Some(cached.clone()));
    }

    match (fetch_record(executor, id), cached) {
        (Ok(fresh), None) => (SyncDecision::Fetched, Some(fresh)),
        (Ok(fresh), Some(_)) => (SyncDecision::Refreshed, Some(fresh)),
        (Err(e), Some(stale)) => (SyncDecision::StaleFallback(e), Some(stale.clone())),
        (Err(e), None) => (SyncDecision::Skipped(e), None),
    }
}

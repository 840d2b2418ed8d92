use crate::api::{ApiError, FETCH_PAGE_PATH, RequestExecutor};
use crate::model::{CatalogPage, SessionSummary};

/// Walk `chat_session/fetch_page` until the server reports no more pages.
///
/// Each follow-up request uses the `seq_id` of the last summary received as
/// `before_seq_id`. A page that claims `has_more` but is empty (or whose last
/// entry has no cursor) ends the walk. Any executor error aborts the whole
/// fetch; a partial catalog is never returned.
pub fn fetch_catalog<E>(executor: &mut E) -> Result<Vec<SessionSummary>, ApiError>
where
    E: RequestExecutor + ?Sized,
{
    let mut summaries = Vec::new();
    let mut cursor: Option<i64> = None;
    let mut pages = 0usize;

    loop {
        let query: Vec<(&str, String)> = cursor
            .map(|seq| vec![("before_seq_id", seq.to_string())])
            .unwrap_or_default();

        let biz = executor.get(FETCH_PAGE_PATH, &query)?;
        let page: CatalogPage = serde_json::from_value(biz)
            .map_err(|e| ApiError::Malformed(format!("catalog page: {e}")))?;
        pages += 1;

        let received = page.chat_sessions.len();
        let last_seq = page.chat_sessions.last().and_then(|s| s.seq_id);
        summaries.extend(page.chat_sessions);
        tracing::debug!(page = pages, received, has_more = page.has_more, "catalog page");

        if !page.has_more {
            break;
        }
        if received == 0 {
            tracing::warn!(page = pages, "server reported more sessions but sent an empty page; stopping");
            break;
        }
        match last_seq {
            Some(seq) => cursor = Some(seq),
            None => {
                tracing::warn!(page = pages, "last session on page has no seq_id; stopping");
                break;
            }
        }
    }

    Ok(summaries)
}

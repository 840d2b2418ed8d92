//! Authenticated requests against the host chat API.
//!
//! Requests are issued from inside the live browser page with `fetch`, so
//! cookies and any anti-bot state travel with them. The bearer token comes
//! from a [`CredentialSupplier`]; nothing here knows how it was obtained.

use serde_json::{Map, Value, json};
use thiserror::Error;
use url::form_urlencoded;

pub const FETCH_PAGE_PATH: &str = "/api/v0/chat_session/fetch_page";
pub const HISTORY_MESSAGES_PATH: &str = "/api/v0/chat/history_messages";

/// A failed API call. Carries the failure message instead of aborting, so
/// each caller decides whether it is fatal.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("no user token found in the page's local storage (is the session logged in?)")]
    MissingToken,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("script execution failed: {0}")]
    Script(String),
}

/// Runs a script inside the active page and returns its resolved value.
///
/// Positional arguments are visible to the script as `arguments[i]`.
pub trait ScriptRunner {
    fn run_script(&self, script: &str, args: Vec<Value>) -> Result<Value, ApiError>;
}

/// Source of the bearer token attached to every API request.
pub trait CredentialSupplier {
    fn bearer_token(&self) -> Result<String, ApiError>;
}

/// Issues one logical GET against the host API.
///
/// Returns the envelope's `data.biz_data` on success.
pub trait RequestExecutor {
    fn get(&mut self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError>;
}

const FETCH_SCRIPT: &str = r#"
const [url, headers] = arguments;
return fetch(url, { method: 'GET', credentials: 'include', headers })
    .then(res => res.json().then(body => ({ status: res.status, body })))
    .catch(err => ({ error: String((err && err.message) || err) }));
"#;

/// Builds the query-string suffixed path. An empty query leaves `path` as is.
pub fn request_url(path: &str, query: &[(&str, String)]) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    format!("{path}?{encoded}")
}

/// Headers shared by every API call.
pub fn request_headers(token: &str) -> Map<String, Value> {
    let mut headers = Map::new();
    headers.insert("Authorization".into(), json!(format!("Bearer {token}")));
    headers.insert("Accept".into(), json!("application/json, text/plain, */*"));
    headers.insert("x-client-platform".into(), json!("web"));
    headers.insert("x-client-locale".into(), json!("en_US"));
    headers
}

/// Turn the script's `{status, body}` / `{error}` result into the payload.
fn unwrap_response(raw: Value) -> Result<Value, ApiError> {
    if let Some(err) = raw.get("error") {
        let message = err.as_str().map(str::to_owned).unwrap_or_else(|| err.to_string());
        return Err(ApiError::Request(message));
    }

    let status = match raw.get("status") {
        None => 200,
        Some(status) => status
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .ok_or_else(|| ApiError::Malformed(format!("invalid HTTP status {status}")))?,
    };
    let Some(mut body) = raw.get("body").cloned() else {
        return Err(ApiError::Malformed("response has no body".into()));
    };

    let message = body
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if status >= 400 {
        return Err(ApiError::Status { status, message });
    }

    if let Some(code) = body.get("code").and_then(Value::as_i64)
        && code != 0
    {
        return Err(ApiError::Api { code, message });
    }

    match body.pointer_mut("/data/biz_data") {
        Some(biz) if !biz.is_null() => Ok(biz.take()),
        _ => Err(ApiError::Malformed("missing data.biz_data".into())),
    }
}

/// [`RequestExecutor`] that fetches from inside a page.
pub struct InPageExecutor<'a, R: ?Sized, C: ?Sized> {
    runner: &'a R,
    credentials: &'a C,
}

impl<'a, R, C> InPageExecutor<'a, R, C>
where
    R: ScriptRunner + ?Sized,
    C: CredentialSupplier + ?Sized,
{
    pub fn new(runner: &'a R, credentials: &'a C) -> Self {
        Self {
            runner,
            credentials,
        }
    }
}

impl<R, C> RequestExecutor for InPageExecutor<'_, R, C>
where
    R: ScriptRunner + ?Sized,
    C: CredentialSupplier + ?Sized,
{
    fn get(&mut self, path: &str, query: &[(&str, String)]) -> Result<Value, ApiError> {
        let token = self.credentials.bearer_token()?;
        let url = request_url(path, query);
        tracing::debug!(%url, "GET");
        let raw = self
            .runner
            .run_script(FETCH_SCRIPT, vec![json!(url), Value::Object(request_headers(&token))])?;
        unwrap_response(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FakePage {
        response: Value,
        calls: RefCell<Vec<Vec<Value>>>,
    }

    impl FakePage {
        fn returning(response: Value) -> Self {
            Self {
                response,
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl ScriptRunner for FakePage {
        fn run_script(&self, _script: &str, args: Vec<Value>) -> Result<Value, ApiError> {
            self.calls.borrow_mut().push(args);
            Ok(self.response.clone())
        }
    }

    struct Token(Option<&'static str>);

    impl CredentialSupplier for Token {
        fn bearer_token(&self) -> Result<String, ApiError> {
            self.0.map(str::to_owned).ok_or(ApiError::MissingToken)
        }
    }

    #[test]
    fn url_without_query_is_unchanged() {
        assert_eq!(request_url(FETCH_PAGE_PATH, &[]), FETCH_PAGE_PATH);
    }

    #[test]
    fn url_query_is_encoded() {
        let url = request_url(HISTORY_MESSAGES_PATH, &[("chat_session_id", "a b&c".into())]);
        assert_eq!(url, "/api/v0/chat/history_messages?chat_session_id=a+b%26c");
    }

    #[test]
    fn successful_call_returns_biz_data_and_sends_token() {
        let page = FakePage::returning(json!({
            "status": 200,
            "body": { "code": 0, "msg": "", "data": { "biz_code": 0, "biz_data": { "has_more": false } } }
        }));
        let token = Token(Some("secret"));
        let mut exec = InPageExecutor::new(&page, &token);

        let data = exec
            .get(FETCH_PAGE_PATH, &[("before_seq_id", "7".into())])
            .unwrap();
        assert_eq!(data, json!({ "has_more": false }));

        let calls = page.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0], json!("/api/v0/chat_session/fetch_page?before_seq_id=7"));
        assert_eq!(calls[0][1]["Authorization"], json!("Bearer secret"));
    }

    #[test]
    fn missing_token_fails_before_any_request() {
        let page = FakePage::returning(json!({}));
        let token = Token(None);
        let mut exec = InPageExecutor::new(&page, &token);

        assert_eq!(exec.get(FETCH_PAGE_PATH, &[]), Err(ApiError::MissingToken));
        assert!(page.calls.borrow().is_empty());
    }

    #[test]
    fn in_page_error_becomes_request_error() {
        let page = FakePage::returning(json!({ "error": "Failed to fetch" }));
        let token = Token(Some("t"));
        let mut exec = InPageExecutor::new(&page, &token);

        assert_eq!(
            exec.get(FETCH_PAGE_PATH, &[]),
            Err(ApiError::Request("Failed to fetch".into()))
        );
    }

    #[test]
    fn http_and_api_failures_are_classified() {
        let unauthorized = json!({ "status": 401, "body": { "code": 40003, "msg": "token invalid" } });
        assert_eq!(
            unwrap_response(unauthorized),
            Err(ApiError::Status {
                status: 401,
                message: "token invalid".into()
            })
        );

        let rejected = json!({ "status": 200, "body": { "code": 40002, "msg": "rate limited", "data": null } });
        assert_eq!(
            unwrap_response(rejected),
            Err(ApiError::Api {
                code: 40002,
                message: "rate limited".into()
            })
        );
    }

    #[test]
    fn out_of_range_status_is_malformed() {
        let raw = json!({ "status": 65736, "body": { "code": 0, "data": { "biz_data": {} } } });
        assert!(matches!(unwrap_response(raw), Err(ApiError::Malformed(_))));

        let raw = json!({ "status": "200", "body": { "code": 0, "data": { "biz_data": {} } } });
        assert!(matches!(unwrap_response(raw), Err(ApiError::Malformed(_))));
    }

    #[test]
    fn missing_biz_data_is_malformed() {
        let raw = json!({ "status": 200, "body": { "code": 0, "data": {} } });
        assert!(matches!(unwrap_response(raw), Err(ApiError::Malformed(_))));

        let raw = json!({ "status": 200, "body": { "data": { "biz_data": null } } });
        assert!(matches!(unwrap_response(raw), Err(ApiError::Malformed(_))));
    }
}

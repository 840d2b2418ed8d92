//! Data shapes exchanged with the DeepSeek web API and persisted to disk.
//!
//! Session summaries are parsed into typed structs because the sync logic
//! reads every field. Full session records are kept as raw JSON: everything
//! besides `chat_session.id` and `chat_session.updated_at` is passed through
//! untouched, so a reused record is written back exactly as it was read.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One catalog entry returned by `chat_session/fetch_page`.
///
/// The server sends many more fields (title, pinned, model type, ...); only
/// the ones the sync needs are kept.
///
/// Deserialization never fails: a field of the wrong type, or an entry that is
/// not an object at all, reads as `None`, so one odd entry cannot sink a page.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    pub id: Option<String>,
    /// Pagination cursor. Descending across the catalog.
    pub seq_id: Option<i64>,
    pub updated_at: Option<f64>,
}

impl From<&Value> for SessionSummary {
    fn from(value: &Value) -> Self {
        Self {
            id: value.get("id").and_then(Value::as_str).map(str::to_owned),
            seq_id: value.get("seq_id").and_then(Value::as_i64),
            updated_at: value.get("updated_at").and_then(Value::as_f64),
        }
    }
}

impl<'de> Deserialize<'de> for SessionSummary {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from(&value))
    }
}

impl SessionSummary {
    /// The session id, treating an empty string the same as a missing one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }
}

/// The `biz_data` payload of one catalog page.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogPage {
    #[serde(default)]
    pub chat_sessions: Vec<SessionSummary>,
    #[serde(default)]
    pub has_more: bool,
}

/// A fully exported session: the `biz_data` of `chat/history_messages`.
///
/// Must carry `chat_session.id`; everything else is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRecord(Value);

impl SessionRecord {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn session_id(&self) -> Option<&str> {
        self.0
            .pointer("/chat_session/id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// `chat_session.updated_at`, compared as an opaque number.
    pub fn updated_at(&self) -> Option<f64> {
        self.0
            .pointer("/chat_session/updated_at")
            .and_then(Value::as_f64)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

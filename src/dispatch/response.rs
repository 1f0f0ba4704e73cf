//! Webhook response normalization and stage routing
//!
//! The webhook answers either with a bare `{stage, message}` object or with a
//! one-element array wrapping it as `[{response: {body: {stage, message}}}]`.
//! Both shapes collapse into [`StagedBody`] here so nothing downstream sees
//! the difference.

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::Phrases;
use crate::error::DispatchError;

/// Name of the optional date field in a record
const DATE_FIELD: &str = "DateStr";

/// How the payload should be presented
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Speak `message[0].json.output`
    Text,
    /// Chart the records
    Graph,
    /// Tabulate the records
    Table,
    /// Chart and tabulate the same records
    Both,
    /// Missing, malformed or unrecognized stage
    Unknown(Option<String>),
}

impl Stage {
    /// Parse a stage tag (case-sensitive)
    #[must_use]
    pub fn parse(tag: Option<&str>) -> Self {
        match tag {
            Some("text") => Self::Text,
            Some("graph") => Self::Graph,
            Some("table") => Self::Table,
            // The workflow has been seen emitting a stray backtick
            Some("both" | "`both") => Self::Both,
            other => Self::Unknown(other.map(ToString::to_string)),
        }
    }
}

/// One entry of the `message` sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Arbitrary fields produced by the workflow
    #[serde(default)]
    pub json: Option<Map<String, Value>>,
}

impl Record {
    /// Build a record from its `json` fields
    #[must_use]
    pub const fn new(json: Map<String, Value>) -> Self {
        Self { json: Some(json) }
    }

    /// Look up a field of `json`
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.json.as_ref()?.get(key)
    }

    /// The `output` text, if present
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.field("output")?.as_str()
    }

    /// Raw `DateStr` value
    #[must_use]
    pub fn date_str(&self) -> Option<&str> {
        self.field(DATE_FIELD)?.as_str()
    }

    /// `DateStr` parsed as a calendar date (`YYYY-MM-DD` or RFC 3339)
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        let raw = self.date_str()?.trim();
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|d| d.date_naive()))
    }

    /// Numeric series fields, skipping `DateStr`
    ///
    /// Numbers sent as strings are accepted.
    pub fn series(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.json
            .iter()
            .flat_map(Map::iter)
            .filter(|(key, _)| key.as_str() != DATE_FIELD)
            .filter_map(|(key, value)| {
                let number = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                }?;
                Some((key.as_str(), number))
            })
    }
}

/// Response body after unwrapping
#[derive(Debug, Clone, PartialEq)]
pub struct StagedBody {
    /// Presentation stage
    pub stage: Stage,
    /// Payload records
    pub message: Vec<Record>,
}

impl StagedBody {
    /// Normalize either accepted response shape
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the body is neither an object nor a non-empty array
    pub fn from_value(value: Value) -> Result<Self, DispatchError> {
        let body = match value {
            Value::Array(items) => {
                let first = items
                    .into_iter()
                    .next()
                    .ok_or_else(|| DispatchError::Malformed("empty response array".to_string()))?;
                unwrap_envelope(first)
            }
            Value::Object(_) => value,
            other => {
                return Err(DispatchError::Malformed(format!(
                    "expected object or array, got {}",
                    kind(&other)
                )));
            }
        };

        let stage = Stage::parse(body.get("stage").and_then(Value::as_str));
        let message = match body.get("message") {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| serde_json::from_value(item.clone()).unwrap_or_default())
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self { stage, message })
    }

    /// Route by stage into the reply the session acts on
    #[must_use]
    pub fn route(self, phrases: &Phrases) -> Reply {
        match self.stage {
            Stage::Text => Reply::Spoken(
                self.message
                    .first()
                    .and_then(Record::output)
                    .map_or_else(|| phrases.completed.clone(), ToString::to_string),
            ),
            Stage::Graph => Reply::Chart(self.message),
            Stage::Table => Reply::Table(self.message),
            Stage::Both => Reply::Both(self.message),
            Stage::Unknown(tag) => {
                tracing::debug!(stage = ?tag, "unrecognized stage, using fallback reply");
                Reply::Spoken(phrases.received.clone())
            }
        }
    }
}

/// Take `response.body` out of a wrapped element, or use the element as-is
fn unwrap_envelope(mut item: Value) -> Value {
    if let Some(body) = item.pointer_mut("/response/body") {
        return body.take();
    }
    item
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Routed outcome of a successful dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Speak this text
    Spoken(String),
    /// Chart data ready
    Chart(Vec<Record>),
    /// Table data ready
    Table(Vec<Record>),
    /// Chart and table from the same data
    Both(Vec<Record>),
}

impl Reply {
    /// What to say for this reply; structured results get a confirmation phrase
    #[must_use]
    pub fn speech<'a>(&'a self, phrases: &'a Phrases) -> &'a str {
        match self {
            Self::Spoken(text) => text,
            Self::Chart(_) => &phrases.chart,
            Self::Table(_) => &phrases.table,
            Self::Both(_) => &phrases.both,
        }
    }
}

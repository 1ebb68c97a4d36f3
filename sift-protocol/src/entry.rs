use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AttrValue;

/// The identifier of a distributed trace.
///
/// All spans of the same trace carry the same id. The id doubles as the seed
/// for deterministic sampling decisions, so its byte representation is part
/// of the stable surface of this type.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Creates a trace id from raw bits.
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the big-endian bytes of the trace id.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl From<Uuid> for TraceId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_simple())
    }
}

impl FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// The status of a finished span.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpanStatus {
    /// The default status, no explicit outcome recorded.
    #[default]
    Unset,
    /// The operation completed successfully.
    Ok,
    /// The operation failed.
    Error,
}

/// An error parsing a [`SpanStatus`] from its wire spelling.
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[error("invalid span status")]
pub struct ParseSpanStatusError;

impl FromStr for SpanStatus {
    type Err = ParseSpanStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UNSET" => Ok(SpanStatus::Unset),
            "OK" => Ok(SpanStatus::Ok),
            "ERROR" => Ok(SpanStatus::Error),
            _ => Err(ParseSpanStatusError),
        }
    }
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanStatus::Unset => write!(f, "UNSET"),
            SpanStatus::Ok => write!(f, "OK"),
            SpanStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// An ordered key/value list propagated alongside a trace.
///
/// Parsed from the `k1=v1,k2=v2` header format. Malformed pairs are skipped
/// during parsing, they do not fail the whole header.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceState(Vec<(String, String)>);

impl TraceState {
    /// Parses a trace state from its header representation.
    pub fn parse(raw: &str) -> Self {
        let entries = raw
            .split(',')
            .filter_map(|pair| {
                let (key, value) = pair.split_once('=')?;
                let key = key.trim();
                let value = value.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_owned(), value.to_owned()))
            })
            .collect();

        Self(entries)
    }

    /// Returns the value for the given key, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if the trace state has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single span of a distributed trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Span {
    /// The trace this span belongs to.
    pub trace_id: TraceId,
    /// The operation name.
    pub name: String,
    /// The span status.
    #[serde(default)]
    pub status: SpanStatus,
    /// Attributes attached to the span.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    /// The trace state propagated with the span, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_state: Option<TraceState>,
    /// The start timestamp of the span.
    pub start_time: DateTime<Utc>,
    /// The network address of the peer the span was received from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_addr: Option<String>,
}

/// A single log record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    /// The log message body.
    pub body: String,
    /// Attributes attached to the record.
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrValue>,
    /// The timestamp of the record.
    pub timestamp: DateTime<Utc>,
    /// The network address of the peer the record was received from, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_addr: Option<String>,
}

/// Uniform access to an entry flowing through the pipeline.
///
/// Every attachable entry kind exposes its attribute map, its timestamp and
/// the connection it arrived on through this trait. Stages that annotate
/// entries, such as resource metadata enrichment, are generic over `Entry`
/// and never inspect concrete entry types.
pub trait Entry {
    /// Returns the attribute value for the given key.
    fn attribute(&self, key: &str) -> Option<&AttrValue>;

    /// Sets an attribute, replacing an existing value for the same key.
    fn set_attribute(&mut self, key: &str, value: AttrValue);

    /// Returns the timestamp of the entry.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Returns the network address of the peer the entry was received from.
    fn peer_addr(&self) -> Option<&str> {
        None
    }
}

impl Entry for Span {
    fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    fn set_attribute(&mut self, key: &str, value: AttrValue) {
        self.attributes.insert(key.to_owned(), value);
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }
}

impl Entry for LogRecord {
    fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    fn set_attribute(&mut self, key: &str, value: AttrValue) {
        self.attributes.insert(key.to_owned(), value);
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }
}

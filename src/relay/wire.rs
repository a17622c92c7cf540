//! Stream entry shapes shared with the operator side.
//!
//! Both directions carry `{id, ts, msg}`: the anonymized ID, unix seconds and
//! the text. Outbound entries add `source`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;

use crate::error::ProtocolError;
use crate::identity::AnonymizedId;
use crate::store::StreamEntry;

pub const FIELD_ID: &str = "id";
pub const FIELD_TS: &str = "ts";
pub const FIELD_MSG: &str = "msg";
pub const FIELD_SOURCE: &str = "source";

/// Where an outbound entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSource {
    /// Text a correspondent wrote.
    Channel,
    /// A canned reply the relay sent.
    AutoResponse,
}

impl MessageSource {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageSource::Channel => "channel",
            MessageSource::AutoResponse => "autoresponse",
        }
    }
}

impl fmt::Display for MessageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{id, ts, msg}` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    pub id: AnonymizedId,
    /// Unix seconds.
    pub ts: i64,
    pub msg: String,
}

impl RelayMessage {
    pub fn new(id: AnonymizedId, ts: i64, msg: impl Into<String>) -> Self {
        Self {
            id,
            ts,
            msg: msg.into(),
        }
    }

    /// Stamp with the current time.
    pub fn now(id: AnonymizedId, msg: impl Into<String>) -> Self {
        Self::new(id, Utc::now().timestamp(), msg)
    }

    /// Outbound field map.
    pub fn to_fields(&self, source: MessageSource) -> BTreeMap<String, String> {
        BTreeMap::from([
            (FIELD_ID.to_string(), self.id.to_string()),
            (FIELD_TS.to_string(), self.ts.to_string()),
            (FIELD_MSG.to_string(), self.msg.clone()),
            (FIELD_SOURCE.to_string(), source.as_str().to_string()),
        ])
    }

    /// Parse an inbound command. Extra fields are ignored.
    pub fn from_entry(entry: &StreamEntry) -> Result<Self, ProtocolError> {
        let id = entry
            .field(FIELD_ID)
            .ok_or(ProtocolError::MissingField(FIELD_ID))?;
        let raw_ts = entry
            .field(FIELD_TS)
            .ok_or(ProtocolError::MissingField(FIELD_TS))?;
        let msg = entry
            .field(FIELD_MSG)
            .ok_or(ProtocolError::MissingField(FIELD_MSG))?;

        let ts = raw_ts
            .trim()
            .parse::<i64>()
            .map_err(|_| ProtocolError::InvalidTimestamp(raw_ts.to_string()))?;

        Ok(Self::new(AnonymizedId::new(id), ts, msg))
    }
}

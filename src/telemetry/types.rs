//! Record written for each received message

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::e220::frame::Rssi;
use crate::e220::payload::Message;

/// One line of the message log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageRecord {
    /// RFC 3339, UTC, millisecond precision
    pub timestamp: String,
    /// `dictionary`, `text` or `bytes`
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rssi_dbm: Option<i16>,
    pub payload: JsonValue,
}

impl MessageRecord {
    /// Record stamped with the current time
    pub fn new(message: &Message, rssi: Option<Rssi>) -> Self {
        Self::at(Utc::now(), message, rssi)
    }

    pub fn at(timestamp: DateTime<Utc>, message: &Message, rssi: Option<Rssi>) -> Self {
        let payload = match message {
            Message::Dictionary(dictionary) => serde_json::to_value(dictionary).unwrap_or(JsonValue::Null),
            Message::Text(text) => JsonValue::String(text.clone()),
            Message::Bytes(bytes) => JsonValue::from(bytes.clone()),
        };

        Self {
            timestamp: timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            kind: message.kind(),
            rssi_dbm: rssi.map(Rssi::dbm),
            payload,
        }
    }
}

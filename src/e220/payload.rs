//! # Payload Codec
//!
//! Self-describing encoding of key/value dictionaries carried inside a
//! transmission frame.
//!
//! Each entry is:
//!
//! ```text
//! [key length][key bytes...][type tag][value length][value bytes...]
//! ```
//!
//! Entries follow each other until the payload is exhausted; the frame length
//! already delimits the record. Lengths are one byte.
//!
//! | Tag | Type | Value bytes |
//! |-----|------|-------------|
//! | 0x01 | string | UTF-8 |
//! | 0x02 | integer | big-endian two's complement, 1 to 8 bytes |
//! | 0x03 | float | IEEE 754 double, big-endian |
//! | 0x04 | boolean | `0x00` or `0x01` |

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{LoraError, Result};

pub const TAG_STRING: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_FLOAT: u8 = 0x03;
pub const TAG_BOOLEAN: u8 = 0x04;

/// Longest key or value an entry can carry
pub const MAX_FIELD_LENGTH: usize = u8::MAX as usize;

/// Primitive value stored in a [`Dictionary`]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Boolean(b) => serializer.serialize_bool(*b),
        }
    }
}

/// Insertion-ordered mapping from string keys to primitive values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dictionary {
    entries: Vec<(String, Value)>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced key keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Dictionary {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dictionary = Dictionary::new();
        for (key, value) in iter {
            dictionary.insert(key, value);
        }
        dictionary
    }
}

impl std::ops::Index<&str> for Dictionary {
    type Output = Value;

    fn index(&self, key: &str) -> &Value {
        match self.get(key) {
            Some(value) => value,
            None => panic!("no entry for key {:?}", key),
        }
    }
}

impl Serialize for Dictionary {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Shortest big-endian two's complement encoding of `value`
fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let redundant = (bytes[start] == 0x00 && bytes[start + 1] & 0x80 == 0)
            || (bytes[start] == 0xFF && bytes[start + 1] & 0x80 != 0);
        if !redundant {
            break;
        }
        start += 1;
    }
    bytes[start..].to_vec()
}

fn decode_integer(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(LoraError::MalformedFrame(format!(
            "integer of {} bytes",
            bytes.len()
        )));
    }
    let fill = if bytes[0] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut full = [fill; 8];
    full[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(i64::from_be_bytes(full))
}

fn put_field(buf: &mut BytesMut, what: &str, bytes: &[u8]) -> Result<()> {
    if bytes.len() > MAX_FIELD_LENGTH {
        return Err(LoraError::InvalidArgument(format!(
            "{} of {} bytes exceeds {}",
            what,
            bytes.len(),
            MAX_FIELD_LENGTH
        )));
    }
    buf.put_u8(bytes.len() as u8);
    buf.put_slice(bytes);
    Ok(())
}

/// Serialize a dictionary into payload bytes
///
/// # Errors
///
/// Returns `InvalidArgument` if a key or value is longer than 255 bytes, or
/// a float is NaN or infinite
///
/// # Examples
///
/// ```
/// use lora_e220::e220::payload::{decode_dict, encode_dict, Dictionary};
///
/// let mut message = Dictionary::new();
/// message.insert("key1", "value1");
///
/// let bytes = encode_dict(&message)?;
/// assert_eq!(decode_dict(&bytes)?, message);
/// # Ok::<(), lora_e220::error::LoraError>(())
/// ```
pub fn encode_dict(dictionary: &Dictionary) -> Result<Vec<u8>> {
    let mut buf = BytesMut::new();

    for (key, value) in dictionary.iter() {
        put_field(&mut buf, "key", key.as_bytes())?;
        let (tag, bytes) = match value {
            Value::String(s) => (TAG_STRING, s.as_bytes().to_vec()),
            Value::Integer(i) => (TAG_INTEGER, encode_integer(*i)),
            Value::Float(f) if !f.is_finite() => {
                return Err(LoraError::InvalidArgument(format!("value for {:?} is not a finite float", key)))
            }
            Value::Float(f) => (TAG_FLOAT, f.to_be_bytes().to_vec()),
            Value::Boolean(b) => (TAG_BOOLEAN, vec![u8::from(*b)]),
        };
        buf.put_u8(tag);
        put_field(&mut buf, key, &bytes)?;
    }

    Ok(buf.to_vec())
}

fn take<'a>(buf: &mut &'a [u8], len: usize, what: &str) -> Result<&'a [u8]> {
    if buf.remaining() < len {
        return Err(LoraError::MalformedFrame(format!(
            "truncated {}: need {} bytes, {} left",
            what,
            len,
            buf.remaining()
        )));
    }
    let current: &'a [u8] = *buf;
    let (head, tail) = current.split_at(len);
    *buf = tail;
    Ok(head)
}

fn take_u8(buf: &mut &[u8], what: &str) -> Result<u8> {
    Ok(take(buf, 1, what)?[0])
}

fn utf8(bytes: &[u8], what: &str) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| LoraError::MalformedFrame(format!("{} is not valid UTF-8", what)))
}

/// Parse payload bytes back into a dictionary
///
/// # Errors
///
/// Returns `MalformedFrame` if the bytes are truncated, a type tag is unknown,
/// or a value does not fit its declared type
pub fn decode_dict(bytes: &[u8]) -> Result<Dictionary> {
    let mut buf = bytes;
    let mut dictionary = Dictionary::new();

    while buf.has_remaining() {
        let key_length = take_u8(&mut buf, "key length")? as usize;
        let key = utf8(take(&mut buf, key_length, "key")?, "key")?;
        let tag = take_u8(&mut buf, "type tag")?;
        let value_length = take_u8(&mut buf, "value length")? as usize;
        let raw = take(&mut buf, value_length, "value")?;

        let value = match tag {
            TAG_STRING => Value::String(utf8(raw, "string value")?),
            TAG_INTEGER => Value::Integer(decode_integer(raw)?),
            TAG_FLOAT => {
                let raw: [u8; 8] = raw
                    .try_into()
                    .map_err(|_| LoraError::MalformedFrame(format!("float of {} bytes", raw.len())))?;
                Value::Float(f64::from_be_bytes(raw))
            }
            TAG_BOOLEAN => match raw {
                [0x00] => Value::Boolean(false),
                [0x01] => Value::Boolean(true),
                _ => return Err(LoraError::MalformedFrame(format!("invalid boolean {:02X?}", raw))),
            },
            other => {
                return Err(LoraError::MalformedFrame(format!(
                    "unknown value type 0x{:02X} for key {:?}",
                    other, key
                )))
            }
        };
        dictionary.insert(key, value);
    }

    Ok(dictionary)
}

/// Logical unit handed to or received from a caller
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Bytes(Vec<u8>),
    Text(String),
    Dictionary(Dictionary),
}

impl Message {
    /// Payload bytes carried inside the transmission frame
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        match self {
            Message::Bytes(bytes) => Ok(bytes.clone()),
            Message::Text(text) => Ok(text.as_bytes().to_vec()),
            Message::Dictionary(dictionary) => encode_dict(dictionary),
        }
    }

    /// Best interpretation of a received payload: dictionary, then text,
    /// then raw bytes
    pub fn from_payload(bytes: Vec<u8>) -> Self {
        if !bytes.is_empty() {
            if let Ok(dictionary) = decode_dict(&bytes) {
                return Message::Dictionary(dictionary);
            }
        }
        match String::from_utf8(bytes) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Bytes(e.into_bytes()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Message::Bytes(_) => "bytes",
            Message::Text(_) => "text",
            Message::Dictionary(_) => "dictionary",
        }
    }
}

/// Interpret raw payload bytes as text
pub fn decode_text(bytes: &[u8]) -> Result<String> {
    utf8(bytes, "text payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dictionary {
        let mut dictionary = Dictionary::new();
        dictionary.insert("key1", "value1");
        dictionary.insert("count", 42);
        dictionary.insert("temp", -12.5);
        dictionary.insert("ok", true);
        dictionary
    }

    #[test]
    fn test_encode_single_string_entry() {
        let dictionary: Dictionary = [("key1", "value1")].into_iter().collect();
        let bytes = encode_dict(&dictionary).unwrap();

        let mut expected = vec![4];
        expected.extend_from_slice(b"key1");
        expected.extend_from_slice(&[TAG_STRING, 6]);
        expected.extend_from_slice(b"value1");
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_round_trip_mixed_values() {
        let dictionary = sample();
        let decoded = decode_dict(&encode_dict(&dictionary).unwrap()).unwrap();
        assert_eq!(decoded, dictionary);

        let keys: Vec<&str> = decoded.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["key1", "count", "temp", "ok"]);
    }

    #[test]
    fn test_round_trip_integer_edges() {
        for value in [0i64, 1, -1, 127, 128, -128, -129, 255, 65_535, i64::from(i32::MIN), i64::MAX, i64::MIN] {
            let dictionary: Dictionary = [("n", value)].into_iter().collect();
            let decoded = decode_dict(&encode_dict(&dictionary).unwrap()).unwrap();
            assert_eq!(decoded["n"].as_i64(), Some(value), "value {}", value);
        }
    }

    #[test]
    fn test_integer_encoding_is_compact() {
        assert_eq!(encode_integer(0), vec![0x00]);
        assert_eq!(encode_integer(127), vec![0x7F]);
        assert_eq!(encode_integer(128), vec![0x00, 0x80]);
        assert_eq!(encode_integer(-1), vec![0xFF]);
        assert_eq!(encode_integer(-129), vec![0xFF, 0x7F]);
        assert_eq!(encode_integer(i64::MIN).len(), 8);
    }

    #[test]
    fn test_empty_dictionary() {
        assert!(encode_dict(&Dictionary::new()).unwrap().is_empty());
        assert!(decode_dict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_input() {
        let bytes = encode_dict(&sample()).unwrap();
        for cut in 1..bytes.len() {
            // Some prefixes end exactly on an entry boundary and stay valid
            if let Ok(partial) = decode_dict(&bytes[..cut]) {
                assert!(partial.len() < sample().len());
            }
        }
        assert!(matches!(decode_dict(&bytes[..bytes.len() - 1]), Err(LoraError::MalformedFrame(_))));
        assert!(matches!(decode_dict(&[5, b'a']), Err(LoraError::MalformedFrame(_))));
    }

    #[test]
    fn test_unknown_type_tag() {
        let bytes = [1, b'k', 0x09, 1, 0x00];
        match decode_dict(&bytes) {
            Err(LoraError::MalformedFrame(msg)) => assert!(msg.contains("0x09")),
            other => panic!("Expected MalformedFrame, got: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_boolean_and_float() {
        assert!(decode_dict(&[1, b'b', TAG_BOOLEAN, 1, 0x02]).is_err());
        assert!(decode_dict(&[1, b'f', TAG_FLOAT, 2, 0x00, 0x00]).is_err());
        assert!(decode_dict(&[1, b'i', TAG_INTEGER, 0]).is_err());
    }

    #[test]
    fn test_invalid_utf8_key() {
        assert!(matches!(
            decode_dict(&[1, 0xFF, TAG_BOOLEAN, 1, 0x01]),
            Err(LoraError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_oversized_value_rejected() {
        let dictionary: Dictionary = [("big", "x".repeat(256))].into_iter().collect();
        assert!(matches!(encode_dict(&dictionary), Err(LoraError::InvalidArgument(_))));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let dictionary: Dictionary = [("x", value)].into_iter().collect();
            assert!(matches!(encode_dict(&dictionary), Err(LoraError::InvalidArgument(_))));
        }

        let dictionary: Dictionary = [("x", f64::MAX)].into_iter().collect();
        assert_eq!(decode_dict(&encode_dict(&dictionary).unwrap()).unwrap(), dictionary);
    }

    #[test]
    fn test_duplicate_keys_keep_last_value() {
        let bytes = [1, b'k', TAG_INTEGER, 1, 0x01, 1, b'k', TAG_INTEGER, 1, 0x02];
        let decoded = decode_dict(&bytes).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded["k"], Value::Integer(2));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut dictionary = sample();
        assert_eq!(dictionary.insert("key1", "other"), Some(Value::from("value1")));
        assert_eq!(dictionary.iter().next().unwrap().1, &Value::from("other"));
        assert_eq!(dictionary.len(), 4);
    }

    #[test]
    fn test_serialize_to_json() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert_eq!(json, r#"{"key1":"value1","count":42,"temp":-12.5,"ok":true}"#);
    }

    #[test]
    fn test_message_payloads() {
        assert_eq!(Message::Bytes(vec![1, 2]).to_payload().unwrap(), vec![1, 2]);
        assert_eq!(Message::Text("hi".into()).to_payload().unwrap(), b"hi".to_vec());
        let dict_payload = Message::Dictionary(sample()).to_payload().unwrap();
        assert_eq!(decode_dict(&dict_payload).unwrap(), sample());
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text(b"hello").unwrap(), "hello");
        assert!(matches!(decode_text(&[0xC3, 0x28]), Err(LoraError::MalformedFrame(_))));
    }

    #[test]
    fn test_message_from_payload() {
        let dict_payload = encode_dict(&sample()).unwrap();
        assert_eq!(Message::from_payload(dict_payload), Message::Dictionary(sample()));
        assert_eq!(Message::from_payload(b"hello".to_vec()), Message::Text("hello".into()));
        assert_eq!(Message::from_payload(vec![0xC3, 0x28]), Message::Bytes(vec![0xC3, 0x28]));
        assert_eq!(Message::from_payload(Vec::new()).kind(), "text");
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::from("a").as_str(), Some("a"));
        assert_eq!(Value::from(3).as_f64(), Some(3.0));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(1.5).as_i64(), None);
        assert_eq!(Value::from(7).to_string(), "7");
    }
}

//! Inbound message abstraction consumed by [`crate::Exchange::route`].
//!
//! The routing core never decodes payloads; it only needs the routing key,
//! the header table and the payload size for byte accounting.

use std::collections::BTreeMap;
use std::fmt;

/// Typed header / binding argument value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    /// No value; as a headers-exchange criterion it matches on key presence only
    Void,
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Void => write!(f, "void"),
            FieldValue::Bool(v) => write!(f, "{}", v),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Ordered header / argument map. Ordered so bindings hash deterministically.
pub type FieldTable = BTreeMap<String, FieldValue>;

/// What the routing core needs to know about a published message
pub trait InboundMessage: Send + Sync {
    /// Routing key supplied by the publisher
    fn routing_key(&self) -> &str;

    /// Payload size in bytes, used for the byte counters
    fn size(&self) -> u64;

    /// Application headers, consulted by header-matching strategies
    fn headers(&self) -> &FieldTable;
}

/// Plain in-memory message
#[derive(Debug, Clone, Default)]
pub struct Message {
    routing_key: String,
    headers: FieldTable,
    payload: Vec<u8>,
}

impl Message {
    pub fn new(routing_key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.into(),
            headers: FieldTable::new(),
            payload,
        }
    }

    /// Add a header, builder style
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_headers(mut self, headers: FieldTable) -> Self {
        self.headers = headers;
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

impl InboundMessage for Message {
    fn routing_key(&self) -> &str {
        &self.routing_key
    }

    fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    fn headers(&self) -> &FieldTable {
        &self.headers
    }
}

//! Message model
//!
//! A [`Message`] is opaque to the store apart from its message id, which
//! must be set in the system properties before the message is added.

use ferry_core::Offset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known system property names
pub mod system_properties {
    /// Unique id assigned upstream; identifies one logical message across
    /// every endpoint it fans out to
    pub const EDGE_MESSAGE_ID: &str = "edgeMsgId";
}

/// Immutable message: byte body plus user and system properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "body_base64")]
    body: Vec<u8>,
    #[serde(default)]
    properties: BTreeMap<String, String>,
    #[serde(default)]
    system_properties: BTreeMap<String, String>,
}

impl Message {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            properties: BTreeMap::new(),
            system_properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties.insert(key.into(), value.into());
        self
    }

    pub fn with_message_id(self, id: impl Into<String>) -> Self {
        self.with_system_property(system_properties::EDGE_MESSAGE_ID, id)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn system_properties(&self) -> &BTreeMap<String, String> {
        &self.system_properties
    }

    /// The message id, if present and non-empty
    pub fn message_id(&self) -> Option<&str> {
        self.system_properties
            .get(system_properties::EDGE_MESSAGE_ID)
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }
}

/// A message together with the offset it holds in one endpoint's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub offset: Offset,
    pub message: Message,
}

impl StoredMessage {
    pub fn new(offset: Offset, message: Message) -> Self {
        Self { offset, message }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.message_id()
    }
}

mod body_base64 {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_lookup() {
        assert_eq!(Message::new("x").message_id(), None);
        assert_eq!(Message::new("x").with_message_id("").message_id(), None);
        assert_eq!(Message::new("x").with_message_id("m1").message_id(), Some("m1"));
    }

    #[test]
    fn test_binary_body_is_base64_in_json() {
        let body = vec![0u8, 159, 146, 150, 255];
        let msg = Message::new(body.clone())
            .with_message_id("m1")
            .with_property("content-type", "application/octet-stream");

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["body"], "AJ+Slv8=");
        assert_eq!(json["system_properties"]["edgeMsgId"], "m1");

        let decoded: Message = serde_json::from_value(json).unwrap();
        assert_eq!(decoded.body(), body.as_slice());
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_rejects_invalid_base64_body() {
        let result: Result<Message, _> = serde_json::from_str(r#"{"body": "not base64!"}"#);
        assert!(result.is_err());
    }
}

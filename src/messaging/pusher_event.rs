use super::ProtocolEvent;
use crate::types::{ErrorData, PusherError, Result};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Value of a frame field that has no typed accessor on [`PusherEvent`].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    String(String),
    Number(Number),
    Bool(bool),
    /// Arrays and objects
    Structured(Value),
    Null,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            Self::Structured(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::String(s),
            Value::Number(n) => Self::Number(n),
            Value::Bool(b) => Self::Bool(b),
            Value::Null => Self::Null,
            structured => Self::Structured(structured),
        }
    }
}

/// An immutable, normalized protocol event.
///
/// Built once per inbound frame (or per local re-tagging) and never mutated afterwards.
/// Every frame field is reachable, either through the typed accessors or through
/// [`field`](Self::field).
///
/// # Example
///
/// ```
/// use pusher_channels_rs::PusherEvent;
///
/// let event = PusherEvent::parse(
///     r#"{"event":"new-message","channel":"chat","data":"{\"text\":\"hi\"}"}"#,
/// ).unwrap();
///
/// assert_eq!(event.name(), "new-message");
/// assert_eq!(event.channel(), Some("chat"));
/// assert_eq!(event.parsed_data().unwrap()["text"], "hi");
/// ```
#[derive(Debug, Clone)]
pub struct PusherEvent {
    name: String,
    channel: Option<String>,
    data: Option<String>,
    user_id: Option<String>,
    extra: BTreeMap<String, FieldValue>,
    parsed: OnceLock<Option<Value>>,
}

impl PusherEvent {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`PusherError::Construction`] if the text is not a JSON object or has no
    /// string `event` field.
    pub fn parse(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => Self::from_fields(map),
            Ok(_) => Err(PusherError::Construction(
                "frame is not a JSON object".to_string(),
            )),
            Err(e) => Err(PusherError::Construction(format!("invalid JSON: {}", e))),
        }
    }

    /// Builds an event from an already decoded field map.
    pub fn from_fields(mut fields: Map<String, Value>) -> Result<Self> {
        let name = match fields.remove("event") {
            Some(Value::String(name)) => name,
            Some(other) => {
                return Err(PusherError::Construction(format!(
                    "`event` must be a string, got {}",
                    other
                )));
            }
            None => {
                return Err(PusherError::Construction(
                    "missing `event` field".to_string(),
                ));
            }
        };

        let channel = take_string(&mut fields, "channel");
        let data = match fields.remove("data") {
            Some(Value::String(data)) => Some(data),
            None | Some(Value::Null) => None,
            Some(structured) => Some(structured.to_string()),
        };
        let user_id = match fields.remove("user_id") {
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            None | Some(Value::Null) => None,
            Some(other) => {
                fields.insert("user_id".to_string(), other);
                None
            }
        };

        Ok(Self {
            name,
            channel,
            data,
            user_id,
            extra: fields
                .into_iter()
                .map(|(key, value)| (key, FieldValue::from(value)))
                .collect(),
            parsed: OnceLock::new(),
        })
    }

    /// Creates a locally generated event (state changes, error notifications).
    pub(crate) fn local(name: &str, channel: Option<&str>, data: Value) -> Self {
        Self {
            name: name.to_string(),
            channel: channel.map(str::to_string),
            data: Some(data.to_string()),
            user_id: None,
            extra: BTreeMap::new(),
            parsed: OnceLock::new(),
        }
    }

    /// Returns a copy of this event under a different name.
    pub fn retagged(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Returns a copy of this event carrying different data.
    pub(crate) fn with_data(&self, data: String) -> Self {
        Self {
            data: Some(data),
            parsed: OnceLock::new(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }

    /// Id of the member that triggered a client event on a presence channel
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn kind(&self) -> ProtocolEvent {
        ProtocolEvent::from_name(&self.name)
    }

    /// Generic accessor for any frame field, including ones without a typed accessor.
    pub fn field(&self, key: &str) -> Option<FieldValue> {
        match key {
            "event" => Some(FieldValue::String(self.name.clone())),
            "channel" => self.channel.clone().map(FieldValue::String),
            "data" => self.data.clone().map(FieldValue::String),
            "user_id" => self.user_id.clone().map(FieldValue::String),
            _ => self.extra.get(key).cloned(),
        }
    }

    /// `data` parsed as JSON; `None` if absent or not valid JSON.
    pub fn parsed_data(&self) -> Option<&Value> {
        self.parsed
            .get_or_init(|| {
                let data = self.data.as_deref()?;
                match serde_json::from_str(data) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        tracing::trace!("Event '{}' data is not JSON: {}", self.name, e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// `data` deserialized into `T`; `None` if absent or of a different shape.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.parsed_data()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Code and message of a `pusher:error` event
    pub fn protocol_error(&self) -> Option<ErrorData> {
        if self.kind() != ProtocolEvent::Error {
            return None;
        }
        self.data_as::<ErrorData>()
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    match fields.remove(key) {
        Some(Value::String(s)) => Some(s),
        None | Some(Value::Null) => None,
        Some(other) => {
            fields.insert(key.to_string(), other);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_rejects_missing_event() {
        let frames = [
            r#"{"channel":"chat","data":"{}"}"#,
            r#"{"event":null}"#,
            r#"{"event":42,"channel":"chat"}"#,
            r#"{}"#,
            r#"["event"]"#,
            r#""pusher:ping""#,
            "not json",
        ];

        for frame in frames {
            match PusherEvent::parse(frame) {
                Err(PusherError::Construction(_)) => {}
                other => panic!("expected construction error for {frame}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_promotes_known_fields() {
        let event = PusherEvent::parse(
            r#"{"event":"client-move","channel":"presence-game","data":"{\"x\":1}","user_id":"u1"}"#,
        )
        .unwrap();

        assert_eq!(event.name(), "client-move");
        assert_eq!(event.channel(), Some("presence-game"));
        assert_eq!(event.data(), Some(r#"{"x":1}"#));
        assert_eq!(event.user_id(), Some("u1"));
        assert_eq!(event.kind(), ProtocolEvent::Client("client-move".into()));
    }

    #[test]
    fn test_structured_data_is_kept_as_json_text() {
        let event =
            PusherEvent::parse(r#"{"event":"pusher:error","data":{"code":4001,"message":"x"}}"#)
                .unwrap();

        assert_eq!(event.parsed_data().unwrap()["code"], 4001);
        let error = event.protocol_error().unwrap();
        assert_eq!(error.code, Some(4001));
        assert_eq!(error.message, "x");
    }

    #[test]
    fn test_numeric_user_id() {
        let event = PusherEvent::parse(r#"{"event":"client-a","user_id":17}"#).unwrap();
        assert_eq!(event.user_id(), Some("17"));
    }

    #[test]
    fn test_unknown_fields_are_typed() {
        let event = PusherEvent::parse(
            r#"{"event":"e","tag":"t","seq":3,"flag":true,"meta":{"a":1},"gone":null}"#,
        )
        .unwrap();

        assert_eq!(event.field("tag"), Some(FieldValue::String("t".into())));
        assert_eq!(event.field("seq").and_then(|v| v.as_u64()), Some(3));
        assert_eq!(event.field("flag"), Some(FieldValue::Bool(true)));
        assert_eq!(
            event.field("meta").unwrap().as_structured(),
            Some(&json!({"a": 1}))
        );
        assert_eq!(event.field("gone"), Some(FieldValue::Null));
        assert_eq!(event.field("missing"), None);
        assert_eq!(event.field("event"), Some(FieldValue::String("e".into())));
    }

    #[test]
    fn test_non_string_channel_stays_in_extra_fields() {
        let event = PusherEvent::parse(r#"{"event":"e","channel":5}"#).unwrap();
        assert_eq!(event.channel(), None);
        assert_eq!(event.field("channel"), None);
        assert_eq!(event.extra.get("channel").and_then(|v| v.as_u64()), Some(5));
    }

    #[test]
    fn test_parsed_data_swallows_errors() {
        let event = PusherEvent::parse(r#"{"event":"e","data":"plain text"}"#).unwrap();
        assert_eq!(event.data(), Some("plain text"));
        assert!(event.parsed_data().is_none());

        let event = PusherEvent::parse(r#"{"event":"e"}"#).unwrap();
        assert!(event.parsed_data().is_none());
    }

    #[test]
    fn test_retagged_keeps_everything_but_name() {
        let event = PusherEvent::parse(
            r#"{"event":"pusher_internal:member_added","channel":"presence-a","data":"{}","x":1}"#,
        )
        .unwrap();
        let retagged = event.retagged("pusher:member_added");

        assert_eq!(retagged.name(), "pusher:member_added");
        assert_eq!(retagged.channel(), event.channel());
        assert_eq!(retagged.data(), event.data());
        assert_eq!(retagged.field("x"), event.field("x"));
        assert_eq!(event.name(), "pusher_internal:member_added");
    }

    #[test]
    fn test_with_data_resets_parsed_cache() {
        let event = PusherEvent::parse(r#"{"event":"e","data":"{\"a\":1}"}"#).unwrap();
        assert_eq!(event.parsed_data().unwrap()["a"], 1);

        let replaced = event.with_data(r#"{"a":2}"#.to_string());
        assert_eq!(replaced.parsed_data().unwrap()["a"], 2);
        assert_eq!(event.parsed_data().unwrap()["a"], 1);
    }
}

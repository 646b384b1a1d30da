//! Wire protocol types for the request/response bridge.
//!
//! On the wire every frame is one untagged [`Envelope`]: `{id, payload?, error?}`.
//! Whether a frame is a request or a reply depends on which side reads it, so
//! each side converts incoming envelopes into the tagged [`Request`] or
//! [`Reply`] type and rejects anything that does not fit as a schema error.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::codec::CodecError;

/// Opaque request identifier, generated by the requester and echoed verbatim.
///
/// UUID v4 by default, so IDs never repeat over a connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The unit exchanged over the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: RequestId,
    /// `Some(Value::Null)` is an explicit `"payload": null` (void success),
    /// distinct from an absent field.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Interpret an incoming frame as a request (router side).
    pub fn into_request(self) -> Result<Request, CodecError> {
        if self.error.is_some() {
            return Err(CodecError::Schema(format!(
                "request {} carries an error field",
                self.id
            )));
        }
        let mut args = match self.payload {
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(CodecError::Schema(format!(
                    "request {} payload must be an object, got {}",
                    self.id,
                    json_kind(&other)
                )));
            }
            None => {
                return Err(CodecError::Schema(format!(
                    "request {} has no payload",
                    self.id
                )));
            }
        };
        let command = match args.remove("command") {
            Some(Value::String(command)) => command,
            Some(other) => {
                return Err(CodecError::Schema(format!(
                    "request {} command must be a string, got {}",
                    self.id,
                    json_kind(&other)
                )));
            }
            None => {
                return Err(CodecError::Schema(format!(
                    "request {} payload is missing command",
                    self.id
                )));
            }
        };
        Ok(Request {
            id: self.id,
            command,
            args,
        })
    }

    /// Interpret an incoming frame as a reply (client side).
    pub fn into_reply(self) -> Result<Reply, CodecError> {
        let result = match (self.payload, self.error) {
            (Some(payload), None) => Ok(payload),
            (None, Some(error)) => Err(error),
            (Some(_), Some(_)) => {
                return Err(CodecError::Schema(format!(
                    "reply {} has both payload and error",
                    self.id
                )));
            }
            (None, None) => {
                return Err(CodecError::Schema(format!(
                    "reply {} has neither payload nor error",
                    self.id
                )));
            }
        };
        Ok(Reply {
            id: self.id,
            result,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A command invocation: name plus command-specific fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub command: String,
    pub args: Map<String, Value>,
}

impl Request {
    pub fn new(id: RequestId, command: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            id,
            command: command.into(),
            args,
        }
    }
}

impl From<Request> for Envelope {
    fn from(req: Request) -> Self {
        let mut payload = req.args;
        payload.insert("command".to_string(), Value::String(req.command));
        Envelope {
            id: req.id,
            payload: Some(Value::Object(payload)),
            error: None,
        }
    }
}

/// The settled outcome of one request, carrying the request's ID.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: RequestId,
    pub result: Result<Value, String>,
}

impl Reply {
    pub fn success(id: RequestId, payload: Value) -> Self {
        Self {
            id,
            result: Ok(payload),
        }
    }

    pub fn failure(id: RequestId, error: impl Into<String>) -> Self {
        Self {
            id,
            result: Err(error.into()),
        }
    }

    pub fn unknown_command(id: RequestId, command: &str) -> Self {
        Self::failure(id, format!("unknown command: {command}"))
    }
}

impl From<Reply> for Envelope {
    fn from(reply: Reply) -> Self {
        match reply.result {
            Ok(payload) => Envelope {
                id: reply.id,
                payload: Some(payload),
                error: None,
            },
            Err(error) => Envelope {
                id: reply.id,
                payload: None,
                error: Some(error),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(raw: &str) -> Envelope {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn request_serializes() {
        let req = Request::new(
            RequestId::from("1"),
            "tab.get",
            json!({"tabId": 7}).as_object().cloned().unwrap(),
        );
        insta::assert_json_snapshot!(Envelope::from(req), @r#"
        {
          "id": "1",
          "payload": {
            "command": "tab.get",
            "tabId": 7
          }
        }
        "#);
    }

    #[test]
    fn success_reply_serializes() {
        let reply = Reply::success(RequestId::from("1"), json!({"id": 7, "title": "Example"}));
        insta::assert_json_snapshot!(Envelope::from(reply), @r#"
        {
          "id": "1",
          "payload": {
            "id": 7,
            "title": "Example"
          }
        }
        "#);
    }

    #[test]
    fn void_reply_keeps_explicit_null_payload() {
        let reply = Reply::success(RequestId::from("9"), Value::Null);
        insta::assert_json_snapshot!(Envelope::from(reply), @r#"
        {
          "id": "9",
          "payload": null
        }
        "#);
    }

    #[test]
    fn unknown_command_reply_serializes() {
        let reply = Reply::unknown_command(RequestId::from("3"), "bogus.op");
        insta::assert_json_snapshot!(Envelope::from(reply), @r#"
        {
          "id": "3",
          "error": "unknown command: bogus.op"
        }
        "#);
    }

    #[test]
    fn explicit_null_payload_is_present() {
        let env = parse(r#"{"id":"1","payload":null}"#);
        assert_eq!(env.payload, Some(Value::Null));
        assert_eq!(env.into_reply().unwrap().result, Ok(Value::Null));
    }

    #[test]
    fn missing_payload_is_absent() {
        let env = parse(r#"{"id":"1"}"#);
        assert_eq!(env.payload, None);
    }

    #[test]
    fn request_strips_command_from_args() {
        let req = parse(r#"{"id":"5","payload":{"command":"tab.pin","tabIds":[3]}}"#)
            .into_request()
            .unwrap();
        assert_eq!(req.command, "tab.pin");
        assert_eq!(req.args.len(), 1);
        assert_eq!(req.args["tabIds"], json!([3]));
    }

    #[test]
    fn request_without_command_is_schema_error() {
        let err = parse(r#"{"id":"5","payload":{"tabIds":[3]}}"#)
            .into_request()
            .unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn request_with_non_string_command_is_schema_error() {
        let err = parse(r#"{"id":"5","payload":{"command":12}}"#)
            .into_request()
            .unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn request_with_error_is_schema_error() {
        let err = parse(r#"{"id":"5","payload":{"command":"tab.list"},"error":"x"}"#)
            .into_request()
            .unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn request_with_array_payload_is_schema_error() {
        let err = parse(r#"{"id":"5","payload":[1]}"#)
            .into_request()
            .unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn reply_with_neither_field_is_schema_error() {
        let err = parse(r#"{"id":"5"}"#).into_reply().unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn reply_with_both_fields_is_schema_error() {
        let err = parse(r#"{"id":"5","payload":1,"error":"x"}"#)
            .into_reply()
            .unwrap_err();
        assert!(matches!(err, CodecError::Schema(_)));
    }

    #[test]
    fn error_reply_parses() {
        let reply = parse(r#"{"id":"5","error":"No tab with id: 99"}"#)
            .into_reply()
            .unwrap();
        assert_eq!(reply.id.as_str(), "5");
        assert_eq!(reply.result, Err("No tab with id: 99".to_string()));
    }

    #[test]
    fn envelope_values_survive_roundtrip() {
        let raw = r#"{"id":"abc","payload":{"command":"history.search","text":"rust","maxResults":5}}"#;
        let env = parse(raw);
        let again: Envelope = serde_json::from_str(&serde_json::to_string(&env).unwrap()).unwrap();
        assert_eq!(env, again);
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(RequestId::new(), RequestId::new());
    }
}

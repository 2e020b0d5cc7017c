use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A util structure to hold payload field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnlyPayload<P> {
    /// payload field
    pub payload: P,
}

/// Identify message payload, client -> server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    /// identity of this game server
    pub identity_token: String,
    /// registration token
    pub registration_token: String,
}

/// Connected message, server -> client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Connected {
    /// optional details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<ConnectedPayload>,
}

/// Connected message payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    /// id assigned to this connection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// IdentifyResponse message, server -> client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    /// outcome of the identify handshake
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<IdentifyOutcome>,
}

/// IdentifyResponse message payload, exactly one of the fields is expected
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifyOutcome {
    /// set when identify failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<IdentifyError>,
    /// set when identify succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerInfo>,
}

/// Error object of a failed identify
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentifyError {
    /// error class name
    #[serde(default)]
    pub name: Option<String>,
    /// reason for human read
    #[serde(default)]
    pub message: Option<String>,
    /// http like status code
    #[serde(default, alias = "httpStatus")]
    pub http: Option<i64>,
}

impl IdentifyError {
    /// 401 and 403 mean the credentials themselves are wrong.
    pub fn is_permanent(&self) -> bool {
        matches!(self.http, Some(401) | Some(403))
    }
}

/// Server side registration info
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    /// server assigned identifier
    #[serde(default)]
    pub id: Option<Value>,
}

/// Authenticated message, server -> client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Authenticated {
    /// server side registration info
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<ServerInfo>,
}

/// Error message, server -> client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorNotice {
    /// reason for human read
    #[serde(default)]
    pub message: Option<String>,
    /// error code, 401 means the link must stop retrying
    #[serde(default)]
    pub code: Option<i64>,
}

/// Request message, server -> client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// correlation id, echoed in the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// what to do
    #[serde(default)]
    pub payload: RequestPayload,
}

impl Request {
    /// Read a request whose fields have unexpected types.
    ///
    /// Scalar `requestId` and `action` are taken as text, anything else
    /// unusable becomes absent.
    pub(crate) fn lenient(obj: &Map<String, Value>) -> Self {
        let payload = obj.get("payload").and_then(Value::as_object);

        Self {
            request_id: scalar_text(obj.get("requestId")),
            payload: RequestPayload {
                action: scalar_text(payload.and_then(|p| p.get("action"))).unwrap_or_default(),
                args: payload.and_then(|p| p.get("args")).cloned(),
            },
        }
    }
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Request message payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// action name, matched exactly
    #[serde(default)]
    pub action: String,
    /// action arguments, a json document encoded as a string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

/// Response message, client -> server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// echoed correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// result, `Some(Value::Null)` is an explicit null result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    /// Successful response to a request with `request_id`.
    pub fn success(request_id: Option<String>, payload: Value) -> Self {
        Self {
            request_id,
            payload: Some(payload),
            error: None,
        }
    }

    /// Failed response to a request with `request_id`.
    pub fn failure(request_id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            request_id,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// GameEvent message payload, client -> server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEventPayload {
    /// event type, like `player-connected`
    pub r#type: String,
    /// event body
    pub data: Value,
}

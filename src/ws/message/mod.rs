//! Websocket protocol message types.

mod stream;
mod types;

pub use stream::{MessageStreamSink, MessageStreamSinkError, ABNORMAL_CLOSE_CODE};
pub use types::{
    Authenticated, Connected, ConnectedPayload, ErrorNotice, GameEventPayload, Identify,
    IdentifyError, IdentifyOutcome, IdentifyResponse, OnlyPayload, Request, RequestPayload,
    Response, ServerInfo,
};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Error when parse text data as message
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)), module(error), context(suffix(false)))]
pub enum ParseMessageError {
    /// data is invalid json
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// data for decode
        data: String,
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("parsed message is not object: {json}"))]
    MessageNotObject {
        /// json string
        json: String,
    },

    /// data json has no type field
    #[snafu(display("message has no type field: {json}"))]
    NoMessageType {
        /// json string
        json: String,
    },

    /// data json type field is not a string
    #[snafu(display("message has non-string type field: {json}"))]
    MessageTypeNotString {
        /// json string
        json: String,
    },

    /// data json has an unknown type
    #[snafu(display("message has unknown type {t}"))]
    UnknownMessageType {
        /// type name
        t: String,
    },

    /// data json is not valid typed message
    #[snafu(display("parse to {type_name} message failed: {source}"))]
    ParseJSONToTypedMessageFailed {
        /// type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

/// Websocket protocol message type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, EnumAsInner)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Identify, client -> server
    Identify(OnlyPayload<Identify>),
    /// Connected, server -> client
    Connected(Connected),
    /// IdentifyResponse, server -> client
    IdentifyResponse(IdentifyResponse),
    /// Authenticated, server -> client
    Authenticated(Authenticated),
    /// Error, server -> client
    Error(ErrorNotice),
    /// Request, server -> client
    Request(Request),
    /// Response, client -> server
    Response(Response),
    /// GameEvent, client -> server
    GameEvent(OnlyPayload<GameEventPayload>),
}

impl Message {
    /// Decode text data to a message
    pub fn decode(data: &str) -> Result<Self, ParseMessageError> {
        let value: serde_json::Value =
            serde_json::from_str(data).context(error::ParseJSONFailed { data })?;

        let obj = value
            .as_object()
            .with_context(|| error::MessageNotObject { json: data })?;

        let t = obj
            .get("type")
            .with_context(|| error::NoMessageType { json: data })?
            .as_str()
            .with_context(|| error::MessageTypeNotString { json: data })?;

        let type_name = Self::known_type_name(t)
            .with_context(|| error::UnknownMessageType { t })?;

        match Self::deserialize(&value) {
            Ok(message) => Ok(message),
            // a request must always get an answer, even a malformed one
            Err(err) if type_name == "request" => {
                log::warn!("Malformed request, reading it leniently: {}", err);
                Ok(Self::Request(Request::lenient(obj)))
            }
            Err(err) => Err(err).context(error::ParseJSONToTypedMessageFailed { type_name }),
        }
    }

    /// Encode message to json text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    fn known_type_name(t: &str) -> Option<&'static str> {
        match t {
            "identify" => Some("identify"),
            "connected" => Some("connected"),
            "identifyResponse" => Some("identifyResponse"),
            "authenticated" => Some("authenticated"),
            "error" => Some("error"),
            "request" => Some("request"),
            "response" => Some("response"),
            "gameEvent" => Some("gameEvent"),
            _ => None,
        }
    }

    /// get type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::Connected(_) => "connected",
            Self::IdentifyResponse(_) => "identifyResponse",
            Self::Authenticated(_) => "authenticated",
            Self::Error(_) => "error",
            Self::Request(_) => "request",
            Self::Response(_) => "response",
            Self::GameEvent(_) => "gameEvent",
        }
    }

    /// True for messages allowed before authentication.
    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Identify(_))
    }
}

#[cfg(test)]
mod test {
    mod decode {
        use super::super::*;
        use serde_json::json;

        fn decode(value: serde_json::Value) -> Message {
            Message::decode(&value.to_string()).unwrap()
        }

        #[test]
        fn test_message_decode_connected() {
            let msg = decode(json!({
                "type": "connected",
                "payload": { "clientId": "abc" },
            }));

            let connected = msg.into_connected().unwrap();
            assert_eq!(connected.payload.unwrap().client_id.unwrap(), "abc");

            let msg = decode(json!({ "type": "connected" }));
            assert!(msg.into_connected().unwrap().payload.is_none());
        }

        #[test]
        fn test_message_decode_identify_response_success() {
            let msg = decode(json!({
                "type": "identifyResponse",
                "payload": { "server": { "id": "server-1" } },
            }));

            let outcome = msg.into_identify_response().unwrap().payload.unwrap();
            assert!(outcome.error.is_none());
            assert_eq!(outcome.server.unwrap().id.unwrap(), json!("server-1"));
        }

        #[test]
        fn test_message_decode_identify_response_error() {
            let msg = decode(json!({
                "type": "identifyResponse",
                "payload": {
                    "error": { "name": "UnauthorizedError", "message": "bad token", "http": 401 },
                },
            }));

            let err = msg
                .into_identify_response()
                .unwrap()
                .payload
                .unwrap()
                .error
                .unwrap();
            assert_eq!(err.http, Some(401));
            assert!(err.is_permanent());

            let msg = decode(json!({
                "type": "identifyResponse",
                "payload": { "error": { "message": "try later", "httpStatus": 503 } },
            }));
            let err = msg
                .into_identify_response()
                .unwrap()
                .payload
                .unwrap()
                .error
                .unwrap();
            assert_eq!(err.http, Some(503));
            assert!(!err.is_permanent());
        }

        #[test]
        fn test_message_decode_error() {
            let msg = decode(json!({ "type": "error", "message": "nope", "code": 401 }));

            let notice = msg.into_error().unwrap();
            assert_eq!(notice.code, Some(401));
            assert_eq!(notice.message.unwrap(), "nope");
        }

        #[test]
        fn test_message_decode_request() {
            let msg = decode(json!({
                "type": "request",
                "requestId": "req-1",
                "payload": { "action": "getPlayer", "args": "{\"gameId\":\"x\"}" },
            }));

            let request = msg.into_request().unwrap();
            assert_eq!(request.request_id.unwrap(), "req-1");
            assert_eq!(request.payload.action, "getPlayer");
            assert_eq!(request.payload.args.unwrap(), json!("{\"gameId\":\"x\"}"));
        }

        #[test]
        fn test_message_decode_request_without_payload() {
            let request = decode(json!({ "type": "request" })).into_request().unwrap();

            assert!(request.request_id.is_none());
            assert_eq!(request.payload.action, "");
        }

        #[test]
        fn test_message_decode_failures() {
            assert!(matches!(
                Message::decode("{"),
                Err(ParseMessageError::ParseJSONFailed { .. })
            ));
            assert!(matches!(
                Message::decode("[]"),
                Err(ParseMessageError::MessageNotObject { .. })
            ));
            assert!(matches!(
                Message::decode("{}"),
                Err(ParseMessageError::NoMessageType { .. })
            ));
            assert!(matches!(
                Message::decode(r#"{"type": 1}"#),
                Err(ParseMessageError::MessageTypeNotString { .. })
            ));
            assert!(matches!(
                Message::decode(r#"{"type": "ping"}"#),
                Err(ParseMessageError::UnknownMessageType { .. })
            ));
            assert!(matches!(
                Message::decode(r#"{"type": "authenticated", "serverInfo": 3}"#),
                Err(ParseMessageError::ParseJSONToTypedMessageFailed { .. })
            ));
        }

        #[test]
        fn test_message_decode_request_with_scalar_fields() {
            let request = decode(json!({
                "type": "request",
                "requestId": 7,
                "payload": { "action": 3, "args": "{}" },
            }))
            .into_request()
            .unwrap();

            assert_eq!(request.request_id.as_deref(), Some("7"));
            assert_eq!(request.payload.action, "3");
            assert_eq!(request.payload.args.unwrap(), json!("{}"));

            let request = decode(json!({ "type": "request", "requestId": [], "payload": 5 }))
                .into_request()
                .unwrap();
            assert!(request.request_id.is_none());
            assert_eq!(request.payload.action, "");
        }
    }

    mod encode {
        use super::super::*;
        use serde_json::{json, Value};

        fn encoded(msg: &Message) -> Value {
            serde_json::from_str(&msg.encode().unwrap()).unwrap()
        }

        #[test]
        fn test_message_encode_identify() {
            let msg = Message::Identify(OnlyPayload {
                payload: Identify {
                    identity_token: "survival-1".to_string(),
                    registration_token: "secret".to_string(),
                },
            });

            assert_eq!(
                encoded(&msg),
                json!({
                    "type": "identify",
                    "payload": { "identityToken": "survival-1", "registrationToken": "secret" },
                })
            );
        }

        #[test]
        fn test_message_encode_response_echoes_id_only_when_present() {
            let msg = Message::Response(Response::success(Some("r-7".to_string()), Value::Null));
            assert_eq!(
                encoded(&msg),
                json!({ "type": "response", "requestId": "r-7", "payload": null })
            );

            let msg = Message::Response(Response::failure(None, "boom"));
            assert_eq!(encoded(&msg), json!({ "type": "response", "error": "boom" }));
        }

        #[test]
        fn test_message_encode_game_event() {
            let msg = Message::GameEvent(OnlyPayload {
                payload: GameEventPayload {
                    r#type: "log".to_string(),
                    data: json!({ "msg": "hello" }),
                },
            });

            assert_eq!(
                encoded(&msg),
                json!({
                    "type": "gameEvent",
                    "payload": { "type": "log", "data": { "msg": "hello" } },
                })
            );
        }
    }
}

use std::{
    fmt::Debug,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;

use crate::ws::message::{Identify, Message, OnlyPayload};

/// Identity and registration tokens presented in the handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// identity of this game server
    pub identity_token: String,
    /// registration token issued by the management service
    pub registration_token: String,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity_token", &self.identity_token)
            .field("registration_token", &"<redacted>")
            .finish()
    }
}

/// What a handshake result message means for the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum AuthOutcome {
    /// identify accepted
    Authenticated,
    /// identify refused
    Rejected {
        /// refused because of the credentials, retrying won't help
        permanent: bool,
    },
    /// message was not a handshake result
    Ignored,
}

/// Identify handshake state of one link.
#[derive(Debug)]
pub(crate) struct AuthSession {
    credentials: RwLock<Credentials>,
    authenticated: AtomicBool,
}

impl AuthSession {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: RwLock::new(credentials),
            authenticated: AtomicBool::new(false),
        }
    }

    /// The identify message for the current credentials.
    pub fn handshake(&self) -> Message {
        let credentials = self.credentials.read();
        Message::Identify(OnlyPayload {
            payload: Identify {
                identity_token: credentials.identity_token.clone(),
                registration_token: credentials.registration_token.clone(),
            },
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    /// Forget the outcome of the last handshake, for a new transport.
    pub fn reset(&self) {
        self.authenticated.store(false, Ordering::Release);
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials.read().clone()
    }

    pub fn update_credentials(&self, credentials: Credentials) {
        log::info!(
            "Credentials updated, identity: {}",
            credentials.identity_token
        );
        *self.credentials.write() = credentials;
    }

    pub fn on_handshake_result(&self, message: &Message) -> AuthOutcome {
        match message {
            Message::Authenticated(data) => {
                self.authenticated.store(true, Ordering::Release);
                log::info!("Successfully authenticated");

                if let Some(ref info) = data.server_info {
                    log::info!(
                        "Server registered, server id: {}",
                        info.id.as_ref().map_or("unknown".to_string(), |id| id_text(id))
                    );
                }

                AuthOutcome::Authenticated
            }
            Message::IdentifyResponse(data) => {
                let outcome = match data.payload {
                    Some(ref outcome) => outcome,
                    None => {
                        log::warn!("Received identifyResponse without payload");
                        return AuthOutcome::Ignored;
                    }
                };

                if let Some(ref err) = outcome.error {
                    log::error!(
                        "Authentication failed: {} - {} (HTTP {})",
                        err.name.as_deref().unwrap_or("Unknown"),
                        err.message.as_deref().unwrap_or("Unknown error"),
                        err.http.unwrap_or_default()
                    );

                    let permanent = err.is_permanent();
                    if permanent {
                        log::error!(
                            "Invalid credentials, check identity and registration tokens"
                        );
                    }
                    return AuthOutcome::Rejected { permanent };
                }

                self.authenticated.store(true, Ordering::Release);
                log::info!("Successfully authenticated");

                if let Some(ref server) = outcome.server {
                    log::info!(
                        "Server registered, server id: {}",
                        server.id.as_ref().map_or("unknown".to_string(), |id| id_text(id))
                    );
                }

                AuthOutcome::Authenticated
            }
            _ => AuthOutcome::Ignored,
        }
    }
}

fn id_text(id: &serde_json::Value) -> String {
    match id {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn session() -> AuthSession {
        AuthSession::new(Credentials {
            identity_token: "survival-1".to_string(),
            registration_token: "secret".to_string(),
        })
    }

    fn message(value: serde_json::Value) -> Message {
        Message::decode(&value.to_string()).unwrap()
    }

    #[test]
    fn test_handshake_carries_current_credentials() {
        let auth = session();
        auth.update_credentials(Credentials {
            identity_token: "survival-2".to_string(),
            registration_token: "rotated".to_string(),
        });

        let identify = auth.handshake().into_identify().unwrap().payload;
        assert_eq!(identify.identity_token, "survival-2");
        assert_eq!(identify.registration_token, "rotated");
    }

    #[test]
    fn test_authenticated_message() {
        let auth = session();
        let outcome = auth.on_handshake_result(&message(json!({
            "type": "authenticated",
            "serverInfo": { "id": 42 },
        })));

        assert_eq!(outcome, AuthOutcome::Authenticated);
        assert!(auth.is_authenticated());

        auth.reset();
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_identify_response_success() {
        let auth = session();
        let outcome = auth.on_handshake_result(&message(json!({
            "type": "identifyResponse",
            "payload": { "server": { "id": "srv" } },
        })));

        assert_eq!(outcome, AuthOutcome::Authenticated);
        assert!(auth.is_authenticated());
    }

    #[test]
    fn test_identify_response_errors() {
        let auth = session();

        for (status, permanent) in [(401, true), (403, true), (500, false), (0, false)] {
            let outcome = auth.on_handshake_result(&message(json!({
                "type": "identifyResponse",
                "payload": { "error": { "name": "E", "message": "m", "http": status } },
            })));
            assert_eq!(outcome, AuthOutcome::Rejected { permanent });
        }

        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_identify_response_without_payload_is_ignored() {
        let auth = session();
        let outcome = auth.on_handshake_result(&message(json!({ "type": "identifyResponse" })));

        assert_eq!(outcome, AuthOutcome::Ignored);
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_credentials_debug_hides_registration_token() {
        let text = format!("{:?}", session().credentials());
        assert!(text.contains("survival-1"));
        assert!(!text.contains("secret"));
    }
}

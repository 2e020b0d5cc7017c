use serde::Serialize;
use serde_json::{json, Value};
use snafu::prelude::*;

use super::{
    args::{parse_game_id, Args},
    error, RequestError, RequestRouter,
};
use crate::platform::PlatformError;

const SHUTDOWN_KICK_MESSAGE: &str = "Server is shutting down";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommandOutcome {
    success: bool,
    // the platform can't capture command output
    raw_result: String,
    error_message: Option<String>,
}

pub(super) fn reachability() -> Value {
    json!({ "connectable": true, "reason": null })
}

impl RequestRouter {
    pub(super) async fn send_message(&self, args: &Args) -> Result<Value, RequestError> {
        let message = args.non_empty_text("message")?;

        // opts without a recipient is a broadcast, same as no opts at all
        let recipient = match args.object("opts").filter(|opts| opts.has("recipient")) {
            Some(opts) => {
                let id = opts
                    .object("recipient")
                    .and_then(|recipient| recipient.text("gameId"))
                    .context(error::RecipientWithoutGameId)?;
                Some(parse_game_id(&id)?)
            }
            None => None,
        };

        self.context
            .run(move |p| -> Result<(), PlatformError> {
                match recipient {
                    Some(id) => {
                        p.whisper(id, &message)?;
                        log::info!("Sent private message to {}: {}", id, message);
                    }
                    None => {
                        p.broadcast(&message);
                        log::info!("Broadcast message to all players: {}", message);
                    }
                }
                Ok(())
            })
            .await
            .context(error::Context)??;

        Ok(Value::Null)
    }

    pub(super) async fn execute_console_command(
        &self,
        args: &Args,
    ) -> Result<Value, RequestError> {
        let command = args.non_empty_text("command")?;

        log::info!("Executing console command: {}", command);

        let outcome = self
            .context
            .run(move |p| match p.execute_command(&command) {
                Ok(success) => {
                    log::info!("Console command executed: {}", command);
                    CommandOutcome {
                        success,
                        raw_result: String::new(),
                        error_message: None,
                    }
                }
                Err(err) => {
                    log::warn!("Console command failed: {} - {}", command, err);
                    CommandOutcome {
                        success: false,
                        raw_result: String::new(),
                        error_message: Some(err.to_string()),
                    }
                }
            })
            .await
            .context(error::Context)?;

        serde_json::to_value(outcome).context(error::Encode)
    }

    /// Announce, wait the grace period, then save, empty and stop the server.
    pub(super) fn begin_shutdown(&self) {
        let grace = self.shutdown_grace;
        let announcement = format!("Server shutting down in {} seconds!", grace.as_secs());

        log::info!("Server shutdown requested, {} seconds countdown", grace.as_secs());

        if let Err(err) = self.context.submit(move |p| p.broadcast(&announcement)) {
            log::error!("Announce shutdown failed: {}", err);
        }

        self.context.submit_after(grace, |p| {
            log::info!("Executing server shutdown");

            if let Err(err) = p.save_worlds() {
                log::error!("Save worlds failed: {}", err);
            }

            for player in p.online_players() {
                if let Err(err) = p.kick(player.game_id, SHUTDOWN_KICK_MESSAGE) {
                    log::warn!("Kick {} failed: {}", player.name, err);
                }
            }

            p.terminate();
        });
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        platform::PlatformAction,
        router::test::{err, harness, ok, request, ALEX, STEVE},
    };

    #[tokio::test]
    async fn test_send_message_broadcast_and_whisper() {
        let h = harness();

        ok(&h, "sendMessage", json!({ "message": "hello" })).await;
        ok(&h, "sendMessage", json!({ "message": "hi all", "opts": {} })).await;
        ok(
            &h,
            "sendMessage",
            json!({ "message": "psst", "opts": { "recipient": { "gameId": ALEX.to_string() } } }),
        )
        .await;

        assert_eq!(
            h.journal.actions(),
            vec![
                PlatformAction::Broadcast("hello".to_string()),
                PlatformAction::Broadcast("hi all".to_string()),
                PlatformAction::Whisper {
                    player: ALEX,
                    message: "psst".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_send_message_errors() {
        let h = harness();

        let cases = [
            (json!({}), "message parameter is required"),
            (json!({ "message": " " }), "message cannot be empty"),
            (
                json!({ "message": "x", "opts": { "recipient": {} } }),
                "recipient must contain gameId",
            ),
            (
                json!({ "message": "x", "opts": { "recipient": { "gameId": "bad" } } }),
                "Invalid gameId format",
            ),
            (
                json!({ "message": "x", "opts": { "recipient": { "gameId": STEVE.to_string() } } }),
                "Player not found or offline",
            ),
        ];

        for (args, expected) in cases {
            assert_eq!(err(&h, "sendMessage", args).await, expected);
        }
        assert!(h.journal.actions().is_empty());
    }

    #[tokio::test]
    async fn test_execute_console_command() {
        let h = harness();

        assert_eq!(
            ok(&h, "executeConsoleCommand", json!({ "command": "say hi" })).await,
            json!({ "success": true, "rawResult": "", "errorMessage": null })
        );
        assert_eq!(
            ok(&h, "executeConsoleCommand", json!({ "command": "fly" })).await,
            json!({ "success": false, "rawResult": "", "errorMessage": null })
        );
        assert_eq!(
            err(&h, "executeConsoleCommand", json!({ "command": "" })).await,
            "command cannot be empty"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_acknowledges_before_acting() {
        let h = harness();

        h.router
            .respond(request(Some("bye"), "shutdown", json!({})))
            .await;

        let sent = h.outbound.sent();
        assert_eq!(sent.len(), 1);
        let response = sent[0].as_response().unwrap();
        assert_eq!(response.request_id.as_deref(), Some("bye"));
        assert_eq!(response.payload, Some(Value::Null));
        assert!(!h
            .journal
            .actions()
            .iter()
            .any(|a| matches!(a, PlatformAction::SaveWorlds | PlatformAction::Kick { .. })));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(
            h.journal.actions(),
            vec![PlatformAction::Broadcast(
                "Server shutting down in 30 seconds!".to_string()
            )]
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            h.journal.actions()[1..],
            [
                PlatformAction::SaveWorlds,
                PlatformAction::Kick {
                    player: ALEX,
                    reason: "Server is shutting down".to_string(),
                },
                PlatformAction::Terminate,
            ]
        );
    }
}

//! Inbound request dispatch.
//!
//! Every request names an action. The router decodes its arguments, runs
//! the game-state part of the action on the main execution context and
//! answers with a response carrying the same request id.

mod args;
mod expiry;
mod items;
mod players;
mod server;

use std::{sync::Arc, time::Duration};

use serde_json::Value;
use snafu::prelude::*;
use tokio::sync::mpsc;

use crate::{
    platform::{ContextError, MainContext, PlatformError},
    ws::{
        message::{Request, Response},
        Message, Outbound,
    },
};
use args::Args;

/// Default wait between the shutdown announcement and the actual shutdown
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Error answered to a request, the display string is sent as is
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum RequestError {
    /// no handler for this action
    #[snafu(display("Action not implemented: {action}"))]
    NotImplemented {
        /// requested action
        action: String,
    },

    /// a required argument is absent
    #[snafu(display("{name} parameter is required"))]
    ParameterRequired {
        /// argument name
        name: String,
    },

    /// a required argument is blank
    #[snafu(display("{name} cannot be empty"))]
    ParameterEmpty {
        /// argument name
        name: String,
    },

    /// `player` argument has no `gameId`
    #[snafu(display("player object must contain gameId"))]
    PlayerWithoutGameId,

    /// `opts.recipient` argument has no `gameId`
    #[snafu(display("recipient must contain gameId"))]
    RecipientWithoutGameId,

    /// game id is not a valid id
    #[snafu(display("Invalid gameId format"))]
    InvalidGameId,

    /// giveItem without player, item or amount
    #[snafu(display("Missing required parameters: player, item, and amount are required"))]
    GiveItemParameters,

    /// amount is not an integer
    #[snafu(display("Invalid amount format"))]
    InvalidAmount,

    /// amount is zero or negative
    #[snafu(display("Amount must be greater than 0"))]
    NonPositiveAmount,

    /// item code is not in the catalogue
    #[snafu(display("Invalid item code: {code}"))]
    UnknownItem {
        /// requested code
        code: String,
    },

    /// item code names something that can't be held, like a fluid
    #[snafu(display("Item code does not represent a valid item: {code}"))]
    NotAnItem {
        /// requested code
        code: String,
    },

    /// expiresAt is not an ISO 8601 timestamp
    #[snafu(display("Invalid expiresAt date format. Expected ISO 8601 format."))]
    InvalidExpiresAt,

    /// platform refused the operation
    #[snafu(display("{source}"))]
    Platform {
        /// source error
        source: PlatformError,
    },

    /// main execution context unavailable
    #[snafu(display("{source}"))]
    Context {
        /// source error
        source: ContextError,
    },

    /// result could not be encoded
    #[snafu(display("encode result failed: {source}"))]
    Encode {
        /// source error
        source: serde_json::Error,
    },
}

impl From<PlatformError> for RequestError {
    fn from(source: PlatformError) -> Self {
        Self::Platform { source }
    }
}

/// Dispatches inbound requests to action handlers.
#[derive(Debug, Clone)]
pub struct RequestRouter {
    context: MainContext,
    outbound: Arc<dyn Outbound>,
    shutdown_grace: Duration,
}

impl RequestRouter {
    /// Router answering through `outbound`, touching game state through `context`.
    pub fn new(context: MainContext, outbound: Arc<dyn Outbound>) -> Self {
        Self {
            context,
            outbound,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Change the wait of the `shutdown` action.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Serve requests until the channel closes.
    ///
    /// Each request is handled on its own task, so a slow main context
    /// does not hold back the others.
    pub async fn run(self, mut requests: mpsc::UnboundedReceiver<Request>) {
        log::debug!("Request router start");

        while let Some(request) = requests.recv().await {
            let router = self.clone();
            tokio::spawn(async move { router.respond(request).await });
        }

        log::debug!("Request router stop, request channel closed");
    }

    /// Handle one request and send its response.
    pub async fn respond(&self, request: Request) {
        let shutdown = request.payload.action == "shutdown";
        let response = self.handle(request).await;
        let ok = response.error.is_none();

        self.send(response);

        if shutdown && ok {
            self.begin_shutdown();
        }
    }

    /// Response to `request`, without sending it.
    pub(crate) async fn handle(&self, request: Request) -> Response {
        let Request {
            request_id,
            payload,
        } = request;

        let args = Args::parse(payload.args.as_ref());

        log::debug!("Handling {} request {:?}", payload.action, request_id);

        match self.dispatch(&payload.action, &args).await {
            Ok(value) => Response::success(request_id, value),
            Err(err) => {
                log::warn!("Request {} failed: {}", payload.action, err);
                Response::failure(request_id, err.to_string())
            }
        }
    }

    async fn dispatch(&self, action: &str, args: &Args) -> Result<Value, RequestError> {
        match action {
            "testReachability" => Ok(server::reachability()),
            "getPlayer" => self.get_player(args).await,
            "getPlayers" => self.get_players().await,
            "getPlayerInventory" => self.get_player_inventory(args).await,
            "getPlayerLocation" => self.get_player_location(args).await,
            "listItems" => self.list_items().await,
            "listBans" => self.list_bans().await,
            "sendMessage" => self.send_message(args).await,
            "giveItem" => self.give_item(args).await,
            "executeConsoleCommand" => self.execute_console_command(args).await,
            "kickPlayer" => self.kick_player(args).await,
            "banPlayer" => self.ban_player(args).await,
            "unbanPlayer" => self.unban_player(args).await,
            "shutdown" => Ok(Value::Null),
            _ => error::NotImplemented { action }.fail(),
        }
    }

    fn send(&self, response: Response) {
        if !self.outbound.is_authenticated() {
            log::warn!(
                "Cannot send response {:?}, not authenticated",
                response.request_id
            );
            return;
        }

        if let Err(err) = self.outbound.send(Message::Response(response)) {
            log::warn!("Send response failed: {}", err);
        }
    }
}

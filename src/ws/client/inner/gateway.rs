use std::time::Duration;

use snafu::prelude::*;
use tokio_tungstenite as websocket;

use super::{connected::ClientStateConnected, wait_shutdown, ClientInner, CONNECT_TIMEOUT};
use crate::ws::client::{CloseInfo, ConnectionManager};
use crate::ws::message::ABNORMAL_CLOSE_CODE;

/// Error when connect to websocket gateway
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConnectGatewayError {
    /// transport could not be established
    #[snafu(display("connect ws gateway {url} failed: {source}"))]
    Transport {
        /// connected url
        url: String,
        /// source error
        source: websocket::tungstenite::Error,
    },

    /// transport did not open in time
    #[snafu(display("connect ws gateway {url} timeout after {secs} seconds"))]
    Timeout {
        /// connected url
        url: String,
        /// timeout in seconds
        secs: u64,
    },

    /// shutdown requested while connecting
    #[snafu(display("connect ws gateway {url} aborted by shutdown"))]
    Aborted {
        /// connected url
        url: String,
    },
}

impl ConnectGatewayError {
    pub(crate) fn close_info(&self) -> CloseInfo {
        CloseInfo {
            code: ABNORMAL_CLOSE_CODE,
            reason: self.to_string(),
            remote: false,
        }
    }
}

#[derive(Debug)]
pub(crate) struct ClientStateGateway {
    pub manager: ConnectionManager,
}

impl ClientInner<ClientStateGateway> {
    pub async fn connect(self) -> Result<ClientInner<ClientStateConnected>, ConnectGatewayError> {
        let url = self.state.manager.shared().url.clone();
        let mut shutdown = self.state.manager.shutdown_signal();

        log::debug!("Connecting gateway: {}", url);

        let connect = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT),
            websocket::connect_async(url.as_str()),
        );

        let ws = tokio::select! {
            _ = wait_shutdown(&mut shutdown) => {
                return error::Aborted { url: url.as_str() }.fail();
            }
            result = connect => {
                result
                    .map_err(|_| {
                        log::warn!("Connect gateway timeout");
                        error::Timeout { url: url.as_str(), secs: CONNECT_TIMEOUT }.build()
                    })?
                    .map(|(client, _)| client)
                    .with_context(|_| error::Transport { url: url.as_str() })?
            }
        };

        log::debug!("Move to connected state");

        Ok(ClientInner {
            state: ClientStateConnected {
                manager: self.state.manager,
                ws,
            },
        })
    }
}

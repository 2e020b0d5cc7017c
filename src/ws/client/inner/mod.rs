mod connected;
mod gateway;
mod init;

pub(super) use init::ClientStateInit;

pub use gateway::ConnectGatewayError;

use tokio::sync::watch;

/// Seconds to wait for the transport to open
pub(crate) const CONNECT_TIMEOUT: u64 = 10;

#[derive(Debug)]
pub(crate) struct ClientInner<S> {
    pub state: S,
}

/// Resolves once shutdown was requested.
pub(crate) async fn wait_shutdown(signal: &mut watch::Receiver<bool>) {
    loop {
        if *signal.borrow() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

use super::{gateway::ClientStateGateway, wait_shutdown, ClientInner};
use crate::ws::client::ConnectionManager;

#[derive(Debug)]
pub(crate) struct ClientStateInit {
    pub manager: ConnectionManager,
}

impl ClientInner<ClientStateInit> {
    /// Connect, stream, and reconnect with backoff until told to stop.
    pub async fn run(self) {
        let manager = self.state.manager;
        let mut shutdown = manager.shutdown_signal();

        log::debug!("Connection task start");

        while !manager.is_shut_down() {
            manager.on_connecting();

            let gateway = ClientInner {
                state: ClientStateGateway {
                    manager: manager.clone(),
                },
            };

            let info = match gateway.connect().await {
                Ok(client) => client.streaming().await,
                Err(err) => {
                    manager.on_transport_error(&err);
                    err.close_info()
                }
            };

            let delay = match manager.on_transport_closed(info) {
                Some((_, delay)) => delay,
                None => break,
            };

            tokio::select! {
                _ = wait_shutdown(&mut shutdown) => {
                    log::debug!("Pending reconnect cancelled by shutdown");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    log::debug!("Reconnect delay elapsed");
                }
            }
        }

        log::debug!("Connection task stop");
    }
}

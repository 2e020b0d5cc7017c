use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::{wait_shutdown, ClientInner};
use crate::ws::{
    client::{CloseInfo, ConnectionManager, WebsocketClient, NORMAL_CLOSE_CODE},
    message::{MessageStreamSink, MessageStreamSinkError, ABNORMAL_CLOSE_CODE},
};

#[derive(Debug)]
pub(crate) struct ClientStateConnected {
    pub manager: ConnectionManager,
    pub ws: WebsocketClient,
}

fn broken(err: &MessageStreamSinkError) -> CloseInfo {
    CloseInfo {
        code: ABNORMAL_CLOSE_CODE,
        reason: err.to_string(),
        remote: false,
    }
}

impl ClientInner<ClientStateConnected> {
    /// Pump frames both ways until the transport goes away.
    pub async fn streaming(self) -> CloseInfo {
        let ClientStateConnected { manager, ws } = self.state;
        let mut shutdown = manager.shutdown_signal();

        let (mut sink, mut stream) =
            MessageStreamSink::new(ws, manager.shared().log_messages).split();
        let (tx, mut rx) = mpsc::unbounded_channel();

        log::debug!("Move to streaming state");
        manager.on_transport_opened(tx);

        loop {
            tokio::select! {
                biased;

                _ = wait_shutdown(&mut shutdown) => {
                    log::debug!("Closing transport for shutdown");

                    let closed = match sink.reunite(stream) {
                        Ok(mut ws) => ws.close_with(NORMAL_CLOSE_CODE, "shutdown").await,
                        Err(mut halves) => halves.0.close().await,
                    };
                    if let Err(err) = closed {
                        log::debug!("Close transport failed: {}", err);
                    }

                    return CloseInfo {
                        code: NORMAL_CLOSE_CODE,
                        reason: "shutdown".to_string(),
                        remote: false,
                    };
                }

                Some(message) = rx.recv() => {
                    log::trace!("Sending {} message", message.type_name());

                    if let Err(err) = sink.send(message).await {
                        if err.is_fatal() {
                            manager.on_transport_error(&err);
                            return broken(&err);
                        }
                        log::warn!("Send message failed: {}", err);
                    }
                }

                item = stream.next() => match item {
                    None => {
                        log::warn!("Message stream ended without close frame");
                        return CloseInfo {
                            code: ABNORMAL_CLOSE_CODE,
                            reason: String::new(),
                            remote: true,
                        };
                    }
                    Some(Ok(message)) => {
                        log::trace!("Received new {} message", message.type_name());
                        manager.on_message(message);
                    }
                    Some(Err(MessageStreamSinkError::Closed { code, reason })) => {
                        return CloseInfo { code, reason, remote: true };
                    }
                    Some(Err(err)) if err.is_fatal() => {
                        manager.on_transport_error(&err);
                        return broken(&err);
                    }
                    Some(Err(err)) => {
                        log::warn!("Message stream error happened but ignored: {}", err);
                    }
                },
            }
        }
    }
}

use std::task::Poll;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::tungstenite::{
    self as websocket,
    protocol::{frame::coding::CloseCode, CloseFrame},
};

use super::{Message, ParseMessageError};
use crate::ws::client::WebsocketClient;

/// Close code reported when the peer vanished without a close frame
pub const ABNORMAL_CLOSE_CODE: u16 = 1006;

/// Error when read/write message stream/sink
#[derive(Debug, Snafu)]
#[snafu(module(error), context(suffix(false)))]
pub enum MessageStreamSinkError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: websocket::Error,
    },

    /// peer sent a close frame
    #[snafu(display("connection closed by peer, code {code}, reason: {reason}"))]
    Closed {
        /// close code
        code: u16,
        /// close reason
        reason: String,
    },

    /// received a frame that carries no message
    #[snafu(display("received a non-message frame"))]
    NotMessageFrame,

    /// received a binary frame that is not utf8
    #[snafu(display("received a binary frame that is not utf8 text"))]
    NotUtf8Frame,

    /// parse text message data failed
    #[snafu(display("parse frame to message failed: {source}"))]
    ParseMessageFailed {
        /// source error
        source: ParseMessageError,
    },

    /// serialize an outgoing message failed
    #[snafu(display("encode {type_name} message failed: {source}"))]
    EncodeMessageFailed {
        /// type name of the message
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

impl MessageStreamSinkError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Websocket { .. } | Self::Closed { .. } => true,
            Self::NotMessageFrame
            | Self::NotUtf8Frame
            | Self::ParseMessageFailed { .. }
            | Self::EncodeMessageFailed { .. } => false,
        }
    }
}

/// Websocket message stream/sink over text frames
#[derive(Debug)]
pub struct MessageStreamSink {
    ws: WebsocketClient,
    log_messages: bool,
}

impl MessageStreamSink {
    /// Construct a new stream with underlying websocket connection.
    ///
    /// the `log_messages` argument makes every raw frame show up in the log.
    pub fn new(ws: WebsocketClient, log_messages: bool) -> Self {
        Self { ws, log_messages }
    }

    /// Send a close frame carrying `code` and `reason`.
    pub async fn close_with(&mut self, code: u16, reason: &str) -> Result<(), MessageStreamSinkError> {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };

        self.ws.close(Some(frame)).await.context(error::Websocket)
    }

    fn decode(&self, text: &str) -> Result<Message, MessageStreamSinkError> {
        if self.log_messages {
            log::info!("Received message: {}", text);
        }

        Message::decode(text).map_err(|e| {
            log::trace!("Parse failed message data: {}", text);
            MessageStreamSinkError::ParseMessageFailed { source: e }
        })
    }
}

impl Stream for MessageStreamSink {
    type Item = Result<Message, MessageStreamSinkError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        match self.ws.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Ready(Some(Err(e))) => {
                Poll::Ready(Some(Err(MessageStreamSinkError::Websocket { source: e })))
            }
            Poll::Ready(Some(Ok(frame))) => {
                let result = match frame {
                    websocket::Message::Text(text) => self.decode(&text),
                    websocket::Message::Binary(data) => match String::from_utf8(data) {
                        Ok(text) => self.decode(&text),
                        Err(_) => Err(MessageStreamSinkError::NotUtf8Frame),
                    },
                    websocket::Message::Close(frame) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((ABNORMAL_CLOSE_CODE, String::new()));
                        Err(MessageStreamSinkError::Closed { code, reason })
                    }
                    _ => Err(MessageStreamSinkError::NotMessageFrame),
                };
                Poll::Ready(Some(result))
            }
        }
    }
}

impl Sink<Message> for MessageStreamSink {
    type Error = MessageStreamSinkError;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn start_send(mut self: std::pin::Pin<&mut Self>, item: Message) -> Result<(), Self::Error> {
        let text = item.encode().context(error::EncodeMessageFailed {
            type_name: item.type_name(),
        })?;

        if self.log_messages {
            log::info!("Sending message: {}", text);
        }

        self.ws
            .start_send_unpin(websocket::Message::Text(text))
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }
}

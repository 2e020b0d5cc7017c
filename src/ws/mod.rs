//! Management service websocket protocol client

mod client;
pub mod message;

pub use client::{
    ConnectGatewayError, ConnectionManager, ConnectionSettings, Credentials, LinkState, Outbound,
    SendError, NORMAL_CLOSE_CODE,
};
pub use message::Message;

//! # Gamelink
//!
//! Control-plane link between a game server and a remote management service.
//!
//! The game server dials out over a websocket, identifies itself, answers
//! the service's requests against the game through a [`platform::GamePlatform`]
//! and pushes game events and server log lines back.
//!
//! A host implements [`platform::GamePlatform`], drains a
//! [`platform::MainContextRunner`] on its game thread and starts a [`Link`].

#![deny(warnings)]
#![deny(clippy::all)]
#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod backoff;
pub mod config;
pub mod events;
pub mod forwarder;
pub mod link;
pub mod log_filter;
pub mod platform;
pub mod router;
pub mod ws;

mod error;
pub use error::{Error, Result};

#[cfg(test)]
mod testing;

pub use config::{ConfigHandle, LinkConfig};
pub use events::GameEvent;
pub use forwarder::EventForwarder;
pub use link::{Link, LinkStatus};

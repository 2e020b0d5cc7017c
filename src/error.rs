//! crate level error types

use snafu::prelude::*;

use crate::config::ParseGatewayUrlError;

/// crate result type
pub type Result<T> = std::result::Result<T, Error>;

/// crate level error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Configured websocket gateway url is unusable
    #[snafu(display("invalid gateway url {url}: {source}"))]
    InvalidGatewayURL {
        /// configured url
        url: String,
        /// source error
        source: ParseGatewayUrlError,
    },

    /// A global logger was already installed
    #[snafu(display("install log forwarding failed: {source}"))]
    InstallLogger {
        /// source error
        source: log::SetLoggerError,
    },
}

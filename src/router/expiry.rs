use chrono::{DateTime, Utc};
use snafu::prelude::*;

use super::{error, RequestError};

// numeric offsets with or without colon, and bare hours like `+01`
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%.f%#z"];

/// Parse a ban expiry timestamp.
///
/// Accepts `Z` or a numeric offset, with or without fractional seconds.
pub(crate) fn parse_expires_at(s: &str) -> Result<DateTime<Utc>, RequestError> {
    let s = s.trim();

    DateTime::parse_from_rfc3339(s)
        .ok()
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|format| DateTime::parse_from_str(s, format).ok())
        })
        .map(|t| t.with_timezone(&Utc))
        .context(error::InvalidExpiresAt)
}

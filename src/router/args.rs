use serde_json::{Map, Value};
use snafu::prelude::*;

use super::{error, RequestError};
use crate::platform::PlayerId;

/// Decoded request arguments, an empty set when absent or malformed.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Args(Map<String, Value>);

impl Args {
    /// `raw` is normally a json document encoded as a string, a plain object is also accepted.
    pub fn parse(raw: Option<&Value>) -> Self {
        let value = match raw {
            None | Some(Value::Null) => return Self::default(),
            Some(Value::String(s)) => match serde_json::from_str(s) {
                Ok(value) => value,
                Err(err) => {
                    log::warn!("Failed to parse args from message: {}", err);
                    return Self::default();
                }
            },
            Some(other) => other.clone(),
        };

        match value {
            Value::Object(map) => Self(map),
            other => {
                log::warn!("Request args is not an object: {}", other);
                Self::default()
            }
        }
    }

    /// Present and not null.
    pub fn has(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// Scalar argument as text, numbers and booleans included.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn required_text(&self, name: &str) -> Result<String, RequestError> {
        self.text(name)
            .with_context(|| error::ParameterRequired { name })
    }

    pub fn non_empty_text(&self, name: &str) -> Result<String, RequestError> {
        let text = self.required_text(name)?;
        ensure!(!text.trim().is_empty(), error::ParameterEmpty { name });
        Ok(text)
    }

    /// Nested object argument.
    pub fn object(&self, name: &str) -> Option<Args> {
        match self.get(name)? {
            Value::Object(map) => Some(Self(map.clone())),
            _ => None,
        }
    }

    /// Top level `name` holding a game id.
    pub fn game_id(&self, name: &str) -> Result<PlayerId, RequestError> {
        parse_game_id(&self.required_text(name)?)
    }

    /// `player.gameId`.
    pub fn player(&self) -> Result<PlayerId, RequestError> {
        ensure!(
            self.has("player"),
            error::ParameterRequired { name: "player" }
        );

        let id = self
            .object("player")
            .and_then(|player| player.text("gameId"))
            .context(error::PlayerWithoutGameId)?;

        parse_game_id(&id)
    }
}

pub(crate) fn parse_game_id(s: &str) -> Result<PlayerId, RequestError> {
    PlayerId::parse_str(s.trim())
        .ok()
        .context(error::InvalidGameId)
}

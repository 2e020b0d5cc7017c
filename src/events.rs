//! Game happenings pushed to the management service.

use serde::Serialize;

use crate::platform::{Location, PlayerId, PlayerRecord};

/// Player identity carried by events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRef {
    /// game id
    pub game_id: PlayerId,
    /// display name
    pub name: String,
    /// platform qualified id
    pub platform_id: String,
}

impl From<&PlayerRecord> for PlayerRef {
    fn from(record: &PlayerRecord) -> Self {
        Self {
            game_id: record.game_id,
            name: record.name.clone(),
            platform_id: record.platform_id.clone(),
        }
    }
}

/// A killed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityInfo {
    /// entity kind code, like `ZOMBIE`
    #[serde(rename = "type")]
    pub kind: String,
    /// readable name
    pub name: String,
}

/// Item a player held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeaponInfo {
    /// item code
    pub code: String,
    /// readable name
    pub name: String,
}

/// Readable form of a code, `CAVE_SPIDER` -> `cave spider`.
fn readable(code: &str) -> String {
    code.to_lowercase().replace('_', " ")
}

impl EntityInfo {
    /// Entity with its readable name derived from the code.
    pub fn from_code(code: &str) -> Self {
        Self {
            kind: code.to_string(),
            name: readable(code),
        }
    }
}

impl WeaponInfo {
    /// Weapon with its readable name derived from the code.
    pub fn from_code(code: &str) -> Self {
        Self {
            code: code.to_string(),
            name: readable(code),
        }
    }
}

/// Something worth telling the management service about.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum GameEvent {
    /// player joined
    PlayerConnected {
        /// who, with ping and address
        player: PlayerRecord,
    },

    /// player left
    PlayerDisconnected {
        /// who
        player: PlayerRef,
    },

    /// chat line
    ChatMessage {
        /// author
        player: PlayerRef,
        /// always `global`, the game has a single channel
        channel: String,
        /// message text
        msg: String,
    },

    /// player died
    PlayerDeath {
        /// who died
        player: PlayerRef,
        /// killer, when it was a player
        #[serde(skip_serializing_if = "Option::is_none")]
        attacker: Option<PlayerRef>,
        /// where
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Location>,
    },

    /// player killed an entity
    EntityKilled {
        /// killer
        player: PlayerRef,
        /// victim
        entity: EntityInfo,
        /// held item, absent when empty handed
        #[serde(skip_serializing_if = "Option::is_none")]
        weapon: Option<WeaponInfo>,
    },

    /// forwarded server log line
    Log {
        /// formatted line
        msg: String,
    },
}

impl GameEvent {
    /// Chat message on the global channel.
    pub fn chat(player: PlayerRef, msg: impl Into<String>) -> Self {
        Self::ChatMessage {
            player,
            channel: "global".to_string(),
            msg: msg.into(),
        }
    }

    /// Wire name of the event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::PlayerConnected { .. } => "player-connected",
            Self::PlayerDisconnected { .. } => "player-disconnected",
            Self::ChatMessage { .. } => "chat-message",
            Self::PlayerDeath { .. } => "player-death",
            Self::EntityKilled { .. } => "entity-killed",
            Self::Log { .. } => "log",
        }
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;

    use super::*;

    fn alex() -> PlayerRecord {
        PlayerRecord {
            game_id: PlayerId::from_u128(1),
            name: "alex".to_string(),
            platform_id: "memory:1".to_string(),
            ping: Some(12),
            ip: None,
        }
    }

    #[test]
    fn test_event_shapes() {
        let id = PlayerId::from_u128(1).to_string();
        let player = PlayerRef::from(&alex());

        assert_eq!(
            serde_json::to_value(GameEvent::chat(player.clone(), "gg")).unwrap(),
            json!({
                "type": "chat-message",
                "data": {
                    "player": { "gameId": id, "name": "alex", "platformId": "memory:1" },
                    "channel": "global",
                    "msg": "gg",
                },
            })
        );

        assert_eq!(
            serde_json::to_value(GameEvent::PlayerConnected { player: alex() }).unwrap()["data"]
                ["player"]["ping"],
            json!(12)
        );

        let killed = GameEvent::EntityKilled {
            player,
            entity: EntityInfo::from_code("CAVE_SPIDER"),
            weapon: None,
        };
        assert_eq!(
            serde_json::to_value(&killed).unwrap()["data"],
            json!({
                "player": { "gameId": id, "name": "alex", "platformId": "memory:1" },
                "entity": { "type": "CAVE_SPIDER", "name": "cave spider" },
            })
        );
    }

    #[test]
    fn test_type_name_matches_tag() {
        let player = PlayerRef::from(&alex());
        let events = [
            GameEvent::PlayerConnected { player: alex() },
            GameEvent::PlayerDisconnected {
                player: player.clone(),
            },
            GameEvent::chat(player.clone(), "hi"),
            GameEvent::PlayerDeath {
                player,
                attacker: None,
                position: None,
            },
            GameEvent::Log {
                msg: "x".to_string(),
            },
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.type_name());
        }
    }
}

use serde::Serialize;
use serde_json::Value;
use snafu::prelude::*;

use super::{
    args::{parse_game_id, Args},
    error,
    expiry::parse_expires_at,
    items::InventoryEntry,
    RequestError, RequestRouter,
};
use crate::platform::{BanEntry, PlatformError, PlayerId};

const DEFAULT_KICK_REASON: &str = "Kicked by administrator";
const DEFAULT_BAN_REASON: &str = "Banned by administrator";
const UNKNOWN_BAN_REASON: &str = "No reason specified";

// identity providers this platform never fills in
const FOREIGN_IDS: [&str; 3] = ["steamId", "epicOnlineServicesId", "xboxLiveId"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BanListing {
    game_id: PlayerId,
    name: String,
    reason: String,
}

impl From<BanEntry> for BanListing {
    fn from(entry: BanEntry) -> Self {
        Self {
            game_id: entry.game_id,
            name: entry.name,
            reason: entry
                .reason
                .unwrap_or_else(|| UNKNOWN_BAN_REASON.to_string()),
        }
    }
}

impl RequestRouter {
    pub(super) async fn get_player(&self, args: &Args) -> Result<Value, RequestError> {
        let id = args.game_id("gameId")?;

        let record = self
            .context
            .run(move |p| p.online_player(id))
            .await
            .context(error::Context)?;

        let record = match record {
            Some(record) => record,
            None => return Ok(Value::Null),
        };

        log::info!("Responding to getPlayer for: {}", record.name);

        let mut value = serde_json::to_value(record).context(error::Encode)?;
        if let Value::Object(ref mut map) = value {
            for key in FOREIGN_IDS {
                map.insert(key.to_string(), Value::Null);
            }
        }
        Ok(value)
    }

    pub(super) async fn get_players(&self) -> Result<Value, RequestError> {
        let players = self
            .context
            .run(|p| p.online_players())
            .await
            .context(error::Context)?;

        log::info!("Responding to getPlayers: {} players online", players.len());

        serde_json::to_value(players).context(error::Encode)
    }

    pub(super) async fn get_player_inventory(&self, args: &Args) -> Result<Value, RequestError> {
        let id = args.game_id("gameId")?;

        let entries = self
            .context
            .run(move |p| -> Result<Vec<InventoryEntry>, PlatformError> {
                Ok(p.inventory(id)?
                    .iter()
                    .filter(|stack| stack.amount > 0)
                    .map(InventoryEntry::from)
                    .collect())
            })
            .await
            .context(error::Context)??;

        log::info!("Responding to getPlayerInventory: {} items", entries.len());

        serde_json::to_value(entries).context(error::Encode)
    }

    pub(super) async fn get_player_location(&self, args: &Args) -> Result<Value, RequestError> {
        let id = args.game_id("gameId")?;

        let location = self
            .context
            .run(move |p| p.location(id))
            .await
            .context(error::Context)??;

        serde_json::to_value(location).context(error::Encode)
    }

    pub(super) async fn list_bans(&self) -> Result<Value, RequestError> {
        let bans: Vec<BanListing> = self
            .context
            .run(|p| p.bans().into_iter().map(BanListing::from).collect())
            .await
            .context(error::Context)?;

        log::info!("Responding to listBans: {} banned players", bans.len());

        serde_json::to_value(bans).context(error::Encode)
    }

    pub(super) async fn kick_player(&self, args: &Args) -> Result<Value, RequestError> {
        let id = args.player()?;
        let reason = args
            .text("reason")
            .unwrap_or_else(|| DEFAULT_KICK_REASON.to_string());

        self.context
            .run(move |p| -> Result<(), PlatformError> {
                let player = p.online_player(id).ok_or(PlatformError::PlayerOffline)?;

                log::info!("Kicking player: {} - Reason: {}", player.name, reason);
                p.kick(id, &reason)
            })
            .await
            .context(error::Context)??;

        Ok(Value::Null)
    }

    pub(super) async fn ban_player(&self, args: &Args) -> Result<Value, RequestError> {
        let id = args.player()?;
        let reason = args
            .text("reason")
            .unwrap_or_else(|| DEFAULT_BAN_REASON.to_string());
        let expires_at = match args.text("expiresAt") {
            Some(s) => Some(parse_expires_at(&s)?),
            None => None,
        };

        self.context
            .run(move |p| -> Result<(), PlatformError> {
                let name = p.known_player_name(id).ok_or(PlatformError::PlayerUnknown)?;

                log::info!(
                    "Banning player: {} - Reason: {} - {}",
                    name,
                    reason,
                    expires_at.map_or("Permanent".to_string(), |t| format!("Expires: {}", t))
                );

                p.ban(id, &reason, expires_at)?;

                if p.online_player(id).is_some() {
                    if let Err(err) = p.kick(id, &format!("You have been banned: {}", reason)) {
                        log::warn!("Kick banned player {} failed: {}", name, err);
                    }
                }
                Ok(())
            })
            .await
            .context(error::Context)??;

        Ok(Value::Null)
    }

    pub(super) async fn unban_player(&self, args: &Args) -> Result<Value, RequestError> {
        let id = parse_game_id(&args.non_empty_text("gameId")?)?;

        self.context
            .run(move |p| -> Result<(), PlatformError> {
                let name = p.known_player_name(id).ok_or(PlatformError::PlayerUnknown)?;
                if !p.is_banned(id) {
                    return Err(PlatformError::NotBanned);
                }

                log::info!("Unbanning player: {}", name);
                p.unban(id)
            })
            .await
            .context(error::Context)??;

        Ok(Value::Null)
    }
}

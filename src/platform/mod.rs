//! Game platform capability interface.
//!
//! The link never touches game state itself, it calls into a
//! [`GamePlatform`] the host implements. Every call is made from the
//! host's main execution context, see [`context`].

pub mod context;
mod memory;

pub use context::{ContextError, MainContext, MainContextRunner};
pub use memory::{Journal, MemoryPlatform, PlatformAction};

use chrono::{DateTime, Utc};
use serde::Serialize;
use snafu::prelude::*;

/// Game id of a player.
pub type PlayerId = uuid::Uuid;

/// Error returned by platform capabilities
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(platform_error), context(suffix(false)))]
pub enum PlatformError {
    /// the player is not connected
    #[snafu(display("Player not found or offline"))]
    PlayerOffline,

    /// the player never joined this server
    #[snafu(display("Player not found"))]
    PlayerUnknown,

    /// the player is not on the ban list
    #[snafu(display("Player is not banned"))]
    NotBanned,

    /// platform refused the operation
    #[snafu(display("{message}"))]
    Rejected {
        /// reason for human read
        message: String,
    },
}

/// A connected or known player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    /// game id
    pub game_id: PlayerId,
    /// display name
    pub name: String,
    /// platform qualified id, like `minecraft:<uuid>`
    pub platform_id: String,
    /// round trip latency in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<u32>,
    /// remote address
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// World position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    /// x coordinate
    pub x: f64,
    /// y coordinate
    pub y: f64,
    /// z coordinate
    pub z: f64,
    /// world name
    pub world: String,
}

/// Entry of the static item catalogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemType {
    /// item code, like `DIAMOND_SWORD`
    pub code: String,
    /// zero when the item does not degrade
    pub max_durability: u16,
    /// placeable block
    pub is_block: bool,
    /// can exist as an inventory item
    pub is_item: bool,
}

/// A stack of items in an inventory slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStack {
    /// item code
    pub code: String,
    /// stack size
    pub amount: u32,
    /// used durability, zero is pristine
    pub damage: u16,
    /// zero when the item does not degrade
    pub max_durability: u16,
}

impl ItemStack {
    /// Pristine stack of `item`.
    pub fn new(item: &ItemType, amount: u32) -> Self {
        Self {
            code: item.code.clone(),
            amount,
            damage: 0,
            max_durability: item.max_durability,
        }
    }
}

/// Ban list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    /// banned player
    pub game_id: PlayerId,
    /// last known name
    pub name: String,
    /// ban reason
    pub reason: Option<String>,
    /// expiry, permanent when absent
    pub expires_at: Option<DateTime<Utc>>,
}

/// Operations the link performs against the game.
///
/// Implementations may assume every call happens on the main execution
/// context, never concurrently.
pub trait GamePlatform {
    /// Connected player by id.
    fn online_player(&self, id: PlayerId) -> Option<PlayerRecord>;

    /// All connected players.
    fn online_players(&self) -> Vec<PlayerRecord>;

    /// Name of a player that joined at least once, online or not.
    fn known_player_name(&self, id: PlayerId) -> Option<String>;

    /// Non-empty inventory slots of a connected player.
    fn inventory(&self, id: PlayerId) -> Result<Vec<ItemStack>, PlatformError>;

    /// Position of a connected player.
    fn location(&self, id: PlayerId) -> Result<Location, PlatformError>;

    /// Every item type known to the game.
    fn item_catalogue(&self) -> Vec<ItemType>;

    /// Item type by exact code.
    fn item_type(&self, code: &str) -> Option<ItemType>;

    /// Current ban list.
    fn bans(&self) -> Vec<BanEntry>;

    /// True if the player is on the ban list.
    fn is_banned(&self, id: PlayerId) -> bool;

    /// Message every connected player.
    fn broadcast(&mut self, message: &str);

    /// Message a single connected player.
    fn whisper(&mut self, id: PlayerId, message: &str) -> Result<(), PlatformError>;

    /// Put items into a player's inventory.
    ///
    /// Returns what did not fit as one stack, its amount may exceed the
    /// game's stack size.
    fn give_item(&mut self, id: PlayerId, stack: ItemStack)
        -> Result<Option<ItemStack>, PlatformError>;

    /// Drop items at a player's feet.
    fn drop_item(&mut self, id: PlayerId, stack: ItemStack) -> Result<(), PlatformError>;

    /// Disconnect a player.
    fn kick(&mut self, id: PlayerId, reason: &str) -> Result<(), PlatformError>;

    /// Add a player to the ban list.
    fn ban(
        &mut self,
        id: PlayerId,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError>;

    /// Remove a player from the ban list.
    fn unban(&mut self, id: PlayerId) -> Result<(), PlatformError>;

    /// Run a console command, true if the game accepted it.
    fn execute_command(&mut self, command: &str) -> Result<bool, PlatformError>;

    /// Persist all worlds.
    fn save_worlds(&mut self) -> Result<(), PlatformError>;

    /// Stop the host process.
    fn terminate(&mut self);
}

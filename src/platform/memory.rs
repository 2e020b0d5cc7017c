//! In-memory [`GamePlatform`], for dry runs and tests.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{
    BanEntry, GamePlatform, ItemStack, ItemType, Location, PlatformError, PlayerId, PlayerRecord,
};

const MAX_STACK_SIZE: u32 = 64;
const DEFAULT_SLOT_CAPACITY: usize = 36;

/// A mutation observed by [`MemoryPlatform`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformAction {
    /// message to everyone
    Broadcast(String),
    /// message to one player
    Whisper {
        /// receiver
        player: PlayerId,
        /// message text
        message: String,
    },
    /// items put into an inventory
    Give {
        /// receiver
        player: PlayerId,
        /// given stack
        stack: ItemStack,
    },
    /// items dropped next to a player
    Drop {
        /// player the items were dropped at
        player: PlayerId,
        /// dropped stack
        stack: ItemStack,
    },
    /// player disconnected
    Kick {
        /// kicked player
        player: PlayerId,
        /// message shown to the player
        reason: String,
    },
    /// player banned
    Ban {
        /// banned player
        player: PlayerId,
        /// ban reason
        reason: String,
        /// ban expiry
        expires_at: Option<DateTime<Utc>>,
    },
    /// player unbanned
    Unban {
        /// pardoned player
        player: PlayerId,
    },
    /// console command
    Command(String),
    /// worlds persisted
    SaveWorlds,
    /// process terminated
    Terminate,
}

/// Shared record of every [`PlatformAction`], in order.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    actions: Arc<Mutex<Vec<PlatformAction>>>,
}

impl Journal {
    fn record(&self, action: PlatformAction) {
        self.actions.lock().push(action);
    }

    /// Snapshot of the recorded actions.
    pub fn actions(&self) -> Vec<PlatformAction> {
        self.actions.lock().clone()
    }
}

#[derive(Debug)]
struct MemoryPlayer {
    record: PlayerRecord,
    online: bool,
    inventory: Vec<ItemStack>,
    location: Location,
}

/// Game platform that keeps everything in memory.
#[derive(Debug)]
pub struct MemoryPlatform {
    players: BTreeMap<PlayerId, MemoryPlayer>,
    items: BTreeMap<String, ItemType>,
    bans: BTreeMap<PlayerId, BanEntry>,
    commands: Vec<String>,
    slot_capacity: usize,
    journal: Journal,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

fn item(code: &str, max_durability: u16, is_block: bool, is_item: bool) -> ItemType {
    ItemType {
        code: code.to_string(),
        max_durability,
        is_block,
        is_item,
    }
}

impl MemoryPlatform {
    /// Empty world with a small item catalogue.
    pub fn new() -> Self {
        let items = [
            item("STONE", 0, true, true),
            item("OAK_LOG", 0, true, true),
            item("APPLE", 0, false, true),
            item("DIAMOND_SWORD", 1561, false, true),
            item("IRON_PICKAXE", 250, false, true),
            item("IRON_HELMET", 165, false, true),
            item("WATER", 0, true, false),
        ];

        Self {
            players: BTreeMap::new(),
            items: items.into_iter().map(|i| (i.code.clone(), i)).collect(),
            bans: BTreeMap::new(),
            commands: vec!["say".to_string(), "time".to_string()],
            slot_capacity: DEFAULT_SLOT_CAPACITY,
            journal: Journal::default(),
        }
    }

    /// Add a player, returns its record.
    pub fn add_player(&mut self, id: PlayerId, name: &str, online: bool) -> PlayerRecord {
        let record = PlayerRecord {
            game_id: id,
            name: name.to_string(),
            platform_id: format!("memory:{}", id),
            ping: online.then_some(20),
            ip: online.then(|| "127.0.0.1".to_string()),
        };

        self.players.insert(
            id,
            MemoryPlayer {
                record: record.clone(),
                online,
                inventory: Vec::new(),
                location: Location {
                    x: 0.0,
                    y: 64.0,
                    z: 0.0,
                    world: "world".to_string(),
                },
            },
        );

        record
    }

    /// Replace a player's inventory.
    pub fn set_inventory(&mut self, id: PlayerId, inventory: Vec<ItemStack>) {
        if let Some(player) = self.players.get_mut(&id) {
            player.inventory = inventory;
        }
    }

    /// Add an item type to the catalogue.
    pub fn add_item(&mut self, item: ItemType) {
        self.items.insert(item.code.clone(), item);
    }

    /// Limit inventories to `slots` stacks.
    pub fn set_slot_capacity(&mut self, slots: usize) {
        self.slot_capacity = slots;
    }

    /// Handle to the action journal.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn online(&self, id: PlayerId) -> Result<&MemoryPlayer, PlatformError> {
        self.players
            .get(&id)
            .filter(|p| p.online)
            .ok_or(PlatformError::PlayerOffline)
    }

    fn online_mut(&mut self, id: PlayerId) -> Result<&mut MemoryPlayer, PlatformError> {
        self.players
            .get_mut(&id)
            .filter(|p| p.online)
            .ok_or(PlatformError::PlayerOffline)
    }
}

impl GamePlatform for MemoryPlatform {
    fn online_player(&self, id: PlayerId) -> Option<PlayerRecord> {
        self.online(id).ok().map(|p| p.record.clone())
    }

    fn online_players(&self) -> Vec<PlayerRecord> {
        self.players
            .values()
            .filter(|p| p.online)
            .map(|p| p.record.clone())
            .collect()
    }

    fn known_player_name(&self, id: PlayerId) -> Option<String> {
        self.players.get(&id).map(|p| p.record.name.clone())
    }

    fn inventory(&self, id: PlayerId) -> Result<Vec<ItemStack>, PlatformError> {
        Ok(self.online(id)?.inventory.clone())
    }

    fn location(&self, id: PlayerId) -> Result<Location, PlatformError> {
        Ok(self.online(id)?.location.clone())
    }

    fn item_catalogue(&self) -> Vec<ItemType> {
        self.items.values().cloned().collect()
    }

    fn item_type(&self, code: &str) -> Option<ItemType> {
        self.items.get(code).cloned()
    }

    fn bans(&self) -> Vec<BanEntry> {
        self.bans.values().cloned().collect()
    }

    fn is_banned(&self, id: PlayerId) -> bool {
        self.bans.contains_key(&id)
    }

    fn broadcast(&mut self, message: &str) {
        self.journal
            .record(PlatformAction::Broadcast(message.to_string()));
    }

    fn whisper(&mut self, id: PlayerId, message: &str) -> Result<(), PlatformError> {
        self.online(id)?;
        self.journal.record(PlatformAction::Whisper {
            player: id,
            message: message.to_string(),
        });
        Ok(())
    }

    fn give_item(
        &mut self,
        id: PlayerId,
        stack: ItemStack,
    ) -> Result<Option<ItemStack>, PlatformError> {
        let capacity = self.slot_capacity;
        let player = self.online_mut(id)?;

        let mut left = stack.amount;
        while left > 0 && player.inventory.len() < capacity {
            let amount = left.min(MAX_STACK_SIZE);
            player.inventory.push(ItemStack {
                amount,
                ..stack.clone()
            });
            left -= amount;
        }

        self.journal.record(PlatformAction::Give {
            player: id,
            stack: ItemStack {
                amount: stack.amount - left,
                ..stack.clone()
            },
        });

        Ok((left > 0).then(|| ItemStack {
            amount: left,
            ..stack
        }))
    }

    fn drop_item(&mut self, id: PlayerId, stack: ItemStack) -> Result<(), PlatformError> {
        self.online(id)?;
        self.journal
            .record(PlatformAction::Drop { player: id, stack });
        Ok(())
    }

    fn kick(&mut self, id: PlayerId, reason: &str) -> Result<(), PlatformError> {
        self.online_mut(id)?.online = false;
        self.journal.record(PlatformAction::Kick {
            player: id,
            reason: reason.to_string(),
        });
        Ok(())
    }

    fn ban(
        &mut self,
        id: PlayerId,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError> {
        let name = self
            .known_player_name(id)
            .ok_or(PlatformError::PlayerUnknown)?;

        self.bans.insert(
            id,
            BanEntry {
                game_id: id,
                name,
                reason: Some(reason.to_string()),
                expires_at,
            },
        );
        self.journal.record(PlatformAction::Ban {
            player: id,
            reason: reason.to_string(),
            expires_at,
        });
        Ok(())
    }

    fn unban(&mut self, id: PlayerId) -> Result<(), PlatformError> {
        self.bans.remove(&id).ok_or(PlatformError::NotBanned)?;
        self.journal.record(PlatformAction::Unban { player: id });
        Ok(())
    }

    fn execute_command(&mut self, command: &str) -> Result<bool, PlatformError> {
        self.journal
            .record(PlatformAction::Command(command.to_string()));

        let name = command
            .trim_start_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default();

        Ok(self.commands.iter().any(|c| c == name))
    }

    fn save_worlds(&mut self) -> Result<(), PlatformError> {
        self.journal.record(PlatformAction::SaveWorlds);
        Ok(())
    }

    fn terminate(&mut self) {
        self.journal.record(PlatformAction::Terminate);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_give_item_overflow_is_returned() {
        let mut platform = MemoryPlatform::new();
        let id = PlayerId::from_u128(1);
        platform.add_player(id, "alex", true);
        platform.set_slot_capacity(2);

        let stone = platform.item_type("STONE").unwrap();
        let leftover = platform
            .give_item(id, ItemStack::new(&stone, 200))
            .unwrap();

        assert_eq!(platform.inventory(id).unwrap().len(), 2);
        assert_eq!(leftover.unwrap().amount, 72);
    }

    #[test]
    fn test_give_item_huge_amount_overflows_as_one_stack() {
        let mut platform = MemoryPlatform::new();
        let id = PlayerId::from_u128(1);
        platform.add_player(id, "alex", true);

        let stone = platform.item_type("STONE").unwrap();
        let leftover = platform
            .give_item(id, ItemStack::new(&stone, u32::MAX))
            .unwrap()
            .unwrap();

        assert_eq!(platform.inventory(id).unwrap().len(), DEFAULT_SLOT_CAPACITY);
        assert_eq!(
            leftover.amount,
            u32::MAX - DEFAULT_SLOT_CAPACITY as u32 * MAX_STACK_SIZE
        );
    }

    #[test]
    fn test_offline_player_is_not_reachable() {
        let mut platform = MemoryPlatform::new();
        let id = PlayerId::from_u128(2);
        platform.add_player(id, "steve", false);

        assert!(platform.online_player(id).is_none());
        assert_eq!(platform.known_player_name(id).as_deref(), Some("steve"));
        assert!(matches!(
            platform.kick(id, "bye"),
            Err(PlatformError::PlayerOffline)
        ));
    }
}

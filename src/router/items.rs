use serde::Serialize;
use serde_json::Value;
use snafu::prelude::*;

use super::{
    args::{parse_game_id, Args},
    error, RequestError, RequestRouter,
};
use crate::platform::{ItemStack, ItemType, PlatformError};

/// Coarse kind of an item, guessed from its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ItemCategory {
    Block,
    Tool,
    Armor,
    Generic,
}

impl ItemCategory {
    pub fn of(item: &ItemType) -> Self {
        const TOOLS: [&str; 4] = ["SWORD", "AXE", "PICKAXE", "SHOVEL"];
        const ARMOR: [&str; 4] = ["HELMET", "CHESTPLATE", "LEGGINGS", "BOOTS"];

        if item.is_block {
            Self::Block
        } else if TOOLS.iter().any(|t| item.code.contains(t)) {
            Self::Tool
        } else if ARMOR.iter().any(|a| item.code.contains(a)) {
            Self::Armor
        } else {
            Self::Generic
        }
    }

    pub fn describe(self, name: &str) -> String {
        let name = name.to_lowercase();
        match self {
            Self::Block => format!("A {} block", name),
            Self::Tool => format!("A {} tool", name),
            Self::Armor => format!("A piece of {} armor", name),
            Self::Generic => format!("A {}", name),
        }
    }
}

/// `DIAMOND_SWORD` -> `diamond sword`
pub(crate) fn plain_name(code: &str) -> String {
    code.to_lowercase().replace('_', " ")
}

/// `DIAMOND_SWORD` -> `Diamond sword`
pub(crate) fn display_name(code: &str) -> String {
    let name = plain_name(code);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => name,
    }
}

/// Remaining integrity in percent, as text.
pub(crate) fn quality(stack: &ItemStack) -> String {
    if stack.max_durability == 0 {
        return "100".to_string();
    }

    let remaining = stack.max_durability.saturating_sub(stack.damage);
    let percent = f64::from(remaining) / f64::from(stack.max_durability) * 100.0;
    (percent as u32).to_string()
}

/// Damage leaving `quality` percent of `max_durability`, quality is clamped to 0..=100.
pub(crate) fn damage_for_quality(max_durability: u16, quality: f64) -> u16 {
    let quality = if (0.0..=100.0).contains(&quality) {
        quality
    } else {
        log::warn!("Quality value out of range (0-100): {}", quality);
        quality.clamp(0.0, 100.0)
    };

    let remaining = (f64::from(max_durability) * (quality / 100.0)) as u16;
    max_durability - remaining
}

#[derive(Debug, Serialize)]
pub(crate) struct InventoryEntry {
    code: String,
    name: String,
    amount: u32,
    quality: String,
}

impl From<&ItemStack> for InventoryEntry {
    fn from(stack: &ItemStack) -> Self {
        Self {
            code: stack.code.clone(),
            name: plain_name(&stack.code),
            amount: stack.amount,
            quality: quality(stack),
        }
    }
}

#[derive(Debug, Serialize)]
struct CatalogueEntry {
    code: String,
    name: String,
    description: String,
}

impl From<&ItemType> for CatalogueEntry {
    fn from(item: &ItemType) -> Self {
        let name = display_name(&item.code);
        Self {
            code: item.code.clone(),
            description: ItemCategory::of(item).describe(&name),
            name,
        }
    }
}

fn parse_amount(value: &Value) -> Result<i64, RequestError> {
    let amount = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    amount.context(error::InvalidAmount)
}

impl RequestRouter {
    pub(super) async fn list_items(&self) -> Result<Value, RequestError> {
        let items: Vec<CatalogueEntry> = self
            .context
            .run(|p| {
                p.item_catalogue()
                    .iter()
                    .filter(|item| item.is_item)
                    .map(CatalogueEntry::from)
                    .collect()
            })
            .await
            .context(error::Context)?;

        log::info!("Responding to listItems: {} items available", items.len());

        serde_json::to_value(items).context(error::Encode)
    }

    pub(super) async fn give_item(&self, args: &Args) -> Result<Value, RequestError> {
        ensure!(
            args.has("player") && args.has("item") && args.has("amount"),
            error::GiveItemParameters
        );

        let id = match args.object("player").and_then(|p| p.text("gameId")) {
            Some(id) => id,
            None => return error::PlayerWithoutGameId.fail(),
        };
        let code = args.required_text("item")?;

        let amount = parse_amount(args.get("amount").unwrap_or(&Value::Null))?;
        ensure!(amount > 0, error::NonPositiveAmount);
        let amount = u32::try_from(amount).ok().context(error::InvalidAmount)?;

        let quality = args.text("quality");
        let id = parse_game_id(&id)?;

        self.context
            .run(move |p| -> Result<(), RequestError> {
                let player = p.online_player(id).ok_or(PlatformError::PlayerOffline)?;

                let item = p
                    .item_type(&code.to_uppercase())
                    .with_context(|| error::UnknownItem { code: &code })?;
                ensure!(item.is_item, error::NotAnItem { code: &code });

                let mut stack = ItemStack::new(&item, amount);

                if let Some(quality) = quality.filter(|_| item.max_durability > 0) {
                    match quality.trim().parse::<f64>() {
                        Ok(q) if q.is_finite() => {
                            stack.damage = damage_for_quality(item.max_durability, q);
                        }
                        _ => log::info!("Non-numeric quality value provided: {}", quality),
                    }
                }

                if let Some(leftover) = p.give_item(id, stack)? {
                    log::info!(
                        "Player inventory full, dropped {} items at player location",
                        leftover.amount
                    );
                    p.drop_item(id, leftover)?;
                }

                log::info!("Gave {} x {} to player {}", amount, item.code, player.name);
                Ok(())
            })
            .await
            .context(error::Context)??;

        Ok(Value::Null)
    }
}

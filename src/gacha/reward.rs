//! Inventory and token bookkeeping for a drawn card.

use anyhow::Result;
use serde::Serialize;

use crate::storage::{Card, Storage, UserCounter};

/// Tokens for the first copy of a card.
pub const NEW_CARD_TOKENS: u32 = 20;
/// Tokens for every further copy.
pub const DUPLICATE_TOKENS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RewardOutcome {
    pub is_new: bool,
    pub tokens_awarded: u32,
    pub quantity: u32,
}

pub fn tokens_for(is_new: bool) -> u32 {
    if is_new { NEW_CARD_TOKENS } else { DUPLICATE_TOKENS }
}

/// Credits a drawn card to a user's inventory and token balance.
///
/// The inventory upsert, the unique-card increment and the token increment
/// are separate document writes; an interruption between them leaves the
/// counters out of step with the inventory.
pub struct RewardResolver<'a> {
    storage: &'a Storage,
}

impl<'a> RewardResolver<'a> {
    pub fn new(storage: &'a Storage) -> Self { Self { storage } }

    pub async fn apply(&self, user_id: &str, card: &Card) -> Result<RewardOutcome> {
        let is_new = self.storage.find_inventory_entry(user_id, &card.id).await?.is_none();
        let entry = self.storage.upsert_inventory_entry(user_id, &card.id).await?;
        if is_new {
            self.storage.increment_user(user_id, UserCounter::TotalUniqueCards, 1).await?;
        }
        let tokens_awarded = tokens_for(is_new);
        self.storage.increment_user(user_id, UserCounter::Tokens, tokens_awarded).await?;
        Ok(RewardOutcome { is_new, tokens_awarded, quantity: entry.quantity })
    }
}

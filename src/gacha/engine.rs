//! Weighted draw with pity.
//!
//! A user's pity counter counts consecutive draws below epic. Once it reaches
//! [`PITY_THRESHOLD`] the next draw is taken from [`PITY_RATES`] and the
//! counter starts over. The card is picked before anything is written, so a
//! draw against an empty catalog leaves the user untouched.

use anyhow::Result;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;

use super::catalog::CardCatalog;
use super::rarity::{Rarity, PITY_RATES, STANDARD_RATES};
use super::reward::{RewardOutcome, RewardResolver};
use crate::storage::{Card, Storage};

/// Pity counter value at which a high-rarity draw is forced.
pub const PITY_THRESHOLD: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierRoll {
    pub tier: Rarity,
    pub pity_forced: bool,
}

/// Pick the tier for a user currently at `pity`.
pub fn roll_tier<R: Rng + ?Sized>(pity: u32, rng: &mut R) -> TierRoll {
    if pity >= PITY_THRESHOLD {
        TierRoll { tier: PITY_RATES.choose(rng), pity_forced: true }
    } else {
        TierRoll { tier: STANDARD_RATES.choose(rng), pity_forced: false }
    }
}

/// Counter after a draw that yielded a card of `card_tier`.
pub fn next_pity(previous: u32, card_tier: Rarity, pity_forced: bool) -> u32 {
    if pity_forced || card_tier.is_high() { 0 } else { previous.saturating_add(1) }
}

#[derive(Debug, Clone, Serialize)]
pub struct DrawResult {
    pub card: Card,
    /// Tier of the card actually handed out.
    pub rarity: Rarity,
    /// Tier chosen by the weighted roll; differs from `rarity` only when the
    /// catalog had no card of that tier.
    pub rolled_tier: Rarity,
    pub pity_forced: bool,
    pub pity_counter: u32,
    pub reward: RewardOutcome,
}

pub struct DrawEngine {
    storage: Arc<Storage>,
    catalog: Arc<CardCatalog>,
}

impl DrawEngine {
    pub fn new(storage: Arc<Storage>, catalog: Arc<CardCatalog>) -> Self {
        Self { storage, catalog }
    }

    /// Draw one card for a user. `Ok(None)` means no cards are configured.
    pub async fn draw(&self, user_id: &str, display_name: &str) -> Result<Option<DrawResult>> {
        let mut rng = StdRng::from_entropy();
        self.draw_with_rng(user_id, display_name, &mut rng).await
    }

    pub async fn draw_with_rng<R>(&self, user_id: &str, display_name: &str, rng: &mut R) -> Result<Option<DrawResult>>
    where
        R: Rng + Send + ?Sized,
    {
        let previous = self.storage.find_user(user_id).await?
            .map(|u| u.pity_counter)
            .unwrap_or(0);

        let roll = roll_tier(previous, &mut *rng);
        let Some(card) = self.catalog.sample(roll.tier, &mut *rng) else {
            debug!("draw for {}: catalog empty", user_id);
            return Ok(None);
        };
        if card.rarity != roll.tier {
            debug!("draw for {}: no {} cards, substituted {} '{}'", user_id, roll.tier, card.rarity, card.name);
        }

        let pity_counter = next_pity(previous, card.rarity, roll.pity_forced);
        self.storage.upsert_user(user_id, display_name, pity_counter).await?;

        let reward = RewardResolver::new(&self.storage).apply(user_id, &card).await?;

        Ok(Some(DrawResult {
            rarity: card.rarity,
            card,
            rolled_tier: roll.tier,
            pity_forced: roll.pity_forced,
            pity_counter,
            reward,
        }))
    }
}

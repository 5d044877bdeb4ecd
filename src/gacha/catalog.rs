//! Read-through cache of the card set, grouped by rarity.
//!
//! The cache is an immutable snapshot behind an `Arc`. `reload` builds a new
//! snapshot off to the side and swaps the pointer, so a concurrent `sample`
//! sees either the old set or the new one.

use anyhow::Result;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::rarity::Rarity;
use crate::storage::{Card, Storage};

#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    by_rarity: HashMap<Rarity, Vec<Card>>,
    all: Vec<Card>,
}

impl CatalogSnapshot {
    pub fn from_cards(cards: Vec<Card>) -> Self {
        let mut by_rarity: HashMap<Rarity, Vec<Card>> = HashMap::new();
        for card in &cards {
            by_rarity.entry(card.rarity).or_default().push(card.clone());
        }
        CatalogSnapshot { by_rarity, all: cards }
    }

    pub fn len(&self) -> usize { self.all.len() }

    pub fn is_empty(&self) -> bool { self.all.is_empty() }

    pub fn count(&self, tier: Rarity) -> usize {
        self.by_rarity.get(&tier).map(Vec::len).unwrap_or(0)
    }
}

#[derive(Debug, Default)]
pub struct CardCatalog {
    snapshot: RwLock<Arc<CatalogSnapshot>>,
}

impl CardCatalog {
    pub fn new() -> Self { Self::default() }

    pub fn with_cards(cards: Vec<Card>) -> Self {
        CardCatalog { snapshot: RwLock::new(Arc::new(CatalogSnapshot::from_cards(cards))) }
    }

    /// Current snapshot. Holding it does not block a reload.
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        let guard = self.snapshot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&*guard)
    }

    /// Swap in a snapshot built from `cards`.
    pub fn replace(&self, cards: Vec<Card>) -> usize {
        let fresh = Arc::new(CatalogSnapshot::from_cards(cards));
        let count = fresh.len();
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        *guard = fresh;
        count
    }

    /// Fetch every card from storage and swap the cache.
    pub async fn reload(&self, storage: &Storage) -> Result<usize> {
        let cards = storage.list_all_cards().await?;
        let count = self.replace(cards);
        info!("Card cache loaded: {} cards in memory", count);
        Ok(count)
    }

    /// Uniform card of `tier`; falls back to any cached card when the tier
    /// has none. `None` only when the catalog is empty.
    pub fn sample<R: Rng + ?Sized>(&self, tier: Rarity, rng: &mut R) -> Option<Card> {
        let snap = self.snapshot();
        match snap.by_rarity.get(&tier) {
            Some(group) if !group.is_empty() => group.choose(rng).cloned(),
            _ => snap.all.choose(rng).cloned(),
        }
    }
}

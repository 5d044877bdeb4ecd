//! Storage module for persisting gacha data
//!
//! Documents are JSON files under the data directory. Every document write
//! lands in a temp file that is renamed over the target, so a single document
//! is never observed half-written. Read-modify-write operations are
//! serialised through an internal lock; there is no multi-document
//! transaction.

use anyhow::{Result, anyhow};
use chrono::{DateTime, FixedOffset};
use log::warn;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::gacha::rarity::Rarity;

const CARDS_FILE: &str = "cards.json";
const HISTORY_FILE: &str = "history.jsonl";

/// Main storage interface
pub struct Storage {
    data_dir: String,
    write_lock: Mutex<()>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Card {
    /// Image reference, or `placeholder` when the card has none.
    pub fn image_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        match self.image_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url,
            _ => placeholder,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub pity_counter: u32,
    #[serde(default)]
    pub total_unique_cards: u32,
    #[serde(default)]
    pub tokens: u32,
}

/// Counters on the user document that support atomic increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCounter {
    Tokens,
    TotalUniqueCards,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub user_id: String,
    pub card_id: String,
    pub quantity: u32,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct InventoryFile {
    entries: BTreeMap<String, InventoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub action: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Default)]
pub struct GachaStatistics {
    pub cards_by_rarity: BTreeMap<Rarity, usize>,
    pub total_users: usize,
    pub history_entries: usize,
}

fn doc_name(id: &str) -> String {
    format!("{}.json", utf8_percent_encode(id, NON_ALPHANUMERIC))
}

async fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(content) => {
            let doc = serde_json::from_str(&content)
                .map_err(|e| anyhow!("Corrupt document {}: {}", path.display(), e))?;
            Ok(Some(doc))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow!("Failed to read {}: {}", path.display(), e)),
    }
}

async fn write_json<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    let json_content = serde_json::to_string_pretty(doc)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json_content).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

impl Storage {
    /// Initialize storage with the given data directory
    pub async fn new(data_dir: &str) -> Result<Self> {
        fs::create_dir_all(data_dir).await
            .map_err(|e| anyhow!("Failed to create data directory {}: {}", data_dir, e))?;

        fs::create_dir_all(Path::new(data_dir).join("users")).await?;
        fs::create_dir_all(Path::new(data_dir).join("inventory")).await?;

        Ok(Storage { data_dir: data_dir.to_string(), write_lock: Mutex::new(()) })
    }

    /// Return the base data directory path used by this storage instance
    pub fn base_dir(&self) -> &str { &self.data_dir }

    fn user_path(&self, user_id: &str) -> PathBuf {
        Path::new(&self.data_dir).join("users").join(doc_name(user_id))
    }

    fn inventory_path(&self, user_id: &str) -> PathBuf {
        Path::new(&self.data_dir).join("inventory").join(doc_name(user_id))
    }

    fn cards_path(&self) -> PathBuf { Path::new(&self.data_dir).join(CARDS_FILE) }

    fn history_path(&self) -> PathBuf { Path::new(&self.data_dir).join(HISTORY_FILE) }

    /// All configured cards; an absent card file is an empty catalog.
    /// Entries that do not parse as a card (e.g. an unknown rarity) are
    /// skipped with a warning.
    pub async fn list_all_cards(&self) -> Result<Vec<Card>> {
        let raw = read_json::<Vec<serde_json::Value>>(&self.cards_path()).await?.unwrap_or_default();
        let mut cards = Vec::with_capacity(raw.len());
        for (idx, value) in raw.into_iter().enumerate() {
            match serde_json::from_value::<Card>(value) {
                Ok(card) => cards.push(card),
                Err(e) => warn!("Skipping card #{} in {}: {}", idx, CARDS_FILE, e),
            }
        }
        Ok(cards)
    }

    /// Replace the whole card set.
    pub async fn save_cards(&self, cards: &[Card]) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for card in cards {
            if !seen.insert(card.id.as_str()) {
                return Err(anyhow!("Duplicate card id '{}'", card.id));
            }
        }
        let _guard = self.write_lock.lock().await;
        write_json(&self.cards_path(), &cards).await
    }

    /// One uniformly random card of `tier`, straight from the stored set.
    pub async fn random_sample_card(&self, tier: Rarity) -> Result<Option<Card>> {
        let cards: Vec<Card> = self.list_all_cards().await?
            .into_iter()
            .filter(|c| c.rarity == tier)
            .collect();
        Ok(cards.choose(&mut rand::thread_rng()).cloned())
    }

    pub async fn find_user(&self, user_id: &str) -> Result<Option<User>> {
        read_json(&self.user_path(user_id)).await
    }

    /// Create the user if needed, then set display name and pity counter in
    /// one document write.
    pub async fn upsert_user(&self, user_id: &str, display_name: &str, pity_counter: u32) -> Result<User> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_path(user_id);
        let mut user = read_json::<User>(&path).await?.unwrap_or_else(|| User {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            pity_counter: 0,
            total_unique_cards: 0,
            tokens: 0,
        });
        user.display_name = display_name.to_string();
        user.pity_counter = pity_counter;
        write_json(&path, &user).await?;
        Ok(user)
    }

    /// Atomically add `amount` to a user counter; returns the new value.
    pub async fn increment_user(&self, user_id: &str, counter: UserCounter, amount: u32) -> Result<u32> {
        let _guard = self.write_lock.lock().await;
        let path = self.user_path(user_id);
        let mut user = read_json::<User>(&path).await?
            .ok_or_else(|| anyhow!("User not found: {}", user_id))?;
        let field = match counter {
            UserCounter::Tokens => &mut user.tokens,
            UserCounter::TotalUniqueCards => &mut user.total_unique_cards,
        };
        *field = field.saturating_add(amount);
        let value = *field;
        write_json(&path, &user).await?;
        Ok(value)
    }

    pub async fn find_inventory_entry(&self, user_id: &str, card_id: &str) -> Result<Option<InventoryEntry>> {
        let file = read_json::<InventoryFile>(&self.inventory_path(user_id)).await?.unwrap_or_default();
        Ok(file.entries.get(card_id).cloned())
    }

    /// Increment the quantity of an owned card, or insert it with quantity 1.
    pub async fn upsert_inventory_entry(&self, user_id: &str, card_id: &str) -> Result<InventoryEntry> {
        let _guard = self.write_lock.lock().await;
        let path = self.inventory_path(user_id);
        let mut file = read_json::<InventoryFile>(&path).await?.unwrap_or_default();
        let entry = file.entries.entry(card_id.to_string()).or_insert_with(|| InventoryEntry {
            user_id: user_id.to_string(),
            card_id: card_id.to_string(),
            quantity: 0,
        });
        entry.quantity = entry.quantity.saturating_add(1);
        let updated = entry.clone();
        write_json(&path, &file).await?;
        Ok(updated)
    }

    pub async fn list_inventory(&self, user_id: &str) -> Result<Vec<InventoryEntry>> {
        let file = read_json::<InventoryFile>(&self.inventory_path(user_id)).await?.unwrap_or_default();
        Ok(file.entries.into_values().collect())
    }

    pub async fn append_history_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let _guard = self.write_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// All history entries, oldest first. Unparseable lines are skipped.
    pub async fn read_history(&self) -> Result<Vec<HistoryEntry>> {
        let content = match fs::read_to_string(self.history_path()).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| match serde_json::from_str(l) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("history: skipping corrupt line: {}", e);
                    None
                }
            })
            .collect())
    }

    pub async fn get_statistics(&self) -> Result<GachaStatistics> {
        let mut stats = GachaStatistics::default();
        for card in self.list_all_cards().await? {
            *stats.cards_by_rarity.entry(card.rarity).or_default() += 1;
        }

        let users_dir = Path::new(&self.data_dir).join("users");
        if users_dir.exists() {
            let mut entries = fs::read_dir(&users_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.path().extension().and_then(|s| s.to_str()) == Some("json") {
                    stats.total_users += 1;
                }
            }
        }

        stats.history_entries = self.read_history().await?.len();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn card(id: &str, rarity: Rarity) -> Card {
        Card { id: id.into(), name: id.to_uppercase(), rarity, image_url: None }
    }

    #[tokio::test]
    async fn user_ids_with_path_characters_are_safe() {
        let tmp = tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        storage.upsert_user("../evil/1", "Eve", 3).await.unwrap();
        let user = storage.find_user("../evil/1").await.unwrap().unwrap();
        assert_eq!(user.pity_counter, 3);
        assert!(!tmp.path().join("evil").exists());
    }

    #[tokio::test]
    async fn upsert_user_keeps_counters() {
        let tmp = tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        storage.upsert_user("42", "alice", 0).await.unwrap();
        storage.increment_user("42", UserCounter::Tokens, 20).await.unwrap();
        let user = storage.upsert_user("42", "Alice", 5).await.unwrap();
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.pity_counter, 5);
        assert_eq!(user.tokens, 20);
    }

    #[tokio::test]
    async fn increment_requires_existing_user() {
        let tmp = tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        assert!(storage.increment_user("nobody", UserCounter::Tokens, 1).await.is_err());
    }

    #[tokio::test]
    async fn inventory_upsert_is_unique_per_card() {
        let tmp = tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        storage.upsert_inventory_entry("u", "c1").await.unwrap();
        let second = storage.upsert_inventory_entry("u", "c1").await.unwrap();
        storage.upsert_inventory_entry("u", "c2").await.unwrap();
        assert_eq!(second.quantity, 2);
        let inv = storage.list_inventory("u").await.unwrap();
        assert_eq!(inv.len(), 2);
        assert!(storage.find_inventory_entry("u", "c3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn random_sample_respects_tier() {
        let tmp = tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        storage.save_cards(&[card("a", Rarity::Common), card("b", Rarity::Epic)]).await.unwrap();
        let got = storage.random_sample_card(Rarity::Epic).await.unwrap().unwrap();
        assert_eq!(got.id, "b");
        assert!(storage.random_sample_card(Rarity::Legendary).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_card_ids_rejected() {
        let tmp = tempdir().unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        let err = storage.save_cards(&[card("a", Rarity::Common), card("a", Rarity::Rare)]).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn missing_rarity_defaults_to_common() {
        let tmp = tempdir().unwrap();
        std::fs::write(tmp.path().join(CARDS_FILE), r#"[{"id":"x","name":"X"}]"#).unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        let cards = storage.list_all_cards().await.unwrap();
        assert_eq!(cards[0].rarity, Rarity::Common);
        assert_eq!(cards[0].image_or("ph"), "ph");
    }

    #[tokio::test]
    async fn unknown_rarity_skips_only_that_card() {
        let tmp = tempdir().unwrap();
        std::fs::write(
            tmp.path().join(CARDS_FILE),
            r#"[{"id":"a","name":"A","rarity":"epic"},{"id":"m","name":"M","rarity":"mythic"},{"id":"b","name":"B"}]"#,
        ).unwrap();
        let storage = Storage::new(tmp.path().to_str().unwrap()).await.unwrap();
        let ids: Vec<String> = storage.list_all_cards().await.unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }
}

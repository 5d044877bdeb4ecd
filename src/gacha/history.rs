//! Draw history: one append-only entry per draw plus a readable log line.
//!
//! Entries written by this crate always use the [`DrawDetails`] field names.
//! Older entries used different names for the same facts; the readers in
//! [`NormalizedDetails`] accept both so the log line and any replay tooling
//! see one shape.

use anyhow::{Result, anyhow};
use chrono::{FixedOffset, Utc};
use log::info;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use super::engine::DrawResult;
use crate::storage::{HistoryEntry, Storage};

pub const ACTION_RECEIVED: &str = "Received card";

pub fn bits_action(bits: u32) -> String {
    format!("Donated {} bits and received", bits)
}

const CARD_NAME_KEYS: &[&str] = &["name", "card_name", "card"];
const RARITY_KEYS: &[&str] = &["rarity", "raridade", "tier"];
const IS_NEW_KEYS: &[&str] = &["got_new", "nova_carta", "is_new"];
const TOKEN_KEYS: &[&str] = &["tokens_gained", "tokens_ganhos", "tokens_awarded", "tokens"];
const PITY_KEYS: &[&str] = &["pity_forced", "pity", "pity_triggered"];

const UNKNOWN_CARD: &str = "Unknown";
const UNKNOWN_RARITY: &str = "???";

/// Canonical details payload for a draw.
#[derive(Debug, Clone, Serialize)]
pub struct DrawDetails {
    pub card_id: String,
    pub card_name: String,
    pub rarity: String,
    pub is_new: bool,
    pub tokens_awarded: u32,
    pub pity_forced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bits: Option<u32>,
}

impl DrawDetails {
    pub fn from_result(result: &DrawResult, bits: Option<u32>) -> Self {
        DrawDetails {
            card_id: result.card.id.clone(),
            card_name: result.card.name.clone(),
            rarity: result.rarity.to_string(),
            is_new: result.reward.is_new,
            tokens_awarded: result.reward.tokens_awarded,
            pity_forced: result.pity_forced,
            bits,
        }
    }
}

/// Details read back through the alias tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDetails {
    pub card_name: String,
    pub rarity: String,
    /// Absent flag reads as a duplicate.
    pub is_new: bool,
    pub tokens: u64,
    pub pity_forced: bool,
}

fn first_str<'a>(details: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| details.get(*k).and_then(Value::as_str))
        .find(|s| !s.trim().is_empty())
}

fn first_bool(details: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| details.get(*k).and_then(Value::as_bool))
}

fn first_u64(details: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter().find_map(|k| details.get(*k).and_then(Value::as_u64))
}

impl NormalizedDetails {
    pub fn from_details(details: &Value) -> Self {
        NormalizedDetails {
            card_name: first_str(details, CARD_NAME_KEYS).unwrap_or(UNKNOWN_CARD).to_string(),
            rarity: first_str(details, RARITY_KEYS).unwrap_or(UNKNOWN_RARITY).to_string(),
            is_new: first_bool(details, IS_NEW_KEYS).unwrap_or(false),
            tokens: first_u64(details, TOKEN_KEYS).unwrap_or(0),
            pity_forced: PITY_KEYS
                .iter()
                .any(|k| details.get(*k).and_then(Value::as_bool).unwrap_or(false)),
        }
    }
}

pub struct EventLogger {
    storage: Arc<Storage>,
    offset: FixedOffset,
}

impl EventLogger {
    pub fn new(storage: Arc<Storage>, utc_offset_hours: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("Invalid history UTC offset: {} hours", utc_offset_hours))?;
        Ok(Self { storage, offset })
    }

    /// Persist one history entry and emit the matching log line.
    pub async fn record(&self, user_id: &str, display_name: &str, action: &str, details: Value) -> Result<HistoryEntry> {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            action: action.to_string(),
            details,
            timestamp: Utc::now().with_timezone(&self.offset),
        };
        self.storage.append_history_entry(&entry).await?;
        info!("{}", format_line(&entry));
        Ok(entry)
    }

    pub async fn record_draw(&self, user_id: &str, display_name: &str, action: &str, result: &DrawResult, bits: Option<u32>) -> Result<HistoryEntry> {
        let details = serde_json::to_value(DrawDetails::from_result(result, bits))?;
        self.record(user_id, display_name, action, details).await
    }
}

pub fn format_line(entry: &HistoryEntry) -> String {
    let d = NormalizedDetails::from_details(&entry.details);
    let pity = if d.pity_forced { " 🌟 PITY" } else { "" };
    let status = if d.is_new { "NEW".to_string() } else { format!("DUPLICATE (+{} tokens)", d.tokens) };
    format!(
        "{} - {} - {} - {} ({}){} - {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.display_name,
        entry.action,
        d.card_name,
        d.rarity,
        pity,
        status
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_names_are_understood() {
        let d = NormalizedDetails::from_details(&json!({
            "name": "Fireball", "rarity": "common", "got_new": true, "tokens_gained": 20, "pity_forced": false
        }));
        assert_eq!(d, NormalizedDetails {
            card_name: "Fireball".into(), rarity: "common".into(), is_new: true, tokens: 20, pity_forced: false,
        });
    }

    #[test]
    fn current_names_are_understood() {
        let d = NormalizedDetails::from_details(&json!({
            "card_name": "Dragon", "rarity": "legendary", "is_new": false, "tokens_awarded": 5, "pity_triggered": true
        }));
        assert_eq!(d.card_name, "Dragon");
        assert!(!d.is_new);
        assert_eq!(d.tokens, 5);
        assert!(d.pity_forced);
    }

    #[test]
    fn portuguese_names_are_understood() {
        let d = NormalizedDetails::from_details(&json!({
            "card_name": "Golem", "raridade": "rare", "nova_carta": false, "tokens_ganhos": 5
        }));
        assert_eq!(d, NormalizedDetails {
            card_name: "Golem".into(), rarity: "rare".into(), is_new: false, tokens: 5, pity_forced: false,
        });
        let fresh = NormalizedDetails::from_details(&json!({ "card_name": "Slime", "nova_carta": true, "tokens_ganhos": 20 }));
        assert!(fresh.is_new);
        assert_eq!(fresh.tokens, 20);
    }

    #[test]
    fn first_non_empty_alias_wins() {
        let d = NormalizedDetails::from_details(&json!({ "name": "", "card_name": "Second", "card": "Third" }));
        assert_eq!(d.card_name, "Second");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let d = NormalizedDetails::from_details(&json!({}));
        assert_eq!(d.card_name, UNKNOWN_CARD);
        assert_eq!(d.rarity, UNKNOWN_RARITY);
        assert!(!d.is_new);
        assert_eq!(d.tokens, 0);
        assert!(!d.pity_forced);
    }

    #[test]
    fn log_line_shape() {
        let entry = HistoryEntry {
            id: Uuid::new_v4(),
            user_id: "1".into(),
            display_name: "Alice".into(),
            action: ACTION_RECEIVED.into(),
            details: json!({ "card_name": "Fireball", "rarity": "epic", "is_new": false, "tokens_awarded": 5, "pity_forced": true }),
            timestamp: Utc::now().with_timezone(&FixedOffset::west_opt(3 * 3600).unwrap()),
        };
        let line = format_line(&entry);
        assert!(line.ends_with("Alice - Received card - Fireball (epic) 🌟 PITY - DUPLICATE (+5 tokens)"), "{line}");
    }

    #[tokio::test]
    async fn timestamps_use_configured_offset() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(tmp.path().to_str().unwrap()).await.unwrap());
        let logger = EventLogger::new(Arc::clone(&storage), -3).unwrap();
        let entry = logger.record("1", "Alice", ACTION_RECEIVED, json!({})).await.unwrap();
        assert_eq!(entry.timestamp.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(storage.read_history().await.unwrap().len(), 1);
    }

    #[test]
    fn bits_label_includes_amount() {
        assert_eq!(bits_action(100), "Donated 100 bits and received");
    }
}

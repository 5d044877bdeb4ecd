//! Runs one draw and hands the result to history and the overlay.

use anyhow::Result;
use log::{error, info};

use super::engine::{DrawEngine, DrawResult};
use super::history::{bits_action, EventLogger, ACTION_RECEIVED};
use super::overlay::OverlayNotifier;
use crate::metrics;

/// What caused a draw; decides the history action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawTrigger {
    Message,
    Bits(u32),
    Command,
}

impl DrawTrigger {
    pub fn action(&self) -> String {
        match self {
            DrawTrigger::Bits(bits) => bits_action(*bits),
            DrawTrigger::Message | DrawTrigger::Command => ACTION_RECEIVED.to_string(),
        }
    }

    pub fn bits(&self) -> Option<u32> {
        match self {
            DrawTrigger::Bits(bits) => Some(*bits),
            _ => None,
        }
    }
}

/// Draw, then record it, then tell the overlay.
pub struct DrawPipeline {
    engine: DrawEngine,
    history: EventLogger,
    overlay: OverlayNotifier,
}

impl DrawPipeline {
    pub fn new(engine: DrawEngine, history: EventLogger, overlay: OverlayNotifier) -> Self {
        Self { engine, history, overlay }
    }

    /// `Ok(None)` when no cards are configured. Errors come only from the
    /// draw itself; history and overlay problems are logged.
    pub async fn run(&self, user_id: &str, display_name: &str, trigger: DrawTrigger) -> Result<Option<DrawResult>> {
        let Some(result) = self.engine.draw(user_id, display_name).await? else {
            metrics::inc_empty_catalog();
            return Ok(None);
        };

        metrics::inc_draws();
        if result.pity_forced { metrics::inc_pity_forced(); }
        if result.reward.is_new { metrics::inc_new_cards(); }

        info!(
            "🪙 {}: got {} ({}) - {} - +{} tokens",
            display_name,
            result.card.name,
            result.rarity,
            if result.reward.is_new { "new" } else { "duplicate" },
            result.reward.tokens_awarded
        );

        if let Err(e) = self.history
            .record_draw(user_id, display_name, &trigger.action(), &result, trigger.bits())
            .await
        {
            error!("history write failed for {}: {:?}", user_id, e);
        }

        self.overlay.notify(display_name, &result.card).await;

        Ok(Some(result))
    }
}

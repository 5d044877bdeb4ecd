use anyhow::{Result, anyhow};
use log::{info, warn, debug, error};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::metrics;
use crate::storage::Storage;
use crate::twitch::{TwitchConnection, TwitchError};
use super::catalog::CardCatalog;
use super::chat::{ChatCommand, ChatCommandParser, ChatEvent};
use super::engine::{DrawEngine, DrawResult};
use super::history::EventLogger;
use super::overlay::OverlayNotifier;
use super::pipeline::{DrawPipeline, DrawTrigger};

pub const NO_CARDS_REPLY: &str = "⚠️ No cards available!";

/// Upper bound for the reconnect backoff.
const MAX_RECONNECT_DELAY_SECS: u64 = 30;

/// Chat reply for a successful draw command.
pub fn draw_reply(display_name: &str, result: &DrawResult) -> String {
    let pity = if result.pity_forced { " 🌟" } else { "" };
    let status = if result.reward.is_new { "NEW" } else { "DUPLICATE" };
    format!(
        "@{}: {} ({}){} - {} +{} tokens",
        display_name, result.card.name, result.rarity, pity, status, result.reward.tokens_awarded
    )
}

fn is_auth_failure(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<TwitchError>(), Some(TwitchError::AuthFailed))
}

/// Main bot that owns the draw components and the chat connection
pub struct GachaBot {
    config: Config,
    storage: Arc<Storage>,
    catalog: Arc<CardCatalog>,
    pipeline: DrawPipeline,
    parser: ChatCommandParser,
    chat: Option<TwitchConnection>,
}

impl GachaBot {
    /// Open storage, load the card cache and wire up the pipeline.
    pub async fn new(config: Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(&config.storage.data_dir).await?);
        let catalog = Arc::new(CardCatalog::new());
        catalog.reload(&storage).await?;

        let engine = DrawEngine::new(Arc::clone(&storage), Arc::clone(&catalog));
        let history = EventLogger::new(Arc::clone(&storage), config.logging.history_utc_offset_hours)?;
        let overlay = OverlayNotifier::new(&config.overlay)?;
        let parser = ChatCommandParser::new(&config.bot.command_prefix);

        Ok(GachaBot {
            config,
            storage,
            catalog,
            pipeline: DrawPipeline::new(engine, history, overlay),
            parser,
            chat: None,
        })
    }

    pub fn storage(&self) -> &Storage { &self.storage }

    pub fn catalog(&self) -> &CardCatalog { &self.catalog }

    /// Rebuild the card cache from storage.
    pub async fn reload_catalog(&self) -> Result<usize> {
        self.catalog.reload(&self.storage).await
    }

    /// Connect to the configured chat channel
    pub async fn connect(&mut self) -> Result<()> {
        let conn = TwitchConnection::connect(&self.config).await?;
        self.chat = Some(conn);
        Ok(())
    }

    /// Run the draw pipeline once, outside of chat.
    pub async fn draw(&self, user_id: &str, display_name: &str, trigger: DrawTrigger) -> Result<Option<DrawResult>> {
        self.pipeline.run(user_id, display_name, trigger).await
    }

    /// Handle one chat event to completion. Returns a reply for the channel,
    /// if any. Failures are logged and never reach chat.
    ///
    /// A message carrying bits always draws under the donation label, even
    /// when it is also a command.
    pub async fn handle_chat_event(&self, ev: &ChatEvent) -> Option<String> {
        if ev.echo { return None; }
        debug!("💬 {}: {}", ev.display_name, ev.content);

        let donation = (ev.bits > 0).then_some(DrawTrigger::Bits(ev.bits));
        match self.parser.parse(&ev.content) {
            ChatCommand::Draw => {
                let trigger = donation.unwrap_or(DrawTrigger::Command);
                match self.pipeline.run(&ev.user_id, &ev.display_name, trigger).await {
                    Ok(Some(result)) => Some(draw_reply(&ev.display_name, &result)),
                    Ok(None) => Some(NO_CARDS_REPLY.to_string()),
                    Err(e) => { error!("draw command for {} failed: {:?}", ev.user_id, e); None }
                }
            }
            ChatCommand::Tokens => {
                if let Some(trigger) = donation {
                    self.draw_silently(ev, trigger).await;
                }
                match self.storage.find_user(&ev.user_id).await {
                    Ok(Some(user)) => Some(format!(
                        "@{}: {} tokens, {} unique cards",
                        ev.display_name, user.tokens, user.total_unique_cards
                    )),
                    Ok(None) => Some(format!("@{}: no cards yet - keep chatting!", ev.display_name)),
                    Err(e) => { error!("balance lookup for {} failed: {:?}", ev.user_id, e); None }
                }
            }
            ChatCommand::Unknown => {
                self.draw_silently(ev, donation.unwrap_or(DrawTrigger::Message)).await;
                None
            }
        }
    }

    async fn draw_silently(&self, ev: &ChatEvent, trigger: DrawTrigger) {
        match self.pipeline.run(&ev.user_id, &ev.display_name, trigger).await {
            Ok(Some(_)) => {}
            Ok(None) => debug!("no cards configured; skipping draw for {}", ev.user_id),
            Err(e) => error!("draw for {} failed: {:?}", ev.user_id, e),
        }
    }

    /// Start the bot main loop and stop on ctrl-c.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("ctrl-c handler failed: {e:?}");
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        }).await
    }

    /// Process chat events one at a time until `shutdown` resolves.
    ///
    /// A closed connection or a RECONNECT request is answered by connecting
    /// again with a growing delay. Only a rejected token ends the loop early.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut chat = self.chat.take()
            .ok_or_else(|| anyhow!("Not connected; call connect() first"))?;
        tokio::pin!(shutdown);
        info!("Gacha bot running in #{}", self.config.bot.channel);

        loop {
            let next = tokio::select! {
                ev = chat.next_event() => ev,
                _ = &mut shutdown => break,
            };
            match next {
                Ok(Some(ev)) => {
                    if let Some(reply) = self.handle_chat_event(&ev).await {
                        if let Err(e) = chat.send_message(&reply).await { warn!("reply send failed: {e:?}"); }
                    }
                    continue;
                }
                Ok(None) => warn!("Chat connection closed; reconnecting"),
                Err(e) if is_auth_failure(&e) => {
                    error!("Chat login rejected: {e}");
                    if let Err(e) = chat.disconnect().await { debug!("disconnect error: {e:?}"); }
                    self.shutdown();
                    return Err(e);
                }
                Err(e) => warn!("Chat connection error: {e:?}; reconnecting"),
            }

            if let Err(e) = chat.disconnect().await { debug!("disconnect error: {e:?}"); }
            match self.reconnect(&mut shutdown).await {
                Some(conn) => chat = conn,
                None => {
                    self.shutdown();
                    return Ok(());
                }
            }
        }

        if let Err(e) = chat.disconnect().await { debug!("disconnect error: {e:?}"); }
        self.shutdown();
        Ok(())
    }

    /// Retry the connection until it succeeds. `None` when shutdown won.
    async fn reconnect<S>(&self, shutdown: &mut S) -> Option<TwitchConnection>
    where
        S: Future<Output = ()> + Unpin,
    {
        let max = Duration::from_secs(MAX_RECONNECT_DELAY_SECS);
        let mut delay = Duration::from_millis(self.config.twitch.reconnect_delay_ms).min(max);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut *shutdown => return None,
            }
            match TwitchConnection::connect(&self.config).await {
                Ok(conn) => {
                    metrics::inc_reconnects();
                    info!("Reconnected to #{}", self.config.bot.channel);
                    return Some(conn);
                }
                Err(e) => warn!("Reconnect failed, retrying in {:?}: {e:?}", (delay * 2).min(max)),
            }
            delay = (delay * 2).min(max);
        }
    }

    /// Show catalog and storage statistics
    pub async fn show_status(&self) -> Result<()> {
        println!("=== Gacha Bot Status ===");
        println!("Channel: {}", self.config.bot.channel);
        println!("Data dir: {}", self.storage.base_dir());
        let stats = self.storage.get_statistics().await?;
        let total: usize = stats.cards_by_rarity.values().sum();
        println!("Cards: {}", total);
        for (rarity, count) in &stats.cards_by_rarity {
            println!("  {:<10} {}", rarity.as_str(), count);
        }
        println!("Users: {}", stats.total_users);
        println!("History entries: {}", stats.history_entries);
        Ok(())
    }

    fn shutdown(&self) {
        let snap = metrics::snapshot();
        info!(
            "Shutting down: {} draws, {} pity-forced, {} new cards, {} empty-catalog, {} overlay failures, {} reconnects",
            snap.draws, snap.pity_forced, snap.new_cards, snap.empty_catalog, snap.overlay_failed, snap.reconnects
        );
    }
}

//! Gacha module
//!
//! The card-draw core and the bot built around it:
//! - Rarity rates and the card cache
//! - The weighted draw with pity and the token reward
//! - Draw history and the overlay push
//! - Chat command handling and the bot event loop

pub mod rarity;
pub mod catalog;
pub mod engine;
pub mod reward;
pub mod history;
pub mod overlay;
pub mod pipeline;
pub mod chat;
pub mod server;

pub use server::GachaBot;
pub use engine::{DrawEngine, DrawResult};
pub use pipeline::{DrawPipeline, DrawTrigger};
pub use chat::{ChatEvent, ChatCommandParser, ChatCommand};

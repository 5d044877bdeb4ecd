//! Library entry for gachabot components used by the binary and tests.

pub mod config;
pub mod gacha;
pub mod metrics;
pub mod storage;
pub mod twitch;

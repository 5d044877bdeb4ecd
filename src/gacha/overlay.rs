//! Best-effort push of a drawn card to the stream overlay.
//!
//! One POST to `<url>/show_card` with a short timeout. Failures are logged
//! and counted, never retried, and never surface to the draw.

use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;

use crate::config::OverlayConfig;
use crate::metrics;
use crate::storage::Card;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayPayload {
    pub user: String,
    pub name: String,
    pub rarity: String,
    pub image_url: String,
}

impl OverlayPayload {
    pub fn new(display_name: &str, card: &Card, placeholder: &str) -> Self {
        OverlayPayload {
            user: display_name.to_string(),
            name: card.name.clone(),
            rarity: card.rarity.to_string(),
            image_url: card.image_or(placeholder).to_string(),
        }
    }
}

pub struct OverlayNotifier {
    endpoint: Option<String>,
    placeholder: String,
    #[cfg(feature = "overlay")]
    client: reqwest::Client,
}

impl OverlayNotifier {
    pub fn new(cfg: &OverlayConfig) -> Result<Self> {
        let endpoint = if cfg.enabled && !cfg.url.trim().is_empty() {
            Some(format!("{}/show_card", cfg.url.trim_end_matches('/')))
        } else {
            None
        };
        #[cfg(feature = "overlay")]
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()?;
        Ok(OverlayNotifier {
            endpoint,
            placeholder: cfg.placeholder_image.clone(),
            #[cfg(feature = "overlay")]
            client,
        })
    }

    pub fn endpoint(&self) -> Option<&str> { self.endpoint.as_deref() }

    /// Push the card; returns whether the overlay acknowledged with 200.
    #[cfg(feature = "overlay")]
    pub async fn notify(&self, display_name: &str, card: &Card) -> bool {
        let Some(url) = &self.endpoint else { return false };
        let payload = OverlayPayload::new(display_name, card, &self.placeholder);
        match self.client.post(url).json(&payload).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                debug!("[Overlay] delivered '{}' for {}", payload.name, payload.user);
                true
            }
            Ok(resp) => {
                warn!("[Overlay] server answered with status {}", resp.status());
                metrics::inc_overlay_failed();
                false
            }
            Err(e) => {
                warn!("[Overlay] failed to send card to overlay: {}", e);
                metrics::inc_overlay_failed();
                false
            }
        }
    }

    #[cfg(not(feature = "overlay"))]
    pub async fn notify(&self, display_name: &str, card: &Card) -> bool {
        if self.endpoint.is_some() {
            let payload = OverlayPayload::new(display_name, card, &self.placeholder);
            debug!("[Overlay] built without 'overlay' feature; dropping {:?}", payload);
        }
        false
    }
}

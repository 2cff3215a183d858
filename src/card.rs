use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("Failed to reach card API: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Card API returned {0}")]
    Status(StatusCode),
    #[error("Failed to decode card: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Card API base URL cannot carry a path: {0}")]
    InvalidUrl(Url),
}

/// A card as returned by the ArkhamDB public API
#[derive(Debug, Clone, Deserialize)]
pub struct Card {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Anything that can resolve a card identifier into a card.
#[async_trait]
pub trait CardLookup: Send + Sync {
    async fn lookup(&self, card_id: &str) -> Result<Card, CardError>;
}

pub struct CardClient {
    client: reqwest::Client,
    base_url: Url,
}

impl CardClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
        }
    }

    fn card_url(&self, card_id: &str) -> Result<Url, CardError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CardError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "public", "card", card_id]);
        Ok(url)
    }
}

#[async_trait]
impl CardLookup for CardClient {
    async fn lookup(&self, card_id: &str) -> Result<Card, CardError> {
        let url = self.card_url(card_id)?;

        debug!("Fetching card from ArkhamDB: {}", url);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CardError::Status(status));
        }

        let body = response.text().await?;
        let card: Card = serde_json::from_str(&body)?;

        debug!(
            "Card {} resolved: {}",
            card_id,
            card.name.as_deref().unwrap_or("<unnamed>")
        );

        Ok(card)
    }
}

//! Agent cards — the descriptor a remote agent publishes, and its
//! resolution from inline values, URLs, or files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Descriptor published by a remote agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// RPC endpoint the client binds to.
    pub url: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: CardCapabilities,
}

/// Optional capabilities a card advertises.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardCapabilities {
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub push_notifications: bool,
}

/// Where the card comes from. Resolution is lazy, on first run.
#[derive(Debug, Clone)]
pub enum CardSource {
    Inline(AgentCard),
    Url(String),
    File(PathBuf),
}

/// Card resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    #[error("card fetch failed: {0}")]
    Fetch(String),

    #[error("card file unreadable: {0}")]
    File(String),

    #[error("card is not valid JSON: {0}")]
    Parse(String),

    #[error("card is invalid: {0}")]
    Invalid(String),
}

impl From<CardError> for af_domain::Error {
    fn from(e: CardError) -> Self {
        af_domain::Error::Card(e.to_string())
    }
}

/// Resolves and validates an [`AgentCard`] from its source.
pub struct CardResolver {
    source: CardSource,
    http: reqwest::Client,
}

impl CardResolver {
    pub fn new(source: CardSource) -> Self {
        Self {
            source,
            http: reqwest::Client::new(),
        }
    }

    pub async fn resolve(&self) -> Result<AgentCard, CardError> {
        let card = match &self.source {
            CardSource::Inline(card) => card.clone(),
            CardSource::Url(url) => self.fetch(url).await?,
            CardSource::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| CardError::File(format!("{}: {e}", path.display())))?;
                serde_json::from_str(&raw).map_err(|e| CardError::Parse(e.to_string()))?
            }
        };

        validate(&card)?;
        tracing::debug!(agent = %card.name, url = %card.url, "agent card resolved");
        Ok(card)
    }

    async fn fetch(&self, url: &str) -> Result<AgentCard, CardError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CardError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CardError::Fetch(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        response
            .json::<AgentCard>()
            .await
            .map_err(|e| CardError::Parse(e.to_string()))
    }
}

/// A card must name a reachable RPC endpoint: non-empty URL with both a
/// scheme and a host.
pub fn validate(card: &AgentCard) -> Result<(), CardError> {
    if card.name.is_empty() {
        return Err(CardError::Invalid("missing agent name".into()));
    }
    if card.url.is_empty() {
        return Err(CardError::Invalid("missing RPC URL".into()));
    }
    let parsed = reqwest::Url::parse(&card.url)
        .map_err(|e| CardError::Invalid(format!("bad RPC URL '{}': {e}", card.url)))?;
    if !parsed.has_host() {
        return Err(CardError::Invalid(format!(
            "RPC URL '{}' has no host",
            card.url
        )));
    }
    Ok(())
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use af_domain::stream::BoxStream;
use af_domain::{Content, Result, ToolDeclaration};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sampling and routing parameters sent with every request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    /// Injected once per request, never read back from the session log.
    #[serde(default)]
    pub system_instruction: Option<String>,
}

/// A provider-agnostic generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    /// The ordered conversation to send.
    pub contents: Vec<Content>,
    /// Tool declarations the model may invoke.
    pub tools: Vec<ToolDeclaration>,
    pub config: LlmConfig,
}

/// A provider-agnostic generation response (or streaming chunk).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmResponse {
    #[serde(default)]
    pub content: Option<Content>,
    /// `true` for intermediate streaming chunks; the final chunk clears it.
    #[serde(default)]
    pub partial: bool,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl LlmResponse {
    pub fn from_content(content: Content) -> Self {
        Self {
            content: Some(content),
            partial: false,
            metadata: HashMap::new(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every model backend adapter must implement.
///
/// Implementations translate between these types and a concrete provider's
/// wire format. Errors whose message carries one of the
/// [`retry`](crate::retry) substrings are treated as transient by the flow
/// driver.
#[async_trait::async_trait]
pub trait LlmBackend: Send + Sync {
    /// Send a request and wait for the complete response.
    async fn generate(&self, req: LlmRequest) -> Result<LlmResponse>;

    /// Send a request and return a stream of partial responses. The final
    /// item arrives with `partial == false`.
    async fn generate_stream(
        &self,
        req: LlmRequest,
    ) -> Result<BoxStream<'static, Result<LlmResponse>>>;

    /// Release any held connections.
    async fn close(&self);
}

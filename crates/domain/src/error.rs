/// Shared error type used across all AgentFlow crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    /// Model backend failure. The message is what the retry classifier
    /// inspects for retryable substrings.
    #[error("model: {0}")]
    Model(String),

    #[error("tool {name}: {message}")]
    Tool { name: String, message: String },

    #[error("callback: {0}")]
    Callback(String),

    #[error("too many tool calls in single turn")]
    ToolLimit,

    #[error("agent card: {0}")]
    Card(String),

    #[error("transport: {0}")]
    Transport(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("invocation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn tool(name: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            name: name.into(),
            message: message.into(),
        }
    }
}

//! Remote agent transport contract: messages, tasks, and server events.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// One element of a remote message or status update. Only text parts are
/// translated into local events; other kinds pass through untranslated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum RemotePart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "file")]
    File { uri: String },
    #[serde(rename = "data")]
    Data { data: serde_json::Value },
}

/// A user or agent message on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub role: String,
    pub parts: Vec<RemotePart>,
}

impl RemoteMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            parts: vec![RemotePart::Text { text: text.into() }],
        }
    }

    /// Joined text parts, if any.
    pub fn text(&self) -> Option<String> {
        let joined: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|p| match p {
                RemotePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined.join("\n"))
        }
    }
}

/// Remote task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Submitted,
    Working,
    Completed,
    Failed,
    Canceled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Submitted => "submitted",
            TaskState::Working => "working",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Canceled => "canceled",
        }
    }
}

/// Server-side task snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    #[serde(default)]
    pub status_message: Option<RemoteMessage>,
    #[serde(default)]
    pub artifacts: Vec<RemoteMessage>,
}

/// One event on the streaming RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskEvent {
    #[serde(rename = "task")]
    Snapshot { task: Task, is_final: bool },
    #[serde(rename = "status_update")]
    StatusUpdate {
        task_id: String,
        state: TaskState,
        #[serde(default)]
        message: Option<RemoteMessage>,
        is_final: bool,
    },
    #[serde(rename = "artifact_update")]
    ArtifactUpdate {
        task_id: String,
        artifact: RemoteMessage,
        is_final: bool,
    },
}

impl TaskEvent {
    pub fn is_final(&self) -> bool {
        match self {
            TaskEvent::Snapshot { is_final, .. }
            | TaskEvent::StatusUpdate { is_final, .. }
            | TaskEvent::ArtifactUpdate { is_final, .. } => *is_final,
        }
    }
}

/// Transport failures. Messages carrying the shared retryable substrings
/// (timeout, connection, …) are retried by the client.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("http: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),
}

impl From<TransportError> for af_domain::Error {
    fn from(e: TransportError) -> Self {
        af_domain::Error::Transport(e.to_string())
    }
}

/// The RPC surface a remote agent server exposes.
#[async_trait::async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Submit a message; returns the (possibly already terminal) task.
    async fn send_message(&self, message: RemoteMessage) -> Result<Task, TransportError>;

    /// Submit a message on the streaming RPC; server events are delivered
    /// through `events` until the final one.
    async fn send_message_stream(
        &self,
        message: RemoteMessage,
        events: mpsc::Sender<TaskEvent>,
    ) -> Result<(), TransportError>;

    /// Fetch the current snapshot of a task.
    async fn get_task(&self, task_id: &str) -> Result<Task, TransportError>;

    async fn close(&self);
}

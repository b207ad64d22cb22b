//! Ordered progress events with keep-alive draining.

use std::{fmt, time::Duration};

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{Mutex, mpsc};

use crate::SessionState;

/// Default idle timeout before a keep-alive is yielded (30 s).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Top-level event fields that extras may not overwrite.
const RESERVED_KEYS: [&str; 3] = ["type", "message", "state"];

/// Kind of a progress event.
///
/// Anything that is not a lifecycle kind is an action kind named after the
/// action the worker requested (e.g. `fill_field`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Started,
    Running,
    ScanRequest,
    AskHuman,
    Resumed,
    Done,
    Error,
    Stopped,
    Action(String),
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Started => "started",
            Self::Running => "running",
            Self::ScanRequest => "scan_request",
            Self::AskHuman => "ask_human",
            Self::Resumed => "resumed",
            Self::Done => "done",
            Self::Error => "error",
            Self::Stopped => "stopped",
            Self::Action(kind) => kind,
        }
    }

    /// Whether this kind closes the event stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Stopped)
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "started" => Self::Started,
            "running" => Self::Running,
            "scan_request" => Self::ScanRequest,
            "ask_human" => Self::AskHuman,
            "resumed" => Self::Resumed,
            "done" => Self::Done,
            "error" => Self::Error,
            "stopped" => Self::Stopped,
            _ => Self::Action(value),
        }
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Action(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub message: String,
    /// Session state at the time the event was produced.
    pub state: SessionState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgressEvent {
    /// Create an event without extra fields.
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>, state: SessionState) -> Self {
        Self {
            kind,
            message: message.into(),
            state,
            extra: Map::new(),
        }
    }

    /// Attach extra fields. Non-object values are stored under `payload`.
    ///
    /// Keys that collide with the event's own fields are renamed to
    /// `payload_<key>`.
    #[must_use]
    pub fn with_extra(mut self, extra: Value) -> Self {
        match extra {
            Value::Object(map) => {
                for (key, value) in map {
                    let key = if RESERVED_KEYS.contains(&key.as_str()) {
                        format!("payload_{key}")
                    } else {
                        key
                    };
                    self.extra.insert(key, value);
                }
            }
            Value::Null => {}
            other => {
                self.extra.insert("payload".to_string(), other);
            }
        }
        self
    }

    /// Convert to an SSE event (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn to_sse_event(&self) -> axum::response::sse::Event {
        match serde_json::to_string(self) {
            Ok(json) => axum::response::sse::Event::default().data(json),
            Err(e) => {
                tracing::error!("Failed to serialize progress event: {e}");
                axum::response::sse::Event::default().comment("unserializable event")
            }
        }
    }
}

/// Result of one drain call.
#[derive(Debug, Clone, PartialEq)]
pub enum Drained {
    /// The next event in submission order.
    Event(ProgressEvent),
    /// No event arrived within the idle timeout.
    KeepAlive,
}

impl Drained {
    /// Convert to an SSE event (requires `sse` feature).
    #[cfg(feature = "sse")]
    #[must_use]
    pub fn to_sse_event(&self) -> axum::response::sse::Event {
        match self {
            Self::Event(event) => event.to_sse_event(),
            Self::KeepAlive => axum::response::sse::Event::default().comment("keepalive"),
        }
    }
}

/// Unbounded FIFO of progress events with a single consumer.
///
/// Producers never block. Concurrent consumers share the queue, so each
/// event is delivered to exactly one of them.
pub struct EventChannel {
    sender: mpsc::UnboundedSender<ProgressEvent>,
    receiver: Mutex<mpsc::UnboundedReceiver<ProgressEvent>>,
    idle_timeout: Duration,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    /// Create a channel with the default idle timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }

    /// Create a channel with a custom idle timeout.
    #[must_use]
    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            idle_timeout,
        }
    }

    /// Append an event.
    pub fn push(&self, event: ProgressEvent) {
        tracing::trace!(kind = %event.kind, "progress event");
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.sender.send(event);
    }

    /// Wait for the next event, or yield a keep-alive after the idle timeout.
    pub async fn drain(&self) -> Drained {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(self.idle_timeout, receiver.recv()).await {
            Ok(Some(event)) => Drained::Event(event),
            Ok(None) | Err(_) => Drained::KeepAlive,
        }
    }

    /// Stream of future events, ending after the first terminal event.
    ///
    /// Nothing is replayed: events already drained by another consumer are gone.
    #[must_use]
    pub fn stream(self: &std::sync::Arc<Self>) -> BoxStream<'static, Drained> {
        let channel = std::sync::Arc::clone(self);
        stream::unfold(Some(channel), |channel| async move {
            let channel = channel?;
            let item = channel.drain().await;
            let closes = matches!(&item, Drained::Event(e) if e.kind.is_terminal());
            Some((item, (!closes).then_some(channel)))
        })
        .boxed()
    }
}

/// Encode drained items as SSE events (requires `sse` feature).
#[cfg(feature = "sse")]
#[must_use]
pub fn sse_stream(
    drained: BoxStream<'static, Drained>,
) -> BoxStream<'static, Result<axum::response::sse::Event, std::convert::Infallible>> {
    drained.map(|item| Ok(item.to_sse_event())).boxed()
}

//! # Event Bus System
//!
//! Typed, broadcast-based events for the authorization and upload workflow,
//! built on `tokio::sync::broadcast`.
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ core-auth   ├──────────────>│           │     subscribe    ┌────────────┐
//! └─────────────┘               │ EventBus  ├─────────────────>│ Subscriber │
//! ┌─────────────┐     emit      │           │                  └────────────┘
//! │ core-upload ├──────────────>│           │
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Auth(AuthEvent::Authorized {
//!         identity: "user@example.com".to_string(),
//!     }))
//!     .ok();
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Identity authorized");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when nobody is subscribed; publishers ignore that case.
//! Slow subscribers get `RecvError::Lagged(n)` and may keep receiving;
//! `RecvError::Closed` means every sender is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Upload(UploadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Auth(e) => e.description(),
            CoreEvent::Upload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::FileFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Upload(UploadEvent::FlushCompleted { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Auth(AuthEvent::Authorized { .. })
            | CoreEvent::Upload(UploadEvent::FlushCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authorization Events
// ============================================================================

/// Events emitted by the authorization service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// An authorization URL was issued; the identity awaits the callback.
    AuthorizationStarted { identity: String },
    /// A code was exchanged and the credential persisted.
    Authorized { identity: String },
    /// A stored credential was refreshed on use.
    TokenRefreshed {
        identity: String,
        /// Unix epoch seconds when the new access token expires.
        expires_at: i64,
    },
    /// The stored credential was removed.
    SignedOut { identity: String },
    AuthError {
        identity: Option<String>,
        message: String,
    },
}

impl AuthEvent {
    fn description(&self) -> &str {
        match self {
            AuthEvent::AuthorizationStarted { .. } => "Authorization started",
            AuthEvent::Authorized { .. } => "Identity authorized",
            AuthEvent::TokenRefreshed { .. } => "Token refreshed successfully",
            AuthEvent::SignedOut { .. } => "Credential removed",
            AuthEvent::AuthError { .. } => "Authorization error",
        }
    }
}

// ============================================================================
// Upload Events
// ============================================================================

/// Events emitted while staging and flushing files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    FileStaged {
        session_id: String,
        file_name: String,
        position: usize,
        size: u64,
    },
    FlushStarted {
        session_id: String,
        identity: String,
        file_count: usize,
    },
    FileUploaded {
        identity: String,
        file_name: String,
        remote_id: String,
    },
    FileFailed {
        identity: String,
        file_name: String,
        message: String,
    },
    FlushCompleted {
        identity: String,
        succeeded: usize,
        failed: usize,
    },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::FileStaged { .. } => "File staged",
            UploadEvent::FlushStarted { .. } => "Flush started",
            UploadEvent::FileUploaded { .. } => "File uploaded",
            UploadEvent::FileFailed { .. } => "File upload failed",
            UploadEvent::FlushCompleted { .. } => "Flush completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus. Subscribers falling more than `capacity`
    /// events behind receive `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a receiver for all future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let uploads = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Upload(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorized(identity: &str) -> CoreEvent {
        CoreEvent::Auth(AuthEvent::Authorized {
            identity: identity.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(authorized("a@example.com")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = authorized("a@example.com");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Upload(_)));

        bus.emit(authorized("a@example.com")).ok();
        let upload = CoreEvent::Upload(UploadEvent::FlushCompleted {
            identity: "a@example.com".to_string(),
            succeeded: 2,
            failed: 0,
        });
        bus.emit(upload.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), upload);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(authorized("a@example.com")).ok();
        assert!(matches!(stream.try_recv(), Some(Ok(CoreEvent::Auth(_)))));
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                identity: format!("user{}@example.com", i),
                expires_at: 1_700_000_000 + i,
            }))
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let error = CoreEvent::Auth(AuthEvent::AuthError {
            identity: None,
            message: "denied".to_string(),
        });
        assert_eq!(error.severity(), EventSeverity::Error);

        let partial = CoreEvent::Upload(UploadEvent::FlushCompleted {
            identity: "a@example.com".to_string(),
            succeeded: 2,
            failed: 1,
        });
        assert_eq!(partial.severity(), EventSeverity::Warning);

        let clean = CoreEvent::Upload(UploadEvent::FlushCompleted {
            identity: "a@example.com".to_string(),
            succeeded: 3,
            failed: 0,
        });
        assert_eq!(clean.severity(), EventSeverity::Info);

        let staged = CoreEvent::Upload(UploadEvent::FileStaged {
            session_id: "s".to_string(),
            file_name: "a.txt".to_string(),
            position: 0,
            size: 3,
        });
        assert_eq!(staged.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Upload(UploadEvent::FileUploaded {
            identity: "a@example.com".to_string(),
            file_name: "a.txt".to_string(),
            remote_id: "1AbC".to_string(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Upload");
        assert_eq!(json["payload"]["event"], "FileUploaded");
        assert_eq!(json["payload"]["remote_id"], "1AbC");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}

//! Auth and upload notifications.
//!
//! Providers publish [`SdkEvent`]s on an [`EventBus`] so a host can drive a
//! sign-in indicator or an upload progress bar without passing callbacks
//! through every call. The bus is a `tokio::sync::broadcast` channel: events
//! published while nobody is subscribed are dropped, and a slow subscriber
//! loses the oldest events rather than blocking uploads.
//!
//! ```rust
//! use core_runtime::events::{EventBus, UploadEvent};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut watch = bus.watch_upload("report.docx");
//!
//! bus.emit(UploadEvent::Progress {
//!     upload_id: "report.docx".to_string(),
//!     bytes_uploaded: 327_680,
//!     total_bytes: 1_048_576,
//! });
//!
//! let event = watch.next().await.unwrap();
//! assert!(!event.is_terminal());
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

pub use tokio::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum SdkEvent {
    Auth(AuthEvent),
    Upload(UploadEvent),
}

impl SdkEvent {
    /// Failures a host would surface to the user.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            SdkEvent::Auth(AuthEvent::AuthError { .. }) | SdkEvent::Upload(UploadEvent::Failed { .. })
        )
    }
}

impl From<AuthEvent> for SdkEvent {
    fn from(event: AuthEvent) -> Self {
        SdkEvent::Auth(event)
    }
}

impl From<UploadEvent> for SdkEvent {
    fn from(event: UploadEvent) -> Self {
        SdkEvent::Upload(event)
    }
}

/// Sign-in lifecycle.
///
/// `account` is the `user_id` reported by the token endpoint, or the client
/// id when the service did not return one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    SignedOut {
        account: String,
    },
    SigningIn {
        /// "MicrosoftAccount" or "ActiveDirectory"
        account_type: String,
    },
    SignedIn {
        account: String,
        account_type: String,
    },
    TokenRefreshing {
        account: String,
    },
    TokenRefreshed {
        account: String,
        /// Unix epoch seconds
        expires_at: i64,
    },
    AuthError {
        account: Option<String>,
        message: String,
        /// Whether signing in again can succeed
        recoverable: bool,
    },
}

/// Chunked upload lifecycle.
///
/// `upload_id` names one upload session for the lifetime of its provider,
/// normally the item name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    Started {
        upload_id: String,
        total_bytes: u64,
    },
    Progress {
        upload_id: String,
        bytes_uploaded: u64,
        total_bytes: u64,
    },
    /// A chunk hit a transient error and will be resent on the next pass.
    ChunkRetried {
        upload_id: String,
        attempt: u32,
        range_start: u64,
        range_end: u64,
        message: String,
    },
    Completed {
        upload_id: String,
        item_id: String,
        total_bytes: u64,
    },
    Failed {
        upload_id: String,
        attempts: u32,
        message: String,
    },
}

impl UploadEvent {
    pub fn upload_id(&self) -> &str {
        match self {
            UploadEvent::Started { upload_id, .. }
            | UploadEvent::Progress { upload_id, .. }
            | UploadEvent::ChunkRetried { upload_id, .. }
            | UploadEvent::Completed { upload_id, .. }
            | UploadEvent::Failed { upload_id, .. } => upload_id,
        }
    }

    /// No further events follow for this upload.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadEvent::Completed { .. } | UploadEvent::Failed { .. })
    }
}

/// Broadcast channel shared by every provider built from one `SdkConfig`.
/// Clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SdkEvent>,
}

impl EventBus {
    /// `capacity` events are buffered per subscriber before the oldest are
    /// overwritten.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers and return how many there were.
    pub fn emit(&self, event: impl Into<SdkEvent>) -> usize {
        self.sender.send(event.into()).unwrap_or(0)
    }

    /// Events published from now on. Nothing is replayed.
    pub fn subscribe(&self) -> Receiver<SdkEvent> {
        self.sender.subscribe()
    }

    /// Follow a single upload until it completes or fails.
    pub fn watch_upload(&self, upload_id: impl Into<String>) -> UploadWatch {
        UploadWatch {
            upload_id: upload_id.into(),
            receiver: self.subscribe(),
            finished: false,
        }
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
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Upload events for one `upload_id`.
///
/// Lost events (the subscriber lagged) are skipped with a warning. The watch
/// yields `None` after the terminal event or once the bus is gone.
#[derive(Debug)]
pub struct UploadWatch {
    upload_id: String,
    receiver: Receiver<SdkEvent>,
    finished: bool,
}

impl UploadWatch {
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub async fn next(&mut self) -> Option<UploadEvent> {
        while !self.finished {
            match self.receiver.recv().await {
                Ok(event) => {
                    if let Some(event) = self.accept(event) {
                        return Some(event);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(upload_id = %self.upload_id, skipped, "Upload watcher lagged");
                }
                Err(RecvError::Closed) => self.finished = true,
            }
        }
        None
    }

    /// Next buffered event, without waiting.
    pub fn try_next(&mut self) -> Option<UploadEvent> {
        while !self.finished {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if let Some(event) = self.accept(event) {
                        return Some(event);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(upload_id = %self.upload_id, skipped, "Upload watcher lagged");
                }
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Closed) => self.finished = true,
            }
        }
        None
    }

    fn accept(&mut self, event: SdkEvent) -> Option<UploadEvent> {
        match event {
            SdkEvent::Upload(event) if event.upload_id() == self.upload_id => {
                self.finished = event.is_terminal();
                Some(event)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(id: &str, bytes: u64) -> UploadEvent {
        UploadEvent::Progress {
            upload_id: id.to_string(),
            bytes_uploaded: bytes,
            total_bytes: 1000,
        }
    }

    fn completed(id: &str) -> UploadEvent {
        UploadEvent::Completed {
            upload_id: id.to_string(),
            item_id: "01BYE5RZ".to_string(),
            total_bytes: 1000,
        }
    }

    fn signed_in() -> AuthEvent {
        AuthEvent::SignedIn {
            account: "user-1".to_string(),
            account_type: "MicrosoftAccount".to_string(),
        }
    }

    #[tokio::test]
    async fn emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        assert_eq!(bus.emit(signed_in()), 0);
    }

    #[tokio::test]
    async fn every_subscriber_gets_the_event() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.emit(signed_in()), 2);
        assert_eq!(first.recv().await.unwrap(), SdkEvent::Auth(signed_in()));
        assert_eq!(second.recv().await.unwrap(), SdkEvent::Auth(signed_in()));
    }

    #[tokio::test]
    async fn watch_follows_one_upload_until_it_finishes() {
        let bus = EventBus::new(16);
        let mut watch = bus.watch_upload("a.bin");

        bus.emit(signed_in());
        bus.emit(progress("b.bin", 10));
        bus.emit(progress("a.bin", 20));
        bus.emit(completed("a.bin"));
        bus.emit(progress("a.bin", 30));

        assert_eq!(watch.next().await, Some(progress("a.bin", 20)));
        assert_eq!(watch.next().await, Some(completed("a.bin")));
        assert_eq!(watch.next().await, None);
    }

    #[tokio::test]
    async fn watch_skips_over_lost_events() {
        let bus = EventBus::new(2);
        let mut watch = bus.watch_upload("a.bin");

        for bytes in [1, 2, 3, 4] {
            bus.emit(progress("a.bin", bytes));
        }

        assert_eq!(watch.try_next(), Some(progress("a.bin", 3)));
        assert_eq!(watch.try_next(), Some(progress("a.bin", 4)));
        assert_eq!(watch.try_next(), None);
    }

    #[tokio::test]
    async fn watch_ends_when_bus_is_dropped() {
        let bus = EventBus::new(4);
        let mut watch = bus.watch_upload("a.bin");
        drop(bus);
        assert_eq!(watch.next().await, None);
    }

    #[test]
    fn error_events() {
        let failed = UploadEvent::Failed {
            upload_id: "a.bin".to_string(),
            attempts: 3,
            message: "boom".to_string(),
        };
        assert!(failed.is_terminal());
        assert!(SdkEvent::from(failed).is_error());
        assert!(!SdkEvent::from(signed_in()).is_error());
    }

    #[test]
    fn events_serialize_with_type_and_payload_tags() {
        let json = serde_json::to_value(SdkEvent::from(progress("a.bin", 5))).unwrap();
        assert_eq!(json["type"], "Upload");
        assert_eq!(json["payload"]["event"], "Progress");
        assert_eq!(json["payload"]["bytes_uploaded"], 5);

        let back: SdkEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, SdkEvent::Upload(progress("a.bin", 5)));
    }
}

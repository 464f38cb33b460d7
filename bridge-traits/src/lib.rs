//! Capabilities the OneDrive SDK borrows from its host.
//!
//! The SDK does no I/O of its own. A host hands it an [`HttpClient`] for all
//! network traffic, a [`SecureStore`] where the credential cache is
//! persisted, and optionally a [`Clock`] and a [`LoggerSink`]. Desktop
//! implementations live in `bridge-desktop`; tests substitute mocks.
//!
//! Every capability is `Send + Sync` and fails with [`BridgeError`]. Only
//! `Timeout` and `Io` count as transient when the upload provider decides
//! whether a chunk may be resent.

pub mod error;
pub mod http;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use storage::SecureStore;
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};

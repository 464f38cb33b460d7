//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the SDK crates:
//! - Logging and tracing bootstrap
//! - SDK configuration (bridges, upload tunables, retry policy)
//! - Event bus for auth and upload events

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{SdkConfig, SdkConfigBuilder, UploadConfig};
pub use error::{Error, Result};
pub use events::{AuthEvent, EventBus, SdkEvent, UploadEvent, UploadWatch};

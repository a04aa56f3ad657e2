//! # pipeline-realtime
//!
//! Change-feed subscriptions for views that mirror a relational store.
//!
//! A [`SubscriptionManager`] owns at most one [`ChangeFeedConnection`] for the
//! [`WatchSet`] it is configured with, exposes a tri-state
//! [`ConnectionStatus`], and delivers every change event to the most recently
//! supplied callback.
//!
//! ## Example
//!
//! ```rust,ignore
//! use pipeline_realtime::prelude::*;
//!
//! let transport = Arc::new(WsTransport::new(
//!     RealtimeConfig::new("https://project.supabase.co").with_api_key(key),
//! )?);
//! let mut manager = SubscriptionManager::new(transport);
//!
//! manager.configure(["applications", "application_steps"], |event| {
//!     println!("{} changed", event.resource);
//!     Ok(())
//! }, true);
//! ```
//!
//! ## Transports
//!
//! - [`WsTransport`] - Phoenix-channel realtime endpoint over WebSockets
//! - [`MemoryTransport`] - in-process, synchronous dispatch

mod config;
mod connection;
mod error;
mod event;
mod manager;
mod memory;
pub mod prelude;
pub mod protocol;
mod transport;
mod watch_set;
mod websocket;

pub use config::{RealtimeConfig, DEFAULT_SCHEMA};
pub use connection::{ChangeFeedConnection, ConnectionStatus, ConnectionStatusHandler};
pub use error::{RealtimeError, Result};
pub use event::{ChangeEvent, ChangeKind, EventMask};
pub use manager::{ChangeCallback, ManagerState, SubscriptionManager};
pub use memory::MemoryTransport;
pub use transport::{
    ChangeTransport, EventHandler, StatusHandler, TransportChannel, TransportStatus,
};
pub use watch_set::{WatchKey, WatchSet};
pub use websocket::WsTransport;

//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use pipeline_realtime::prelude::*;
//! ```

pub use crate::{
    ChangeEvent, ChangeKind, ChangeTransport, ConnectionStatus, MemoryTransport, RealtimeConfig,
    RealtimeError, SubscriptionManager, WatchSet, WsTransport,
};

pub use std::sync::Arc;

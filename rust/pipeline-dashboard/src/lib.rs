//! # pipeline-dashboard
//!
//! Live views over a recruiting pipeline: headline stats and an applications
//! grid, each re-queried whenever the change feed reports a write to the
//! `applications` or `application_steps` tables.
//!
//! ```rust,ignore
//! use pipeline_dashboard::prelude::*;
//!
//! let config = DashboardConfig::from_env()?;
//! telemetry::init(config.telemetry())?;
//!
//! let dashboard = Dashboard::connect(&config)?;
//! let stats = dashboard.stats.wait_for(|s| !s.loading).await;
//! ```
//!
//! [`MemoryStore`] paired with a `MemoryTransport` gives a fully in-process
//! setup where every write is echoed on the feed.

mod config;
mod dashboard;
mod error;
pub mod model;
pub mod prelude;
mod reset;
pub mod seed;
pub mod store;
pub mod telemetry;
pub mod view_model;

pub use config::DashboardConfig;
pub use dashboard::Dashboard;
pub use error::{Result, StoreError};
pub use reset::{reset_all, ResetReport};
pub use store::{Filter, MemoryStore, Query, RecordStore, RestStore};
pub use view_model::{
    ApplicationsGrid, DashboardStats, Fetcher, LiveView, RealtimeMonitor, Snapshot, Stats,
};

//! ```rust,ignore
//! use pipeline_dashboard::prelude::*;
//! ```

pub use crate::model::{Application, ApplicationStep, StepStatus};
pub use crate::telemetry::{self, TelemetryConfig};
pub use crate::{
    ApplicationsGrid, Dashboard, DashboardConfig, DashboardStats, MemoryStore, RecordStore,
    RestStore, Stats, StoreError,
};

pub use pipeline_realtime::{ConnectionStatus, MemoryTransport, WsTransport};
pub use std::sync::Arc;

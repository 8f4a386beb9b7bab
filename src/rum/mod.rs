//! Session and view instrumentation: performance metrics and crash reconciliation.
//!
//! Components here are driven from the host's serial event-processing queue. Callbacks for one
//! session arrive on one logical thread, so the metrics carry no locks and take `&mut self`.

pub mod crash;
pub mod metrics;

mod app_state;
mod event;

pub use app_state::{AppState, AppStateHistory};
pub use event::{
    ApplicationInfo, Cellular, Connectivity, CrashAttributes, CrashCount, DeviceInfo,
    ErrorCategory, ErrorCount, ErrorDetails, ErrorViewRef, RumErrorEvent, RumEvent, RumViewEvent,
    SessionInfo, UserInfo, ViewDetails,
};

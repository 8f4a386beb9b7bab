//! Crash reconciliation.
//!
//! A crashed process cannot report its own crash: the platform crash handler captures a report,
//! and the *next* process launch finds it alongside the state snapshot the crashed process kept
//! persisting. This module decides whether that crash belongs to a tracked session and emits the
//! retroactive view and error events for it.

mod context;
mod reconciler;
mod report;

pub use context::{
    CrashContext, CrashContextStore, LastSessionState, SessionKnowledge, TrackingConsent,
    NOT_SAMPLED_SESSION_ID,
};
pub use reconciler::{
    CrashReconciler, CrashReconcilerConfig, EventMapper, APP_LAUNCH_VIEW_NAME,
    APP_LAUNCH_VIEW_URL, BACKGROUND_VIEW_NAME, BACKGROUND_VIEW_URL,
};
pub use report::{BinaryImage, CrashMeta, CrashReport, CrashThread};

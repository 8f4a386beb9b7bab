//! RUM view and error event schemas.
//!
//! These mirror the intake wire format closely enough for crash reconciliation: the last view
//! event is persisted in the crash-context snapshot and replayed (updated) after a crash, so it
//! must round-trip losslessly through serialization.

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::rum::crash::{BinaryImage, CrashMeta, CrashThread};
use crate::{Str, Timestamp};

/// An event emitted into the RUM event stream.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RumEvent {
    /// A view update.
    View(RumViewEvent),
    /// An error linked to a view.
    Error(RumErrorEvent),
}

/// A view update.
///
/// Each update describes the cumulative state of one view. Consumers receiving several updates
/// for the same view id keep the one with the highest [`document_version`][Self::document_version].
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RumViewEvent {
    /// When the view started.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: Timestamp,
    /// The monitored application.
    pub application: ApplicationInfo,
    /// The session this view belongs to.
    pub session: SessionInfo,
    /// View state.
    pub view: ViewDetails,
    /// The user tracked at the time of the view.
    pub usr: Option<UserInfo>,
    /// Network connectivity at the time of the view.
    pub connectivity: Option<Connectivity>,
    /// The device running the application.
    pub device: Option<DeviceInfo>,
    /// Service name of the application.
    pub service: Option<Str>,
    /// Version of the application.
    pub version: Option<Str>,
    /// Build number of the application.
    pub build_version: Option<Str>,
    /// The SDK flavor that produced this event, e.g. `"ios"` or `"android"`.
    pub source: Option<Str>,
    /// Counter incremented on each update of this view.
    pub document_version: u64,
    /// Crash details, present when this update was produced by crash reconciliation.
    pub crash_details: Option<CrashAttributes>,
}

impl RumViewEvent {
    /// Number of crashes recorded against this view.
    pub fn crash_count(&self) -> u64 {
        self.view.crash.map_or(0, |crash| crash.count)
    }
}

/// Identity of the monitored application.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApplicationInfo {
    /// RUM application id.
    pub id: Str,
}

/// Identity of a RUM session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SessionInfo {
    /// Session id. The all-zeroes id marks a session rejected by sampling.
    pub id: Str,
}

/// Per-view state carried on a view update.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewDetails {
    /// View id.
    pub id: Str,
    /// Human-readable view name.
    pub name: Option<Str>,
    /// View URL, or a URL-like identifier for native views.
    pub url: Str,
    /// Crashes recorded against this view. Absent means zero.
    pub crash: Option<CrashCount>,
    /// Errors recorded against this view.
    #[serde(default)]
    pub error: ErrorCount,
    /// Whether the view is still active. A crash always closes its view.
    pub is_active: Option<bool>,
}

/// Crash counter nested under `view.crash`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrashCount {
    /// Number of crashes.
    pub count: u64,
}

/// Error counter nested under `view.error`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorCount {
    /// Number of errors.
    pub count: u64,
}

/// Identity of the tracked user.
#[allow(missing_docs)]
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct UserInfo {
    pub id: Option<Str>,
    pub name: Option<Str>,
    pub email: Option<Str>,
}

/// Network connectivity snapshot.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Connectivity {
    /// Connectivity status: `"connected"`, `"not_connected"`, or `"maybe"`.
    pub status: Str,
    /// Active network interfaces, e.g. `"wifi"` or `"cellular"`.
    pub interfaces: Option<Vec<Str>>,
    /// Cellular details, when a cellular interface is active.
    pub cellular: Option<Cellular>,
}

/// Cellular connection details.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cellular {
    /// Radio technology, e.g. `"LTE"`.
    pub technology: Option<Str>,
    /// Carrier name.
    pub carrier_name: Option<Str>,
}

/// Device the application runs on.
#[allow(missing_docs)]
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct DeviceInfo {
    pub name: Option<Str>,
    pub model: Option<Str>,
    pub brand: Option<Str>,
    pub architecture: Option<Str>,
}

/// Crash details attached to the events synthesized by crash reconciliation.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrashAttributes {
    /// The state of each thread at crash time.
    pub threads: Option<Vec<CrashThread>>,
    /// Binary images loaded by the crashed process.
    pub binary_images: Option<Vec<BinaryImage>>,
    /// Metadata recorded by the crash handler.
    pub meta: Option<CrashMeta>,
    /// Whether the crash report was truncated.
    pub was_truncated: Option<bool>,
}

/// An error linked to a view.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RumErrorEvent {
    /// When the error occurred.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: Timestamp,
    /// The monitored application.
    pub application: ApplicationInfo,
    /// The session this error belongs to.
    pub session: SessionInfo,
    /// The view this error is linked to.
    pub view: ErrorViewRef,
    /// Error details.
    pub error: ErrorDetails,
    /// The user tracked at the time of the error.
    pub usr: Option<UserInfo>,
    /// Network connectivity at the time of the error.
    pub connectivity: Option<Connectivity>,
    /// The device running the application.
    pub device: Option<DeviceInfo>,
    /// Service name of the application.
    pub service: Option<Str>,
    /// Version of the application.
    pub version: Option<Str>,
    /// Build number of the application.
    pub build_version: Option<Str>,
    /// The SDK flavor that produced this event.
    pub source: Option<Str>,
    /// Crash details, present when this error was produced by crash reconciliation.
    pub crash_details: Option<CrashAttributes>,
}

/// Reference to the view an error is linked to.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorViewRef {
    /// Id of the containing view.
    pub id: Str,
    /// Name of the containing view.
    pub name: Option<Str>,
    /// URL of the containing view.
    pub url: Option<Str>,
}

/// The error carried by a [`RumErrorEvent`].
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Error message.
    pub message: Str,
    /// Platform error type, e.g. an exception name or a signal.
    #[serde(rename = "type")]
    pub error_type: Option<Str>,
    /// Formatted stack trace.
    pub stack: Option<Str>,
    /// Error category.
    pub category: Option<ErrorCategory>,
    /// Whether the error crashed the process.
    pub is_crash: Option<bool>,
    /// Runtime that produced the error, for cross-platform hosts (e.g. `"react-native"`).
    pub source_type: Option<Str>,
}

/// Category of an error.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    /// An unhandled exception or a fatal signal.
    Exception,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn view_event() -> RumViewEvent {
        RumViewEvent {
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            application: ApplicationInfo { id: "app-1".into() },
            session: SessionInfo { id: "session-1".into() },
            view: ViewDetails {
                id: "view-1".into(),
                name: Some("Checkout".into()),
                url: "com/example/checkout".into(),
                crash: Some(CrashCount { count: 1 }),
                error: ErrorCount { count: 2 },
                is_active: Some(false),
            },
            usr: Some(UserInfo {
                id: Some("user-1".into()),
                name: None,
                email: None,
            }),
            connectivity: None,
            device: None,
            service: Some("shop-app".into()),
            version: Some("1.2.3".into()),
            build_version: None,
            source: Some("ios".into()),
            document_version: 3,
            crash_details: None,
        }
    }

    #[test]
    fn view_event_serializes_nested_counters() {
        let json = serde_json::to_value(RumEvent::View(view_event())).unwrap();

        assert_eq!(json["type"], "view");
        assert_eq!(json["date"], 1714564800000i64);
        assert_eq!(json["view"]["crash"]["count"], 1);
        assert_eq!(json["view"]["error"]["count"], 2);
        assert_eq!(json["view"]["isActive"], false);
        assert_eq!(json["documentVersion"], 3);
        // Absent optionals are omitted rather than serialized as null.
        assert!(json.get("connectivity").is_none());
        assert!(json.get("buildVersion").is_none());
    }

    #[test]
    fn view_event_round_trips() {
        let event = view_event();
        let json = serde_json::to_string(&event).unwrap();
        let parsed: RumViewEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn crash_count_defaults_to_zero() {
        let event = RumViewEvent {
            view: ViewDetails {
                crash: None,
                ..view_event().view
            },
            ..view_event()
        };
        assert_eq!(event.crash_count(), 0);
    }

    #[test]
    fn error_event_serializes_error_details() {
        let event = RumErrorEvent {
            date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap(),
            application: ApplicationInfo { id: "app-1".into() },
            session: SessionInfo { id: "session-1".into() },
            view: ErrorViewRef {
                id: "view-1".into(),
                name: Some("Checkout".into()),
                url: Some("com/example/checkout".into()),
            },
            error: ErrorDetails {
                message: "Application crash: SIGSEGV".into(),
                error_type: Some("SIGSEGV".into()),
                stack: Some("frame 0".into()),
                category: Some(ErrorCategory::Exception),
                is_crash: Some(true),
                source_type: Some("ios".into()),
            },
            usr: None,
            connectivity: None,
            device: None,
            service: None,
            version: None,
            build_version: None,
            source: Some("ios".into()),
            crash_details: None,
        };

        let json = serde_json::to_value(RumEvent::Error(event)).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["error"]["type"], "SIGSEGV");
        assert_eq!(json["error"]["isCrash"], true);
        assert_eq!(json["error"]["category"], "exception");
        assert_eq!(json["error"]["sourceType"], "ios");
    }
}

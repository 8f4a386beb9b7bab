use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{Str, Timestamp};

/// A crash report produced by the platform crash capture.
///
/// The reconciler treats most of this as an opaque payload: nothing here interprets stacks or
/// symbolication, the fields are only carried onto the events it synthesizes.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    /// When the crash occurred. Absent when the crash handler could not determine it.
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub date: Option<Timestamp>,
    /// The type of the crash, e.g. an exception name or a signal description.
    #[serde(rename = "type")]
    pub crash_type: Str,
    /// Human-readable crash message.
    pub message: Str,
    /// Formatted stack trace of the crashed thread.
    pub stack: Str,
    /// The state of each thread at crash time.
    #[serde(default)]
    pub threads: Vec<CrashThread>,
    /// Binary images loaded by the crashed process.
    #[serde(default)]
    pub binary_images: Vec<BinaryImage>,
    /// Metadata recorded by the crash handler.
    #[serde(default)]
    pub meta: CrashMeta,
    /// Whether the report was truncated to fit size limits.
    #[serde(default)]
    pub was_truncated: bool,
}

/// State of a single thread captured at crash time.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrashThread {
    /// Thread name, e.g. `"Thread 0"`.
    pub name: Str,
    /// Formatted stack trace of this thread.
    pub stack: Str,
    /// Whether this is the thread that crashed.
    pub crashed: bool,
}

/// A binary image loaded by the crashed process.
#[allow(missing_docs)]
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BinaryImage {
    pub library_name: Str,
    pub uuid: Str,
    pub architecture: Option<Str>,
    pub is_system_library: bool,
    pub load_address: Str,
    pub max_address: Str,
}

/// Metadata recorded by the crash handler.
///
/// Everything is optional as different platforms populate different subsets.
#[allow(missing_docs)]
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct CrashMeta {
    pub incident_identifier: Option<Str>,
    pub process: Option<Str>,
    pub parent_process: Option<Str>,
    pub path: Option<Str>,
    pub code_type: Option<Str>,
    pub exception_type: Option<Str>,
    pub exception_codes: Option<Str>,
}

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{Attributes, Str, Timestamp};

use super::FlagValue;

/// An aggregated flag evaluation, in the shape accepted by the evaluation intake.
///
/// One event summarizes every evaluation of a (flag, variation, subject, context) combination
/// within a flush window. `timestamp` always equals `first_evaluation`.
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    /// Timestamp of the first evaluation folded into this event.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: Timestamp,
    /// The key of the evaluated flag.
    pub flag_key: Str,
    /// The key of the served variation. Absent when a runtime default was served.
    pub variation_key: Option<Str>,
    /// The key of the matched allocation. Absent when a runtime default was served.
    pub allocation_key: Option<Str>,
    /// The key of the targeting subject. May be the empty string.
    pub subject_key: Str,
    /// The value that was returned to the caller.
    pub value: FlagValue,
    /// Description of the evaluation failure, if any.
    pub error_message: Option<Str>,
    /// Whether the served value was the caller-supplied runtime default.
    pub runtime_default_used: bool,
    /// Number of evaluations folded into this event.
    pub evaluation_count: u64,
    /// Timestamp of the first evaluation.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub first_evaluation: Timestamp,
    /// Timestamp of the latest evaluation.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_evaluation: Timestamp,
    /// Targeting context of the first evaluation. Absent when the subject carried no extra
    /// attributes.
    pub context: Option<EvaluationEventContext>,
}

/// Targeting context attached to an [`EvaluationEvent`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEventContext {
    /// Attributes the flag was evaluated against.
    pub evaluation: Arc<Attributes>,
}

/// A single deduplicated flag exposure.
///
/// Unlike [`EvaluationEvent`], exposures are not aggregated; the logger suppresses consecutive
/// duplicates instead.
#[skip_serializing_none]
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExposureEvent {
    /// Server-corrected timestamp of the exposure.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: Timestamp,
    /// The key of the evaluated flag.
    pub flag_key: Str,
    /// The key of the served variation, if the evaluation matched one.
    pub variation_key: Option<Str>,
    /// The key of the matched allocation, if the evaluation matched one.
    pub allocation_key: Option<Str>,
    /// The key of the targeting subject.
    pub subject_key: Str,
    /// The value that was returned to the caller.
    pub value: FlagValue,
}

/// Application-level identity attached to an uploaded batch.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchContext {
    pub service: Option<Str>,
    pub version: Option<Str>,
    pub application_id: Option<Str>,
    pub session_id: Option<Str>,
    pub view_id: Option<Str>,
}

/// Payload POSTed to the evaluation intake.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationBatch {
    pub context: BatchContext,
    pub flag_evaluations: Vec<EvaluationEvent>,
}

use std::sync::Arc;

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize};

use crate::{Attributes, Str};

/// Type of a flag value.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum FlagValueType {
    String,
    Integer,
    Numeric,
    Boolean,
    Json,
}

/// Value served for a feature flag.
///
/// # Serialization
///
/// When serialized to JSON, serialized as a two-field object with `type` and `value`. Type is one
/// of "STRING", "INTEGER", "NUMERIC", "BOOLEAN", or "JSON". Value is either string, number,
/// boolean, or arbitrary JSON value.
///
/// Example:
/// ```json
/// {"type":"JSON","value":{"hello":"world"}}
/// ```
#[derive(Debug, Clone)]
pub enum FlagValue {
    /// A string value.
    String(Str),
    /// An integer value.
    Integer(i64),
    /// A numeric value (floating-point).
    Numeric(f64),
    /// A boolean value.
    Boolean(bool),
    /// Arbitrary JSON value.
    Json(Arc<serde_json::Value>),
}

impl Serialize for FlagValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("FlagValue", 2)?;
        match self {
            FlagValue::String(s) => {
                state.serialize_field("type", "STRING")?;
                state.serialize_field("value", s)?;
            }
            FlagValue::Integer(i) => {
                state.serialize_field("type", "INTEGER")?;
                state.serialize_field("value", i)?;
            }
            FlagValue::Numeric(n) => {
                state.serialize_field("type", "NUMERIC")?;
                state.serialize_field("value", n)?;
            }
            FlagValue::Boolean(b) => {
                state.serialize_field("type", "BOOLEAN")?;
                state.serialize_field("value", b)?;
            }
            FlagValue::Json(parsed) => {
                state.serialize_field("type", "JSON")?;
                state.serialize_field("value", parsed)?;
            }
        }
        state.end()
    }
}

impl PartialEq for FlagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FlagValue::String(v1), FlagValue::String(v2)) => v1 == v2,
            (FlagValue::Integer(v1), FlagValue::Integer(v2)) => v1 == v2,
            (FlagValue::Numeric(v1), FlagValue::Numeric(v2)) => v1 == v2,
            (FlagValue::Boolean(v1), FlagValue::Boolean(v2)) => v1 == v2,
            (FlagValue::Json(v1), FlagValue::Json(v2)) => v1 == v2,
            _ => false,
        }
    }
}

impl FlagValue {
    /// Returns the value as a string if it is of type String.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value as an integer if it is of type Integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FlagValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the value as a numeric value if it is of type Numeric.
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FlagValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the value as a boolean if it is of type Boolean.
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            FlagValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as a JSON value if it is of type Json.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            FlagValue::Json(parsed) => Some(parsed),
            _ => None,
        }
    }

    /// Returns the type of the value.
    pub fn value_type(&self) -> FlagValueType {
        match self {
            FlagValue::String(_) => FlagValueType::String,
            FlagValue::Integer(_) => FlagValueType::Integer,
            FlagValue::Numeric(_) => FlagValueType::Numeric,
            FlagValue::Boolean(_) => FlagValueType::Boolean,
            FlagValue::Json(_) => FlagValueType::Json,
        }
    }
}

/// Subset of [`serde_json::Value`] as served by the assignments endpoint.
///
/// Unlike [`FlagValue`], `ValueWire` is untagged, so we don't know the exact type until we combine
/// it with [`FlagValueType`] from the flag level.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(untagged)]
pub enum ValueWire {
    /// Boolean maps to [`FlagValue::Boolean`].
    Boolean(bool),
    /// Number maps to either [`FlagValue::Integer`] or [`FlagValue::Numeric`].
    Number(f64),
    /// String maps to either [`FlagValue::String`] or [`FlagValue::Json`].
    String(Str),
}

impl ValueWire {
    /// Try to convert `ValueWire` to [`FlagValue`] under the given [`FlagValueType`].
    pub(crate) fn to_flag_value(&self, ty: FlagValueType) -> Option<FlagValue> {
        Some(match ty {
            FlagValueType::String => FlagValue::String(self.as_string()?),
            FlagValueType::Integer => FlagValue::Integer(self.as_integer()?),
            FlagValueType::Numeric => FlagValue::Numeric(self.as_number()?),
            FlagValueType::Boolean => FlagValue::Boolean(self.as_boolean()?),
            FlagValueType::Json => FlagValue::Json(Arc::new(self.to_json()?)),
        })
    }

    /// The type this value carries before the flag-level type is applied.
    ///
    /// Numbers report as [`FlagValueType::Numeric`] and strings as [`FlagValueType::String`]
    /// since the wire cannot distinguish the narrower types.
    pub(crate) fn natural_type(&self) -> FlagValueType {
        match self {
            Self::Boolean(_) => FlagValueType::Boolean,
            Self::Number(_) => FlagValueType::Numeric,
            Self::String(_) => FlagValueType::String,
        }
    }

    fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        let f = self.as_number()?;
        let i = f as i64;
        if i as f64 == f {
            Some(i)
        } else {
            None
        }
    }

    fn as_string(&self) -> Option<Str> {
        match self {
            Self::String(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn to_json(&self) -> Option<serde_json::Value> {
        match self {
            Self::String(value) => serde_json::from_str(value).ok(),
            _ => None,
        }
    }
}

/// Why a particular value was served for a flag.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentReason {
    /// The targeting configuration matched the subject and produced this value.
    TargetingMatch,
    /// No allocation matched; the caller-supplied default value was used.
    Default,
    /// Evaluation failed; the caller-supplied default value was used.
    Error,
}

impl AssignmentReason {
    /// Returns `true` if the served value was the caller-supplied runtime default.
    pub fn is_runtime_default(self) -> bool {
        matches!(self, AssignmentReason::Default | AssignmentReason::Error)
    }
}

/// Result of evaluating a feature flag, as reported by the host's evaluation layer.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlagAssignment {
    /// Value that was returned to the caller.
    pub value: FlagValue,
    /// The key of the variation the subject was assigned to. Absent when the value is a runtime
    /// default.
    pub variation_key: Option<Str>,
    /// The key of the allocation that matched. Absent when the value is a runtime default.
    pub allocation_key: Option<Str>,
    /// Why this value was served.
    pub reason: AssignmentReason,
    /// Whether this assignment should produce an exposure event. Internal/logging-only
    /// evaluations set this to `false`.
    pub do_log: bool,
}

/// The targeting context a flag was evaluated against.
///
/// An empty `subject_key` is a valid subject and is preserved verbatim on emitted events; it is
/// never treated as "absent".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    /// The key identifying the targeting subject.
    pub subject_key: Str,
    /// Extra targeting attributes beyond the bare subject identifier.
    #[serde(default)]
    pub attributes: Arc<Attributes>,
}

impl EvaluationContext {
    /// Context with a bare subject identifier and no extra attributes.
    pub fn from_subject(subject_key: impl Into<Str>) -> EvaluationContext {
        EvaluationContext {
            subject_key: subject_key.into(),
            attributes: Arc::new(Attributes::new()),
        }
    }
}

/// Enum representing possible errors that can occur during flag evaluation. Reported alongside the
/// runtime-default assignment that the error caused.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum FlagEvaluationError {
    /// Flag assignments have not been fetched yet.
    #[error("flag assignments missing")]
    AssignmentsMissing,

    /// The requested flag was not found in the fetched assignments.
    #[error("flag not found")]
    FlagNotFound,

    /// Requested flag has invalid type.
    #[error("invalid flag value type (expected: {expected:?}, found: {found:?})")]
    TypeMismatch {
        /// Expected type of the flag.
        expected: FlagValueType,
        /// Actual type of the flag.
        found: FlagValueType,
    },
}

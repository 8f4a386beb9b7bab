use std::collections::{BTreeMap, HashMap};

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Type alias for a HashMap representing key-value pairs of attributes.
///
/// Keys are strings representing attribute names.
///
/// # Examples
/// ```
/// # use rum_core::{Attributes, AttributeValue};
/// let attributes = [
///     ("age".to_owned(), 30.0.into()),
///     ("is_premium_member".to_owned(), true.into()),
///     ("username".to_owned(), "john_doe".into()),
/// ].into_iter().collect::<Attributes>();
/// ```
pub type Attributes = HashMap<String, AttributeValue>;

/// Enum representing possible values of a targeting-context attribute.
///
/// Conveniently implements `From` conversions for `String`, `&str`, `f64`, and `bool` types.
///
/// Examples:
/// ```
/// # use rum_core::AttributeValue;
/// let string_attr: AttributeValue = "example".into();
/// let number_attr: AttributeValue = 42.0.into();
/// let bool_attr: AttributeValue = true.into();
/// ```
#[derive(Debug, Serialize, Deserialize, PartialEq, PartialOrd, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// A string value.
    String(String),
    /// A numerical value.
    Number(f64),
    /// A boolean value.
    Boolean(bool),
    /// A null value or absence of value.
    Null,
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        if let AttributeValue::String(s) = self {
            Some(s.as_str())
        } else {
            None
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Serialize `attributes` to a canonical JSON form: map iteration order must not leak into the
/// result, so two maps with equal entries always produce equal strings.
pub(crate) fn canonical_json(attributes: &Attributes) -> String {
    let sorted: BTreeMap<&str, &AttributeValue> = attributes
        .iter()
        .map(|(key, value)| (key.as_str(), value))
        .collect();
    serde_json::to_string(&sorted).expect("attribute values should always be serializable")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_json_is_order_independent() {
        let a: Attributes = [
            ("zeta".to_owned(), 1.0.into()),
            ("alpha".to_owned(), "x".into()),
            ("mid".to_owned(), true.into()),
        ]
        .into_iter()
        .collect();
        let b: Attributes = [
            ("mid".to_owned(), true.into()),
            ("alpha".to_owned(), "x".into()),
            ("zeta".to_owned(), 1.0.into()),
        ]
        .into_iter()
        .collect();

        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(canonical_json(&a), r#"{"alpha":"x","mid":true,"zeta":1.0}"#);
    }

    #[test]
    fn canonical_json_distinguishes_values() {
        let a: Attributes = [("k".to_owned(), 1.0.into())].into_iter().collect();
        let b: Attributes = [("k".to_owned(), 2.0.into())].into_iter().collect();

        assert_ne!(canonical_json(&a), canonical_json(&b));
    }
}

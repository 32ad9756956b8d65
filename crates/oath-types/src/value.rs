//! Tagged state values and transition inputs.
//!
//! [`StateValue`] is the sum type used wherever the simulation needs an
//! ad-hoc typed value: node state data, transition input parameters, and
//! the escape-hatch attribute bags on the world context. It serializes
//! untagged, so documents stay plain JSON (`3`, `2.5`, `"city"`, `true`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A loosely-typed value: integer, float, string, or boolean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    /// A boolean flag.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    Text(String),
}

impl StateValue {
    /// Return the integer payload, if this is an [`StateValue::Int`].
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Return the float payload. Integers widen to floats.
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Return the string payload, if this is a [`StateValue::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Return the boolean payload, if this is a [`StateValue::Bool`].
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for StateValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for StateValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for StateValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for StateValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for StateValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// The input fed to an automaton when attempting a transition.
///
/// `kind` names the interaction (`"buy"`, `"pay_bounty"`, `"advance_phase"`),
/// `params` carries whatever the predicates and node behaviours need.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionInput {
    /// The interaction being attempted.
    pub kind: String,
    /// Named parameters for the interaction.
    #[serde(default)]
    pub params: BTreeMap<String, StateValue>,
}

impl TransitionInput {
    /// Create an input with the given kind and no parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insertion.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Whether this input has the given kind.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Look up a raw parameter.
    pub fn param(&self, key: &str) -> Option<&StateValue> {
        self.params.get(key)
    }

    /// Look up an integer parameter.
    pub fn int(&self, key: &str) -> Option<i64> {
        self.param(key).and_then(StateValue::as_int)
    }

    /// Look up a float parameter (integers widen).
    pub fn float(&self, key: &str) -> Option<f64> {
        self.param(key).and_then(StateValue::as_float)
    }

    /// Look up a string parameter.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(StateValue::as_text)
    }

    /// Look up a boolean parameter.
    pub fn flag(&self, key: &str) -> Option<bool> {
        self.param(key).and_then(StateValue::as_bool)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shapes() {
        let values = vec![
            StateValue::Int(3),
            StateValue::Float(2.5),
            StateValue::Text(String::from("city")),
            StateValue::Bool(true),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[3,2.5,"city",true]"#);

        let back: Vec<StateValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn integers_widen_to_float() {
        assert_eq!(StateValue::Int(4).as_float(), Some(4.0));
        assert_eq!(StateValue::Text(String::from("x")).as_float(), None);
    }

    #[test]
    fn input_builder_and_accessors() {
        let input = TransitionInput::new("buy")
            .with("item", "bread")
            .with("quantity", 2_i64)
            .with("haggle", true);

        assert!(input.is("buy"));
        assert!(!input.is("sell"));
        assert_eq!(input.text("item"), Some("bread"));
        assert_eq!(input.int("quantity"), Some(2));
        assert_eq!(input.flag("haggle"), Some(true));
        assert_eq!(input.int("item"), None);
        assert_eq!(input.param("missing"), None);
    }

    #[test]
    fn input_without_params_deserializes() {
        let input: TransitionInput = serde_json::from_str(r#"{"kind":"wait"}"#).unwrap();
        assert!(input.is("wait"));
        assert!(input.params.is_empty());
    }
}

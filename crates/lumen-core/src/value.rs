//! Parameter values stored on graph nodes.
//!
//! A [`ParamValue`] is what a node's parameter map holds. The persisted graph
//! format writes values untagged, so a JSON number, string, or four-element
//! array round-trips to the matching variant.

use serde::{Deserialize, Serialize};

/// A single parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Numeric value (also used for integer and toggle parameters).
    Number(f32),
    /// Linear RGBA color, each channel in 0.0..=1.0.
    Color([f32; 4]),
    /// String value (enumerated parameters).
    Text(String),
}

impl ParamValue {
    /// Returns the numeric value, if this is a `Number`.
    #[inline]
    pub fn as_number(&self) -> Option<f32> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string value, if this is a `Text`.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the color value, if this is a `Color`.
    #[inline]
    pub fn as_color(&self) -> Option<[f32; 4]> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::Color(_) => "color",
            Self::Text(_) => "text",
        }
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<[f32; 4]> for ParamValue {
    fn from(value: [f32; 4]) -> Self {
        Self::Color(value)
    }
}

impl core::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => write!(f, "\"{s}\""),
            Self::Color([r, g, b, a]) => write!(f, "rgba({r:.3}, {g:.3}, {b:.3}, {a:.3})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_json_shapes() {
        let n: ParamValue = serde_json::from_str("0.25").unwrap();
        assert_eq!(n, ParamValue::Number(0.25));

        let t: ParamValue = serde_json::from_str("\"add\"").unwrap();
        assert_eq!(t, ParamValue::Text("add".into()));

        let c: ParamValue = serde_json::from_str("[1.0, 0.5, 0.0, 1.0]").unwrap();
        assert_eq!(c, ParamValue::Color([1.0, 0.5, 0.0, 1.0]));
    }

    #[test]
    fn accessors_match_variant() {
        assert_eq!(ParamValue::from(2.0).as_number(), Some(2.0));
        assert_eq!(ParamValue::from("x").as_number(), None);
        assert_eq!(ParamValue::from("x").as_text(), Some("x"));
        assert_eq!(ParamValue::from([0.0; 4]).as_color(), Some([0.0; 4]));
        assert_eq!(ParamValue::from([0.0; 4]).kind_name(), "color");
    }
}

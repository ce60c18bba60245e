//! Cell style values.
//!
//! A cell carries an inline [`CellStyle`]: an ordered list of named base
//! styles plus property overrides. Resolution against a stylesheet happens in
//! the view.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel value meaning "no value"; inline properties set to it do not
/// override inherited ones.
pub const NONE: &str = "none";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl StyleValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(text) => text.parse().ok(),
            Self::Flag(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(text) => match text.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::Text(text) if text == NONE)
    }
}

impl fmt::Display for StyleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => write!(f, "{flag}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for StyleValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StyleValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<f64> for StyleValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for StyleValue {
    fn from(value: i32) -> Self {
        Self::Number(value as f64)
    }
}

impl From<bool> for StyleValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// Flattened property map, ordered by key for stable output.
pub type StyleMap = BTreeMap<String, StyleValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CellStyle {
    /// Named stylesheet entries merged left to right before the inline properties.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub base_style_names: Vec<String>,
    #[serde(flatten)]
    pub properties: StyleMap,
}

impl CellStyle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_base_styles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            base_style_names: names.into_iter().map(Into::into).collect(),
            properties: StyleMap::new(),
        }
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<StyleValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&StyleValue> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<StyleValue>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<StyleValue> {
        self.properties.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.base_style_names.is_empty() && self.properties.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_value_untagged_serde() {
        let style: CellStyle = serde_json::from_str(
            r#"{"baseStyleNames": ["column"], "fillColor": "red", "rounded": true, "strokeWidth": 2}"#,
        )
        .unwrap();
        assert_eq!(style.base_style_names, vec!["column".to_string()]);
        assert_eq!(style.get("fillColor"), Some(&StyleValue::from("red")));
        assert_eq!(style.get("rounded"), Some(&StyleValue::Flag(true)));
        assert_eq!(style.get("strokeWidth").and_then(StyleValue::as_f64), Some(2.0));
    }

    #[test]
    fn test_none_sentinel() {
        assert!(StyleValue::from("none").is_none());
        assert!(!StyleValue::from("red").is_none());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(StyleValue::from("12").as_f64(), Some(12.0));
        assert_eq!(StyleValue::from("true").as_bool(), Some(true));
        assert_eq!(StyleValue::from(0).as_bool(), Some(false));
        assert_eq!(StyleValue::Flag(true).as_f64(), None);
    }
}

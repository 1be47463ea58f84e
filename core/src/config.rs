//! Static node configuration: schema fields and lazy validation.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// Raw, unvalidated config as stored on a node instance.
pub type RawConfig = serde_json::Map<String, Json>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigFieldType {
    String,
    Number,
    Boolean,
    /// A string restricted to `options`
    Select,
}

/// A validated config value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        ConfigValue::Number(n)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

/// One entry of a node's configuration surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigField {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: ConfigFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<ConfigValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl ConfigField {
    pub fn string(key: impl Into<String>, label: impl Into<String>, default: &str) -> Self {
        Self::new(key, label, ConfigFieldType::String, default.into())
    }

    pub fn number(key: impl Into<String>, label: impl Into<String>, default: f64) -> Self {
        Self::new(key, label, ConfigFieldType::Number, default.into())
    }

    pub fn boolean(key: impl Into<String>, label: impl Into<String>, default: bool) -> Self {
        Self::new(key, label, ConfigFieldType::Boolean, default.into())
    }

    /// Select field defaulting to `default`.
    pub fn select(
        key: impl Into<String>,
        label: impl Into<String>,
        options: &[&str],
        default: &str,
    ) -> Self {
        let mut field = Self::new(key, label, ConfigFieldType::Select, default.into());
        field.options = options.iter().map(|o| o.to_string()).collect();
        field
    }

    fn new(
        key: impl Into<String>,
        label: impl Into<String>,
        field_type: ConfigFieldType,
        default: ConfigValue,
    ) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            field_type,
            default_value: Some(default),
            options: Vec::new(),
        }
    }

    /// The declared default, or the zero value of the field type.
    pub fn fallback(&self) -> ConfigValue {
        if let Some(default) = &self.default_value {
            return default.clone();
        }
        match self.field_type {
            ConfigFieldType::String => ConfigValue::String(String::new()),
            ConfigFieldType::Number => ConfigValue::Number(0.0),
            ConfigFieldType::Boolean => ConfigValue::Bool(false),
            ConfigFieldType::Select => {
                ConfigValue::String(self.options.first().cloned().unwrap_or_default())
            }
        }
    }

    /// Validate one raw value against this field.
    pub fn validate(&self, raw: &Json) -> Result<ConfigValue, ConfigIssue> {
        let issue = |message: String| ConfigIssue {
            key: self.key.clone(),
            message,
        };
        match (self.field_type, raw) {
            (ConfigFieldType::String, Json::String(s)) => Ok(ConfigValue::String(s.clone())),
            (ConfigFieldType::Number, Json::Number(n)) => n
                .as_f64()
                .map(ConfigValue::Number)
                .ok_or_else(|| issue(format!("{} is not representable as a number", n))),
            (ConfigFieldType::Boolean, Json::Bool(b)) => Ok(ConfigValue::Bool(*b)),
            (ConfigFieldType::Select, Json::String(s)) => {
                if self.options.is_empty() || self.options.iter().any(|o| o == s) {
                    Ok(ConfigValue::String(s.clone()))
                } else {
                    Err(issue(format!(
                        "{:?} is not one of [{}]",
                        s,
                        self.options.join(", ")
                    )))
                }
            }
            (expected, other) => Err(issue(format!(
                "expected {:?}, found {}",
                expected,
                json_kind(other)
            ))),
        }
    }
}

fn json_kind(raw: &Json) -> &'static str {
    match raw {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// A config value that failed its schema type and was replaced by the default.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigIssue {
    pub key: String,
    pub message: String,
}

/// Validated config for one node, keyed by field key.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ConfigValues(BTreeMap<String, ConfigValue>);

impl ConfigValues {
    /// Resolve every schema field from `raw`.
    ///
    /// Absent fields (and explicit nulls) take the fallback silently; present values of
    /// the wrong type take the fallback and produce an issue. Keys not in the schema
    /// are ignored.
    pub fn resolve(schema: &[ConfigField], raw: &RawConfig) -> (Self, Vec<ConfigIssue>) {
        let mut values = BTreeMap::new();
        let mut issues = Vec::new();
        for field in schema {
            let value = match raw.get(&field.key) {
                None | Some(Json::Null) => field.fallback(),
                Some(raw_value) => match field.validate(raw_value) {
                    Ok(value) => value,
                    Err(issue) => {
                        issues.push(issue);
                        field.fallback()
                    }
                },
            };
            values.insert(field.key.clone(), value);
        }
        (Self(values), issues)
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn number(&self, key: &str) -> f64 {
        match self.0.get(key) {
            Some(ConfigValue::Number(n)) => *n,
            _ => 0.0,
        }
    }

    pub fn boolean(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(ConfigValue::Bool(true)))
    }

    pub fn string(&self, key: &str) -> &str {
        match self.0.get(key) {
            Some(ConfigValue::String(s)) => s,
            _ => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Json) -> RawConfig {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Vec<ConfigField> {
        vec![
            ConfigField::number("frequency", "Frequency", 1.0),
            ConfigField::select("waveform", "Waveform", &["sine", "square"], "sine"),
            ConfigField::boolean("invert", "Invert", false),
            ConfigField::string("label", "Label", "main"),
        ]
    }

    #[test]
    fn test_missing_fields_take_defaults_without_issues() {
        let (values, issues) = ConfigValues::resolve(&schema(), &RawConfig::new());
        assert!(issues.is_empty());
        assert_eq!(values.number("frequency"), 1.0);
        assert_eq!(values.string("waveform"), "sine");
        assert!(!values.boolean("invert"));
        assert_eq!(values.string("label"), "main");
    }

    #[test]
    fn test_wrong_types_fall_back_and_report() {
        let config = raw(json!({
            "frequency": "fast",
            "waveform": "noise",
            "invert": true,
            "label": 7,
            "unrelated": [1, 2]
        }));
        let (values, issues) = ConfigValues::resolve(&schema(), &config);
        assert_eq!(values.number("frequency"), 1.0);
        assert_eq!(values.string("waveform"), "sine");
        assert!(values.boolean("invert"));
        assert_eq!(values.string("label"), "main");

        let keys: Vec<_> = issues.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["frequency", "waveform", "label"]);
        assert!(values.get("unrelated").is_none());
    }

    #[test]
    fn test_fallback_without_declared_default() {
        let mut field = ConfigField::select("mode", "Mode", &["a", "b"], "b");
        field.default_value = None;
        assert_eq!(field.fallback(), ConfigValue::String("a".to_string()));

        let mut number = ConfigField::number("n", "N", 3.0);
        number.default_value = None;
        assert_eq!(number.fallback(), ConfigValue::Number(0.0));
    }

    #[test]
    fn test_config_value_untagged_serde() {
        let v: ConfigValue = serde_json::from_str("2.5").unwrap();
        assert_eq!(v, ConfigValue::Number(2.5));
        let v: ConfigValue = serde_json::from_str("\"x\"").unwrap();
        assert_eq!(v, ConfigValue::String("x".to_string()));
    }
}

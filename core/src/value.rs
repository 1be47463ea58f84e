//! Runtime values that flow between nodes.

use crate::ports::PortType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Port id -> value map used for node inputs, outputs and their caches.
pub type PortValues = BTreeMap<String, Value>;

/// A value that can be passed between nodes during graph execution.
///
/// One variant per [`PortType`], plus `None` for "nothing produced" and an
/// opaque `Any` payload for values whose shape the engine does not know.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Value {
    /// No value / null
    #[default]
    None,
    Number(f64),
    Boolean(bool),
    String(String),
    /// Asset id
    Asset(String),
    Color(Color),
    /// Audio asset id
    Audio(String),
    /// Image asset id
    Image(String),
    /// Video asset id
    Video(String),
    /// Scene id
    Scene(String),
    /// Effect id
    Effect(String),
    /// Client device id
    Client(String),
    /// Control command payload, forwarded verbatim to the dispatch layer
    Command(serde_json::Value),
    /// Fuzzy truth value, clamped to `0.0..=1.0` by producers
    Fuzzy(f64),
    Array(Vec<Value>),
    /// Untyped payload
    Any(serde_json::Value),
}

impl Value {
    /// The port type this value naturally belongs to. `None` has no type.
    pub fn port_type(&self) -> Option<PortType> {
        let ty = match self {
            Value::None => return None,
            Value::Number(_) => PortType::Number,
            Value::Boolean(_) => PortType::Boolean,
            Value::String(_) => PortType::String,
            Value::Asset(_) => PortType::Asset,
            Value::Color(_) => PortType::Color,
            Value::Audio(_) => PortType::Audio,
            Value::Image(_) => PortType::Image,
            Value::Video(_) => PortType::Video,
            Value::Scene(_) => PortType::Scene,
            Value::Effect(_) => PortType::Effect,
            Value::Client(_) => PortType::Client,
            Value::Command(_) => PortType::Command,
            Value::Fuzzy(_) => PortType::Fuzzy,
            Value::Array(_) => PortType::Array,
            Value::Any(_) => PortType::Any,
        };
        Some(ty)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::None => Some(false),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) | Value::Fuzzy(n) => Some(*n),
            _ => None,
        }
    }

    /// Text payload of any string-like variant (plain strings and id references).
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s)
            | Value::Asset(s)
            | Value::Audio(s)
            | Value::Image(s)
            | Value::Video(s)
            | Value::Scene(s)
            | Value::Effect(s)
            | Value::Client(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Boolean(b) => *b,
            Value::Number(n) | Value::Fuzzy(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Any(v) | Value::Command(v) => !v.is_null(),
            _ => true,
        }
    }

    /// Whether this value, sitting on an upstream output, triggers a sink delivery.
    ///
    /// Absent values and `false` do not fire; every other value does.
    pub fn is_firing(&self) -> bool {
        !matches!(self, Value::None | Value::Boolean(false))
    }

    /// Plain JSON rendering, used when handing payloads to the dispatch layer.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Value::None => serde_json::Value::Null,
            Value::Number(n) | Value::Fuzzy(n) => json!(n),
            Value::Boolean(b) => json!(b),
            Value::String(s)
            | Value::Asset(s)
            | Value::Audio(s)
            | Value::Image(s)
            | Value::Video(s)
            | Value::Scene(s)
            | Value::Effect(s)
            | Value::Client(s) => json!(s),
            Value::Color(c) => json!(c.to_hex()),
            Value::Command(v) | Value::Any(v) => v.clone(),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

/// 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`, `rrggbb`, `#rgb` or `rgb`.
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match hex.len() {
            6 => {
                let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
                let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
                let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
                Some(Self { r, g, b })
            }
            3 => {
                let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|d| d * 17);
                Some(Self {
                    r: digit(0)?,
                    g: digit(1)?,
                    b: digit(2)?,
                })
            }
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Linear interpolation; `t` is clamped to `0.0..=1.0`.
    pub fn lerp(&self, other: &Color, t: f64) -> Color {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
        Color {
            r: mix(self.r, other.r),
            g: mix(self.g, other.g),
            b: mix(self.b, other.b),
        }
    }

    /// Scale brightness; `factor` is clamped to `0.0..=1.0`.
    pub fn scaled(&self, factor: f64) -> Color {
        Color::BLACK.lerp(self, factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_json_shape() {
        let json = serde_json::to_value(Value::Number(0.5)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "number", "value": 0.5}));

        let none = serde_json::to_value(Value::None).unwrap();
        assert_eq!(none, serde_json::json!({"type": "none"}));

        let parsed: Value =
            serde_json::from_str(r#"{"type":"color","value":{"r":255,"g":0,"b":16}}"#).unwrap();
        assert_eq!(parsed, Value::Color(Color::new(255, 0, 16)));
    }

    #[test]
    fn test_port_type_of_values() {
        assert_eq!(Value::None.port_type(), None);
        assert_eq!(Value::Video("clip".into()).port_type(), Some(PortType::Video));
        assert_eq!(Value::Any(serde_json::json!(1)).port_type(), Some(PortType::Any));
    }

    #[test]
    fn test_firing() {
        assert!(!Value::None.is_firing());
        assert!(!Value::Boolean(false).is_firing());
        assert!(Value::Boolean(true).is_firing());
        assert!(Value::Number(0.0).is_firing());
        assert!(Value::Command(serde_json::json!({"action": "blackout"})).is_firing());
    }

    #[test]
    fn test_color_hex() {
        assert_eq!(Color::from_hex("#ff8000"), Some(Color::new(255, 128, 0)));
        assert_eq!(Color::from_hex("0f0"), Some(Color::new(0, 255, 0)));
        assert_eq!(Color::from_hex("#12345"), None);
        assert_eq!(Color::from_hex("zzzzzz"), None);
        assert_eq!(Color::new(1, 2, 255).to_hex(), "#0102ff");
    }

    #[test]
    fn test_color_lerp_clamps() {
        let a = Color::BLACK;
        let b = Color::WHITE;
        assert_eq!(a.lerp(&b, 0.5), Color::new(128, 128, 128));
        assert_eq!(a.lerp(&b, 4.0), Color::WHITE);
        assert_eq!(a.lerp(&b, f64::NAN), Color::BLACK);
    }

    #[test]
    fn test_to_json_flattens_payloads() {
        let v = Value::Array(vec![Value::Number(1.0), Value::Color(Color::WHITE)]);
        assert_eq!(v.to_json(), serde_json::json!([1.0, "#ffffff"]));
    }
}

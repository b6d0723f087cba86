//! Values stored in object features.

use std::fmt;
use std::sync::Arc;

use super::ObjectId;
use crate::meta::{DataType, EnumLiteral, ValueType};

/// A single value held by an attribute or reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Text, also used for `char` and custom data types.
    String(Arc<str>),
    /// Any integral type.
    Int(i64),
    /// `float` and `double`.
    Float(f64),
    Bool(bool),
    /// An enumeration literal.
    Literal(EnumLiteral),
    /// An object or proxy.
    Object(ObjectId),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<EnumLiteral> {
        match self {
            Value::Literal(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Short kind name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "boolean",
            Value::Literal(_) => "enum literal",
            Value::Object(_) => "object",
        }
    }

    /// Parse the text form of an attribute value.
    pub fn parse(text: &str, ty: &ValueType) -> Result<Value, String> {
        match ty {
            ValueType::Enum(e) => e
                .literal(text.trim())
                .map(Value::Literal)
                .ok_or_else(|| format!("'{}' is not a literal of enumeration '{}'", text, e.name())),
            ValueType::Data(dt) => match dt {
                DataType::Boolean => match text.trim() {
                    t if t.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
                    t if t.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
                    _ => Err(format!("'{text}' is not a boolean")),
                },
                dt if dt.is_integral() => text
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| format!("'{text}' is not an integer")),
                dt if dt.is_floating() => text
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| format!("'{text}' is not a number")),
                _ => Ok(Value::String(text.into())),
            },
        }
    }

    /// Text form of a data value. `None` for objects.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(format_float(*f)),
            Value::Bool(b) => Some(b.to_string()),
            Value::Literal(l) => Some(l.name().to_string()),
            Value::Object(_) => None,
        }
    }
}

/// `1.0` rather than `1`, so the text still reads as a float.
fn format_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{f:.1}")
    } else {
        f.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Object(id) => write!(f, "{id}"),
            other => f.write_str(&other.to_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<EnumLiteral> for Value {
    fn from(l: EnumLiteral) -> Self {
        Self::Literal(l)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Object(id)
    }
}

/// The content of one feature of one object.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureValue {
    Single(Option<Value>),
    Many(Vec<Value>),
}

impl FeatureValue {
    /// All values, in order.
    pub fn values(&self) -> &[Value] {
        match self {
            FeatureValue::Single(Some(v)) => std::slice::from_ref(v),
            FeatureValue::Single(None) => &[],
            FeatureValue::Many(vs) => vs,
        }
    }

    pub fn into_values(self) -> Vec<Value> {
        match self {
            FeatureValue::Single(v) => v.into_iter().collect(),
            FeatureValue::Many(vs) => vs,
        }
    }

    pub fn single(&self) -> Option<&Value> {
        match self {
            FeatureValue::Single(v) => v.as_ref(),
            FeatureValue::Many(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values().is_empty()
    }

    /// Membership by value equality.
    pub fn contains(&self, value: &Value) -> bool {
        self.values().contains(value)
    }
}

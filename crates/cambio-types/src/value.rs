use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde_json::{Map, Number, Value};
use smol_str::SmolStr;

/// A cell of an aggregated row, and the output of a post-aggregator.
///
/// Aggregators emit longs, floats and doubles (counts, sums, sketch
/// estimates) and string dimensions; `List` and `Struct` hold whatever else
/// an engine places in a row.
#[derive(Clone, Debug)]
pub enum TypedValue {
    Null,
    Bool(bool),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(SmolStr),
    List(Vec<TypedValue>),
    Struct(Vec<(SmolStr, TypedValue)>),
}

// Floats compare by bit pattern so that Eq and Hash agree.
impl PartialEq for TypedValue {
    fn eq(&self, other: &Self) -> bool {
        use TypedValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (UInt64(a), UInt64(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (List(a), List(b)) => a == b,
            (Struct(a), Struct(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for TypedValue {}

impl Hash for TypedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int64(n) => n.hash(state),
            Self::UInt64(n) => n.hash(state),
            Self::Float(x) => x.to_bits().hash(state),
            Self::Double(x) => x.to_bits().hash(state),
            Self::String(s) => s.hash(state),
            Self::List(items) => items.hash(state),
            Self::Struct(fields) => fields.hash(state),
        }
    }
}

impl TypedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Lowercase name of the runtime type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int64(_) => "long",
            Self::UInt64(_) => "ulong",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Int64(_) | Self::UInt64(_) | Self::Float(_) | Self::Double(_)
        )
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Exact value of an integer variant. Every `i64` and `u64` fits.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Self::Int64(n) => Some(i128::from(*n)),
            Self::UInt64(n) => Some(i128::from(*n)),
            _ => None,
        }
    }

    /// Value of a floating-point variant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(f64::from(*x)),
            Self::Double(x) => Some(*x),
            _ => None,
        }
    }

    /// Any numeric variant, widened to f64.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int64(n) => Some(*n as f64),
            Self::UInt64(n) => Some(*n as f64),
            _ => self.as_f64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl From<f64> for TypedValue {
    fn from(x: f64) -> Self {
        Self::Double(x)
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        Self::String(SmolStr::new(s))
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => fmt::Display::fmt(b, f),
            Self::Int64(n) => fmt::Display::fmt(n, f),
            Self::UInt64(n) => fmt::Display::fmt(n, f),
            Self::Float(x) => fmt::Display::fmt(x, f),
            Self::Double(x) => fmt::Display::fmt(x, f),
            Self::String(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Struct(fields) => {
                f.write_str("{")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<Value> for TypedValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => number_to_value(&n),
            Value::String(s) => Self::String(SmolStr::new(s)),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => Self::Struct(
                map.into_iter()
                    .map(|(k, v)| (SmolStr::new(k), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

fn number_to_value(n: &Number) -> TypedValue {
    if let Some(i) = n.as_i64() {
        TypedValue::Int64(i)
    } else if let Some(u) = n.as_u64() {
        TypedValue::UInt64(u)
    } else {
        n.as_f64().map_or(TypedValue::Null, TypedValue::Double)
    }
}

/// Non-finite floats have no JSON form and become `null`.
impl From<TypedValue> for Value {
    fn from(value: TypedValue) -> Self {
        match value {
            TypedValue::Null => Value::Null,
            TypedValue::Bool(b) => Value::Bool(b),
            TypedValue::Int64(n) => Value::from(n),
            TypedValue::UInt64(n) => Value::from(n),
            TypedValue::Float(x) => float_to_json(f64::from(x)),
            TypedValue::Double(x) => float_to_json(x),
            TypedValue::String(s) => Value::String(s.to_string()),
            TypedValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            TypedValue::Struct(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), Value::from(v)))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

fn float_to_json(x: f64) -> Value {
    Number::from_f64(x).map_or(Value::Null, Value::Number)
}

/// Build a row from the top-level keys of a JSON object. Anything other than
/// an object yields an empty row.
pub fn json_object_to_row(value: Value) -> HashMap<SmolStr, TypedValue> {
    match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (SmolStr::new(k), TypedValue::from(v)))
            .collect(),
        _ => HashMap::new(),
    }
}

/// Parse JSON text into a row. See [`json_object_to_row`].
pub fn json_str_to_row(text: &str) -> Result<HashMap<SmolStr, TypedValue>, serde_json::Error> {
    Ok(json_object_to_row(serde_json::from_str(text)?))
}

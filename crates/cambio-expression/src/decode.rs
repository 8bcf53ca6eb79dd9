//! Explicit field-by-field decoding of node configurations.

use cambio_common::{CambioError, CambioResult, DecodeConfig};
use serde_json::Value;

use crate::node::NodeRef;
use crate::registry::PostAggregatorRegistry;

pub type JsonObject = serde_json::Map<String, Value>;

/// Key holding the type discriminator in every node configuration.
pub const TYPE_KEY: &str = "type";

/// State threaded through a recursive decode: the registry to dispatch
/// children through and the current nesting depth.
pub struct DecodeContext<'a> {
    registry: &'a PostAggregatorRegistry,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    pub(crate) fn root(registry: &'a PostAggregatorRegistry) -> Self {
        Self { registry, depth: 0 }
    }

    pub fn config(&self) -> &DecodeConfig {
        self.registry.config()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Decode a nested node configuration one level deeper.
    pub fn decode_child(&self, value: &Value) -> CambioResult<NodeRef> {
        let depth = self.depth + 1;
        if depth > self.config().max_depth {
            return Err(CambioError::Config(format!(
                "post-aggregator nesting exceeds max depth {}",
                self.config().max_depth
            )));
        }
        let child = DecodeContext {
            registry: self.registry,
            depth,
        };
        self.registry.decode_with(value, &child)
    }
}

/// Typed accessors over one node's JSON object.
///
/// JSON `null` is treated the same as an absent field.
pub struct Fields<'a> {
    type_name: &'static str,
    object: &'a JsonObject,
}

impl<'a> Fields<'a> {
    /// Wrap `object`, rejecting fields outside `known` when the decode
    /// config asks for strict decoding.
    pub fn new(
        type_name: &'static str,
        object: &'a JsonObject,
        known: &[&str],
        config: &DecodeConfig,
    ) -> CambioResult<Self> {
        if config.deny_unknown_fields {
            if let Some(unknown) = object
                .keys()
                .find(|k| k.as_str() != TYPE_KEY && !known.contains(&k.as_str()))
            {
                return Err(CambioError::Config(format!(
                    "{type_name}: unknown field '{unknown}'"
                )));
            }
        }
        Ok(Self { type_name, object })
    }

    pub fn optional_value(&self, key: &str) -> Option<&'a Value> {
        self.object.get(key).filter(|v| !v.is_null())
    }

    pub fn required_value(&self, key: &str) -> CambioResult<&'a Value> {
        self.optional_value(key)
            .ok_or_else(|| self.error(format!("'{key}' cannot be null")))
    }

    pub fn optional_str(&self, key: &str) -> CambioResult<Option<&'a str>> {
        match self.optional_value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.mismatch(key, "a string", other)),
        }
    }

    pub fn required_str(&self, key: &str) -> CambioResult<&'a str> {
        self.optional_str(key)?
            .ok_or_else(|| self.error(format!("'{key}' cannot be null")))
    }

    pub fn optional_bool(&self, key: &str) -> CambioResult<Option<bool>> {
        match self.optional_value(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.mismatch(key, "a boolean", other)),
        }
    }

    pub fn required_f64(&self, key: &str) -> CambioResult<f64> {
        match self.required_value(key)? {
            Value::Number(n) => n
                .as_f64()
                .ok_or_else(|| self.error(format!("'{key}' is not representable as f64"))),
            other => Err(self.mismatch(key, "a number", other)),
        }
    }

    pub fn required_object(&self, key: &str) -> CambioResult<&'a JsonObject> {
        match self.required_value(key)? {
            Value::Object(map) => Ok(map),
            other => Err(self.mismatch(key, "an object", other)),
        }
    }

    pub fn error(&self, message: String) -> CambioError {
        CambioError::Config(format!("{}: {message}", self.type_name))
    }

    fn mismatch(&self, key: &str, expected: &str, found: &Value) -> CambioError {
        self.error(format!("'{key}' must be {expected}, got {}", json_kind(found)))
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

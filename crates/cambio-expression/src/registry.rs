//! Post-aggregator registry: type discriminator → decode function.
//!
//! Pre-populated with the built-in node types. The registry is immutable once
//! decoding starts; decoding a configuration dispatches on its `type` field
//! and recurses into child nodes through a [`DecodeContext`].

use cambio_common::{CambioError, CambioResult, DecodeConfig};
use hashbrown::HashMap;
use serde_json::Value;
use smol_str::SmolStr;
use tracing::debug;

use crate::constant::Constant;
use crate::currency::CurrencyConversion;
use crate::decode::{json_kind, DecodeContext, JsonObject, TYPE_KEY};
use crate::field_access::FieldAccess;
use crate::node::NodeRef;

/// Builds a node from its JSON object. Child nodes are decoded through the
/// context so nesting depth is tracked.
pub type DecodeFn = fn(&JsonObject, &DecodeContext<'_>) -> CambioResult<NodeRef>;

pub struct PostAggregatorRegistry {
    decoders: HashMap<SmolStr, DecodeFn>,
    config: DecodeConfig,
}

impl Default for PostAggregatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PostAggregatorRegistry {
    /// An empty registry with the default decode configuration.
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
            config: DecodeConfig::default(),
        }
    }

    /// Create a registry pre-populated with the built-in node types.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        register_builtins(&mut reg);
        reg
    }

    pub fn with_config(mut self, config: DecodeConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a decoder for `type_name`. Type names are case-sensitive and
    /// may be registered once.
    pub fn register(&mut self, type_name: &str, decode: DecodeFn) -> CambioResult<()> {
        if type_name.is_empty() {
            return Err(CambioError::Config(
                "post-aggregator type name cannot be empty".into(),
            ));
        }
        if self.decoders.contains_key(type_name) {
            return Err(CambioError::Config(format!(
                "post-aggregator type '{type_name}' is already registered"
            )));
        }
        self.decoders.insert(SmolStr::new(type_name), decode);
        Ok(())
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.decoders.contains_key(type_name)
    }

    /// Number of registered node types.
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    pub fn config(&self) -> &DecodeConfig {
        &self.config
    }

    /// Decode a node configuration.
    pub fn decode(&self, value: &Value) -> CambioResult<NodeRef> {
        self.decode_with(value, &DecodeContext::root(self))
    }

    /// Parse JSON text and decode it as a node configuration.
    pub fn decode_str(&self, json: &str) -> CambioResult<NodeRef> {
        let value: Value = serde_json::from_str(json)?;
        self.decode(&value)
    }

    pub(crate) fn decode_with(
        &self,
        value: &Value,
        ctx: &DecodeContext<'_>,
    ) -> CambioResult<NodeRef> {
        let object = match value {
            Value::Object(map) => map,
            other => {
                return Err(CambioError::Config(format!(
                    "post-aggregator must be a JSON object, got {}",
                    json_kind(other)
                )));
            }
        };
        let type_name = match object.get(TYPE_KEY) {
            Some(Value::String(s)) => s.as_str(),
            Some(other) if !other.is_null() => {
                return Err(CambioError::Config(format!(
                    "post-aggregator '{TYPE_KEY}' must be a string, got {}",
                    json_kind(other)
                )));
            }
            _ => {
                return Err(CambioError::Config(format!(
                    "post-aggregator is missing '{TYPE_KEY}'"
                )));
            }
        };
        let decode = self.decoders.get(type_name).ok_or_else(|| {
            CambioError::Config(format!("unknown post-aggregator type '{type_name}'"))
        })?;
        debug!(type_name, depth = ctx.depth(), "decoding post-aggregator");
        decode(object, ctx)
    }
}

fn register_builtins(reg: &mut PostAggregatorRegistry) {
    let builtins: [(&str, DecodeFn); 3] = [
        (FieldAccess::TYPE_NAME, FieldAccess::decode),
        (Constant::TYPE_NAME, Constant::decode),
        (CurrencyConversion::TYPE_NAME, CurrencyConversion::decode),
    ];
    for (type_name, decode) in builtins {
        reg.decoders.insert(SmolStr::new(type_name), decode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::PostAggregator;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn builtins_registered() {
        let reg = PostAggregatorRegistry::with_builtins();
        assert_eq!(reg.len(), 3);
        assert!(reg.contains("fieldAccess"));
        assert!(reg.contains("constant"));
        assert!(reg.contains("currencyConversion"));
        assert!(!reg.contains("CurrencyConversion"));
        assert!(PostAggregatorRegistry::new().is_empty());
    }

    #[test]
    fn decode_dispatches_on_type() {
        let reg = PostAggregatorRegistry::with_builtins();
        let node = reg
            .decode(&json!({"type": "fieldAccess", "name": "total", "fieldName": "total"}))
            .unwrap();
        assert_eq!(node.type_name(), "fieldAccess");
        assert_eq!(node.name(), Some("total"));
    }

    #[test]
    fn unknown_type_rejected() {
        let reg = PostAggregatorRegistry::with_builtins();
        let err = reg.decode(&json!({"type": "arithmetic"})).unwrap_err();
        assert_eq!(
            err.to_string(),
            "configuration error: unknown post-aggregator type 'arithmetic'"
        );
    }

    #[test]
    fn malformed_configurations_rejected() {
        let reg = PostAggregatorRegistry::with_builtins();
        assert!(reg.decode(&json!([1, 2])).unwrap_err().is_config());
        assert!(reg.decode(&json!({"fieldName": "x"})).unwrap_err().is_config());
        assert!(reg.decode(&json!({"type": 7})).unwrap_err().is_config());
        assert!(reg.decode(&json!({"type": null})).unwrap_err().is_config());
    }

    #[test]
    fn decode_str_reports_bad_json() {
        let reg = PostAggregatorRegistry::with_builtins();
        let err = reg.decode_str("{\"type\": ").unwrap_err();
        assert!(matches!(err, CambioError::Json { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn nesting_depth_bounded() {
        let reg = PostAggregatorRegistry::with_builtins().with_config(DecodeConfig {
            max_depth: 1,
            ..DecodeConfig::default()
        });
        let leaf = json!({"type": "fieldAccess", "fieldName": "x"});
        let one = json!({
            "type": "currencyConversion",
            "conversions": {"USD": 1.0},
            "field": leaf,
            "currencyField": leaf,
        });
        assert!(reg.decode(&one).is_ok());

        let two = json!({
            "type": "currencyConversion",
            "conversions": {"USD": 1.0},
            "field": one,
            "currencyField": leaf,
        });
        let err = reg.decode(&two).unwrap_err();
        assert!(err.to_string().contains("max depth 1"));
    }

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Zero;

    impl PostAggregator for Zero {
        fn type_name(&self) -> &'static str {
            "zero"
        }
        fn name(&self) -> Option<&str> {
            None
        }
        fn compute(&self, _row: &dyn cambio_types::Row) -> CambioResult<cambio_types::TypedValue> {
            Ok(cambio_types::TypedValue::Double(0.0))
        }
        fn dependent_fields(&self) -> hashbrown::HashSet<SmolStr> {
            hashbrown::HashSet::new()
        }
        fn cache_key(&self) -> CambioResult<Vec<u8>> {
            Ok(vec![0x7f])
        }
        fn decorate(self: Arc<Self>, _aggregators: &crate::node::AggregatorMetadata) -> NodeRef {
            self
        }
        fn to_json(&self) -> Value {
            json!({"type": "zero"})
        }
    }

    fn decode_zero(_object: &JsonObject, _ctx: &DecodeContext<'_>) -> CambioResult<NodeRef> {
        Ok(Arc::new(Zero))
    }

    #[test]
    fn custom_type_usable_as_child() {
        let mut reg = PostAggregatorRegistry::with_builtins();
        reg.register("zero", decode_zero).unwrap();
        assert!(reg.register("zero", decode_zero).is_err());
        assert!(reg.register("constant", decode_zero).is_err());
        assert!(reg.register("", decode_zero).is_err());

        let node = reg
            .decode(&json!({
                "type": "currencyConversion",
                "currency": "GBP",
                "conversions": {"GBP": 1.0},
                "field": {"type": "zero"},
                "currencyField": {"type": "constant", "value": 1.0},
            }))
            .unwrap();
        assert_eq!(node.type_name(), "currencyConversion");
    }
}

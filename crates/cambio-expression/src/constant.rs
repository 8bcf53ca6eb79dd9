//! `constant`: a fixed number, independent of the row.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cambio_common::{CambioError, CambioResult};
use cambio_types::{Row, TypedValue};
use hashbrown::HashSet;
use serde_json::json;
use smol_str::SmolStr;

use crate::cache_key::{CacheKeyBuilder, CONSTANT_CACHE_ID};
use crate::decode::{DecodeContext, Fields, JsonObject};
use crate::node::{AggregatorMetadata, NodeRef, PostAggregator};

#[derive(Clone, Debug)]
pub struct Constant {
    name: Option<SmolStr>,
    value: f64,
}

impl Constant {
    pub const TYPE_NAME: &'static str = "constant";

    pub fn new(name: Option<&str>, value: f64) -> CambioResult<Self> {
        if !value.is_finite() {
            return Err(CambioError::Config(format!(
                "{}: value must be finite, got {value}",
                Self::TYPE_NAME
            )));
        }
        Ok(Self {
            name: name.map(SmolStr::new),
            value,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub(crate) fn decode(object: &JsonObject, ctx: &DecodeContext<'_>) -> CambioResult<NodeRef> {
        let fields = Fields::new(Self::TYPE_NAME, object, &["name", "value"], ctx.config())?;
        let node = Self::new(fields.optional_str("name")?, fields.required_f64("value")?)?;
        Ok(Arc::new(node))
    }
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value.to_bits() == other.value.to_bits()
    }
}

impl Eq for Constant {}

impl Hash for Constant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.value.to_bits().hash(state);
    }
}

impl PostAggregator for Constant {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn compute(&self, _row: &dyn Row) -> CambioResult<TypedValue> {
        Ok(TypedValue::Double(self.value))
    }

    fn dependent_fields(&self) -> HashSet<SmolStr> {
        HashSet::new()
    }

    fn cache_key(&self) -> CambioResult<Vec<u8>> {
        CacheKeyBuilder::new(CONSTANT_CACHE_ID)
            .append_f64(self.value)
            .build()
    }

    fn decorate(self: Arc<Self>, _aggregators: &AggregatorMetadata) -> NodeRef {
        self
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "type": Self::TYPE_NAME,
            "name": self.name,
            "value": self.value,
        })
    }
}

//! `fieldAccess`: reads one named value out of the aggregated row.

use std::sync::Arc;

use cambio_common::{CambioError, CambioResult};
use cambio_types::{Row, TypedValue};
use hashbrown::HashSet;
use serde_json::json;
use smol_str::SmolStr;
use tracing::debug;

use crate::cache_key::{CacheKeyBuilder, FIELD_ACCESS_CACHE_ID};
use crate::decode::{DecodeContext, Fields, JsonObject};
use crate::node::{AggregatorMetadata, NodeRef, PostAggregator};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldAccess {
    name: Option<SmolStr>,
    field_name: SmolStr,
}

impl FieldAccess {
    pub const TYPE_NAME: &'static str = "fieldAccess";

    pub fn new(name: Option<&str>, field_name: &str) -> CambioResult<Self> {
        if field_name.trim().is_empty() {
            return Err(CambioError::Config(format!(
                "{}: fieldName cannot be blank",
                Self::TYPE_NAME
            )));
        }
        Ok(Self {
            name: name.map(SmolStr::new),
            field_name: SmolStr::new(field_name),
        })
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub(crate) fn decode(object: &JsonObject, ctx: &DecodeContext<'_>) -> CambioResult<NodeRef> {
        let fields = Fields::new(Self::TYPE_NAME, object, &["name", "fieldName"], ctx.config())?;
        let node = Self::new(fields.optional_str("name")?, fields.required_str("fieldName")?)?;
        debug!(
            field = %node.field_name,
            depth = ctx.depth(),
            "decoded fieldAccess post-aggregator"
        );
        Ok(Arc::new(node))
    }
}

impl PostAggregator for FieldAccess {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn compute(&self, row: &dyn Row) -> CambioResult<TypedValue> {
        Ok(row.value(&self.field_name).cloned().unwrap_or(TypedValue::Null))
    }

    fn dependent_fields(&self) -> HashSet<SmolStr> {
        HashSet::from([self.field_name.clone()])
    }

    fn cache_key(&self) -> CambioResult<Vec<u8>> {
        CacheKeyBuilder::new(FIELD_ACCESS_CACHE_ID)
            .append_string(&self.field_name)
            .build()
    }

    fn decorate(self: Arc<Self>, _aggregators: &AggregatorMetadata) -> NodeRef {
        self
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "type": Self::TYPE_NAME,
            "name": self.name,
            "fieldName": self.field_name,
        })
    }
}

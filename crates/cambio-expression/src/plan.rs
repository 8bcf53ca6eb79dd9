//! An ordered list of post-aggregators evaluated against one row.

use std::collections::HashMap;
use std::sync::Arc;

use cambio_common::CambioResult;
use cambio_types::TypedValue;
use hashbrown::HashSet;
use serde_json::Value;
use smol_str::SmolStr;
use tracing::debug;

use crate::node::{AggregatorMetadata, NodeRef};
use crate::registry::PostAggregatorRegistry;

/// Later nodes may read the outputs of earlier ones by name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PostAggregationPlan {
    nodes: Vec<NodeRef>,
}

impl PostAggregationPlan {
    pub fn new(nodes: Vec<NodeRef>) -> Self {
        Self { nodes }
    }

    /// Decode a JSON array of node configurations.
    pub fn decode(registry: &PostAggregatorRegistry, value: &Value) -> CambioResult<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => return Ok(Self::new(vec![registry.decode(other)?])),
        };
        let nodes = items
            .iter()
            .map(|item| registry.decode(item))
            .collect::<CambioResult<Vec<_>>>()?;
        debug!(nodes = nodes.len(), "decoded post-aggregation plan");
        Ok(Self::new(nodes))
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Fields the plan needs from the aggregated row. Outputs of earlier
    /// nodes are produced by the plan itself and excluded.
    pub fn dependent_fields(&self) -> HashSet<SmolStr> {
        let mut produced: HashSet<&str> = HashSet::new();
        let mut needed = HashSet::new();
        for node in &self.nodes {
            needed.extend(
                node.dependent_fields()
                    .into_iter()
                    .filter(|f| !produced.contains(f.as_str())),
            );
            if let Some(name) = node.name() {
                produced.insert(name);
            }
        }
        needed
    }

    /// Node cache keys concatenated in plan order.
    pub fn cache_key(&self) -> CambioResult<Vec<u8>> {
        let mut key = Vec::new();
        for node in &self.nodes {
            key.extend_from_slice(&node.cache_key()?);
        }
        Ok(key)
    }

    pub fn decorate(&self, aggregators: &AggregatorMetadata) -> Self {
        Self::new(
            self.nodes
                .iter()
                .map(|node| Arc::clone(node).decorate(aggregators))
                .collect(),
        )
    }

    /// Compute every node in order, storing each named result in `row`.
    /// Unnamed nodes are evaluated but their results are not stored.
    pub fn apply(&self, row: &mut HashMap<SmolStr, TypedValue>) -> CambioResult<()> {
        for node in &self.nodes {
            let value = node.compute(&*row)?;
            if let Some(name) = node.name() {
                row.insert(SmolStr::new(name), value);
            }
        }
        Ok(())
    }
}

//! The post-aggregator node capability.
//!
//! A node derives one output value from an already-aggregated row. Nodes form
//! a tree: a node's children are themselves `Arc<dyn PostAggregator>`, so any
//! type implementing the trait can be plugged under any other.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use cambio_common::CambioResult;
use cambio_types::{natural_nulls_first, Row, TypedValue};
use hashbrown::{HashMap, HashSet};
use smol_str::SmolStr;

/// Shared handle to a node. Nodes are immutable, so one instance may be
/// evaluated from many threads at once.
pub type NodeRef = Arc<dyn PostAggregator>;

/// Ordering over a node's output values.
pub type Comparator = fn(&TypedValue, &TypedValue) -> Ordering;

/// What the engine knows about one aggregator feeding the row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregatorSpec {
    pub name: SmolStr,
    pub kind: SmolStr,
}

/// Aggregators of the query, keyed by output name.
pub type AggregatorMetadata = HashMap<SmolStr, AggregatorSpec>;

/// A computed-value node evaluated after aggregation.
pub trait PostAggregator: NodeIdentity + fmt::Debug + Send + Sync + 'static {
    /// Type discriminator used in the declarative configuration.
    fn type_name(&self) -> &'static str;

    /// Output field name. `None` when the configuration omitted it.
    fn name(&self) -> Option<&str>;

    /// Compute this node's value from an aggregated row.
    fn compute(&self, row: &dyn Row) -> CambioResult<TypedValue>;

    /// Row fields this node reads, directly or through its children.
    fn dependent_fields(&self) -> HashSet<SmolStr>;

    /// Ordering the engine uses when sorting rows by this node's output.
    fn comparator(&self) -> Comparator {
        natural_nulls_first
    }

    /// Cache-key fragment: equal configurations give equal bytes, and any
    /// difference in compute behavior gives different bytes.
    fn cache_key(&self) -> CambioResult<Vec<u8>>;

    /// Bind the node to the query's aggregators. Nodes without a late-bound
    /// dependency on aggregator metadata return the same instance.
    fn decorate(self: Arc<Self>, aggregators: &AggregatorMetadata) -> NodeRef;

    /// The declarative configuration this node decodes from.
    fn to_json(&self) -> serde_json::Value;
}

/// Structural equality and hashing across node trait objects.
///
/// Implemented for every `PostAggregator` that is `Eq + Hash`; node types
/// never implement it by hand.
pub trait NodeIdentity {
    fn as_any(&self) -> &dyn Any;
    fn dyn_eq(&self, other: &dyn PostAggregator) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

impl<T: PostAggregator + Eq + Hash> NodeIdentity for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn PostAggregator) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .map_or(false, |other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.type_name().hash(&mut state);
        self.hash(&mut state);
    }
}

impl PartialEq for dyn PostAggregator {
    fn eq(&self, other: &Self) -> bool {
        self.dyn_eq(other)
    }
}

impl Eq for dyn PostAggregator {}

impl Hash for dyn PostAggregator {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.dyn_hash(state);
    }
}

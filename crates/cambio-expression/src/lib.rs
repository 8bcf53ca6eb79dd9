//! cambio-expression: post-aggregator nodes, currency conversion, cache keys, decoding.

pub mod cache_key;
pub mod constant;
pub mod conversion;
pub mod currency;
pub mod decode;
pub mod field_access;
pub mod node;
pub mod plan;
pub mod registry;

pub use cache_key::{
    CacheKeyBuilder, CONSTANT_CACHE_ID, CURRENCY_CONVERSION_CACHE_ID, FIELD_ACCESS_CACHE_ID,
};
pub use constant::Constant;
pub use conversion::ConversionTable;
pub use currency::{CurrencyConversion, CurrencyPolicy, UnknownCurrency};
pub use decode::{DecodeContext, Fields, JsonObject};
pub use field_access::FieldAccess;
pub use node::{
    AggregatorMetadata, AggregatorSpec, Comparator, NodeIdentity, NodeRef, PostAggregator,
};
pub use plan::PostAggregationPlan;
pub use registry::{DecodeFn, PostAggregatorRegistry};

//! `currencyConversion`: rescales a value into a reference currency.
//!
//! ```json
//! {
//!   "type": "currencyConversion",
//!   "name": "convertedValue",
//!   "currency": "GBP",
//!   "field": { "type": "fieldAccess", "name": "total", "fieldName": "total" },
//!   "currencyField": { "type": "fieldAccess", "name": "currency", "fieldName": "currency" },
//!   "conversions": { "USD": 1.6, "GBP": 1.0, "EUR": 0.89 }
//! }
//! ```
//!
//! With `currency` set the node passes values already in that currency
//! through and fails on codes missing from the table. Without it, values
//! within [`NEAR_ZERO_EPSILON`] of zero become `0.0` before the currency is
//! even read, and unknown codes convert to `0.0`. `onUnknownCurrency` and
//! `shortCircuitNearZero` override either default.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use cambio_common::{CambioError, CambioResult, NEAR_ZERO_EPSILON};
use cambio_types::{Row, TypedValue};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use smol_str::SmolStr;
use tracing::{debug, trace};

use crate::cache_key::{CacheKeyBuilder, CURRENCY_CONVERSION_CACHE_ID};
use crate::conversion::ConversionTable;
use crate::decode::{DecodeContext, Fields, JsonObject};
use crate::node::{AggregatorMetadata, NodeRef, PostAggregator};

/// Outcome for a currency code that has no multiplier in the table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownCurrency {
    Error,
    Zero,
}

impl UnknownCurrency {
    fn cache_byte(self) -> u8 {
        match self {
            Self::Error => 0,
            Self::Zero => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CurrencyPolicy {
    pub on_unknown: UnknownCurrency,
    pub short_circuit_near_zero: bool,
}

impl CurrencyPolicy {
    /// Policy of a node configured with a target currency.
    pub const FIXED_TARGET: Self = Self {
        on_unknown: UnknownCurrency::Error,
        short_circuit_near_zero: false,
    };

    /// Policy of a node configured without a target currency.
    pub const DEFAULT_TO_ZERO: Self = Self {
        on_unknown: UnknownCurrency::Zero,
        short_circuit_near_zero: true,
    };

    pub fn default_for(target: Option<&str>) -> Self {
        match target {
            Some(_) => Self::FIXED_TARGET,
            None => Self::DEFAULT_TO_ZERO,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash)]
pub struct CurrencyConversion {
    name: Option<SmolStr>,
    field: NodeRef,
    currency_field: NodeRef,
    target: Option<SmolStr>,
    conversions: ConversionTable,
    policy: CurrencyPolicy,
}

impl PartialEq for CurrencyConversion {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && *self.field == *other.field
            && *self.currency_field == *other.currency_field
            && self.target == other.target
            && self.conversions == other.conversions
            && self.policy == other.policy
    }
}

const FIELDS: &[&str] = &[
    "name",
    "currency",
    "conversions",
    "field",
    "currencyField",
    "onUnknownCurrency",
    "shortCircuitNearZero",
];

impl CurrencyConversion {
    pub const TYPE_NAME: &'static str = "currencyConversion";

    pub fn new(
        name: Option<&str>,
        target: Option<&str>,
        conversions: ConversionTable,
        field: NodeRef,
        currency_field: NodeRef,
        policy: CurrencyPolicy,
    ) -> CambioResult<Self> {
        if let Some(target) = target {
            if target.trim().is_empty() {
                return Err(CambioError::Config(format!(
                    "{}: currency cannot be blank",
                    Self::TYPE_NAME
                )));
            }
        }
        Ok(Self {
            name: name.map(SmolStr::new),
            field,
            currency_field,
            target: target.map(SmolStr::new),
            conversions,
            policy,
        })
    }

    /// Fixed target currency; unknown codes are errors.
    pub fn with_target(
        name: Option<&str>,
        target: &str,
        conversions: ConversionTable,
        field: NodeRef,
        currency_field: NodeRef,
    ) -> CambioResult<Self> {
        Self::new(
            name,
            Some(target),
            conversions,
            field,
            currency_field,
            CurrencyPolicy::FIXED_TARGET,
        )
    }

    /// No target currency; near-zero values and unknown codes yield `0.0`.
    pub fn default_to_zero(
        name: Option<&str>,
        conversions: ConversionTable,
        field: NodeRef,
        currency_field: NodeRef,
    ) -> CambioResult<Self> {
        Self::new(
            name,
            None,
            conversions,
            field,
            currency_field,
            CurrencyPolicy::DEFAULT_TO_ZERO,
        )
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn conversions(&self) -> &ConversionTable {
        &self.conversions
    }

    pub fn field(&self) -> &NodeRef {
        &self.field
    }

    pub fn currency_field(&self) -> &NodeRef {
        &self.currency_field
    }

    pub fn policy(&self) -> CurrencyPolicy {
        self.policy
    }

    pub(crate) fn decode(object: &JsonObject, ctx: &DecodeContext<'_>) -> CambioResult<NodeRef> {
        let fields = Fields::new(Self::TYPE_NAME, object, FIELDS, ctx.config())?;
        let name = fields.optional_str("name")?;
        let target = fields.optional_str("currency")?;
        if fields.optional_value("conversions").is_none() {
            return Err(CambioError::Config("must have a conversion set".into()));
        }
        let conversions = ConversionTable::from_json(fields.required_object("conversions")?)?;
        let field = ctx.decode_child(fields.required_value("field")?)?;
        let currency_field = ctx.decode_child(fields.required_value("currencyField")?)?;

        let mut policy = CurrencyPolicy::default_for(target);
        if let Some(value) = fields.optional_value("onUnknownCurrency") {
            policy.on_unknown = UnknownCurrency::deserialize(value).map_err(|e| {
                fields.error(format!("'onUnknownCurrency' must be \"error\" or \"zero\": {e}"))
            })?;
        }
        if let Some(flag) = fields.optional_bool("shortCircuitNearZero")? {
            policy.short_circuit_near_zero = flag;
        }

        let node = Self::new(name, target, conversions, field, currency_field, policy)?;
        debug!(
            name = ?node.name,
            target = ?node.target,
            conversions = node.conversions.len(),
            on_unknown = ?node.policy.on_unknown,
            short_circuit = node.policy.short_circuit_near_zero,
            depth = ctx.depth(),
            "decoded currencyConversion post-aggregator"
        );
        Ok(Arc::new(node))
    }

    fn numeric_value(&self, row: &dyn Row) -> CambioResult<f64> {
        let value = self.field.compute(row)?;
        value.as_number().ok_or_else(|| {
            CambioError::TypeMismatch(format!(
                "{}: field must be numeric, got {} ({value})",
                Self::TYPE_NAME,
                value.type_name()
            ))
        })
    }

    fn convert(&self, code: &str, value: f64) -> CambioResult<f64> {
        if self.target.as_deref() == Some(code) {
            trace!(currency = code, "value already in target currency");
            return Ok(value);
        }
        match self.conversions.get(code) {
            Some(multiplier) => Ok(value * multiplier),
            None => self.unknown_currency(code),
        }
    }

    fn unknown_currency(&self, code: &str) -> CambioResult<f64> {
        match self.policy.on_unknown {
            UnknownCurrency::Error => Err(CambioError::UnknownCurrency(code.to_string())),
            UnknownCurrency::Zero => {
                trace!(currency = code, "unknown currency converted to zero");
                Ok(0.0)
            }
        }
    }
}

impl PostAggregator for CurrencyConversion {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn compute(&self, row: &dyn Row) -> CambioResult<TypedValue> {
        let value = self.numeric_value(row)?;
        if self.policy.short_circuit_near_zero && value.abs() <= NEAR_ZERO_EPSILON {
            trace!(value, "near-zero value short-circuited");
            return Ok(TypedValue::Double(0.0));
        }

        let converted = match self.currency_field.compute(row)? {
            TypedValue::Null => self.unknown_currency("null")?,
            observed => {
                let code: Cow<'_, str> = match observed.as_str() {
                    Some(s) => Cow::Borrowed(s),
                    None => Cow::Owned(observed.to_string()),
                };
                self.convert(&code, value)?
            }
        };
        Ok(TypedValue::Double(converted))
    }

    fn dependent_fields(&self) -> HashSet<SmolStr> {
        let mut fields = self.field.dependent_fields();
        fields.extend(self.currency_field.dependent_fields());
        fields
    }

    fn cache_key(&self) -> CambioResult<Vec<u8>> {
        CacheKeyBuilder::new(CURRENCY_CONVERSION_CACHE_ID)
            .append_optional_string(self.target.as_deref())
            .append_u8(self.policy.on_unknown.cache_byte())
            .append_bool(self.policy.short_circuit_near_zero)
            .append_cacheable(self.field.as_ref())
            .append_cacheable(self.currency_field.as_ref())
            .append_result(self.conversions.to_canonical_json())
            .build()
    }

    fn decorate(self: Arc<Self>, _aggregators: &AggregatorMetadata) -> NodeRef {
        self
    }

    fn to_json(&self) -> serde_json::Value {
        let mut value = json!({
            "type": Self::TYPE_NAME,
            "name": self.name,
            "conversions": self.conversions.to_json(),
            "field": self.field.to_json(),
            "currencyField": self.currency_field.to_json(),
            "onUnknownCurrency": self.policy.on_unknown,
            "shortCircuitNearZero": self.policy.short_circuit_near_zero,
        });
        if let Some(target) = &self.target {
            value["currency"] = json!(target);
        }
        value
    }
}

impl fmt::Display for CurrencyConversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CurrencyConversion{{name={:?}, currency={:?}, field={}, currencyField={}}}",
            self.name.as_deref(),
            self.target.as_deref(),
            self.field.to_json(),
            self.currency_field.to_json(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;
    use std::collections::hash_map::DefaultHasher;
    use std::collections::HashMap;
    use std::hash::{Hash, Hasher};

    use crate::constant::Constant;
    use crate::field_access::FieldAccess;

    fn field(name: &str) -> NodeRef {
        Arc::new(FieldAccess::new(Some(name), name).unwrap())
    }

    fn table() -> ConversionTable {
        ConversionTable::new([("GBP", 1.0), ("USD", 2.0)]).unwrap()
    }

    fn fixed(
        name: Option<&str>,
        target: &str,
        value: NodeRef,
        currency: NodeRef,
    ) -> CurrencyConversion {
        CurrencyConversion::with_target(name, target, table(), value, currency).unwrap()
    }

    fn fixed_gbp() -> CurrencyConversion {
        fixed(Some("converted"), "GBP", field("total"), field("currency"))
    }

    fn zero_default() -> CurrencyConversion {
        CurrencyConversion::default_to_zero(
            Some("converted"),
            table(),
            field("total"),
            field("currency"),
        )
        .unwrap()
    }

    fn row(total: TypedValue, currency: &str) -> HashMap<SmolStr, TypedValue> {
        let mut row = HashMap::new();
        row.insert(SmolStr::new("total"), total);
        row.insert(SmolStr::new("currency"), TypedValue::from(currency));
        row
    }

    fn hash_of(node: &dyn PostAggregator) -> u64 {
        let mut hasher = DefaultHasher::new();
        node.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn converts_foreign_currency() {
        let node = fixed_gbp();
        let out = node.compute(&row(TypedValue::Int64(3), "USD")).unwrap();
        assert_eq!(out, TypedValue::Double(6.0));
    }

    #[test]
    fn target_currency_passes_through() {
        let node = fixed_gbp();
        let out = node.compute(&row(TypedValue::Int64(3), "GBP")).unwrap();
        assert_eq!(out, TypedValue::Double(3.0));
    }

    #[test]
    fn target_wins_over_table_entry() {
        let conversions = ConversionTable::new([("GBP", 5.0), ("USD", 2.0)]).unwrap();
        let node = CurrencyConversion::with_target(
            None,
            "GBP",
            conversions,
            field("total"),
            field("currency"),
        )
        .unwrap();
        let out = node.compute(&row(TypedValue::Double(3.0), "GBP")).unwrap();
        assert_eq!(out, TypedValue::Double(3.0));
    }

    #[test]
    fn fixed_target_fails_on_unknown_currency() {
        let node = fixed_gbp();
        let err = node.compute(&row(TypedValue::Int64(3), "EUR")).unwrap_err();
        assert!(matches!(err, CambioError::UnknownCurrency(ref code) if code == "EUR"));
    }

    #[test]
    fn default_to_zero_on_unknown_currency() {
        let node = zero_default();
        let out = node.compute(&row(TypedValue::Int64(3), "EUR")).unwrap();
        assert_eq!(out, TypedValue::Double(0.0));
    }

    #[test]
    fn default_to_zero_converts_known_currency() {
        let node = zero_default();
        assert_eq!(
            node.compute(&row(TypedValue::Int64(3), "USD")).unwrap(),
            TypedValue::Double(6.0)
        );
        assert_eq!(
            node.compute(&row(TypedValue::Int64(3), "GBP")).unwrap(),
            TypedValue::Double(3.0)
        );
    }

    #[test]
    fn near_zero_short_circuits_before_currency() {
        let node = zero_default();
        for v in [0.0, 1e-5, -1e-5, 5e-6, -0.0] {
            // Unknown code: reaching the lookup would still give 0.0, so the
            // skipped lookup is asserted in the integration tests.
            let out = node.compute(&row(TypedValue::Double(v), "XXX")).unwrap();
            assert_eq!(out, TypedValue::Double(0.0));
        }
        let out = node.compute(&row(TypedValue::Double(2e-5), "USD")).unwrap();
        assert_eq!(out, TypedValue::Double(4e-5));
    }

    #[test]
    fn fixed_target_does_not_short_circuit() {
        let node = fixed_gbp();
        let out = node.compute(&row(TypedValue::Double(1e-6), "USD")).unwrap();
        assert_eq!(out, TypedValue::Double(2e-6));
        assert!(node.compute(&row(TypedValue::Double(0.0), "EUR")).is_err());
    }

    #[test]
    fn non_numeric_value_is_type_mismatch() {
        let node = fixed_gbp();
        let err = node
            .compute(&row(TypedValue::from("three"), "USD"))
            .unwrap_err();
        assert!(matches!(err, CambioError::TypeMismatch(_)));

        let mut missing = row(TypedValue::Null, "USD");
        missing.remove("total");
        assert!(matches!(
            node.compute(&missing).unwrap_err(),
            CambioError::TypeMismatch(_)
        ));
    }

    #[test]
    fn null_currency_follows_unknown_policy() {
        let mut r = row(TypedValue::Int64(3), "USD");
        r.insert(SmolStr::new("currency"), TypedValue::Null);
        assert!(matches!(
            fixed_gbp().compute(&r).unwrap_err(),
            CambioError::UnknownCurrency(_)
        ));
        assert_eq!(zero_default().compute(&r).unwrap(), TypedValue::Double(0.0));
    }

    #[test]
    fn non_string_currency_uses_display_text() {
        let conversions = ConversionTable::new([("826", 1.0), ("840", 2.0)]).unwrap();
        let node = CurrencyConversion::with_target(
            None,
            "826",
            conversions,
            field("total"),
            field("currency"),
        )
        .unwrap();
        let mut r = row(TypedValue::Int64(3), "");
        r.insert(SmolStr::new("currency"), TypedValue::Int64(840));
        assert_eq!(node.compute(&r).unwrap(), TypedValue::Double(6.0));
    }

    #[test]
    fn policy_override() {
        let policy = CurrencyPolicy {
            on_unknown: UnknownCurrency::Zero,
            short_circuit_near_zero: false,
        };
        let node = CurrencyConversion::new(
            None,
            Some("GBP"),
            table(),
            field("total"),
            field("currency"),
            policy,
        )
        .unwrap();
        assert_eq!(
            node.compute(&row(TypedValue::Int64(3), "EUR")).unwrap(),
            TypedValue::Double(0.0)
        );
    }

    #[test]
    fn blank_target_rejected() {
        for target in ["", "   "] {
            let err = CurrencyConversion::with_target(
                None,
                target,
                table(),
                field("total"),
                field("currency"),
            )
            .unwrap_err();
            assert!(err.is_config());
        }
    }

    #[test]
    fn dependent_fields_union() {
        let node = fixed_gbp();
        let expected: HashSet<SmolStr> = ["total", "currency"]
            .into_iter()
            .map(SmolStr::new)
            .collect();
        assert_eq!(node.dependent_fields(), expected);

        let shared = fixed(None, "GBP", field("x"), field("x"));
        assert_eq!(shared.dependent_fields().len(), 1);

        let constant: NodeRef = Arc::new(Constant::new(None, 3.0).unwrap());
        let none = fixed(None, "GBP", constant.clone(), constant);
        assert!(none.dependent_fields().is_empty());
    }

    #[test]
    fn comparator_is_nulls_first() {
        let cmp = fixed_gbp().comparator();
        assert_eq!(cmp(&TypedValue::Null, &TypedValue::Double(-1.0)), Ordering::Less);
        assert_eq!(cmp(&TypedValue::Double(6.0), &TypedValue::Double(3.0)), Ordering::Greater);
    }

    #[test]
    fn decorate_returns_same_instance() {
        let node: NodeRef = Arc::new(fixed_gbp());
        let decorated = Arc::clone(&node).decorate(&AggregatorMetadata::new());
        assert!(Arc::ptr_eq(&node, &decorated));
    }

    #[test]
    fn structural_equality_and_hash() {
        let a = fixed_gbp();
        let b = fixed_gbp();
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let unnamed = fixed(None, "GBP", field("total"), field("currency"));
        assert_ne!(a, unnamed);
        assert_eq!(unnamed, unnamed.clone());

        let other_target = fixed(Some("converted"), "USD", field("total"), field("currency"));
        assert_ne!(a, other_target);
        assert_ne!(a, zero_default());
    }

    #[test]
    fn dyn_equality_across_types() {
        let a: NodeRef = Arc::new(fixed_gbp());
        let b: NodeRef = Arc::new(fixed_gbp());
        let c: NodeRef = field("total");
        assert!(*a == *b);
        assert!(*a != *c);
        assert_eq!(hash_of(a.as_ref()), hash_of(b.as_ref()));
    }

    #[test]
    fn cache_key_equal_for_equal_configuration() {
        assert_eq!(fixed_gbp().cache_key().unwrap(), fixed_gbp().cache_key().unwrap());
        let renamed = fixed(Some("other"), "GBP", field("total"), field("currency"));
        assert_eq!(fixed_gbp().cache_key().unwrap(), renamed.cache_key().unwrap());
    }

    #[test]
    fn cache_key_differs_with_behavior() {
        let base = fixed_gbp().cache_key().unwrap();
        assert_eq!(base[0], CURRENCY_CONVERSION_CACHE_ID);

        let other_table = CurrencyConversion::with_target(
            Some("converted"),
            "GBP",
            ConversionTable::new([("GBP", 1.0), ("USD", 2.5)]).unwrap(),
            field("total"),
            field("currency"),
        )
        .unwrap();
        let other_target = fixed(Some("converted"), "USD", field("total"), field("currency"));
        let swapped_children = fixed(Some("converted"), "GBP", field("currency"), field("total"));
        let no_target = CurrencyConversion::new(
            Some("converted"),
            None,
            table(),
            field("total"),
            field("currency"),
            CurrencyPolicy::FIXED_TARGET,
        )
        .unwrap();
        let other_policy = CurrencyConversion::new(
            Some("converted"),
            Some("GBP"),
            table(),
            field("total"),
            field("currency"),
            CurrencyPolicy::DEFAULT_TO_ZERO,
        )
        .unwrap();

        let keys = [
            base,
            other_table.cache_key().unwrap(),
            other_target.cache_key().unwrap(),
            swapped_children.cache_key().unwrap(),
            no_target.cache_key().unwrap(),
            other_policy.cache_key().unwrap(),
            zero_default().cache_key().unwrap(),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in &keys[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[derive(Debug, PartialEq, Eq, Hash)]
    struct Unkeyable;

    impl PostAggregator for Unkeyable {
        fn type_name(&self) -> &'static str {
            "unkeyable"
        }

        fn name(&self) -> Option<&str> {
            None
        }

        fn compute(&self, _row: &dyn Row) -> CambioResult<TypedValue> {
            Ok(TypedValue::from("USD"))
        }

        fn dependent_fields(&self) -> HashSet<SmolStr> {
            HashSet::new()
        }

        fn cache_key(&self) -> CambioResult<Vec<u8>> {
            Err(CambioError::CacheKey("child cannot be keyed".into()))
        }

        fn decorate(self: Arc<Self>, _aggregators: &AggregatorMetadata) -> NodeRef {
            self
        }

        fn to_json(&self) -> serde_json::Value {
            json!({ "type": "unkeyable" })
        }
    }

    #[test]
    fn child_cache_key_failure_propagates() {
        let failing: NodeRef = Arc::new(Unkeyable);
        let as_value = fixed(None, "GBP", failing.clone(), field("currency"));
        let as_currency = fixed(None, "GBP", field("total"), failing);

        for node in [as_value, as_currency] {
            let err = node.cache_key().unwrap_err();
            assert_eq!(err.to_string(), "cache key error: child cannot be keyed");
        }
    }

    #[test]
    fn display_names_target_and_children() {
        let text = fixed_gbp().to_string();
        assert!(text.starts_with(
            "CurrencyConversion{name=Some(\"converted\"), currency=Some(\"GBP\")"
        ));
        assert!(text.contains("\"fieldName\":\"total\""));
    }

    #[test]
    fn concurrent_compute_on_shared_node() {
        let node: NodeRef = Arc::new(fixed_gbp());
        std::thread::scope(|s| {
            for i in 0..8i64 {
                let node = Arc::clone(&node);
                s.spawn(move || {
                    for _ in 0..100 {
                        let out = node.compute(&row(TypedValue::Int64(i), "USD")).unwrap();
                        assert_eq!(out, TypedValue::Double((i * 2) as f64));
                    }
                });
            }
        });
    }
}

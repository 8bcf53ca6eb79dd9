//! Immutable currency → multiplier table.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use cambio_common::{CambioError, CambioResult};
use serde_json::Value;
use smol_str::SmolStr;

use crate::decode::{json_kind, JsonObject};

/// Multipliers that rescale a value in a given currency into the reference
/// currency. Codes are case-sensitive. Always non-empty, every multiplier
/// finite; keys are kept sorted so the serialized form is canonical.
#[derive(Clone, Debug)]
pub struct ConversionTable {
    rates: BTreeMap<SmolStr, f64>,
}

impl ConversionTable {
    pub fn new<I, K>(entries: I) -> CambioResult<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut rates = BTreeMap::new();
        for (code, multiplier) in entries {
            let code = code.as_ref();
            if !multiplier.is_finite() {
                return Err(CambioError::Config(format!(
                    "conversion for '{code}' must be finite, got {multiplier}"
                )));
            }
            if rates.insert(SmolStr::new(code), multiplier).is_some() {
                return Err(CambioError::Config(format!("duplicate conversion for '{code}'")));
            }
        }
        if rates.is_empty() {
            return Err(CambioError::Config("must have a conversion set".into()));
        }
        Ok(Self { rates })
    }

    /// Decode the `conversions` object of a node configuration.
    pub fn from_json(object: &JsonObject) -> CambioResult<Self> {
        let mut entries = Vec::with_capacity(object.len());
        for (code, value) in object {
            let multiplier = match value {
                Value::Null => {
                    return Err(CambioError::Config(
                        "no conversion value can be null".into(),
                    ));
                }
                Value::Number(n) => n.as_f64().ok_or_else(|| {
                    CambioError::Config(format!(
                        "conversion for '{code}' is not representable as f64"
                    ))
                })?,
                other => {
                    return Err(CambioError::Config(format!(
                        "conversion for '{code}' must be a number, got {}",
                        json_kind(other)
                    )));
                }
            };
            entries.push((code.as_str(), multiplier));
        }
        Self::new(entries)
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.rates.get(code).copied()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false for a constructed table; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Entries in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.rates.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Key-sorted JSON text of the table, as used in cache keys.
    pub fn to_canonical_json(&self) -> CambioResult<String> {
        serde_json::to_string(&self.rates)
            .map_err(|e| CambioError::CacheKey(format!("cannot serialize conversions: {e}")))
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.rates
                .iter()
                .map(|(k, v)| (k.to_string(), Value::from(*v)))
                .collect(),
        )
    }
}

impl PartialEq for ConversionTable {
    fn eq(&self, other: &Self) -> bool {
        self.rates.len() == other.rates.len()
            && self
                .rates
                .iter()
                .zip(other.rates.iter())
                .all(|((ka, va), (kb, vb))| ka == kb && va.to_bits() == vb.to_bits())
    }
}

impl Eq for ConversionTable {}

impl Hash for ConversionTable {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rates.len().hash(state);
        for (code, multiplier) in &self.rates {
            code.hash(state);
            multiplier.to_bits().hash(state);
        }
    }
}

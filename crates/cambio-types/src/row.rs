use std::collections::BTreeMap;
use std::hash::BuildHasher;

use smol_str::SmolStr;

use crate::value::TypedValue;

/// Trait for reading named values out of an aggregated row during
/// post-aggregation.
///
/// Implemented for the map types an engine is likely to hold rows in, so
/// nodes never need to know the concrete row layout.
pub trait Row {
    fn value(&self, name: &str) -> Option<&TypedValue>;
}

impl<S: BuildHasher> Row for std::collections::HashMap<SmolStr, TypedValue, S> {
    #[inline]
    fn value(&self, name: &str) -> Option<&TypedValue> {
        self.get(name)
    }
}

impl<S: BuildHasher> Row for hashbrown::HashMap<SmolStr, TypedValue, S> {
    #[inline]
    fn value(&self, name: &str) -> Option<&TypedValue> {
        self.get(name)
    }
}

impl Row for BTreeMap<SmolStr, TypedValue> {
    #[inline]
    fn value(&self, name: &str) -> Option<&TypedValue> {
        self.get(name)
    }
}

impl Row for [(SmolStr, TypedValue)] {
    fn value(&self, name: &str) -> Option<&TypedValue> {
        self.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

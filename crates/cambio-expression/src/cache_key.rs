//! Cache-key construction for post-aggregators.
//!
//! A key starts with the node's type id and continues with typed elements.
//! Every element is `[tag][u32 big-endian length][payload]`, so two different
//! element sequences never produce the same bytes.

use cambio_common::{CambioError, CambioResult};

use crate::node::PostAggregator;

pub const FIELD_ACCESS_CACHE_ID: u8 = 0x01;
pub const CONSTANT_CACHE_ID: u8 = 0x02;
pub const CURRENCY_CONVERSION_CACHE_ID: u8 = 0x21;

const NULL_TAG: u8 = 0x00;
const STRING_TAG: u8 = 0x01;
const CACHEABLE_TAG: u8 = 0x02;
const BOOL_TAG: u8 = 0x03;
const U8_TAG: u8 = 0x04;
const F64_TAG: u8 = 0x05;

/// Builds a cache key. Appends are infallible to keep call sites chained;
/// the first failure is held back and returned by [`CacheKeyBuilder::build`].
#[derive(Debug)]
pub struct CacheKeyBuilder {
    buf: Vec<u8>,
    error: Option<CambioError>,
}

impl CacheKeyBuilder {
    pub fn new(type_id: u8) -> Self {
        Self {
            buf: vec![type_id],
            error: None,
        }
    }

    pub fn append_string(self, value: &str) -> Self {
        self.append_element(STRING_TAG, value.as_bytes())
    }

    /// Absent strings get their own tag, distinct from the empty string.
    pub fn append_optional_string(self, value: Option<&str>) -> Self {
        match value {
            Some(s) => self.append_string(s),
            None => self.append_element(NULL_TAG, &[]),
        }
    }

    pub fn append_bool(self, value: bool) -> Self {
        self.append_element(BOOL_TAG, &[u8::from(value)])
    }

    pub fn append_u8(self, value: u8) -> Self {
        self.append_element(U8_TAG, &[value])
    }

    /// Bit pattern of the float, so `0.0` and `-0.0` differ.
    pub fn append_f64(self, value: f64) -> Self {
        self.append_element(F64_TAG, &value.to_bits().to_be_bytes())
    }

    /// Append a child node's own cache key.
    pub fn append_cacheable(mut self, node: &dyn PostAggregator) -> Self {
        if self.error.is_some() {
            return self;
        }
        match node.cache_key() {
            Ok(key) => self.append_element(CACHEABLE_TAG, &key),
            Err(e) => {
                self.error = Some(e);
                self
            }
        }
    }

    /// Record a failure from an encoding step done outside the builder.
    pub fn append_result(mut self, value: CambioResult<String>) -> Self {
        match value {
            Ok(s) => self.append_string(&s),
            Err(e) => {
                if self.error.is_none() {
                    self.error = Some(e);
                }
                self
            }
        }
    }

    pub fn build(self) -> CambioResult<Vec<u8>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.buf),
        }
    }

    fn append_element(mut self, tag: u8, payload: &[u8]) -> Self {
        if self.error.is_some() {
            return self;
        }
        let len = match u32::try_from(payload.len()) {
            Ok(len) => len,
            Err(_) => {
                self.error = Some(CambioError::CacheKey(format!(
                    "cache key element of {} bytes exceeds the u32 length prefix",
                    payload.len()
                )));
                return self;
            }
        };
        self.buf.reserve(1 + 4 + payload.len());
        self.buf.push(tag);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(payload);
        self
    }
}

/// Absolute tolerance under which a value counts as zero for the
/// near-zero short-circuit of currency conversion.
pub const NEAR_ZERO_EPSILON: f64 = 0.00001;

/// Configuration for decoding post-aggregator trees from their declarative form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeConfig {
    /// Maximum nesting of child node configurations. Default: 32.
    pub max_depth: usize,
    /// Reject fields the node type does not define. Default: false.
    pub deny_unknown_fields: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            deny_unknown_fields: false,
        }
    }
}

impl DecodeConfig {
    /// Strict decoding: unknown fields are configuration errors.
    pub fn strict() -> Self {
        Self {
            deny_unknown_fields: true,
            ..Self::default()
        }
    }
}

//! cambio-common: shared error taxonomy, decode configuration, constants.

pub mod config;
pub mod error;

pub use config::{DecodeConfig, NEAR_ZERO_EPSILON};
pub use error::{CambioError, CambioResult};

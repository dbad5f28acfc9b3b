//! Shared utility helpers.

pub mod error;
pub(crate) mod math;

pub use error::{DecodeError, FeatureSide, IconFailure, IconMatchError, IconMatchResult};

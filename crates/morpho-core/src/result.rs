//! Result type aliases for Morpho.

use crate::MorphoError;

/// A specialized `Result` type for Morpho operations.
pub type MorphoResult<T> = Result<T, MorphoError>;

//! Cell coercion and column normalization shared by every reader.

pub mod normalize;
pub mod values;

pub use normalize::{canonical_name, normalize, normalize_table, Normalized};

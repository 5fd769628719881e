//! # targetd common
//!
//! Domain types and the error taxonomy shared by the targetd crates.
//!
//! Everything the registry stores is described here: a [`Kind`] names a
//! namespace, a [`TargetKey`] names an entry inside it, and a [`Payload`]
//! carries the opaque bytes. A [`Listing`] is a point-in-time snapshot of
//! one namespace.

pub mod errors;
pub mod types;

// Re-export commonly used items
pub use errors::{Error, Result, ResultExt};
pub use types::{Kind, Listing, Payload, TargetKey};

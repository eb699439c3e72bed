//! Agricultural product tokenization
//!
//! This crate re-exports all the components of the agritoken system.

pub use agritoken_core::*;
pub use agritoken_proofs::*;
pub use agritoken_runtime::*;
pub use agritoken_storage_impl::*;

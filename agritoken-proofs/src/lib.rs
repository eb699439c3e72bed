pub mod blake3_engine;
pub mod engine;

// Re-export the main types for convenience
pub use blake3_engine::Blake3CommitmentEngine;
pub use engine::{CommitmentEngine, VerificationResult};

pub mod config;
pub mod registry;
pub mod runtime;
pub mod supply;
pub mod tokenizer;

// Re-export the main types for convenience
pub use config::{DeploymentConfig, TokenConfig, DEFAULT_CONTRACT_LABEL};
pub use registry::{derive_unit_class_id, AssetRegistry, ClassLedger, InMemoryAssetRegistry};
pub use runtime::TokenizerRuntime;
pub use supply::SupplyLedger;
pub use tokenizer::Tokenizer;

// Re-export VerificationResult from agritoken-proofs
pub use agritoken_proofs::VerificationResult;

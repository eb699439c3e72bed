use agritoken_core::content_address::ContentAddress;
use agritoken_core::error::TokenizerError;
use agritoken_core::id::AccountId;
use agritoken_core::objects::AdminRegistry;
use agritoken_core::policy::{AdminRule, PolicyProfile};
use agritoken_core::transaction::CreateUnitParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Label used to derive the contract id when none is configured
pub const DEFAULT_CONTRACT_LABEL: &str = "farm-food-tokenizer";

/// The token a deployment creates with `create_unit`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub name: String,
    pub unit_name: String,
    pub total_supply: u64,
    pub decimals: u8,
    /// Bare CID or `ipfs://` URL of the provenance document
    pub metadata_cid: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            name: "FarmToken".to_string(),
            unit_name: "FT".to_string(),
            total_supply: 1_000_000,
            decimals: 2,
            metadata_cid: "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG".to_string(),
        }
    }
}

impl TokenConfig {
    pub fn create_params(&self) -> CreateUnitParams {
        CreateUnitParams {
            name: self.name.clone(),
            unit_symbol: self.unit_name.clone(),
            initial_supply: self.total_supply,
            decimals: self.decimals,
            metadata_pointer: self.metadata_cid.clone(),
        }
    }
}

/// Everything fixed when a contract is deployed.
///
/// ```json
/// {
///   "admins": ["<64 hex chars>", "<64 hex chars>", "<64 hex chars>"],
///   "threshold": 2,
///   "profile": "hardened",
///   "admin_rule": "primary_only",
///   "token": { "name": "FarmToken", "unit_name": "FT" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    #[serde(default = "default_contract_label")]
    pub contract_label: String,

    /// Admin registry, primary admin first
    pub admins: Vec<AccountId>,

    /// Signatures required for critical operations
    pub threshold: u32,

    #[serde(default)]
    pub profile: PolicyProfile,

    #[serde(default)]
    pub admin_rule: AdminRule,

    #[serde(default)]
    pub token: TokenConfig,
}

fn default_contract_label() -> String {
    DEFAULT_CONTRACT_LABEL.to_string()
}

impl DeploymentConfig {
    /// Minimal-profile deployment with the default token
    pub fn new(admins: Vec<AccountId>, threshold: u32) -> Self {
        Self {
            contract_label: default_contract_label(),
            admins,
            threshold,
            profile: PolicyProfile::default(),
            admin_rule: AdminRule::default(),
            token: TokenConfig::default(),
        }
    }

    pub fn with_profile(mut self, profile: PolicyProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse deployment config")?;
        config.validate().context("Invalid deployment config")?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read deployment config {}", path.display()))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize deployment config")
    }

    /// Identity of the deployed contract
    pub fn contract_id(&self) -> AccountId {
        AccountId::derive(&[b"contract", self.contract_label.as_bytes()])
    }

    pub fn admin_registry(&self) -> Result<AdminRegistry, TokenizerError> {
        AdminRegistry::new(self.admins.clone(), self.threshold)
    }

    pub fn validate(&self) -> Result<(), TokenizerError> {
        if self.contract_label.is_empty() {
            return Err(TokenizerError::InvalidParameters(
                "contract label is empty".to_string(),
            ));
        }
        self.admin_registry()?;
        ContentAddress::parse(&self.token.metadata_cid)?;
        self.token.create_params().validate()
    }
}

//! Authorization policy: decides whether a transaction's signer set may run
//! an operation of a given class.

use crate::error::TokenizerError;
use crate::id::AccountId;
use crate::objects::AdminRegistry;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Authorization class of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationClass {
    /// A single admin signature suffices
    AdminOnly,
    /// M-of-N registry signatures are required
    Critical,
}

/// Every operation the contract exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    CreateUnit,
    Mint,
    Burn,
    AddToDenyList,
    RemoveFromDenyList,
    UpdateMetadataPointer,
    UpdateAdminRegistry,
    Transfer,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::CreateUnit => "create_unit",
            OperationKind::Mint => "mint",
            OperationKind::Burn => "burn",
            OperationKind::AddToDenyList => "add_to_deny_list",
            OperationKind::RemoveFromDenyList => "remove_from_deny_list",
            OperationKind::UpdateMetadataPointer => "update_metadata_pointer",
            OperationKind::UpdateAdminRegistry => "update_admin_registry",
            OperationKind::Transfer => "transfer",
        };
        f.write_str(name)
    }
}

/// Deployment-time choice of which operations are critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyProfile {
    /// Supply changes need one admin; pointer and registry updates need M-of-N
    #[default]
    Minimal,
    /// Supply changes also need M-of-N
    Hardened,
}

impl PolicyProfile {
    /// Fixed class of an operation under this profile.
    ///
    /// `None` for transfers, which are authorized by the sender's own
    /// signature rather than by the admin registry.
    pub fn classify(&self, kind: OperationKind) -> Option<OperationClass> {
        use OperationClass::*;
        use OperationKind::*;

        match (self, kind) {
            (_, Transfer) => None,
            (_, AddToDenyList | RemoveFromDenyList) => Some(AdminOnly),
            (_, UpdateMetadataPointer | UpdateAdminRegistry) => Some(Critical),
            (PolicyProfile::Minimal, CreateUnit | Mint | Burn) => Some(AdminOnly),
            (PolicyProfile::Hardened, CreateUnit | Mint | Burn) => Some(Critical),
        }
    }
}

/// Which registry members may satisfy an admin-only check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRule {
    /// Only the primary (first) registry entry
    #[default]
    PrimaryOnly,
    /// Any registry member
    AnyAdmin,
}

/// Successful authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub class: OperationClass,
    /// Registry members found in the signer set
    pub valid_signatures: usize,
}

/// Pure decision function over the current admin registry
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationPolicy<'a> {
    registry: &'a AdminRegistry,
    rule: AdminRule,
}

impl<'a> AuthorizationPolicy<'a> {
    pub fn new(registry: &'a AdminRegistry, rule: AdminRule) -> Self {
        Self { registry, rule }
    }

    /// Check a signer set against an operation class
    ///
    /// # Parameters
    /// * `class` - The operation's fixed class
    /// * `signers` - Identities that signed the transaction, at least one
    ///
    /// # Returns
    /// The decision, or `Unauthorized` / `InsufficientSignatures`
    pub fn authorize(
        &self,
        class: OperationClass,
        signers: &BTreeSet<AccountId>,
    ) -> Result<Decision, TokenizerError> {
        let valid_signatures = self.registry.count_members(signers);

        let allowed = match class {
            OperationClass::AdminOnly => match self.rule {
                AdminRule::PrimaryOnly => signers.contains(self.registry.primary()),
                AdminRule::AnyAdmin => valid_signatures > 0,
            },
            OperationClass::Critical => {
                valid_signatures >= self.registry.threshold() as usize
            }
        };

        debug!(
            "authorize {:?}: {} of {} signers are admins, threshold {}, allowed={}",
            class,
            valid_signatures,
            signers.len(),
            self.registry.threshold(),
            allowed
        );

        if allowed {
            return Ok(Decision {
                class,
                valid_signatures,
            });
        }

        match class {
            OperationClass::AdminOnly => Err(TokenizerError::Unauthorized {
                // Prefer naming a signer outside the registry
                signer: signers
                    .iter()
                    .find(|s| !self.registry.contains(s))
                    .or_else(|| signers.iter().next())
                    .copied()
                    .unwrap_or_default(),
            }),
            OperationClass::Critical => Err(TokenizerError::InsufficientSignatures {
                present: valid_signatures,
                required: self.registry.threshold() as usize,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(labels: &[&str]) -> BTreeSet<AccountId> {
        labels.iter().map(|l| AccountId::from_label(l)).collect()
    }

    fn registry() -> AdminRegistry {
        AdminRegistry::new(
            vec![
                AccountId::from_label("A"),
                AccountId::from_label("B"),
                AccountId::from_label("C"),
            ],
            2,
        )
        .unwrap()
    }

    #[test]
    fn test_critical_threshold() {
        let registry = registry();
        let policy = AuthorizationPolicy::new(&registry, AdminRule::PrimaryOnly);

        let decision = policy
            .authorize(OperationClass::Critical, &ids(&["A", "B"]))
            .unwrap();
        assert_eq!(decision.valid_signatures, 2);

        assert!(policy.authorize(OperationClass::Critical, &ids(&["B", "C"])).is_ok());

        match policy.authorize(OperationClass::Critical, &ids(&["A"])) {
            Err(TokenizerError::InsufficientSignatures { present, required }) => {
                assert_eq!(present, 1);
                assert_eq!(required, 2);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_outsiders_do_not_count() {
        let registry = registry();
        let policy = AuthorizationPolicy::new(&registry, AdminRule::PrimaryOnly);

        match policy.authorize(OperationClass::Critical, &ids(&["A", "X", "Y", "Z"])) {
            Err(TokenizerError::InsufficientSignatures { present, .. }) => assert_eq!(present, 1),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_admin_only_primary_rule() {
        let registry = registry();
        let policy = AuthorizationPolicy::new(&registry, AdminRule::PrimaryOnly);

        assert!(policy.authorize(OperationClass::AdminOnly, &ids(&["A"])).is_ok());
        assert!(policy.authorize(OperationClass::AdminOnly, &ids(&["A", "X"])).is_ok());
        assert!(matches!(
            policy.authorize(OperationClass::AdminOnly, &ids(&["B"])),
            Err(TokenizerError::Unauthorized { .. })
        ));
        assert!(matches!(
            policy.authorize(OperationClass::AdminOnly, &ids(&["X"])),
            Err(TokenizerError::Unauthorized { signer }) if signer == AccountId::from_label("X")
        ));
    }

    #[test]
    fn test_admin_only_any_admin_rule() {
        let registry = registry();
        let policy = AuthorizationPolicy::new(&registry, AdminRule::AnyAdmin);

        assert!(policy.authorize(OperationClass::AdminOnly, &ids(&["C"])).is_ok());
        assert!(matches!(
            policy.authorize(OperationClass::AdminOnly, &ids(&["X"])),
            Err(TokenizerError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_profiles() {
        use OperationKind::*;

        for kind in [CreateUnit, Mint, Burn] {
            assert_eq!(PolicyProfile::Minimal.classify(kind), Some(OperationClass::AdminOnly));
            assert_eq!(PolicyProfile::Hardened.classify(kind), Some(OperationClass::Critical));
        }
        for profile in [PolicyProfile::Minimal, PolicyProfile::Hardened] {
            assert_eq!(profile.classify(UpdateMetadataPointer), Some(OperationClass::Critical));
            assert_eq!(profile.classify(UpdateAdminRegistry), Some(OperationClass::Critical));
            assert_eq!(profile.classify(AddToDenyList), Some(OperationClass::AdminOnly));
            assert_eq!(profile.classify(RemoveFromDenyList), Some(OperationClass::AdminOnly));
            assert_eq!(profile.classify(Transfer), None);
        }
    }
}

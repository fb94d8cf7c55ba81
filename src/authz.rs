//! Authorization core for owner/delegate actors.
//!
//! Vendors never pass through here; their capability is the link token plus
//! the OTP/Vendor-Secret pair, enforced in the vendor access engine.

use uuid::Uuid;

use crate::api::ApiError;
use crate::audit::ActorType;
use crate::model::{DocType, Permissions, Role, UserProfile};
use crate::store::{Store, StoreError};

/// Resolved access for a (user, vault) pair. Owners implicitly hold every doc
/// type; delegates hold the subset granted by their membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Owner,
    Delegate(Permissions),
}

impl Access {
    pub fn role(&self) -> Role {
        match self {
            Access::Owner => Role::Owner,
            Access::Delegate(_) => Role::Delegate,
        }
    }

    pub fn actor_type(&self) -> ActorType {
        match self {
            Access::Owner => ActorType::Owner,
            Access::Delegate(_) => ActorType::Delegate,
        }
    }

    pub fn allows_doc_type(&self, doc_type: DocType) -> bool {
        match self {
            Access::Owner => true,
            Access::Delegate(perms) => perms.allows(doc_type),
        }
    }
}

/// Resolve (vault, external user) to access, or `None` for strangers.
pub fn resolve(
    store: &dyn Store,
    vault_id: Uuid,
    external_user_id: &str,
) -> Result<Option<(UserProfile, Access)>, StoreError> {
    let Some(profile) = store.profile_by_external_id(external_user_id)? else {
        return Ok(None);
    };

    let Some(vault) = store.vault_by_id(vault_id)? else {
        return Ok(None);
    };

    if vault.owner_profile_id == profile.id {
        return Ok(Some((profile, Access::Owner)));
    }

    match store.membership(vault_id, profile.id)? {
        Some(membership) => Ok(Some((profile, Access::Delegate(membership.permissions)))),
        None => Ok(None),
    }
}

/// Resolve and enforce. With `role` set, an exact match is required: an owner
/// calling a delegate-only operation is denied, not silently downgraded.
pub fn require(
    store: &dyn Store,
    vault_id: Uuid,
    external_user_id: &str,
    role: Option<Role>,
) -> Result<(UserProfile, Access), ApiError> {
    let (profile, access) =
        resolve(store, vault_id, external_user_id)?.ok_or(ApiError::Forbidden)?;

    if let Some(required) = role {
        if access.role() != required {
            return Err(ApiError::Forbidden);
        }
    }
    Ok((profile, access))
}

/// True iff the resolved access lists the doc type.
pub fn can_access_doc_type(
    store: &dyn Store,
    vault_id: Uuid,
    external_user_id: &str,
    doc_type: DocType,
) -> Result<bool, StoreError> {
    Ok(resolve(store, vault_id, external_user_id)?
        .is_some_and(|(_, access)| access.allows_doc_type(doc_type)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::model::{TeamMembership, Vault};
    use crate::store::MemoryStore;

    fn seed_vault(store: &MemoryStore, owner_ext: &str) -> (Uuid, Uuid) {
        let owner = store.upsert_profile(owner_ext).unwrap();
        let vault = Vault {
            id: Uuid::new_v4(),
            owner_profile_id: owner.id,
            kdf_salt: [0u8; 16],
            kdf_params: KdfParams::for_tests(),
            created_at: 1,
            updated_at: 1,
        };
        store.insert_vault(vault.clone()).unwrap();
        (vault.id, owner.id)
    }

    #[test]
    fn owner_resolves_with_all_doc_types() {
        let store = MemoryStore::new();
        let (vault_id, _) = seed_vault(&store, "owner-1");

        let (_, access) = resolve(&store, vault_id, "owner-1").unwrap().unwrap();
        assert_eq!(access, Access::Owner);
        for doc_type in DocType::ALL {
            assert!(access.allows_doc_type(doc_type));
        }
    }

    #[test]
    fn delegate_resolves_with_granted_subset() {
        let store = MemoryStore::new();
        let (vault_id, _) = seed_vault(&store, "owner-1");
        let delegate = store.upsert_profile("delegate-1").unwrap();
        store
            .insert_membership(TeamMembership {
                vault_id,
                profile_id: delegate.id,
                role: Role::Delegate,
                permissions: Permissions {
                    allowed_doc_types: vec![DocType::Id],
                },
            })
            .unwrap();

        let (_, access) = resolve(&store, vault_id, "delegate-1").unwrap().unwrap();
        assert!(access.allows_doc_type(DocType::Id));
        assert!(!access.allows_doc_type(DocType::SourceOfWealth));
    }

    #[test]
    fn stranger_resolves_to_none_and_require_denies() {
        let store = MemoryStore::new();
        let (vault_id, _) = seed_vault(&store, "owner-1");
        store.upsert_profile("stranger").unwrap();

        assert!(resolve(&store, vault_id, "stranger").unwrap().is_none());
        let err = require(&store, vault_id, "stranger", None).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[test]
    fn doc_type_check_follows_resolved_access() {
        let store = MemoryStore::new();
        let (vault_id, _) = seed_vault(&store, "owner-1");
        let delegate = store.upsert_profile("delegate-1").unwrap();
        store
            .insert_membership(TeamMembership {
                vault_id,
                profile_id: delegate.id,
                role: Role::Delegate,
                permissions: Permissions {
                    allowed_doc_types: vec![DocType::ProofOfAddress],
                },
            })
            .unwrap();

        assert!(can_access_doc_type(&store, vault_id, "owner-1", DocType::SourceOfWealth).unwrap());
        assert!(
            can_access_doc_type(&store, vault_id, "delegate-1", DocType::ProofOfAddress).unwrap()
        );
        assert!(!can_access_doc_type(&store, vault_id, "delegate-1", DocType::Id).unwrap());
        assert!(!can_access_doc_type(&store, vault_id, "missing", DocType::Id).unwrap());
    }

    #[test]
    fn require_with_role_demands_exact_match() {
        let store = MemoryStore::new();
        let (vault_id, _) = seed_vault(&store, "owner-1");

        assert!(require(&store, vault_id, "owner-1", Some(Role::Owner)).is_ok());
        let err = require(&store, vault_id, "owner-1", Some(Role::Delegate)).unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }
}

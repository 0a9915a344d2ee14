//! Permission store: {resource, action, actor} → grant.
//!
//! Grants carry their own manager. The manager is the only actor that may
//! revoke or reassign a grant; creating one requires `CREATE_PERMISSIONS_ROLE`
//! over the resource or over the ACL itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{Address, KernelEvent, RoleId, CREATE_PERMISSIONS_ROLE};
use crate::errors::KernelError;

/// Read-only authorization query consulted before every gated mutation.
pub trait PermissionOracle {
    fn has_permission(&self, resource: Address, action: RoleId, actor: Address) -> bool;
}

/// An authorization record binding an actor to an action on a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Grant {
    pub resource: Address,
    pub action: RoleId,
    pub actor: Address,
    pub manager: Address,
}

impl Grant {
    pub fn key(&self) -> PermissionKey {
        PermissionKey {
            resource: self.resource,
            action: self.action,
            actor: self.actor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PermissionKey {
    pub resource: Address,
    pub action: RoleId,
    pub actor: Address,
}

/// The ACL. Serialized as a flat, sorted list of grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AclRepr", into = "AclRepr")]
pub struct PermissionStore {
    acl: Option<Address>,
    grants: BTreeMap<PermissionKey, Grant>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct AclRepr {
    acl: Option<Address>,
    grants: Vec<Grant>,
}

impl TryFrom<AclRepr> for PermissionStore {
    type Error = String;

    fn try_from(repr: AclRepr) -> Result<Self, Self::Error> {
        let mut grants = BTreeMap::new();
        for g in repr.grants {
            let key = g.key();
            if grants.insert(key, g).is_some() {
                return Err(format!(
                    "duplicate grant for ({}, {}, {})",
                    key.resource, key.action, key.actor
                ));
            }
        }
        Ok(Self {
            acl: repr.acl,
            grants,
        })
    }
}

impl From<PermissionStore> for AclRepr {
    fn from(store: PermissionStore) -> Self {
        Self {
            acl: store.acl,
            grants: store.grants.into_values().collect(),
        }
    }
}

impl PermissionOracle for PermissionStore {
    fn has_permission(&self, resource: Address, action: RoleId, actor: Address) -> bool {
        self.grants.contains_key(&PermissionKey {
            resource,
            action,
            actor,
        })
    }
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address of the ACL resource, once bootstrapped.
    pub fn acl_address(&self) -> Option<Address> {
        self.acl
    }

    /// One-time bootstrap: `root` receives `CREATE_PERMISSIONS_ROLE` on the
    /// ACL and manages that grant.
    pub fn initialize(
        &mut self,
        acl: Address,
        root: Address,
    ) -> Result<Vec<KernelEvent>, KernelError> {
        if self.acl.is_some() {
            return Err(KernelError::AlreadyInitialized);
        }
        if root.is_zero() {
            return Err(KernelError::InvalidManager);
        }
        self.acl = Some(acl);
        Ok(self.insert(Grant {
            resource: acl,
            action: CREATE_PERMISSIONS_ROLE,
            actor: root,
            manager: root,
        }))
    }

    /// May `caller` create grants over `resource`?
    pub fn can_create_permissions(&self, caller: Address, resource: Address) -> bool {
        self.has_permission(resource, CREATE_PERMISSIONS_ROLE, caller)
            || self
                .acl
                .is_some_and(|acl| self.has_permission(acl, CREATE_PERMISSIONS_ROLE, caller))
    }

    /// Create (or re-confirm) a grant.
    ///
    /// A re-grant with the same manager is a no-op. Changing the manager of a
    /// live grant requires `caller` to be its current manager.
    pub fn grant(
        &mut self,
        caller: Address,
        resource: Address,
        action: RoleId,
        actor: Address,
        manager: Address,
    ) -> Result<Vec<KernelEvent>, KernelError> {
        if !self.can_create_permissions(caller, resource) {
            return Err(KernelError::Unauthorized {
                resource,
                action: CREATE_PERMISSIONS_ROLE,
                actor: caller,
            });
        }
        if manager.is_zero() {
            return Err(KernelError::InvalidManager);
        }

        let key = PermissionKey {
            resource,
            action,
            actor,
        };
        match self.grants.get(&key) {
            Some(existing) if existing.manager == manager => Ok(Vec::new()),
            Some(existing) => {
                if existing.manager != caller {
                    return Err(KernelError::Unauthorized {
                        resource,
                        action,
                        actor: caller,
                    });
                }
                self.set_manager(caller, resource, action, actor, manager)
            }
            None => Ok(self.insert(Grant {
                resource,
                action,
                actor,
                manager,
            })),
        }
    }

    /// Remove a grant. Only its manager may do this.
    pub fn revoke(
        &mut self,
        caller: Address,
        resource: Address,
        action: RoleId,
        actor: Address,
    ) -> Result<Vec<KernelEvent>, KernelError> {
        let key = PermissionKey {
            resource,
            action,
            actor,
        };
        self.require_manager(&key, caller)?;
        self.grants.remove(&key);
        Ok(vec![KernelEvent::SetPermission {
            resource,
            action,
            actor,
            allowed: false,
        }])
    }

    /// Reassign the manager of a live grant. Only the current manager may.
    pub fn set_manager(
        &mut self,
        caller: Address,
        resource: Address,
        action: RoleId,
        actor: Address,
        new_manager: Address,
    ) -> Result<Vec<KernelEvent>, KernelError> {
        if new_manager.is_zero() {
            return Err(KernelError::InvalidManager);
        }
        let key = PermissionKey {
            resource,
            action,
            actor,
        };
        self.require_manager(&key, caller)?;
        if let Some(grant) = self.grants.get_mut(&key) {
            grant.manager = new_manager;
        }
        Ok(vec![KernelEvent::ChangePermissionManager {
            resource,
            action,
            actor,
            manager: new_manager,
        }])
    }

    pub fn manager_of(&self, resource: Address, action: RoleId, actor: Address) -> Option<Address> {
        self.grants
            .get(&PermissionKey {
                resource,
                action,
                actor,
            })
            .map(|g| g.manager)
    }

    /// All live grants in key order.
    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.values()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&PermissionKey, &Grant)> {
        self.grants.iter()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    fn require_manager(&self, key: &PermissionKey, caller: Address) -> Result<(), KernelError> {
        match self.grants.get(key) {
            Some(g) if g.manager == caller => Ok(()),
            _ => Err(KernelError::Unauthorized {
                resource: key.resource,
                action: key.action,
                actor: caller,
            }),
        }
    }

    fn insert(&mut self, grant: Grant) -> Vec<KernelEvent> {
        let events = vec![
            KernelEvent::SetPermission {
                resource: grant.resource,
                action: grant.action,
                actor: grant.actor,
                allowed: true,
            },
            KernelEvent::ChangePermissionManager {
                resource: grant.resource,
                action: grant.action,
                actor: grant.actor,
                manager: grant.manager,
            },
        ];
        self.grants.insert(grant.key(), grant);
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bytes32, APP_MANAGER_ROLE};
    use proptest::prelude::*;

    const ACL: Address = Address::from_low_u64(0xac1);
    const KERNEL: Address = Address::from_low_u64(0xda0);
    const ROOT: Address = Address::from_low_u64(1);
    const ALICE: Address = Address::from_low_u64(2);
    const BOB: Address = Address::from_low_u64(3);

    fn bootstrapped() -> PermissionStore {
        let mut store = PermissionStore::new();
        store.initialize(ACL, ROOT).unwrap();
        store
    }

    #[test]
    fn initialize_grants_root_create_permissions_once() {
        let mut store = bootstrapped();
        assert!(store.has_permission(ACL, CREATE_PERMISSIONS_ROLE, ROOT));
        assert_eq!(store.manager_of(ACL, CREATE_PERMISSIONS_ROLE, ROOT), Some(ROOT));
        assert_eq!(
            store.initialize(ACL, ALICE).unwrap_err(),
            KernelError::AlreadyInitialized
        );
    }

    #[test]
    fn grant_requires_create_permissions() {
        let mut store = bootstrapped();
        let err = store
            .grant(ALICE, KERNEL, APP_MANAGER_ROLE, ALICE, ALICE)
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert!(!store.has_permission(KERNEL, APP_MANAGER_ROLE, ALICE));

        let events = store
            .grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, ROOT)
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(store.has_permission(KERNEL, APP_MANAGER_ROLE, ALICE));
    }

    #[test]
    fn create_permissions_scoped_to_resource_is_enough() {
        let mut store = bootstrapped();
        store
            .grant(ROOT, KERNEL, CREATE_PERMISSIONS_ROLE, ALICE, ROOT)
            .unwrap();
        store
            .grant(ALICE, KERNEL, APP_MANAGER_ROLE, BOB, ALICE)
            .unwrap();
        assert!(store.has_permission(KERNEL, APP_MANAGER_ROLE, BOB));
        // Not over other resources.
        assert!(store
            .grant(ALICE, ACL, APP_MANAGER_ROLE, BOB, ALICE)
            .is_err());
    }

    #[test]
    fn regrant_same_manager_is_noop() {
        let mut store = bootstrapped();
        store.grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, ROOT).unwrap();
        let events = store.grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, ROOT).unwrap();
        assert!(events.is_empty());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn regrant_with_new_manager_needs_current_manager() {
        let mut store = bootstrapped();
        store.grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, BOB).unwrap();

        // ROOT can create permissions but does not manage this grant.
        let err = store
            .grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, ROOT)
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        assert_eq!(store.manager_of(KERNEL, APP_MANAGER_ROLE, ALICE), Some(BOB));
    }

    #[test]
    fn only_manager_revokes() {
        let mut store = bootstrapped();
        store.grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, BOB).unwrap();
        assert!(store.revoke(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE).is_err());
        assert!(store.has_permission(KERNEL, APP_MANAGER_ROLE, ALICE));
        store.revoke(BOB, KERNEL, APP_MANAGER_ROLE, ALICE).unwrap();
        assert!(!store.has_permission(KERNEL, APP_MANAGER_ROLE, ALICE));
    }

    #[test]
    fn revoke_missing_grant_is_unauthorized() {
        let mut store = bootstrapped();
        assert_eq!(
            store.revoke(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE).unwrap_err().kind(),
            "unauthorized"
        );
    }

    #[test]
    fn set_manager_transfers_authority() {
        let mut store = bootstrapped();
        store.grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, ROOT).unwrap();
        store
            .set_manager(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, BOB)
            .unwrap();
        assert!(store.revoke(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE).is_err());
        assert!(store.revoke(BOB, KERNEL, APP_MANAGER_ROLE, ALICE).is_ok());
    }

    #[test]
    fn zero_manager_rejected() {
        let mut store = bootstrapped();
        assert_eq!(
            store
                .grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, Address::ZERO)
                .unwrap_err(),
            KernelError::InvalidManager
        );
    }

    #[test]
    fn serde_rejects_duplicate_grants() {
        let mut store = bootstrapped();
        store.grant(ROOT, KERNEL, APP_MANAGER_ROLE, ALICE, ROOT).unwrap();
        let mut value = serde_json::to_value(&store).unwrap();
        let first = value["grants"][0].clone();
        value["grants"].as_array_mut().unwrap().push(first);
        assert!(serde_json::from_value::<PermissionStore>(value).is_err());
    }

    fn arb_address() -> impl Strategy<Value = Address> {
        (1u64..64).prop_map(Address::from_low_u64)
    }

    fn arb_role() -> impl Strategy<Value = RoleId> {
        prop::sample::select(vec![
            APP_MANAGER_ROLE,
            Bytes32::label("TRANSFER_ROLE"),
            Bytes32::label("MINT_ROLE"),
        ])
    }

    proptest! {
        /// Property: no grant means no permission, and grant-then-revoke
        /// restores the original answer.
        #[test]
        fn prop_grant_then_revoke_restores(
            resource in arb_address(),
            action in arb_role(),
            actor in arb_address(),
            manager in arb_address(),
        ) {
            let mut store = bootstrapped();
            prop_assert!(!store.has_permission(resource, action, actor));

            store.grant(ROOT, resource, action, actor, manager).unwrap();
            prop_assert!(store.has_permission(resource, action, actor));
            store.revoke(manager, resource, action, actor).unwrap();
            prop_assert!(!store.has_permission(resource, action, actor));
        }
    }
}

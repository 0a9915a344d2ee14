//! App registry: (namespace, app id) → implementation address.
//!
//! Every mutation is gated by `APP_MANAGER_ROLE` on the kernel resource,
//! checked through an injected `PermissionOracle`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::acl::PermissionOracle;
use crate::domain::{
    Address, AppId, KernelEvent, Namespace, APP_ADDR_NAMESPACE, APP_MANAGER_ROLE,
};
use crate::errors::KernelError;

/// One registry slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryEntry {
    pub namespace: Namespace,
    pub app_id: AppId,
    pub implementation: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RegistryRepr", into = "RegistryRepr")]
pub struct Registry {
    /// Resource identity checked against the ACL (the kernel proxy address).
    kernel: Address,
    entries: BTreeMap<(Namespace, AppId), Address>,
    default_vault: Option<AppId>,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RegistryRepr {
    kernel: Address,
    entries: Vec<RegistryEntry>,
    default_vault: Option<AppId>,
}

impl TryFrom<RegistryRepr> for Registry {
    type Error = String;

    fn try_from(repr: RegistryRepr) -> Result<Self, Self::Error> {
        let mut entries = BTreeMap::new();
        for e in repr.entries {
            if entries
                .insert((e.namespace, e.app_id), e.implementation)
                .is_some()
            {
                return Err(format!(
                    "duplicate registry entry ({}, {})",
                    e.namespace, e.app_id
                ));
            }
        }
        Ok(Self {
            kernel: repr.kernel,
            entries,
            default_vault: repr.default_vault,
        })
    }
}

impl From<Registry> for RegistryRepr {
    fn from(reg: Registry) -> Self {
        Self {
            kernel: reg.kernel,
            entries: reg
                .entries
                .into_iter()
                .map(|((namespace, app_id), implementation)| RegistryEntry {
                    namespace,
                    app_id,
                    implementation,
                })
                .collect(),
            default_vault: reg.default_vault,
        }
    }
}

impl Registry {
    pub fn new(kernel: Address) -> Self {
        Self {
            kernel,
            ..Default::default()
        }
    }

    /// The resource identity that `APP_MANAGER_ROLE` is scoped to.
    pub fn kernel(&self) -> Address {
        self.kernel
    }

    /// Overwrite an entry. Writing the null address clears it.
    pub fn set_entry<P: PermissionOracle + ?Sized>(
        &mut self,
        acl: &P,
        caller: Address,
        namespace: Namespace,
        app_id: AppId,
        implementation: Address,
    ) -> Result<KernelEvent, KernelError> {
        self.authorize(acl, caller)?;
        self.write_entry(namespace, app_id, implementation);
        Ok(KernelEvent::SetApp {
            namespace,
            app_id,
            implementation,
        })
    }

    /// Lookup. `None` means "no implementation", never an error.
    pub fn get_entry(&self, namespace: Namespace, app_id: AppId) -> Option<Address> {
        self.entries.get(&(namespace, app_id)).copied()
    }

    /// Point recovery at an app instance. Existence is checked at recovery
    /// time, not here.
    pub fn set_default_vault<P: PermissionOracle + ?Sized>(
        &mut self,
        acl: &P,
        caller: Address,
        app_id: Option<AppId>,
    ) -> Result<KernelEvent, KernelError> {
        self.authorize(acl, caller)?;
        self.default_vault = app_id;
        Ok(KernelEvent::SetDefaultVault { app_id })
    }

    pub fn default_vault_id(&self) -> Option<AppId> {
        self.default_vault
    }

    /// Pointer → app-instance entry. `None` if either is unset.
    pub fn resolve_default_vault(&self) -> Option<Address> {
        self.default_vault
            .and_then(|id| self.get_entry(APP_ADDR_NAMESPACE, id))
    }

    pub fn entries(&self) -> impl Iterator<Item = RegistryEntry> + '_ {
        self.entries
            .iter()
            .map(|(&(namespace, app_id), &implementation)| RegistryEntry {
                namespace,
                app_id,
                implementation,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ungated write used by bootstrap only.
    pub(crate) fn write_entry(&mut self, namespace: Namespace, app_id: AppId, implementation: Address) {
        if implementation.is_zero() {
            self.entries.remove(&(namespace, app_id));
        } else {
            self.entries.insert((namespace, app_id), implementation);
        }
    }

    fn authorize<P: PermissionOracle + ?Sized>(
        &self,
        acl: &P,
        caller: Address,
    ) -> Result<(), KernelError> {
        if acl.has_permission(self.kernel, APP_MANAGER_ROLE, caller) {
            Ok(())
        } else {
            Err(KernelError::Unauthorized {
                resource: self.kernel,
                action: APP_MANAGER_ROLE,
                actor: caller,
            })
        }
    }
}

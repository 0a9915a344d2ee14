//! Application code behind proxies.
//!
//! State only records *which* artifact lives at a code address. The
//! `CodeLibrary` maps artifact names to operation tables (`AppLogic`), and a
//! forwarded call composes one of those tables with the proxy's own storage
//! and balances through a `CallContext`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::{Address, Amount, AppId, KernelEvent, Namespace, ETH};
use crate::errors::KernelError;
use crate::ledger::{AssetLedger, Ledger};
use crate::registry::Registry;

/// Failure raised by application code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    /// Application-level revert with a reason.
    #[error("{0}")]
    Revert(String),
    /// A kernel operation performed on the app's behalf failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

impl AppError {
    pub fn revert(reason: impl Into<String>) -> Self {
        AppError::Revert(reason.into())
    }
}

impl From<AppError> for KernelError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Revert(reason) => KernelError::CallReverted(reason),
            AppError::Kernel(inner) => inner,
        }
    }
}

/// Operation table of one code artifact.
pub trait AppLogic: Send + Sync {
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        method: &str,
        args: &Value,
    ) -> Result<Value, AppError>;

    /// Whether a recovery sweep may move `asset` out of a proxy running this code.
    fn allow_recoverability(&self, _asset: Address) -> bool {
        true
    }
}

/// Execution context of a forwarded call: the code runs as the proxy.
pub struct CallContext<'a> {
    proxy: Address,
    sender: Address,
    value: Amount,
    registry: &'a Registry,
    storage: &'a mut BTreeMap<String, Value>,
    ledger: &'a mut Ledger,
    events: &'a mut Vec<KernelEvent>,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(
        proxy: Address,
        sender: Address,
        value: Amount,
        registry: &'a Registry,
        storage: &'a mut BTreeMap<String, Value>,
        ledger: &'a mut Ledger,
        events: &'a mut Vec<KernelEvent>,
    ) -> Self {
        Self {
            proxy,
            sender,
            value,
            registry,
            storage,
            ledger,
            events,
        }
    }

    /// Address the code runs as.
    pub fn address(&self) -> Address {
        self.proxy
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    /// Native value attached to this call (already credited to the proxy).
    pub fn value(&self) -> Amount {
        self.value
    }

    pub fn registry(&self) -> &Registry {
        self.registry
    }

    pub fn load(&self, key: &str) -> Option<&Value> {
        self.storage.get(key)
    }

    pub fn store(&mut self, key: impl Into<String>, value: Value) {
        self.storage.insert(key.into(), value);
    }

    /// The proxy's own balance of `asset`.
    pub fn balance(&self, asset: Address) -> Amount {
        self.ledger.balance_of(self.proxy, asset)
    }

    /// Move funds out of the proxy.
    pub fn transfer(&mut self, to: Address, asset: Address, amount: Amount) -> Result<(), AppError> {
        let event = self.ledger.transfer(self.proxy, to, asset, amount)?;
        self.events.push(event);
        Ok(())
    }
}

/// Artifact name → operation table.
#[derive(Clone, Default)]
pub struct CodeLibrary {
    artifacts: BTreeMap<String, Arc<dyn AppLogic>>,
}

impl fmt::Debug for CodeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.artifacts.keys()).finish()
    }
}

impl CodeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with the reference artifacts: `kernel`, `vault`, `app_stub`
    /// and `app_stub_v2`.
    pub fn builtin() -> Self {
        let mut lib = Self::new();
        lib.register(KERNEL_ARTIFACT, KernelBase);
        lib.register("vault", Vault);
        lib.register("app_stub", AppStub { version: 1 });
        lib.register("app_stub_v2", AppStub { version: 2 });
        lib
    }

    pub fn register(&mut self, name: impl Into<String>, logic: impl AppLogic + 'static) {
        self.artifacts.insert(name.into(), Arc::new(logic));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AppLogic>> {
        self.artifacts.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.artifacts.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.artifacts.keys().map(String::as_str)
    }
}

/// Artifact deployed as the kernel proxy's fixed implementation.
pub const KERNEL_ARTIFACT: &str = "kernel";

fn parse_args<T: DeserializeOwned>(method: &str, args: &Value) -> Result<T, AppError> {
    serde_json::from_value(args.clone())
        .map_err(|e| AppError::revert(format!("{}: bad arguments: {}", method, e)))
}

fn unknown_method(method: &str) -> AppError {
    AppError::revert(format!("unknown method {:?}", method))
}

// ---------------------------------------------------------------------------
// Reference artifacts
// ---------------------------------------------------------------------------

/// Read-only views of the registry, served through the kernel proxy.
pub struct KernelBase;

impl AppLogic for KernelBase {
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        method: &str,
        args: &Value,
    ) -> Result<Value, AppError> {
        #[derive(Deserialize)]
        struct GetApp {
            namespace: Namespace,
            app_id: AppId,
        }

        let reg = ctx.registry();
        match method {
            "kernel" => Ok(json!(reg.kernel())),
            "get_app" => {
                let a: GetApp = parse_args(method, args)?;
                Ok(json!(reg.get_entry(a.namespace, a.app_id)))
            }
            "default_vault_id" => Ok(json!(reg.default_vault_id())),
            "resolve_default_vault" => Ok(json!(reg.resolve_default_vault())),
            _ => Err(unknown_method(method)),
        }
    }
}

/// Custodial sink. Accepts anything and never lets recovery sweep it.
pub struct Vault;

impl AppLogic for Vault {
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        method: &str,
        args: &Value,
    ) -> Result<Value, AppError> {
        #[derive(Deserialize)]
        struct Balance {
            asset: Address,
        }

        match method {
            "deposit" => Ok(json!(ctx.value())),
            "balance" => {
                let a: Balance = parse_args(method, args)?;
                Ok(json!(ctx.balance(a.asset)))
            }
            _ => Err(unknown_method(method)),
        }
    }

    fn allow_recoverability(&self, _asset: Address) -> bool {
        false
    }
}

/// Minimal stateful app used to exercise forwarding and upgrades.
pub struct AppStub {
    pub version: u64,
}

impl AppLogic for AppStub {
    fn invoke(
        &self,
        ctx: &mut CallContext<'_>,
        method: &str,
        args: &Value,
    ) -> Result<Value, AppError> {
        #[derive(Deserialize)]
        struct Set {
            key: String,
            value: Value,
        }
        #[derive(Deserialize)]
        struct Get {
            key: String,
        }
        #[derive(Deserialize)]
        struct Withdraw {
            to: Address,
            amount: Amount,
        }

        match method {
            "initialize" => {
                if ctx.load("initialized").is_some() {
                    return Err(AppError::revert("already initialized"));
                }
                ctx.store("initialized", json!(true));
                Ok(Value::Null)
            }
            "version" => Ok(json!(self.version)),
            "set" => {
                let a: Set = parse_args(method, args)?;
                ctx.store(a.key, a.value);
                Ok(Value::Null)
            }
            "get" => {
                let a: Get = parse_args(method, args)?;
                Ok(ctx.load(&a.key).cloned().unwrap_or(Value::Null))
            }
            "withdraw" => {
                let a: Withdraw = parse_args(method, args)?;
                ctx.transfer(a.to, ETH, a.amount)?;
                Ok(Value::Null)
            }
            "deposit_then_fail" => {
                ctx.store("touched", json!(true));
                Err(AppError::revert("deposit rejected"))
            }
            _ => Err(unknown_method(method)),
        }
    }
}

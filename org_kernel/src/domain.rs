//! OrgKernel v1 — Core Domain Types
//!
//! Pure data. No behaviour, no transition logic.
//! Amounts are unsigned 64-bit integers. No float.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Token and native-currency amounts.
pub type Amount = u64;

// ── Identities ─────────────────────────────────────────────────────

/// A 20-byte identity: actors, resources, proxies, code and tokens.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Null sentinel. Also the asset reference for native currency.
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Test/fixture helper: an address whose last byte is `n`.
    pub const fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        let be = n.to_be_bytes();
        let mut i = 0;
        while i < 8 {
            bytes[12 + i] = be[i];
            i += 1;
        }
        Address(bytes)
    }
}

/// A 32-byte fixed-width key: roles, namespaces and app identifiers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Bytes32(pub [u8; 32]);

impl Bytes32 {
    pub const ZERO: Bytes32 = Bytes32([0u8; 32]);

    /// Pack an ASCII label (at most 32 bytes) into a key, right-padded with zeros.
    ///
    /// This is a constant constructor for well-known identifiers, not a
    /// name hash.
    pub const fn label(s: &str) -> Self {
        let src = s.as_bytes();
        assert!(src.len() <= 32, "label longer than 32 bytes");
        let mut bytes = [0u8; 32];
        let mut i = 0;
        while i < src.len() {
            bytes[i] = src[i];
            i += 1;
        }
        Bytes32(bytes)
    }
}

/// Action scoped to a resource.
pub type RoleId = Bytes32;
/// Registry keyspace partition.
pub type Namespace = Bytes32;
/// Opaque logical application identifier.
pub type AppId = Bytes32;

// ── Well-known constants ───────────────────────────────────────────

/// Asset reference denoting native currency in recovery and ledger calls.
pub const ETH: Address = Address::ZERO;

pub const APP_MANAGER_ROLE: RoleId = Bytes32::label("APP_MANAGER_ROLE");
pub const CREATE_PERMISSIONS_ROLE: RoleId = Bytes32::label("CREATE_PERMISSIONS_ROLE");

pub const CORE_NAMESPACE: Namespace = Bytes32::label("core");
pub const APP_BASES_NAMESPACE: Namespace = Bytes32::label("base");
pub const APP_ADDR_NAMESPACE: Namespace = Bytes32::label("app");

pub const KERNEL_APP_ID: AppId = Bytes32::label("kernel.aragonpm.eth");
pub const ACL_APP_ID: AppId = Bytes32::label("acl.aragonpm.eth");

// ── Hex formatting / parsing ───────────────────────────────────────

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

fn parse_hex<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.len() != N * 2 {
        return Err(format!(
            "expected {} hex digits, got {} in {:?}",
            N * 2,
            digits.len(),
            s
        ));
    }
    let mut out = [0u8; N];
    for (i, chunk) in digits.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).map_err(|e| e.to_string())?;
        out[i] = u8::from_str_radix(pair, 16)
            .map_err(|_| format!("invalid hex byte {:?} in {:?}", pair, s))?;
    }
    Ok(out)
}

macro_rules! hex_identity {
    ($ty:ident, $len:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_hex(f, &self.0)
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write_hex(f, &self.0)
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                parse_hex::<$len>(s).map($ty)
            }
        }

        impl TryFrom<&[u8]> for $ty {
            type Error = String;

            fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
                <[u8; $len]>::try_from(bytes).map($ty).map_err(|_| {
                    format!(
                        "{}: expected {} bytes, got {}",
                        stringify!($ty),
                        $len,
                        bytes.len()
                    )
                })
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_identity!(Address, 20);
hex_identity!(Bytes32, 32);

// ── Proxies ────────────────────────────────────────────────────────

/// How a proxy finds the implementation it forwards to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum ProxyKind {
    /// The kernel's own front. Implementation captured at construction.
    Kernel { implementation: Address },
    /// Re-resolves `(APP_BASES_NAMESPACE, app_id)` on every call.
    Upgradeable,
    /// App proxy whose base was captured at construction.
    Pinned { implementation: Address },
}

/// A stable-address front bound to one app identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyRecord {
    pub address: Address,
    pub app_id: AppId,
    pub kind: ProxyKind,
}

// ── Events and receipts ────────────────────────────────────────────

/// Observable side effects of committed transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", deny_unknown_fields)]
pub enum KernelEvent {
    SetPermission {
        resource: Address,
        action: RoleId,
        actor: Address,
        allowed: bool,
    },
    ChangePermissionManager {
        resource: Address,
        action: RoleId,
        actor: Address,
        manager: Address,
    },
    SetApp {
        namespace: Namespace,
        app_id: AppId,
        implementation: Address,
    },
    SetDefaultVault {
        app_id: Option<AppId>,
    },
    NewAppProxy {
        proxy: Address,
        app_id: AppId,
        pinned: bool,
    },
    CodeDeployed {
        address: Address,
        artifact: String,
    },
    TokenDeployed {
        token: Address,
        holder: Address,
        supply: Amount,
    },
    Transfer {
        asset: Address,
        from: Address,
        to: Address,
        amount: Amount,
    },
    RecoverToVault {
        proxy: Address,
        vault: Address,
        asset: Address,
        amount: Amount,
    },
}

/// Structured outcome of a committed transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Receipt {
    pub tx_type: String,
    pub sequence: u64,
    /// Address created by the transaction (code, proxy, token).
    pub created: Option<Address>,
    /// Return value of a forwarded call.
    pub output: Option<Value>,
    /// Amount moved by a recovery sweep.
    pub swept: Option<Amount>,
    pub events: Vec<KernelEvent>,
}

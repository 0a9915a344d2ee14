//! Balances of native currency and fungible tokens.
//!
//! The kernel treats this as an opaque collaborator with balance/transfer
//! semantics (`AssetLedger`). Native currency is addressed by the `ETH`
//! sentinel; any other asset reference names a deployed token.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::arithmetic::{checked_add, checked_sub};
use crate::domain::{Address, Amount, KernelEvent, ETH};
use crate::errors::KernelError;

/// Balance and transfer contract the proxies rely on.
pub trait AssetLedger {
    fn balance_of(&self, holder: Address, asset: Address) -> Amount;

    /// Move `amount` of `asset`. Either the whole move happens or nothing does.
    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        asset: Address,
        amount: Amount,
    ) -> Result<KernelEvent, KernelError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TokenRecord {
    pub supply: Amount,
    pub balances: BTreeMap<Address, Amount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Ledger {
    native: BTreeMap<Address, Amount>,
    native_supply: Amount,
    tokens: BTreeMap<Address, TokenRecord>,
    /// Addresses that reject native value (code without a payable entry).
    non_receivers: BTreeSet<Address>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint native currency at genesis.
    pub fn credit_genesis(&mut self, holder: Address, amount: Amount) -> Result<(), KernelError> {
        self.native_supply = checked_add(self.native_supply, amount)?;
        let bal = self.native.get(&holder).copied().unwrap_or(0);
        set_balance(&mut self.native, holder, checked_add(bal, amount)?);
        Ok(())
    }

    /// Register a token with its whole supply held by `holder`.
    pub fn deploy_token(
        &mut self,
        token: Address,
        holder: Address,
        supply: Amount,
    ) -> Result<KernelEvent, KernelError> {
        if token == ETH || self.tokens.contains_key(&token) {
            return Err(KernelError::TransferFailed {
                asset: token,
                from: Address::ZERO,
                to: holder,
                amount: supply,
                reason: "token address already in use".to_string(),
            });
        }
        let mut record = TokenRecord {
            supply,
            balances: BTreeMap::new(),
        };
        set_balance(&mut record.balances, holder, supply);
        self.tokens.insert(token, record);
        Ok(KernelEvent::TokenDeployed {
            token,
            holder,
            supply,
        })
    }

    pub fn mark_non_receiver(&mut self, address: Address) {
        self.non_receivers.insert(address);
    }

    pub fn can_receive_native(&self, address: Address) -> bool {
        !self.non_receivers.contains(&address)
    }

    pub fn native_supply(&self) -> Amount {
        self.native_supply
    }

    pub fn native_balances(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.native.iter()
    }

    pub fn tokens(&self) -> impl Iterator<Item = (&Address, &TokenRecord)> {
        self.tokens.iter()
    }

    pub fn is_token(&self, asset: Address) -> bool {
        self.tokens.contains_key(&asset)
    }

    pub fn non_receivers(&self) -> impl Iterator<Item = &Address> {
        self.non_receivers.iter()
    }
}

impl AssetLedger for Ledger {
    fn balance_of(&self, holder: Address, asset: Address) -> Amount {
        if asset == ETH {
            self.native.get(&holder).copied().unwrap_or(0)
        } else {
            self.tokens
                .get(&asset)
                .and_then(|t| t.balances.get(&holder).copied())
                .unwrap_or(0)
        }
    }

    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        asset: Address,
        amount: Amount,
    ) -> Result<KernelEvent, KernelError> {
        let fail = |reason: &str| KernelError::TransferFailed {
            asset,
            from,
            to,
            amount,
            reason: reason.to_string(),
        };

        let balances = if asset == ETH {
            if !self.can_receive_native(to) {
                return Err(fail("recipient cannot receive native value"));
            }
            &mut self.native
        } else {
            if to.is_zero() {
                return Err(fail("token transfer to the null address"));
            }
            match self.tokens.get_mut(&asset) {
                Some(t) => &mut t.balances,
                None => return Err(fail("unknown token")),
            }
        };

        let from_bal = balances.get(&from).copied().unwrap_or(0);
        let new_from = checked_sub(from_bal, amount).map_err(|_| fail("insufficient balance"))?;
        if from != to {
            let to_bal = balances.get(&to).copied().unwrap_or(0);
            let new_to = checked_add(to_bal, amount)?;
            set_balance(balances, from, new_from);
            set_balance(balances, to, new_to);
        }

        Ok(KernelEvent::Transfer {
            asset,
            from,
            to,
            amount,
        })
    }
}

/// Zero balances are not stored, so equal ledgers serialize identically.
fn set_balance(map: &mut BTreeMap<Address, Amount>, holder: Address, amount: Amount) {
    if amount == 0 {
        map.remove(&holder);
    } else {
        map.insert(holder, amount);
    }
}

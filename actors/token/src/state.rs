use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::serde_bytes;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_actors_runtime::{actor_error, ActorContext, ActorError, Map2, DEFAULT_HAMT_CONFIG};

pub type BalanceMap<BS> = Map2<BS, Address, TokenAmount>;
pub type ApprovalsMap<BS> = Map2<BS, Address, Cid>;
pub type AllowanceMap<BS> = Map2<BS, Address, TokenAmount>;

/// Token actor state.
/// The identity fields are fixed at construction; only the two map roots
/// change afterwards.
#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct State {
    /// Human readable name of the token.
    pub name: String,

    /// Ticker symbol for the token.
    pub symbol: String,

    /// Image data for the token icon.
    #[serde(with = "serde_bytes")]
    pub icon: Vec<u8>,

    /// Number of decimals represented by one token unit.
    pub decimals: u64,

    /// Total amount of token units in existence.
    pub total_supply: TokenAmount,

    /// Balance sheet for all token holders, keyed by ID address.
    pub balances: Cid, // HAMT[Address]TokenAmount

    /// Remaining transfer allowances, keyed by owner address, then by spender.
    /// The outer map holds the root of each owner's allowance table.
    pub approvals: Cid, // HAMT[Address]HAMT[Address]TokenAmount
}

impl State {
    /// Creates the initial state, with the entire supply held by `owner`.
    pub fn new<BS: Blockstore>(
        store: &BS,
        name: String,
        symbol: String,
        icon: Vec<u8>,
        decimals: u64,
        supply: TokenAmount,
        owner: Address,
    ) -> Result<State, ActorError> {
        let mut balances = BalanceMap::empty(store, DEFAULT_HAMT_CONFIG, "balances");
        balances.set(&owner, supply.clone()).context("failed to set initial balance")?;
        let balances = balances.flush().context("failed to create balances map")?;

        let approvals = ApprovalsMap::flush_empty(store, DEFAULT_HAMT_CONFIG)
            .context("failed to create approvals map")?;

        Ok(State { name, symbol, icon, decimals, total_supply: supply, balances, approvals })
    }

    /// Returns the balance held by an account, zero if the account has no entry.
    pub fn balance_of<BS: Blockstore>(
        &self,
        store: &BS,
        account: &Address,
    ) -> Result<TokenAmount, ActorError> {
        let balances = BalanceMap::load(store, &self.balances, DEFAULT_HAMT_CONFIG, "balances")?;
        Ok(balances.get(account)?.cloned().unwrap_or_default())
    }

    /// Moves value between two balance entries.
    /// The debit is applied and written back before the credit is read, so a
    /// transfer to self leaves the balance unchanged. Entries that reach zero
    /// are deleted.
    pub fn transfer<BS: Blockstore>(
        &mut self,
        store: &BS,
        from: &Address,
        to: &Address,
        value: &TokenAmount,
    ) -> Result<(), ActorError> {
        let mut balances = BalanceMap::load(store, &self.balances, DEFAULT_HAMT_CONFIG, "balances")?;

        let from_balance = balances.get(from)?.cloned().unwrap_or_default();
        if &from_balance < value {
            return Err(actor_error!(insufficient_funds;
                "{} has insufficient funds ({}) to transfer {} to {}", from, from_balance, value, to));
        }

        let new_from_balance = from_balance - value;
        if new_from_balance.is_zero() {
            balances.delete(from)?;
        } else {
            balances.set(from, new_from_balance)?;
        }

        let to_balance = balances.get(to)?.cloned().unwrap_or_default();
        balances.set(to, to_balance + value)?;

        self.balances = balances.flush()?;
        Ok(())
    }

    /// Adds to the allowance granted by `owner` to `spender` (cumulative),
    /// creating the owner's allowance table if it does not exist yet.
    pub fn approve<BS: Blockstore>(
        &mut self,
        store: &BS,
        owner: &Address,
        spender: &Address,
        value: &TokenAmount,
    ) -> Result<(), ActorError> {
        let mut approvals =
            ApprovalsMap::load(store, &self.approvals, DEFAULT_HAMT_CONFIG, "approvals")?;

        let mut allowances = match approvals.get(owner)? {
            Some(root) => AllowanceMap::load(store, root, DEFAULT_HAMT_CONFIG, "allowances")?,
            None => AllowanceMap::empty(store, DEFAULT_HAMT_CONFIG, "allowances"),
        };

        let allowance = allowances.get(spender)?.cloned().unwrap_or_default();
        allowances.set(spender, allowance + value)?;

        let allowance_root = allowances.flush()?;
        approvals.set(owner, allowance_root)?;
        self.approvals = approvals.flush()?;
        Ok(())
    }

    /// Returns the remaining allowance from `owner` to `spender`, zero when
    /// either the owner's table or the spender's entry is absent.
    pub fn allowance<BS: Blockstore>(
        &self,
        store: &BS,
        owner: &Address,
        spender: &Address,
    ) -> Result<TokenAmount, ActorError> {
        let approvals =
            ApprovalsMap::load(store, &self.approvals, DEFAULT_HAMT_CONFIG, "approvals")?;
        match approvals.get(owner)? {
            Some(root) => {
                let allowances = AllowanceMap::load(store, root, DEFAULT_HAMT_CONFIG, "allowances")?;
                Ok(allowances.get(spender)?.cloned().unwrap_or_default())
            }
            None => Ok(TokenAmount::zero()),
        }
    }

    /// Deducts value from the allowance `owner` granted to `spender`.
    /// An absent or short allowance is a forbidden error. A remainder of zero
    /// is deleted, and an emptied allowance table is removed from the outer map.
    pub fn deduct_allowance<BS: Blockstore>(
        &mut self,
        store: &BS,
        owner: &Address,
        spender: &Address,
        value: &TokenAmount,
    ) -> Result<(), ActorError> {
        let mut approvals =
            ApprovalsMap::load(store, &self.approvals, DEFAULT_HAMT_CONFIG, "approvals")?;

        let allowance_root = approvals.get(owner)?.cloned().ok_or_else(|| {
            actor_error!(forbidden;
                "insufficient allowance (0) for {} to transfer from {}", spender, owner)
        })?;
        let mut allowances =
            AllowanceMap::load(store, &allowance_root, DEFAULT_HAMT_CONFIG, "allowances")?;

        let allowance = allowances.get(spender)?.cloned().unwrap_or_default();
        if &allowance < value {
            return Err(actor_error!(forbidden;
                "insufficient allowance ({}) for {} to transfer {} from {}", allowance, spender, value, owner));
        }

        let remaining = allowance - value;
        if remaining.is_zero() {
            allowances.delete(spender)?;
        } else {
            allowances.set(spender, remaining)?;
        }

        if allowances.is_empty() {
            approvals.delete(owner)?;
        } else {
            let allowance_root = allowances.flush()?;
            approvals.set(owner, allowance_root)?;
        }
        self.approvals = approvals.flush()?;
        Ok(())
    }
}

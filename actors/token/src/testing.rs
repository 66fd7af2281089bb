use fvm_ipld_blockstore::Blockstore;
use fvm_shared::address::Protocol;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_actors_runtime::{MessageAccumulator, DEFAULT_HAMT_CONFIG};

use crate::state::{AllowanceMap, ApprovalsMap, BalanceMap};
use crate::State;

pub struct StateSummary {
    pub total_supply: TokenAmount,
    pub holder_count: u64,
    pub allowance_count: u64,
}

/// Checks internal invariants of token actor state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(state.total_supply.is_positive(), "total supply must be positive");

    let mut balance_sum = TokenAmount::zero();
    let mut holder_count = 0;
    match BalanceMap::load(store, &state.balances, DEFAULT_HAMT_CONFIG, "balances") {
        Ok(balances) => {
            let ret = balances.for_each(|holder, balance| {
                acc.require(
                    holder.protocol() == Protocol::ID,
                    format!("balance key {holder} must be an ID address"),
                );
                acc.require(
                    balance.is_positive(),
                    format!("balance {balance} for {holder} must be positive"),
                );
                balance_sum += balance;
                holder_count += 1;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating balances");
        }
        Err(e) => acc.add(format!("error loading balances: {e}")),
    }

    acc.require(
        balance_sum == state.total_supply,
        format!("sum of balances {} does not equal total supply {}", balance_sum, state.total_supply),
    );

    let mut allowance_count = 0;
    match ApprovalsMap::load(store, &state.approvals, DEFAULT_HAMT_CONFIG, "approvals") {
        Ok(approvals) => {
            let ret = approvals.for_each(|owner, allowances_root| {
                let acc = acc.with_prefix(format!("approvals for {owner}: "));
                acc.require(
                    owner.protocol() == Protocol::ID,
                    "approvals key must be an ID address",
                );
                match AllowanceMap::load(store, allowances_root, DEFAULT_HAMT_CONFIG, "allowances")
                {
                    Ok(allowances) => {
                        acc.require(!allowances.is_empty(), "allowance table must not be empty");
                        let ret = allowances.for_each(|spender, allowance| {
                            acc.require(
                                spender.protocol() == Protocol::ID,
                                format!("allowance key {spender} must be an ID address"),
                            );
                            acc.require(
                                allowance.is_positive(),
                                format!("allowance {allowance} for {spender} must be positive"),
                            );
                            allowance_count += 1;
                            Ok(())
                        });
                        acc.require_no_error(ret, "error iterating allowances");
                    }
                    Err(e) => acc.add(format!("error loading allowances: {e}")),
                }
                Ok(())
            });
            acc.require_no_error(ret, "error iterating approvals");
        }
        Err(e) => acc.add(format!("error loading approvals: {e}")),
    }

    (
        StateSummary { total_supply: state.total_supply.clone(), holder_count, allowance_count },
        acc,
    )
}

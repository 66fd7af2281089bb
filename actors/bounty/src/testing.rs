use fvm_ipld_blockstore::Blockstore;
use fvm_shared::econ::TokenAmount;
use num_traits::Zero;

use fil_actors_runtime::{MessageAccumulator, DEFAULT_HAMT_CONFIG};

use crate::state::PaidMap;
use crate::State;

pub struct StateSummary {
    pub remaining_bounties: u64,
    pub paid_deal_count: u64,
    pub total_paid: TokenAmount,
}

/// Checks internal invariants of bounty actor state.
pub fn check_state_invariants<BS: Blockstore>(
    state: &State,
    store: &BS,
) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(state.value.is_positive(), "bounty value must be positive");

    let mut paid_deal_count = 0;
    let mut total_paid = TokenAmount::zero();
    match PaidMap::load(store, &state.paid, DEFAULT_HAMT_CONFIG, "paid") {
        Ok(paid) => {
            let ret = paid.for_each(|deal_id, amount| {
                acc.require(
                    amount.is_positive(),
                    format!("amount {amount} paid for deal {deal_id} must be positive"),
                );
                paid_deal_count += 1;
                total_paid += amount;
                Ok(())
            });
            acc.require_no_error(ret, "error iterating paid deals");
        }
        Err(e) => acc.add(format!("error loading paid deals: {e}")),
    }

    (
        StateSummary { remaining_bounties: state.bounties, paid_deal_count, total_paid },
        acc,
    )
}

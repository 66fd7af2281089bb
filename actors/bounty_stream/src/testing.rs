use std::collections::BTreeSet;

use fvm_shared::address::Protocol;

use fil_actors_runtime::MessageAccumulator;

use crate::State;

pub struct StateSummary {
    pub active_deal_count: u64,
    pub max_active_deals: u64,
}

/// Checks internal invariants of bounty stream actor state.
pub fn check_state_invariants(state: &State) -> (StateSummary, MessageAccumulator) {
    let acc = MessageAccumulator::default();

    acc.require(state.value.is_positive(), "bounty value must be positive");
    acc.require(state.duration > 0, "bounty duration must be positive");
    acc.require(
        state.active_deals.len() as u64 <= state.max_active_deals,
        format!(
            "{} deals are tracked, more than the limit of {}",
            state.active_deals.len(),
            state.max_active_deals
        ),
    );

    let mut deal_ids = BTreeSet::new();
    for deal in &state.active_deals {
        let acc = acc.with_prefix(format!("deal {}: ", deal.deal_id));
        acc.require(deal_ids.insert(deal.deal_id), "deal is tracked more than once");
        acc.require(deal.client.protocol() == Protocol::ID, "client must be an ID address");
        acc.require(deal.last_paid >= 0, "last paid epoch must not be negative");
        acc.require(
            deal.last_paid <= deal.deal_end,
            format!("last paid epoch {} is after deal end {}", deal.last_paid, deal.deal_end),
        );
    }

    (
        StateSummary {
            active_deal_count: state.active_deals.len() as u64,
            max_active_deals: state.max_active_deals,
        },
        acc,
    )
}

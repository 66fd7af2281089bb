use cid::Cid;
use fvm_ipld_blockstore::Blockstore;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;

use fil_actors_runtime::{ActorContext, ActorError, Map2, DEFAULT_HAMT_CONFIG};

pub type PaidMap<BS> = Map2<BS, DealID, TokenAmount>;

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct State {
    /// Piece for which this actor pays the bounty.
    pub piece_cid: Cid,

    /// If present, the bounty is paid in this token rather than in native value.
    pub token: Option<Address>,

    /// If a token is present, bounties are paid from this account (the bounty
    /// actor must be approved as a spender there).
    pub from: Address,

    /// Amount paid per claimed deal.
    pub value: TokenAmount,

    /// Number of remaining bounties to pay.
    pub bounties: u64,

    /// Deals already paid, with the amount recorded for audit.
    pub paid: Cid, // HAMT[DealID]TokenAmount
}

impl State {
    pub fn new<BS: Blockstore>(
        store: &BS,
        piece_cid: Cid,
        token: Option<Address>,
        from: Address,
        value: TokenAmount,
        bounties: u64,
    ) -> Result<State, ActorError> {
        let paid = PaidMap::flush_empty(store, DEFAULT_HAMT_CONFIG)
            .context("failed to create paid map")?;
        Ok(State { piece_cid, token, from, value, bounties, paid })
    }

    /// Records a deal as paid at the current bounty value.
    /// Returns false without modifying state when the deal was already recorded.
    pub fn record_paid<BS: Blockstore>(
        &mut self,
        store: &BS,
        deal_id: DealID,
    ) -> Result<bool, ActorError> {
        let mut paid = PaidMap::load(store, &self.paid, DEFAULT_HAMT_CONFIG, "paid")?;
        if !paid.set_if_absent(&deal_id, self.value.clone())? {
            return Ok(false);
        }
        self.paid = paid.flush()?;
        Ok(true)
    }

    pub fn has_paid<BS: Blockstore>(&self, store: &BS, deal_id: DealID) -> Result<bool, ActorError> {
        let paid = PaidMap::load(store, &self.paid, DEFAULT_HAMT_CONFIG, "paid")?;
        paid.contains_key(&deal_id)
    }
}

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::bigint::BigInt;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug)]
pub struct State {
    /// Piece for which this actor pays the bounty.
    pub piece_cid: Cid,

    /// If present, the bounty is paid in this token rather than in native value.
    pub token: Option<Address>,

    /// If a token is present, bounties are paid from this account (the bounty
    /// actor must be approved as a spender there).
    pub from: Address,

    /// Total amount paid for a full duration of storage across all deal slots.
    pub value: TokenAmount,

    /// Amount of time covered by the bounty.
    pub duration: ChainEpoch,

    /// Maximum number of deals paid for concurrently.
    pub max_active_deals: u64,

    /// Tracked deals and the last epoch for which each has been paid.
    pub active_deals: Vec<DealBounty>,
}

#[derive(Serialize_tuple, Deserialize_tuple, Clone, Debug, PartialEq, Eq)]
pub struct DealBounty {
    pub deal_id: DealID,
    /// Deal client receiving the payments.
    pub client: Address,
    /// Last epoch for which the client has been paid.
    pub last_paid: ChainEpoch,
    /// Epoch at which the deal ends.
    pub deal_end: ChainEpoch,
}

impl State {
    pub fn new(
        piece_cid: Cid,
        token: Option<Address>,
        from: Address,
        value: TokenAmount,
        duration: ChainEpoch,
        max_active_deals: u64,
    ) -> State {
        State { piece_cid, token, from, value, duration, max_active_deals, active_deals: Vec::new() }
    }

    /// Payment accrued by one deal slot over `elapsed` epochs of active
    /// storage. The rate divides the total value across the full capacity
    /// (all slots for the whole duration); integer division truncates.
    pub fn prorated_payment(&self, elapsed: ChainEpoch) -> TokenAmount {
        let capacity = BigInt::from(self.max_active_deals) * BigInt::from(self.duration);
        TokenAmount::from_atto(self.value.atto() * elapsed / capacity)
    }
}

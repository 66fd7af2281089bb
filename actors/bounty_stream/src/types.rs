use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;

#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ConstructorParams {
    /// Piece for which the bounty is paid.
    pub piece_cid: Cid,
    /// Token in which the bounty is paid. Pays native value when absent.
    pub token: Option<Address>,
    /// Account token payments are drawn from.
    pub from: Address,
    /// Amount paid for a full duration of storage across all deal slots.
    pub value: TokenAmount,
    /// Amount of time covered by the bounty.
    pub duration: ChainEpoch,
    /// Maximum number of deals paid for concurrently.
    pub bounties: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ClaimParams {
    /// Deal to start tracking, in addition to settling all deals already
    /// tracked.
    pub new_deal_id: Option<DealID>,
}

use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
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
    /// Amount paid per claimed deal.
    pub value: TokenAmount,
    /// Number of deals the bounty pays for.
    pub bounties: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
pub struct ClaimParams {
    pub deal_id: DealID,
}

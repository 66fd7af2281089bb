use cid::Cid;
use fvm_ipld_encoding::tuple::*;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::piece::PaddedPieceSize;

pub mod market {
    use super::*;

    pub const GET_ACTIVE_DEALS_METHOD: u64 = 11;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct GetActiveDealsParams {
        pub deal_ids: Vec<DealID>,
    }

    /// Proposals and lifecycle states parallel to the queried deal ids.
    /// Either entry is null for deals the market no longer tracks.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct GetActiveDealsReturn {
        pub proposals: Vec<Option<DealProposal>>,
        pub states: Vec<Option<DealState>>,
    }

    /// Terms of a storage deal as recorded by the market actor.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct DealProposal {
        pub piece_cid: Cid,
        pub piece_size: PaddedPieceSize,
        pub verified_deal: bool,
        pub client: Address,
        pub provider: Address,
        pub label: String,
        pub start_epoch: ChainEpoch,
        pub end_epoch: ChainEpoch,
        pub storage_price_per_epoch: TokenAmount,
        pub provider_collateral: TokenAmount,
        pub client_collateral: TokenAmount,
    }

    /// Lifecycle state of a deal. A negative slash epoch means not slashed.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct DealState {
        pub sector_start_epoch: ChainEpoch,
        pub last_updated_epoch: ChainEpoch,
        pub slash_epoch: ChainEpoch,
    }
}

pub mod token {
    use super::*;

    pub const TRANSFER_FROM_METHOD: u64 = 10;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize_tuple, Deserialize_tuple)]
    pub struct TransferFromParams {
        pub from: Address,
        pub to: Address,
        pub value: TokenAmount,
    }
}

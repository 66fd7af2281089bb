// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fil_actor_bounty_stream::testing::check_state_invariants;
use fil_actor_bounty_stream::{
    ext, Actor as BountyStreamActor, ClaimParams, ConstructorParams, DealBounty, Method, State,
};
use fil_actors_runtime::test_utils::*;
use fil_actors_runtime::{ActorError, INIT_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR};
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::clock::ChainEpoch;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::piece::PaddedPieceSize;
use fvm_shared::{MethodNum, METHOD_SEND};

const BOUNTY_ACTOR_ID: u64 = 100;
const FOUNDER_ID: u64 = 101;
const TOKEN_ACTOR_ID: u64 = 102;
const CLIENT1_ID: u64 = 103;
const CLIENT2_ID: u64 = 104;
const PROVIDER_ID: u64 = 150;

const DURATION: ChainEpoch = 100;
const MAX_ACTIVE_DEALS: u64 = 2;

fn founder() -> Address {
    Address::new_id(FOUNDER_ID)
}

fn token_actor() -> Address {
    Address::new_id(TOKEN_ACTOR_ID)
}

fn client1() -> Address {
    Address::new_id(CLIENT1_ID)
}

fn client2() -> Address {
    Address::new_id(CLIENT2_ID)
}

fn piece() -> Cid {
    make_piece_cid(b"42")
}

fn bounty_value() -> TokenAmount {
    TokenAmount::from_atto(1_000_000)
}

/// Payment accrued by one deal over `elapsed` epochs, per the actor's rate.
fn prorated(elapsed: ChainEpoch) -> TokenAmount {
    TokenAmount::from_atto(1_000_000 * elapsed / (MAX_ACTIVE_DEALS as i64 * DURATION))
}

fn new_runtime() -> MockRuntime {
    let rt = MockRuntime { receiver: Address::new_id(BOUNTY_ACTOR_ID), ..Default::default() };
    rt.set_caller(*INIT_ACTOR_CODE_ID, INIT_ACTOR_ADDR);
    rt
}

fn token_params() -> ConstructorParams {
    ConstructorParams {
        piece_cid: piece(),
        token: Some(token_actor()),
        from: founder(),
        value: bounty_value(),
        duration: DURATION,
        bounties: MAX_ACTIVE_DEALS,
    }
}

fn construct_and_verify(rt: &MockRuntime, params: &ConstructorParams) {
    rt.set_caller(*INIT_ACTOR_CODE_ID, INIT_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
    let ret = rt
        .call::<BountyStreamActor>(
            Method::Constructor as MethodNum,
            IpldBlock::serialize_cbor(params).unwrap(),
        )
        .unwrap();
    expect_empty(ret);
    rt.verify();
}

fn deal_proposal(piece_cid: Cid, client: Address, deal_end: ChainEpoch) -> ext::market::DealProposal {
    ext::market::DealProposal {
        piece_cid,
        piece_size: PaddedPieceSize(1 << 32),
        verified_deal: false,
        client,
        provider: Address::new_id(PROVIDER_ID),
        label: "deal".to_string(),
        start_epoch: 0,
        end_epoch: deal_end,
        storage_price_per_epoch: TokenAmount::from_atto(1 << 20),
        provider_collateral: TokenAmount::from_atto(2_000_000),
        client_collateral: TokenAmount::from_atto(1_000_000),
    }
}

fn deal_state(slash_epoch: ChainEpoch) -> ext::market::DealState {
    ext::market::DealState { sector_start_epoch: 0, last_updated_epoch: -1, slash_epoch }
}

fn expect_get_deals(
    rt: &MockRuntime,
    deal_ids: Vec<DealID>,
    ret: &ext::market::GetActiveDealsReturn,
) {
    rt.expect_send_simple(
        STORAGE_MARKET_ACTOR_ADDR,
        ext::market::GET_ACTIVE_DEALS_METHOD,
        IpldBlock::serialize_cbor(&ext::market::GetActiveDealsParams { deal_ids }).unwrap(),
        TokenAmount::from_atto(0),
        IpldBlock::serialize_cbor(ret).unwrap(),
        ExitCode::OK,
    );
}

fn expect_token_payment(rt: &MockRuntime, to: Address, value: TokenAmount) {
    rt.expect_send_simple(
        token_actor(),
        ext::token::TRANSFER_FROM_METHOD,
        IpldBlock::serialize_cbor(&ext::token::TransferFromParams { from: founder(), to, value })
            .unwrap(),
        TokenAmount::from_atto(0),
        None,
        ExitCode::OK,
    );
}

fn claim(rt: &MockRuntime, new_deal_id: Option<DealID>) -> Result<(), ActorError> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, client1());
    rt.expect_validate_caller_any();
    let ret = rt.call::<BountyStreamActor>(
        Method::Claim as MethodNum,
        IpldBlock::serialize_cbor(&ClaimParams { new_deal_id }).unwrap(),
    )?;
    expect_empty(ret);
    rt.verify();
    Ok(())
}

/// Starts tracking a deal (no payment accrues for a deal added in the current
/// epoch).
fn add_deal(rt: &MockRuntime, existing: Vec<DealID>, deal_id: DealID, client: Address, deal_end: ChainEpoch) {
    let st: State = rt.get_state();
    let mut entries: Vec<(Option<ext::market::DealProposal>, Option<ext::market::DealState>)> = st
        .active_deals
        .iter()
        .map(|d| (Some(deal_proposal(piece(), d.client, d.deal_end)), Some(deal_state(-1))))
        .collect();
    entries.push((Some(deal_proposal(piece(), client, deal_end)), Some(deal_state(-1))));

    let mut deal_ids = existing;
    deal_ids.push(deal_id);
    expect_get_deals(
        rt,
        deal_ids,
        &ext::market::GetActiveDealsReturn {
            proposals: entries.iter().map(|e| e.0.clone()).collect(),
            states: entries.iter().map(|e| e.1.clone()).collect(),
        },
    );
    claim(rt, Some(deal_id)).unwrap();
}

fn check_state(rt: &MockRuntime) {
    let (_, acc) = check_state_invariants(&rt.get_state());
    acc.assert_empty();
}

mod construction {
    use super::*;

    #[test]
    fn constructs_with_token() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());

        let st: State = rt.get_state();
        assert_eq!(piece(), st.piece_cid);
        assert_eq!(Some(token_actor()), st.token);
        assert_eq!(founder(), st.from);
        assert_eq!(bounty_value(), st.value);
        assert_eq!(DURATION, st.duration);
        assert_eq!(MAX_ACTIVE_DEALS, st.max_active_deals);
        assert!(st.active_deals.is_empty());
        check_state(&rt);
    }

    #[test]
    fn constructs_with_native_escrow() {
        let rt = new_runtime();
        rt.set_balance(TokenAmount::from_atto(2_000_000));
        let params = ConstructorParams { token: None, ..token_params() };
        construct_and_verify(&rt, &params);
        check_state(&rt);
    }

    #[test]
    fn rejects_underfunded_native_escrow() {
        let rt = new_runtime();
        rt.set_balance(TokenAmount::from_atto(1_999_999));
        let params = ConstructorParams { token: None, ..token_params() };

        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "must cover total value of bounties",
            rt.call::<BountyStreamActor>(
                Method::Constructor as MethodNum,
                IpldBlock::serialize_cbor(&params).unwrap(),
            ),
        );
        rt.verify();
    }

    #[test]
    fn rejects_non_positive_value() {
        let rt = new_runtime();
        let params = ConstructorParams { value: TokenAmount::from_atto(0), ..token_params() };

        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "value greater than zero",
            rt.call::<BountyStreamActor>(
                Method::Constructor as MethodNum,
                IpldBlock::serialize_cbor(&params).unwrap(),
            ),
        );
        rt.verify();
    }

    #[test]
    fn rejects_non_positive_duration() {
        let rt = new_runtime();
        let params = ConstructorParams { duration: 0, ..token_params() };

        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "duration greater than zero",
            rt.call::<BountyStreamActor>(
                Method::Constructor as MethodNum,
                IpldBlock::serialize_cbor(&params).unwrap(),
            ),
        );
        rt.verify();
    }

    #[test]
    fn rejects_caller_other_than_init() {
        let rt = new_runtime();
        rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, founder());

        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        expect_abort(
            ExitCode::USR_FORBIDDEN,
            rt.call::<BountyStreamActor>(
                Method::Constructor as MethodNum,
                IpldBlock::serialize_cbor(&token_params()).unwrap(),
            ),
        );
        rt.verify();
    }
}

mod claim {
    use super::*;

    #[test]
    fn adds_first_deal_without_payment() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);

        add_deal(&rt, vec![], 5, client1(), 1100);

        let st: State = rt.get_state();
        assert_eq!(
            vec![DealBounty { deal_id: 5, client: client1(), last_paid: 1000, deal_end: 1100 }],
            st.active_deals
        );
        check_state(&rt);
    }

    #[test]
    fn duplicate_new_deal_is_forbidden() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);

        // Rejected before the market is consulted.
        expect_abort_contains_message(
            ExitCode::USR_FORBIDDEN,
            "already active",
            claim(&rt, Some(5)),
        );
        check_state(&rt);
    }

    #[test]
    fn live_deal_accrues_prorated_payment() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);

        rt.set_epoch(1050);
        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(piece(), client1(), 1100))],
                states: vec![Some(deal_state(-1))],
            },
        );
        // 50 of the 200 slot-epochs of capacity have been stored.
        expect_token_payment(&rt, client1(), prorated(50));
        claim(&rt, None).unwrap();

        let st: State = rt.get_state();
        assert_eq!(
            vec![DealBounty { deal_id: 5, client: client1(), last_paid: 1050, deal_end: 1100 }],
            st.active_deals
        );
        check_state(&rt);
    }

    #[test]
    fn ended_deal_pays_to_deal_end_and_frees_slot() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);

        rt.set_epoch(1150);
        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(piece(), client1(), 1100))],
                states: vec![Some(deal_state(-1))],
            },
        );
        expect_token_payment(&rt, client1(), prorated(100));
        claim(&rt, None).unwrap();

        let st: State = rt.get_state();
        assert!(st.active_deals.is_empty());
        check_state(&rt);
    }

    #[test]
    fn slashed_deal_pays_to_slash_epoch_and_frees_slot() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);

        rt.set_epoch(1050);
        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(piece(), client1(), 1100))],
                states: vec![Some(deal_state(1025))],
            },
        );
        expect_token_payment(&rt, client1(), prorated(25));
        claim(&rt, None).unwrap();

        let st: State = rt.get_state();
        assert!(st.active_deals.is_empty());
        check_state(&rt);
    }

    #[test]
    fn forgotten_deal_is_treated_as_expired() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);

        rt.set_epoch(1150);
        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn { proposals: vec![None], states: vec![None] },
        );
        expect_token_payment(&rt, client1(), prorated(100));
        claim(&rt, None).unwrap();

        let st: State = rt.get_state();
        assert!(st.active_deals.is_empty());
        check_state(&rt);
    }

    #[test]
    fn settles_multiple_deals_in_one_claim() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);
        add_deal(&rt, vec![5], 6, client2(), 1200);

        rt.set_epoch(1080);
        expect_get_deals(
            &rt,
            vec![5, 6],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![
                    Some(deal_proposal(piece(), client1(), 1100)),
                    Some(deal_proposal(piece(), client2(), 1200)),
                ],
                states: vec![Some(deal_state(-1)), Some(deal_state(-1))],
            },
        );
        expect_token_payment(&rt, client1(), prorated(80));
        expect_token_payment(&rt, client2(), prorated(80));
        claim(&rt, None).unwrap();

        let st: State = rt.get_state();
        assert_eq!(2, st.active_deals.len());
        assert_eq!(1080, st.active_deals[0].last_paid);
        assert_eq!(1080, st.active_deals[1].last_paid);
        check_state(&rt);
    }

    #[test]
    fn active_deal_limit_is_enforced() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);
        add_deal(&rt, vec![5], 6, client2(), 1200);

        // Both slots are occupied by live deals; a third cannot be added.
        expect_get_deals(
            &rt,
            vec![5, 6, 7],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![
                    Some(deal_proposal(piece(), client1(), 1100)),
                    Some(deal_proposal(piece(), client2(), 1200)),
                    Some(deal_proposal(piece(), client1(), 1300)),
                ],
                states: vec![Some(deal_state(-1)), Some(deal_state(-1)), Some(deal_state(-1))],
            },
        );
        expect_abort_contains_message(
            ExitCode::USR_FORBIDDEN,
            "would exceed the active deal limit",
            claim(&rt, Some(7)),
        );

        let st: State = rt.get_state();
        assert_eq!(2, st.active_deals.len());
        check_state(&rt);
    }

    #[test]
    fn terminated_deal_frees_capacity_for_a_new_one() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);
        add_deal(&rt, vec![5], 6, client2(), 1200);

        // Deal 5 has ended; settling it makes room for deal 7 in the same claim.
        rt.set_epoch(1150);
        expect_get_deals(
            &rt,
            vec![5, 6, 7],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![
                    Some(deal_proposal(piece(), client1(), 1100)),
                    Some(deal_proposal(piece(), client2(), 1200)),
                    Some(deal_proposal(piece(), client1(), 1300)),
                ],
                states: vec![Some(deal_state(-1)), Some(deal_state(-1)), Some(deal_state(-1))],
            },
        );
        expect_token_payment(&rt, client1(), prorated(100));
        expect_token_payment(&rt, client2(), prorated(150));
        claim(&rt, Some(7)).unwrap();

        let st: State = rt.get_state();
        assert_eq!(
            vec![
                DealBounty { deal_id: 6, client: client2(), last_paid: 1150, deal_end: 1200 },
                DealBounty { deal_id: 7, client: client1(), last_paid: 1150, deal_end: 1300 },
            ],
            st.active_deals
        );
        check_state(&rt);
    }

    #[test]
    fn new_deal_with_wrong_piece_is_rejected() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);

        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(make_piece_cid(b"43"), client1(), 1100))],
                states: vec![Some(deal_state(-1))],
            },
        );
        expect_abort_contains_message(
            ExitCode::USR_NOT_FOUND,
            "wrong piece",
            claim(&rt, Some(5)),
        );
        check_state(&rt);
    }

    #[test]
    fn new_deal_missing_from_market_is_rejected() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);

        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn { proposals: vec![None], states: vec![None] },
        );
        expect_abort_contains_message(
            ExitCode::USR_NOT_FOUND,
            "not found",
            claim(&rt, Some(5)),
        );
        check_state(&rt);
    }

    #[test]
    fn new_deal_already_ended_is_rejected() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);

        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(piece(), client1(), 900))],
                states: vec![Some(deal_state(-1))],
            },
        );
        expect_abort_contains_message(
            ExitCode::USR_NOT_FOUND,
            "not currently active",
            claim(&rt, Some(5)),
        );
        check_state(&rt);
    }

    #[test]
    fn new_deal_already_slashed_is_rejected() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);

        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(piece(), client1(), 1100))],
                states: vec![Some(deal_state(900))],
            },
        );
        expect_abort_contains_message(
            ExitCode::USR_NOT_FOUND,
            "not currently active",
            claim(&rt, Some(5)),
        );
        check_state(&rt);
    }

    #[test]
    fn pays_native_value_when_no_token_is_set() {
        let rt = new_runtime();
        rt.set_balance(TokenAmount::from_atto(2_000_000));
        let params = ConstructorParams { token: None, ..token_params() };
        construct_and_verify(&rt, &params);
        rt.set_epoch(1000);
        add_deal(&rt, vec![], 5, client1(), 1100);

        rt.set_epoch(1050);
        expect_get_deals(
            &rt,
            vec![5],
            &ext::market::GetActiveDealsReturn {
                proposals: vec![Some(deal_proposal(piece(), client1(), 1100))],
                states: vec![Some(deal_state(-1))],
            },
        );
        rt.expect_send_simple(client1(), METHOD_SEND, None, prorated(50), None, ExitCode::OK);
        claim(&rt, None).unwrap();

        assert_eq!(TokenAmount::from_atto(2_000_000) - prorated(50), rt.get_balance());
        check_state(&rt);
    }

    #[test]
    fn market_failure_aborts_with_market_exit_code() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());
        rt.set_epoch(1000);

        rt.expect_send_simple(
            STORAGE_MARKET_ACTOR_ADDR,
            ext::market::GET_ACTIVE_DEALS_METHOD,
            IpldBlock::serialize_cbor(&ext::market::GetActiveDealsParams { deal_ids: vec![5] })
                .unwrap(),
            TokenAmount::from_atto(0),
            None,
            ExitCode::USR_NOT_FOUND,
        );
        expect_abort_contains_message(
            ExitCode::USR_NOT_FOUND,
            "failed to retrieve deals",
            claim(&rt, Some(5)),
        );
        check_state(&rt);
    }
}

// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fil_actor_bounty::testing::check_state_invariants;
use fil_actor_bounty::{
    ext, Actor as BountyActor, ClaimParams, ConstructorParams, Method, State,
};
use fil_actors_runtime::runtime::Runtime;
use fil_actors_runtime::test_utils::*;
use fil_actors_runtime::{INIT_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR};
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
const PROVIDER_ID: u64 = 150;

fn founder() -> Address {
    Address::new_id(FOUNDER_ID)
}

fn token_actor() -> Address {
    Address::new_id(TOKEN_ACTOR_ID)
}

fn piece() -> Cid {
    make_piece_cid(b"42")
}

fn bounty_value() -> TokenAmount {
    TokenAmount::from_atto(2000)
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
        bounties: 3,
    }
}

fn native_params() -> ConstructorParams {
    ConstructorParams { token: None, ..token_params() }
}

fn construct_and_verify(rt: &MockRuntime, params: &ConstructorParams) {
    rt.set_caller(*INIT_ACTOR_CODE_ID, INIT_ACTOR_ADDR);
    rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
    let ret = rt
        .call::<BountyActor>(
            Method::Constructor as MethodNum,
            IpldBlock::serialize_cbor(params).unwrap(),
        )
        .unwrap();
    expect_empty(ret);
    rt.verify();
}

fn deal_proposal(piece_cid: Cid, client: Address, label: &str, deal_end: ChainEpoch) -> ext::market::DealProposal {
    ext::market::DealProposal {
        piece_cid,
        piece_size: PaddedPieceSize(1 << 32),
        verified_deal: false,
        client,
        provider: Address::new_id(PROVIDER_ID),
        label: label.to_string(),
        start_epoch: 0,
        end_epoch: deal_end,
        storage_price_per_epoch: TokenAmount::from_atto(1 << 20),
        provider_collateral: TokenAmount::from_atto(2_000_000),
        client_collateral: TokenAmount::from_atto(1_000_000),
    }
}

fn expect_get_deal(rt: &MockRuntime, deal_id: DealID, proposal: &ext::market::DealProposal) {
    rt.expect_send_simple(
        STORAGE_MARKET_ACTOR_ADDR,
        ext::market::GET_ACTIVE_DEAL_METHOD,
        IpldBlock::serialize_cbor(&ext::market::GetActiveDealParams { deal_id }).unwrap(),
        TokenAmount::from_atto(0),
        IpldBlock::serialize_cbor(proposal).unwrap(),
        ExitCode::OK,
    );
}

fn claim(rt: &MockRuntime, caller: Address, deal_id: DealID) -> Result<(), fil_actors_runtime::ActorError> {
    rt.set_caller(*ACCOUNT_ACTOR_CODE_ID, caller);
    rt.expect_validate_caller_any();
    let ret = rt.call::<BountyActor>(
        Method::Claim as MethodNum,
        IpldBlock::serialize_cbor(&ClaimParams { deal_id }).unwrap(),
    )?;
    expect_empty(ret);
    rt.verify();
    Ok(())
}

fn check_state(rt: &MockRuntime) {
    let (_, acc) = check_state_invariants(&rt.get_state(), rt.store());
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
        assert_eq!(3, st.bounties);
        check_state(&rt);
    }

    #[test]
    fn constructs_with_native_escrow() {
        let rt = new_runtime();
        rt.set_balance(TokenAmount::from_atto(6000));
        construct_and_verify(&rt, &native_params());

        let st: State = rt.get_state();
        assert_eq!(None, st.token);
        check_state(&rt);
    }

    #[test]
    fn rejects_underfunded_native_escrow() {
        let rt = new_runtime();
        rt.set_balance(TokenAmount::from_atto(5999));

        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "must cover total value of bounties",
            rt.call::<BountyActor>(
                Method::Constructor as MethodNum,
                IpldBlock::serialize_cbor(&native_params()).unwrap(),
            ),
        );
        rt.verify();
    }

    #[test]
    fn rejects_non_positive_value() {
        let rt = new_runtime();
        let mut params = token_params();
        params.value = TokenAmount::from_atto(0);

        rt.expect_validate_caller_addr(vec![INIT_ACTOR_ADDR]);
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "greater than zero",
            rt.call::<BountyActor>(
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
            rt.call::<BountyActor>(
                Method::Constructor as MethodNum,
                IpldBlock::serialize_cbor(&token_params()).unwrap(),
            ),
        );
        rt.verify();
    }
}

mod claim {
    use super::*;

    fn expect_token_payment(rt: &MockRuntime, to: Address) {
        rt.expect_send_simple(
            token_actor(),
            ext::token::TRANSFER_FROM_METHOD,
            IpldBlock::serialize_cbor(&ext::token::TransferFromParams {
                from: founder(),
                to,
                value: bounty_value(),
            })
            .unwrap(),
            TokenAmount::from_atto(0),
            None,
            ExitCode::OK,
        );
    }

    #[test]
    fn pays_token_bounty_per_deal_until_exhausted() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());

        let clients: Vec<Address> = (0..3).map(|i| Address::new_id(103 + i)).collect();
        for (i, client) in clients.iter().enumerate() {
            let deal_id = i as DealID;
            expect_get_deal(&rt, deal_id, &deal_proposal(piece(), *client, "deal", 200_000));
            expect_token_payment(&rt, *client);
            claim(&rt, clients[0], deal_id).unwrap();

            let st: State = rt.get_state();
            assert_eq!(2 - i as u64, st.bounties);
            assert!(st.has_paid(rt.store(), deal_id).unwrap());
            check_state(&rt);
        }

        // All bounty slots are used up; a fourth valid deal is refused.
        expect_get_deal(&rt, 3, &deal_proposal(piece(), Address::new_id(106), "deal4", 200_000));
        expect_abort_contains_message(
            ExitCode::USR_FORBIDDEN,
            "all bounties have been claimed",
            claim(&rt, clients[0], 3),
        );
        check_state(&rt);
    }

    #[test]
    fn pays_native_bounty_directly() {
        let rt = new_runtime();
        rt.set_balance(TokenAmount::from_atto(6000));
        construct_and_verify(&rt, &native_params());

        let client = Address::new_id(103);
        expect_get_deal(&rt, 7, &deal_proposal(piece(), client, "deal7", 200_000));
        rt.expect_send_simple(client, METHOD_SEND, None, bounty_value(), None, ExitCode::OK);
        claim(&rt, client, 7).unwrap();

        assert_eq!(TokenAmount::from_atto(4000), rt.get_balance());
        check_state(&rt);
    }

    #[test]
    fn duplicate_claim_is_forbidden() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());

        let client = Address::new_id(103);
        let proposal = deal_proposal(piece(), client, "deal", 200_000);
        expect_get_deal(&rt, 0, &proposal);
        expect_token_payment(&rt, client);
        claim(&rt, client, 0).unwrap();

        expect_get_deal(&rt, 0, &proposal);
        expect_abort_contains_message(
            ExitCode::USR_FORBIDDEN,
            "already claimed",
            claim(&rt, client, 0),
        );

        let st: State = rt.get_state();
        assert_eq!(2, st.bounties);
        check_state(&rt);
    }

    #[test]
    fn wrong_piece_is_rejected() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());

        let client = Address::new_id(103);
        expect_get_deal(&rt, 0, &deal_proposal(make_piece_cid(b"43"), client, "deal", 200_000));
        expect_abort_contains_message(
            ExitCode::USR_ILLEGAL_ARGUMENT,
            "bounty pays for",
            claim(&rt, client, 0),
        );

        let st: State = rt.get_state();
        assert_eq!(3, st.bounties);
        assert!(!st.has_paid(rt.store(), 0).unwrap());
        check_state(&rt);
    }

    #[test]
    fn inactive_deal_aborts_with_market_exit_code() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());

        rt.expect_send_simple(
            STORAGE_MARKET_ACTOR_ADDR,
            ext::market::GET_ACTIVE_DEAL_METHOD,
            IpldBlock::serialize_cbor(&ext::market::GetActiveDealParams { deal_id: 42 }).unwrap(),
            TokenAmount::from_atto(0),
            None,
            ExitCode::USR_NOT_FOUND,
        );
        expect_abort_contains_message(
            ExitCode::USR_NOT_FOUND,
            "failed to retrieve deal",
            claim(&rt, Address::new_id(103), 42),
        );
        check_state(&rt);
    }

    #[test]
    fn failed_payment_aborts_with_token_exit_code() {
        let rt = new_runtime();
        construct_and_verify(&rt, &token_params());

        let client = Address::new_id(103);
        expect_get_deal(&rt, 0, &deal_proposal(piece(), client, "deal", 200_000));
        rt.expect_send_simple(
            token_actor(),
            ext::token::TRANSFER_FROM_METHOD,
            IpldBlock::serialize_cbor(&ext::token::TransferFromParams {
                from: founder(),
                to: client,
                value: bounty_value(),
            })
            .unwrap(),
            TokenAmount::from_atto(0),
            None,
            ExitCode::USR_FORBIDDEN,
        );
        expect_abort_contains_message(
            ExitCode::USR_FORBIDDEN,
            "failed to transfer token",
            claim(&rt, client, 0),
        );
    }
}

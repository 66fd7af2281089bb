// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::econ::TokenAmount;
use fvm_shared::{METHOD_CONSTRUCTOR, METHOD_SEND};
use num_derive::FromPrimitive;
use num_traits::Zero;

use fil_actors_runtime::runtime::{ActorCode, Runtime};
use fil_actors_runtime::{
    actor_dispatch, actor_error, deserialize_block, extract_send_result, ActorContext, ActorError,
    INIT_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR,
};

pub use self::state::State;
pub use self::types::*;

pub mod ext;
mod state;
pub mod testing;
mod types;

/// Bounty actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Claim = 2,
}

/// Bounty Actor
///
/// Escrows value and pays it out, once per storage deal, to clients storing a
/// designated piece.
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &impl Runtime, params: ConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&INIT_ACTOR_ADDR))?;

        if params.value <= TokenAmount::zero() {
            return Err(actor_error!(illegal_argument; "must have value greater than zero"));
        }

        // When paying native value the escrow is pre-funded at Exec time.
        if params.token.is_none() {
            let total_value = TokenAmount::from_atto(params.value.atto() * params.bounties);
            if rt.current_balance() < total_value {
                return Err(actor_error!(illegal_argument;
                    "bounty actor balance {} must cover total value of bounties {}",
                    rt.current_balance(), total_value));
            }
        }

        let st = State::new(
            rt.store(),
            params.piece_cid,
            params.token,
            params.from,
            params.value,
            params.bounties,
        )
        .map_err(|e| e.wrap("could not initialize state"))?;
        rt.create(&st)?;
        Ok(())
    }

    /// Pays out one bounty to the client of an active deal storing the piece.
    /// Each deal can be claimed at most once.
    pub fn claim(rt: &impl Runtime, params: ClaimParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        // Retrieve the deal from the market actor. This fails if the deal is
        // not active.
        let proposal: ext::market::DealProposal = deserialize_block(
            extract_send_result(rt.send_simple(
                &STORAGE_MARKET_ACTOR_ADDR,
                ext::market::GET_ACTIVE_DEAL_METHOD,
                IpldBlock::serialize_cbor(&ext::market::GetActiveDealParams {
                    deal_id: params.deal_id,
                })?,
                TokenAmount::zero(),
            ))
            .map_err(|e| e.wrap(format!("failed to retrieve deal {}", params.deal_id)))?,
        )?;

        let (token, from, value) = rt.transaction(|st: &mut State, rt| {
            if st.bounties < 1 {
                return Err(actor_error!(forbidden; "all bounties have been claimed"));
            }

            if proposal.piece_cid != st.piece_cid {
                return Err(actor_error!(illegal_argument;
                    "deal {} stores piece {}, bounty pays for {}",
                    params.deal_id, proposal.piece_cid, st.piece_cid));
            }

            if !st.record_paid(rt.store(), params.deal_id)? {
                return Err(actor_error!(forbidden;
                    "bounty already claimed for deal {}", params.deal_id));
            }
            st.bounties -= 1;

            Ok((st.token, st.from, st.value.clone()))
        })?;

        // The claim is validated and recorded, pay the deal client.
        match token {
            Some(token) => {
                let transfer_params = ext::token::TransferFromParams {
                    from,
                    to: proposal.client,
                    value: value.clone(),
                };
                extract_send_result(rt.send_simple(
                    &token,
                    ext::token::TRANSFER_FROM_METHOD,
                    IpldBlock::serialize_cbor(&transfer_params)?,
                    TokenAmount::zero(),
                ))
                .with_context(|| {
                    format!("failed to transfer token {} from {} to {}", token, from, proposal.client)
                })?;
            }
            None => {
                extract_send_result(rt.send_simple(
                    &proposal.client,
                    METHOD_SEND,
                    None,
                    value.clone(),
                ))
                .with_context(|| format!("failed to transfer {} to {}", value, proposal.client))?;
            }
        }

        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Bounty"
    }

    actor_dispatch! {
        Constructor => constructor,
        Claim => claim,
    }
}

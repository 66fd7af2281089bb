// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::address::Address;
use fvm_shared::deal::DealID;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::{METHOD_CONSTRUCTOR, METHOD_SEND};
use num_derive::FromPrimitive;
use num_traits::Zero;

use fil_actors_runtime::runtime::{ActorCode, Runtime};
use fil_actors_runtime::{
    actor_dispatch, actor_error, deserialize_block, extract_send_result, ActorContext, ActorError,
    AsActorError, INIT_ACTOR_ADDR, STORAGE_MARKET_ACTOR_ADDR,
};

pub use self::state::{DealBounty, State};
pub use self::types::*;

pub mod ext;
mod state;
pub mod testing;
mod types;

/// Bounty stream actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Claim = 2,
}

/// Payment owed to a deal client, settled after the claim commits.
struct Payment {
    to: Address,
    value: TokenAmount,
}

/// Bounty stream actor
///
/// Escrows value and streams it to the clients of active deals storing a
/// designated piece, prorated per epoch of active storage.
pub struct Actor;

impl Actor {
    pub fn constructor(rt: &impl Runtime, params: ConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&INIT_ACTOR_ADDR))?;

        if params.value <= TokenAmount::zero() {
            return Err(actor_error!(illegal_argument; "must have value greater than zero"));
        }

        if params.duration <= 0 {
            return Err(actor_error!(illegal_argument; "must have duration greater than zero"));
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
            params.piece_cid,
            params.token,
            params.from,
            params.value,
            params.duration,
            params.bounties,
        );
        rt.create(&st)?;
        Ok(())
    }

    /// Settles accrued payments for every tracked deal, drops deals that have
    /// been slashed or have ended, and optionally starts tracking a new deal.
    pub fn claim(rt: &impl Runtime, params: ClaimParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        // Read state to find the deals currently tracked.
        let st: State = rt.state()?;
        let mut deal_ids: Vec<DealID> = st.active_deals.iter().map(|d| d.deal_id).collect();
        if let Some(new_deal_id) = params.new_deal_id {
            if deal_ids.contains(&new_deal_id) {
                return Err(actor_error!(forbidden; "new deal {} is already active", new_deal_id));
            }
            deal_ids.push(new_deal_id);
        }
        let queried = deal_ids.len();

        // Retrieve the deals from the market actor. Deals the market no
        // longer tracks come back null.
        let deals: ext::market::GetActiveDealsReturn = deserialize_block(
            extract_send_result(rt.send_simple(
                &STORAGE_MARKET_ACTOR_ADDR,
                ext::market::GET_ACTIVE_DEALS_METHOD,
                IpldBlock::serialize_cbor(&ext::market::GetActiveDealsParams { deal_ids })?,
                TokenAmount::zero(),
            ))
            .map_err(|e| e.wrap("failed to retrieve deals"))?,
        )?;
        if deals.proposals.len() != queried || deals.states.len() != queried {
            return Err(actor_error!(illegal_state;
                "market returned {} proposals and {} states for {} deals",
                deals.proposals.len(), deals.states.len(), queried));
        }

        let (token, from, payments) = rt.transaction(|st: &mut State, rt| {
            let curr_epoch = rt.curr_epoch();
            let mut next_active_deals = Vec::new();
            let mut payments = Vec::new();

            for (i, old_deal) in st.active_deals.iter().enumerate() {
                let last_active_epoch = match (&deals.proposals[i], &deals.states[i]) {
                    (Some(_), Some(deal_state)) => {
                        if deal_state.slash_epoch >= 0 {
                            // Deal was terminated, pay up to the slashing and
                            // let the slot open up.
                            deal_state.slash_epoch
                        } else if old_deal.deal_end < curr_epoch {
                            old_deal.deal_end
                        } else {
                            // Deal appears to be active, carry it forward.
                            next_active_deals.push(DealBounty {
                                deal_id: old_deal.deal_id,
                                client: old_deal.client,
                                last_paid: curr_epoch,
                                deal_end: old_deal.deal_end,
                            });
                            curr_epoch
                        }
                    }
                    // The market no longer tracks the deal, assume it expired.
                    _ => old_deal.deal_end,
                };

                if last_active_epoch > old_deal.last_paid {
                    payments.push(Payment {
                        to: old_deal.client,
                        value: st.prorated_payment(last_active_epoch - old_deal.last_paid),
                    });
                }
            }

            // Now add the new deal if there is room for it.
            if let Some(new_deal_id) = params.new_deal_id {
                if next_active_deals.len() as u64 >= st.max_active_deals {
                    return Err(actor_error!(forbidden;
                        "adding deal {} would exceed the active deal limit", new_deal_id));
                }

                // The new deal trails the tracked deals in the query results.
                let proposal = deals.proposals[st.active_deals.len()]
                    .as_ref()
                    .with_context_code(ExitCode::USR_NOT_FOUND, || {
                        format!("proposed bounty deal {} not found", new_deal_id)
                    })?;
                let deal_state = deals.states[st.active_deals.len()]
                    .as_ref()
                    .with_context_code(ExitCode::USR_NOT_FOUND, || {
                        format!("proposed bounty deal {} not active", new_deal_id)
                    })?;

                if proposal.piece_cid != st.piece_cid {
                    return Err(actor_error!(not_found;
                        "proposed bounty deal {} is for wrong piece {}",
                        new_deal_id, proposal.piece_cid));
                }
                if proposal.end_epoch < curr_epoch {
                    return Err(actor_error!(not_found;
                        "proposed bounty deal {} not currently active", new_deal_id));
                }
                if deal_state.slash_epoch >= 0 && deal_state.slash_epoch < curr_epoch {
                    return Err(actor_error!(not_found;
                        "proposed bounty deal {} not currently active", new_deal_id));
                }

                next_active_deals.push(DealBounty {
                    deal_id: new_deal_id,
                    client: proposal.client,
                    last_paid: curr_epoch,
                    deal_end: proposal.end_epoch,
                });
            }

            st.active_deals = next_active_deals;
            Ok((st.token, st.from, payments))
        })?;

        // Getting this far means the claim is validated and committed, send
        // the payments.
        for payment in payments {
            match token {
                Some(token) => {
                    let transfer_params = ext::token::TransferFromParams {
                        from,
                        to: payment.to,
                        value: payment.value.clone(),
                    };
                    extract_send_result(rt.send_simple(
                        &token,
                        ext::token::TRANSFER_FROM_METHOD,
                        IpldBlock::serialize_cbor(&transfer_params)?,
                        TokenAmount::zero(),
                    ))
                    .with_context(|| {
                        format!(
                            "failed to transfer token {} from {} to {}",
                            token, from, payment.to
                        )
                    })?;
                }
                None => {
                    extract_send_result(rt.send_simple(
                        &payment.to,
                        METHOD_SEND,
                        None,
                        payment.value.clone(),
                    ))
                    .with_context(|| {
                        format!("failed to transfer {} to {}", payment.value, payment.to)
                    })?;
                }
            }
        }

        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "BountyStream"
    }

    actor_dispatch! {
        Constructor => constructor,
        Claim => claim,
    }
}

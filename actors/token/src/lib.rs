// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::RawBytes;
use fvm_shared::address::Address;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::ExitCode;
use fvm_shared::METHOD_CONSTRUCTOR;
use num_derive::FromPrimitive;
use num_traits::Zero;

use fil_actors_runtime::runtime::{ActorCode, Runtime};
use fil_actors_runtime::{
    actor_dispatch, actor_error, is_principal, resolve_to_actor_id, ActorContext, ActorError,
    AsActorError, INIT_ACTOR_ADDR,
};

pub use self::state::State;
pub use self::types::*;

mod state;
pub mod testing;
mod types;

/// Token actor methods available
#[derive(FromPrimitive)]
#[repr(u64)]
pub enum Method {
    Constructor = METHOD_CONSTRUCTOR,
    Name = 2,
    Symbol = 3,
    Decimals = 4,
    TotalSupply = 5,
    BalanceOf = 6,
    Transfer = 7,
    Approve = 8,
    Allowance = 9,
    TransferFrom = 10,
    Icon = 11,
}

/// Token Actor
pub struct Actor;

impl Actor {
    /// Creates the token with a fixed supply, all of it credited to the
    /// system account.
    pub fn constructor(rt: &impl Runtime, params: ConstructorParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_is(std::iter::once(&INIT_ACTOR_ADDR))?;

        if params.total_supply <= TokenAmount::zero() {
            return Err(actor_error!(illegal_argument;
                "must have initial total supply greater than zero"));
        }

        let system_account = resolve_to_actor_id(rt, &params.system_account, false)
            .map_err(|e| e.wrap("failed to resolve system account"))?;

        // The initial holder must be able to sign transfers.
        let code_cid =
            rt.get_actor_code_cid(&system_account).with_context_code(
                ExitCode::USR_ILLEGAL_ARGUMENT,
                || format!("no code for system account {}", params.system_account),
            )?;
        if !is_principal(rt, &code_cid) {
            return Err(actor_error!(forbidden;
                "system account {} must be a principal account, was {}",
                params.system_account, code_cid));
        }

        let st = State::new(
            rt.store(),
            params.name,
            params.symbol,
            params.icon,
            params.decimals,
            params.total_supply,
            Address::new_id(system_account),
        )
        .map_err(|e| e.wrap("could not initialize state"))?;
        rt.create(&st)?;
        Ok(())
    }

    /// Get name of token
    pub fn name(rt: &impl Runtime) -> Result<String, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(st.name)
    }

    /// Get symbol of token
    pub fn symbol(rt: &impl Runtime) -> Result<String, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(st.symbol)
    }

    /// Get icon of token
    pub fn icon(rt: &impl Runtime) -> Result<RawBytes, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(RawBytes::new(st.icon))
    }

    /// Get decimals used by token
    pub fn decimals(rt: &impl Runtime) -> Result<u64, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(st.decimals)
    }

    /// Get total supply of token
    pub fn total_supply(rt: &impl Runtime) -> Result<TokenAmount, ActorError> {
        rt.validate_immediate_caller_accept_any()?;
        let st: State = rt.state()?;
        Ok(st.total_supply)
    }

    /// Get balance for an account, zero for accounts never seen.
    pub fn balance_of(rt: &impl Runtime, account: Address) -> Result<TokenAmount, ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let account = resolve_to_actor_id(rt, &account, false)
            .map_err(|e| e.wrap("failed to resolve account address"))?;

        let st: State = rt.state()?;
        st.balance_of(rt.store(), &Address::new_id(account))
            .map_err(|e| e.wrap("failed to retrieve balance"))
    }

    /// Transfer balance to another account.
    pub fn transfer(rt: &impl Runtime, params: TransferParams) -> Result<(), ActorError> {
        // Only addresses holding a balance can transfer anything anyway.
        rt.validate_immediate_caller_accept_any()?;

        if params.value <= TokenAmount::zero() {
            return Err(actor_error!(illegal_argument; "transfer value must be positive"));
        }

        let to = resolve_to_actor_id(rt, &params.to, false)
            .map(Address::new_id)
            .map_err(|e| e.wrap("failed to resolve destination address"))?;

        rt.transaction(|st: &mut State, rt| {
            let from = rt.message().caller();
            st.transfer(rt.store(), &from, &to, &params.value)
        })?;

        Ok(())
    }

    /// Approve another address to transfer on the caller's behalf.
    /// Approvals accumulate: approving twice grants the sum of both amounts.
    pub fn approve(rt: &impl Runtime, params: ApproveParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        if params.value <= TokenAmount::zero() {
            return Err(actor_error!(illegal_argument; "approval value must be positive"));
        }

        let approvee = resolve_to_actor_id(rt, &params.approvee, false)
            .map(Address::new_id)
            .map_err(|e| e.wrap("failed to resolve approvee address"))?;

        rt.transaction(|st: &mut State, rt| {
            let owner = rt.message().caller();
            st.approve(rt.store(), &owner, &approvee, &params.value)
                .with_context(|| format!("failed to approve {}", approvee))
        })?;

        Ok(())
    }

    /// Retrieve how much a spender is still authorized to transfer from an
    /// owner's balance.
    pub fn allowance(rt: &impl Runtime, params: AllowanceParams) -> Result<TokenAmount, ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        let owner = resolve_to_actor_id(rt, &params.owner, false)
            .map(Address::new_id)
            .map_err(|e| e.wrap("failed to resolve owner address"))?;
        let spender = resolve_to_actor_id(rt, &params.spender, false)
            .map(Address::new_id)
            .map_err(|e| e.wrap("failed to resolve spender address"))?;

        let st: State = rt.state()?;
        st.allowance(rt.store(), &owner, &spender)
    }

    /// Transfer between two accounts on behalf of the owner, consuming the
    /// caller's allowance. Allowance and balance move together or not at all.
    pub fn transfer_from(rt: &impl Runtime, params: TransferFromParams) -> Result<(), ActorError> {
        rt.validate_immediate_caller_accept_any()?;

        if params.value <= TokenAmount::zero() {
            return Err(actor_error!(illegal_argument; "transfer value must be positive"));
        }

        let from = resolve_to_actor_id(rt, &params.from, false)
            .map(Address::new_id)
            .map_err(|e| e.wrap("failed to resolve source address"))?;
        let to = resolve_to_actor_id(rt, &params.to, false)
            .map(Address::new_id)
            .map_err(|e| e.wrap("failed to resolve destination address"))?;

        rt.transaction(|st: &mut State, rt| {
            let spender = rt.message().caller();
            st.deduct_allowance(rt.store(), &from, &spender, &params.value)?;
            st.transfer(rt.store(), &from, &to, &params.value)
        })?;

        Ok(())
    }
}

impl ActorCode for Actor {
    type Methods = Method;

    fn name() -> &'static str {
        "Token"
    }

    actor_dispatch! {
        Constructor => constructor,
        Name => name,
        Symbol => symbol,
        Decimals => decimals,
        TotalSupply => total_supply,
        BalanceOf => balance_of,
        Transfer => transfer,
        Approve => approve,
        Allowance => allowance,
        TransferFrom => transfer_from,
        Icon => icon,
    }
}

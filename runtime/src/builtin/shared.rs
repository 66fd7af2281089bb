// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use fvm_shared::address::Address;
use fvm_shared::error::ExitCode;
use fvm_shared::ActorID;

use crate::runtime::builtins::Type;
use crate::runtime::Runtime;
use crate::{actor_error, ActorError, AsActorError};

pub const HAMT_BIT_WIDTH: u32 = 5;

/// Types of built-in actors that can be treated as principals.
/// A principal is an account-like actor that may own token balances and sign
/// for transfers.
pub const CALLER_TYPES_SIGNABLE: &[Type] = &[Type::Account, Type::Multisig];

/// Resolves an address to an ID address, aborting with ErrIllegalArgument when
/// the address has no entry in the Init actor's table. When `check_existence`
/// is set, also requires code to be deployed at the resolved actor.
pub fn resolve_to_actor_id(
    rt: &impl Runtime,
    address: &Address,
    check_existence: bool,
) -> Result<ActorID, ActorError> {
    if let Some(id) = rt.resolve_address(address) {
        if check_existence {
            rt.get_actor_code_cid(&id).with_context_code(ExitCode::USR_ILLEGAL_ARGUMENT, || {
                format!("no code for address {}", address)
            })?;
        }
        return Ok(id);
    }
    Err(actor_error!(illegal_argument; "failed to resolve address {} to ID address", address))
}

/// Whether the code CID identifies an account-like actor capable of signing
/// for funds (as opposed to a storage or registry actor).
pub fn is_principal(rt: &impl Runtime, code_cid: &Cid) -> bool {
    rt.resolve_builtin_actor_type(code_cid)
        .map_or(false, |typ| CALLER_TYPES_SIGNABLE.contains(&typ))
}

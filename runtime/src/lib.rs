// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_shared::error::{ErrorNumber, ExitCode};
use fvm_shared::Response;
use serde::de::DeserializeOwned;

pub use self::actor_error::*;
pub use self::builtin::*;
pub use self::dispatch::{dispatch, Dispatch, Dispatcher};
pub use self::util::*;
pub use crate::runtime::Runtime;

pub mod actor_error;
pub mod builtin;
pub mod dispatch;
pub mod runtime;
pub mod util;

#[cfg(feature = "test_utils")]
pub mod test_utils;

/// Hash algorithm used by the state HAMTs.
pub type Hasher = fvm_ipld_hamt::Sha256;

/// The returned error when a syscall-level send fails. Higher-level failures
/// (the callee aborting) are reported through the `Response` exit code instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("failed to send message (error number: {0})")]
pub struct SendError(pub ErrorNumber);

impl From<SendError> for ActorError {
    fn from(s: SendError) -> Self {
        match s.0 {
            ErrorNumber::NotFound => {
                ActorError::not_found("receiver of message not found".to_string())
            }
            ErrorNumber::InsufficientFunds => {
                ActorError::insufficient_funds("not enough funds to cover message value".to_string())
            }
            e => ActorError::unspecified(format!("send failed with error number {}", e)),
        }
    }
}

/// Propagates a failed send as an abort carrying the callee's exit code,
/// otherwise yields the (optional) return block.
pub fn extract_send_result(
    res: Result<Response, SendError>,
) -> Result<Option<IpldBlock>, ActorError> {
    let ret = res?;
    if ret.exit_code.is_success() {
        Ok(ret.return_data)
    } else {
        Err(ActorError::unchecked(
            ret.exit_code,
            format!("send aborted with code {}", ret.exit_code),
        ))
    }
}

/// Deserializes a required return block into a typed value.
pub fn deserialize_block<T: DeserializeOwned>(ret: Option<IpldBlock>) -> Result<T, ActorError> {
    ret.context_code(ExitCode::USR_ASSERTION_FAILED, "return expected".to_string())?
        .deserialize()
        .exit_code(ExitCode::USR_SERIALIZATION)
}

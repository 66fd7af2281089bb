// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use core::fmt;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::rc::Rc;

use cid::multihash::{Code, Multihash as OtherMultihash};
use cid::Cid;
use fvm_ipld_blockstore::{Blockstore, MemoryBlockstore};
use fvm_ipld_encoding::de::DeserializeOwned;
use fvm_ipld_encoding::ipld_block::IpldBlock;
use fvm_ipld_encoding::CborStore;
use fvm_shared::address::{Address, Payload, Protocol};
use fvm_shared::clock::ChainEpoch;
use fvm_shared::commcid::FIL_COMMITMENT_UNSEALED;
use fvm_shared::econ::TokenAmount;
use fvm_shared::error::{ErrorNumber, ExitCode};
use fvm_shared::sys::SendFlags;
use fvm_shared::{ActorID, MethodNum, Response};
use multihash::derive::Multihash;
use multihash::MultihashDigest;
use rand::prelude::*;
use serde::Serialize;

use crate::runtime::builtins::Type;
use crate::runtime::{ActorCode, MessageInfo, Runtime, EMPTY_ARR_CID};
use crate::{actor_error, ActorError, SendError};

lazy_static::lazy_static! {
    pub static ref SYSTEM_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/system");
    pub static ref INIT_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/init");
    pub static ref CRON_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/cron");
    pub static ref ACCOUNT_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/account");
    pub static ref POWER_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/storagepower");
    pub static ref MINER_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/storageminer");
    pub static ref MARKET_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/storagemarket");
    pub static ref MULTISIG_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/multisig");
    pub static ref TOKEN_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/token");
    pub static ref BOUNTY_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/bounty");
    pub static ref BOUNTY_STREAM_ACTOR_CODE_ID: Cid = make_identity_cid(b"fil/test/bountystream");

    pub static ref ACTOR_TYPES: BTreeMap<Cid, Type> = {
        let mut map = BTreeMap::new();
        map.insert(*SYSTEM_ACTOR_CODE_ID, Type::System);
        map.insert(*INIT_ACTOR_CODE_ID, Type::Init);
        map.insert(*CRON_ACTOR_CODE_ID, Type::Cron);
        map.insert(*ACCOUNT_ACTOR_CODE_ID, Type::Account);
        map.insert(*POWER_ACTOR_CODE_ID, Type::Power);
        map.insert(*MINER_ACTOR_CODE_ID, Type::Miner);
        map.insert(*MARKET_ACTOR_CODE_ID, Type::Market);
        map.insert(*MULTISIG_ACTOR_CODE_ID, Type::Multisig);
        map.insert(*TOKEN_ACTOR_CODE_ID, Type::Token);
        map.insert(*BOUNTY_ACTOR_CODE_ID, Type::Bounty);
        map.insert(*BOUNTY_STREAM_ACTOR_CODE_ID, Type::BountyStream);
        map
    };
}

const IPLD_RAW: u64 = 0x55;

/// Returns an identity CID for bz.
pub fn make_identity_cid(bz: &[u8]) -> Cid {
    Cid::new_v1(IPLD_RAW, OtherMultihash::wrap(0, bz).expect("name too long"))
}

/// Enable logging to environment. Returns error if already init.
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    pretty_env_logger::try_init()
}

pub struct MockRuntime<BS = MemoryBlockstore> {
    pub epoch: RefCell<ChainEpoch>,
    pub id_addresses: RefCell<HashMap<Address, Address>>,
    pub actor_code_cids: RefCell<HashMap<Address, Cid>>,
    pub receiver: Address,
    pub caller: RefCell<Address>,
    pub caller_type: RefCell<Cid>,
    pub value_received: RefCell<TokenAmount>,

    // Actor State
    pub state: RefCell<Option<Cid>>,
    pub balance: RefCell<TokenAmount>,

    // VM Impl
    pub in_call: RefCell<bool>,
    pub store: Rc<BS>,
    pub in_transaction: RefCell<bool>,

    // Expectations
    pub expectations: RefCell<Expectations>,
}

#[derive(Default)]
pub struct Expectations {
    pub expect_validate_caller_any: bool,
    pub expect_validate_caller_addr: Option<Vec<Address>>,
    pub expect_validate_caller_type: Option<Vec<Type>>,
    pub expect_sends: VecDeque<ExpectedMessage>,
    skip_verification_on_drop: bool,
}

impl Expectations {
    fn reset(&mut self) {
        self.skip_verification_on_drop = true;
        *self = Default::default();
    }

    fn verify(&mut self) {
        // If we don't reset them, we'll try to re-verify on drop. If something fails, we'll panic
        // twice and abort making the tests difficult to debug.
        self.skip_verification_on_drop = true;
        let this = std::mem::take(self);

        assert!(!this.expect_validate_caller_any, "expected ValidateCallerAny, not received");
        assert!(
            this.expect_validate_caller_addr.is_none(),
            "expected ValidateCallerAddr {:?}, not received",
            this.expect_validate_caller_addr
        );
        assert!(
            this.expect_validate_caller_type.is_none(),
            "expected ValidateCallerType {:?}, not received",
            this.expect_validate_caller_type
        );
        assert!(
            this.expect_sends.is_empty(),
            "expected all messages to be sent, unsent messages {:?}",
            this.expect_sends
        );
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new(Default::default())
    }
}

impl<BS> MockRuntime<BS> {
    pub fn new(store: BS) -> Self {
        Self {
            epoch: Default::default(),
            id_addresses: Default::default(),
            actor_code_cids: Default::default(),
            receiver: Address::new_id(0),
            caller: RefCell::new(Address::new_id(0)),
            caller_type: Default::default(),
            value_received: Default::default(),
            state: Default::default(),
            balance: Default::default(),
            in_call: Default::default(),
            store: Rc::new(store),
            in_transaction: Default::default(),
            expectations: Default::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExpectedMessage {
    pub to: Address,
    pub method: MethodNum,
    pub params: Option<IpldBlock>,
    pub value: TokenAmount,
    pub gas_limit: Option<u64>,
    pub send_flags: SendFlags,

    // returns from applying expectedMessage
    pub send_return: Option<IpldBlock>,
    pub exit_code: ExitCode,
    pub send_error: Option<ErrorNumber>,
}

pub fn expect_empty(res: Option<IpldBlock>) {
    assert!(res.is_none());
}

pub fn expect_abort_contains_message<T: fmt::Debug>(
    expect_exit_code: ExitCode,
    expect_msg: &str,
    res: Result<T, ActorError>,
) {
    let err = res.expect_err(&format!(
        "expected abort with exit code {}, but call succeeded",
        expect_exit_code
    ));
    assert_eq!(
        err.exit_code(),
        expect_exit_code,
        "expected failure with exit code {}, but failed with exit code {}; error message: {}",
        expect_exit_code,
        err.exit_code(),
        err.msg(),
    );
    let err_msg = err.msg();
    assert!(
        err.msg().contains(expect_msg),
        "expected err message '{}' to contain '{}'",
        err_msg,
        expect_msg,
    );
}

pub fn expect_abort<T: fmt::Debug>(exit_code: ExitCode, res: Result<T, ActorError>) {
    expect_abort_contains_message(exit_code, "", res);
}

impl<BS: Blockstore> MockRuntime<BS> {
    ///// Runtime access for tests /////

    pub fn get_state<T: DeserializeOwned>(&self) -> T {
        self.store_get(self.state.borrow().as_ref().unwrap())
    }

    pub fn replace_state<T: Serialize>(&self, obj: &T) {
        self.state.replace(Some(self.store_put(obj)));
    }

    pub fn set_balance(&self, amount: TokenAmount) {
        self.balance.replace(amount);
    }

    pub fn get_balance(&self) -> TokenAmount {
        self.balance.borrow().to_owned()
    }

    pub fn set_caller(&self, code_id: Cid, address: Address) {
        // fail if called with a non-ID address, since the caller() method must always return an ID
        address.id().unwrap();
        self.caller.replace(address);
        self.caller_type.replace(code_id);
        self.actor_code_cids.borrow_mut().insert(address, code_id);
    }

    pub fn set_value(&self, value: TokenAmount) {
        self.value_received.replace(value);
    }

    pub fn set_epoch(&self, epoch: ChainEpoch) -> ChainEpoch {
        self.epoch.replace(epoch);
        epoch
    }

    pub fn set_address_actor_type(&self, address: Address, actor_type: Cid) {
        self.actor_code_cids.borrow_mut().insert(address, actor_type);
    }

    pub fn get_id_address(&self, address: &Address) -> Option<Address> {
        if address.protocol() == Protocol::ID {
            return Some(*address);
        }
        self.id_addresses.borrow().get(address).cloned()
    }

    pub fn add_id_address(&self, source: Address, target: Address) {
        assert_eq!(target.protocol(), Protocol::ID, "target must use ID address protocol");
        self.id_addresses.borrow_mut().insert(source, target);
    }

    pub fn call<A: ActorCode>(
        &self,
        method_num: MethodNum,
        params: Option<IpldBlock>,
    ) -> Result<Option<IpldBlock>, ActorError> {
        self.in_call.replace(true);
        let prev_state = *self.state.borrow();
        let res = A::invoke_method(self, method_num, params);

        if res.is_err() {
            self.state.replace(prev_state);
        }
        self.in_call.replace(false);
        res
    }

    /// Verifies that all mock expectations have been met (and resets the expectations).
    pub fn verify(&self) {
        self.expectations.borrow_mut().verify()
    }

    /// Clears all mock expectations.
    pub fn reset(&self) {
        self.expectations.borrow_mut().reset();
    }

    ///// Mock expectations /////

    #[allow(dead_code)]
    pub fn expect_validate_caller_addr(&self, addr: Vec<Address>) {
        assert!(!addr.is_empty(), "addrs must be non-empty");
        self.expectations.borrow_mut().expect_validate_caller_addr = Some(addr);
    }

    #[allow(dead_code)]
    pub fn expect_validate_caller_type(&self, types: Vec<Type>) {
        assert!(!types.is_empty(), "types must be non-empty");
        self.expectations.borrow_mut().expect_validate_caller_type = Some(types);
    }

    #[allow(dead_code)]
    pub fn expect_validate_caller_any(&self) {
        self.expectations.borrow_mut().expect_validate_caller_any = true;
    }

    #[allow(dead_code)]
    pub fn expect_send_simple(
        &self,
        to: Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
        send_return: Option<IpldBlock>,
        exit_code: ExitCode,
    ) {
        self.expect_send(
            to,
            method,
            params,
            value,
            None,
            SendFlags::default(),
            send_return,
            exit_code,
            None,
        )
    }

    #[allow(dead_code)]
    #[allow(clippy::too_many_arguments)]
    pub fn expect_send(
        &self,
        to: Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
        gas_limit: Option<u64>,
        send_flags: SendFlags,
        send_return: Option<IpldBlock>,
        exit_code: ExitCode,
        send_error: Option<ErrorNumber>,
    ) {
        self.expectations.borrow_mut().expect_sends.push_back(ExpectedMessage {
            to,
            method,
            params,
            value,
            gas_limit,
            send_flags,
            send_return,
            exit_code,
            send_error,
        })
    }

    ///// Private helpers /////

    fn require_in_call(&self) {
        assert!(*self.in_call.borrow(), "invalid runtime invocation outside of method call")
    }

    fn store_put<T: Serialize>(&self, o: &T) -> Cid {
        self.store.put_cbor(&o, Code::Blake2b256).unwrap()
    }

    fn store_get<T: DeserializeOwned>(&self, cid: &Cid) -> T {
        self.store.get_cbor(cid).unwrap().unwrap()
    }
}

impl<BS> MessageInfo for MockRuntime<BS> {
    fn caller(&self) -> Address {
        *self.caller.borrow()
    }
    fn receiver(&self) -> Address {
        self.receiver
    }
    fn value_received(&self) -> TokenAmount {
        self.value_received.borrow().clone()
    }
}

impl<BS: Blockstore> Runtime for MockRuntime<BS> {
    type Blockstore = Rc<BS>;

    fn message(&self) -> &dyn MessageInfo {
        self.require_in_call();
        self
    }

    fn curr_epoch(&self) -> ChainEpoch {
        self.require_in_call();
        *self.epoch.borrow()
    }

    fn validate_immediate_caller_accept_any(&self) -> Result<(), ActorError> {
        self.require_in_call();
        assert!(
            self.expectations.borrow_mut().expect_validate_caller_any,
            "unexpected validate-caller-any"
        );
        self.expectations.borrow_mut().expect_validate_caller_any = false;
        Ok(())
    }

    fn validate_immediate_caller_is<'a, I>(&self, addresses: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Address>,
    {
        self.require_in_call();

        let addrs: Vec<Address> = addresses.into_iter().cloned().collect();

        let mut expectations = self.expectations.borrow_mut();
        assert!(
            expectations.expect_validate_caller_addr.is_some(),
            "unexpected validate caller addrs"
        );

        let expected_addrs = expectations.expect_validate_caller_addr.as_ref().unwrap();
        assert_eq!(
            &addrs, expected_addrs,
            "unexpected validate caller addrs {:?}, expected {:?}",
            addrs, &expectations.expect_validate_caller_addr
        );

        for expected in &addrs {
            if self.message().caller() == *expected {
                expectations.expect_validate_caller_addr = None;
                return Ok(());
            }
        }
        expectations.expect_validate_caller_addr = None;
        Err(actor_error!(forbidden;
                "caller address {:?} forbidden, allowed: {:?}",
                self.message().caller(), &addrs
        ))
    }

    fn validate_immediate_caller_type<'a, I>(&self, types: I) -> Result<(), ActorError>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        self.require_in_call();
        assert!(
            self.expectations.borrow_mut().expect_validate_caller_type.is_some(),
            "unexpected validate caller code"
        );

        let types: Vec<Type> = types.into_iter().copied().collect();
        let expected_caller_type =
            self.expectations.borrow_mut().expect_validate_caller_type.clone().unwrap();
        assert_eq!(
            &types, &expected_caller_type,
            "unexpected validate caller code {:?}, expected {:?}",
            types, expected_caller_type,
        );

        if let Some(call_type) = self.resolve_builtin_actor_type(&self.caller_type.borrow()) {
            for expected in &types {
                if &call_type == expected {
                    self.expectations.borrow_mut().expect_validate_caller_type = None;
                    return Ok(());
                }
            }
        }

        self.expectations.borrow_mut().expect_validate_caller_type = None;
        Err(actor_error!(forbidden; "caller type {:?} forbidden, allowed: {:?}",
                self.caller_type, types))
    }

    fn current_balance(&self) -> TokenAmount {
        self.require_in_call();
        self.balance.borrow().clone()
    }

    fn resolve_address(&self, address: &Address) -> Option<ActorID> {
        self.require_in_call();
        if let &Payload::ID(id) = address.payload() {
            return Some(id);
        }

        match self.get_id_address(address) {
            None => None,
            Some(addr) => {
                if let &Payload::ID(id) = addr.payload() {
                    return Some(id);
                }
                None
            }
        }
    }

    fn get_actor_code_cid(&self, id: &ActorID) -> Option<Cid> {
        self.require_in_call();
        self.actor_code_cids.borrow().get(&Address::new_id(*id)).cloned()
    }

    fn resolve_builtin_actor_type(&self, code_id: &Cid) -> Option<Type> {
        (*ACTOR_TYPES).get(code_id).cloned()
    }

    fn create<T: Serialize>(&self, obj: &T) -> Result<(), ActorError> {
        if self.state.borrow().is_some() {
            return Err(actor_error!(illegal_state; "state already constructed"));
        }
        self.state.replace(Some(self.store_put(obj)));
        Ok(())
    }

    fn state<T: DeserializeOwned>(&self) -> Result<T, ActorError> {
        Ok(self.store_get(self.state.borrow().as_ref().unwrap()))
    }

    fn get_state_root(&self) -> Result<Cid, ActorError> {
        Ok(self.state.borrow().unwrap_or(*EMPTY_ARR_CID))
    }

    fn set_state_root(&self, root: &Cid) -> Result<(), ActorError> {
        self.state.replace(Some(*root));
        Ok(())
    }

    fn transaction<S, RT, F>(&self, f: F) -> Result<RT, ActorError>
    where
        S: Serialize + DeserializeOwned,
        F: FnOnce(&mut S, &Self) -> Result<RT, ActorError>,
    {
        if *self.in_transaction.borrow() {
            return Err(actor_error!(assertion_failed; "nested transaction"));
        }
        let mut read_only = self.state()?;
        self.in_transaction.replace(true);
        let ret = f(&mut read_only, self);
        if ret.is_ok() {
            self.state.replace(Some(self.store_put(&read_only)));
        }
        self.in_transaction.replace(false);
        ret
    }

    fn store(&self) -> &Rc<BS> {
        &self.store
    }

    fn send(
        &self,
        to: &Address,
        method: MethodNum,
        params: Option<IpldBlock>,
        value: TokenAmount,
        gas_limit: Option<u64>,
        send_flags: SendFlags,
    ) -> Result<Response, SendError> {
        self.require_in_call();
        if *self.in_transaction.borrow() {
            return Ok(Response { exit_code: ExitCode::USR_ASSERTION_FAILED, return_data: None });
        }

        assert!(
            !self.expectations.borrow_mut().expect_sends.is_empty(),
            "unexpected message to: {:?} method: {:?}, value: {:?}, params: {:?}",
            to,
            method,
            value,
            params
        );

        let expected_msg = self.expectations.borrow_mut().expect_sends.pop_front().unwrap();

        assert_eq!(expected_msg.to, *to);
        assert_eq!(expected_msg.method, method);
        assert_eq!(expected_msg.params, params);
        assert_eq!(expected_msg.value, value);
        assert_eq!(expected_msg.gas_limit, gas_limit, "gas limit did not match expectation");
        assert_eq!(expected_msg.send_flags, send_flags, "send flags did not match expectation");

        if let Some(e) = expected_msg.send_error {
            return Err(SendError(e));
        }

        {
            let mut balance = self.balance.borrow_mut();
            if value > *balance {
                return Err(SendError(ErrorNumber::InsufficientFunds));
            }
            *balance -= value;
        }

        Ok(Response { exit_code: expected_msg.exit_code, return_data: expected_msg.send_return })
    }
}

// The Expectations are by default verified on drop().
// In order to clear the unsatisfied expectations in tests, use MockRuntime#reset().
impl Drop for Expectations {
    fn drop(&mut self) {
        if !self.skip_verification_on_drop && !std::thread::panicking() {
            self.verify();
        }
    }
}

// The multihash library doesn't support the filecoin piece hash, so we fake it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Multihash)]
#[mh(alloc_size = 64)]
enum MhCode {
    #[mh(code = 0x1012, hasher = multihash::Sha2_256)]
    Sha256TruncPaddedFake,
}

fn make_cid(input: &[u8], prefix: u64, hash: MhCode) -> Cid {
    let hash = hash.digest(input);
    Cid::new_v1(prefix, hash)
}

pub fn make_cid_sha(input: &[u8], prefix: u64) -> Cid {
    make_cid(input, prefix, MhCode::Sha256TruncPaddedFake)
}

pub fn make_piece_cid(input: &[u8]) -> Cid {
    make_cid_sha(input, FIL_COMMITMENT_UNSEALED)
}

pub fn new_bls_addr(s: u8) -> Address {
    let seed = [s; 32];
    let mut rng: StdRng = SeedableRng::from_seed(seed);
    let mut key = [0u8; 48];
    rng.fill_bytes(&mut key);
    Address::new_bls(&key).unwrap()
}

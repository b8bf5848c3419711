//! In-memory chain used to exercise the relayer without a node

use crate::chain::{ChainClient, ChainError, ChainReceipt};
use async_trait::async_trait;
use credence_contracts::{
    account::{CreateAccountCall, ExecuteCall},
    registry::{IssueCredentialCall, RevokeCredentialCall, VerifyCredentialCall},
};
use credence_primitives::{
    constants::entry_point, OnChainCredential, OnChainStatus, UserOperationSigned,
};
use ethers::{
    abi::AbiDecode,
    types::{Address, Bytes, H256, U256},
    utils::keccak256,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// First id the mock registry assigns
pub const FIRST_ON_CHAIN_ID: u64 = 1000;
/// Block number of the first mined transaction
pub const FIRST_BLOCK: u64 = 100;

#[derive(Debug, Clone)]
enum Submission {
    Operations(Vec<UserOperationSigned>),
    Transaction { data: Bytes },
}

#[derive(Debug, Clone)]
struct SubmissionFailure {
    message: String,
    mined: bool,
}

#[derive(Debug)]
struct State {
    nonces: HashMap<Address, U256>,
    deployed: HashSet<Address>,
    fees: (U256, U256),
    call_gas: Result<U256, String>,
    failures: VecDeque<SubmissionFailure>,
    revert_next: bool,
    read_error: Option<String>,
    auto_mine: bool,
    next_hash: u64,
    next_block: u64,
    unmined: Vec<(H256, Submission)>,
    receipts: HashMap<H256, ChainReceipt>,
    credentials: BTreeMap<U256, (OnChainCredential, Address)>,
    issued: Vec<(Address, U256)>,
    next_credential_id: U256,
    handle_ops: Vec<Vec<UserOperationSigned>>,
    transactions: Vec<(Address, U256, Bytes)>,
}

/// Chain client mock
///
/// Submissions are mined immediately unless auto mining is turned off. The registry contract is
/// emulated: `execute` call data of relayed operations is decoded and applied.
#[derive(Debug)]
pub struct MockChainClient {
    chain_id: u64,
    entry_point: Address,
    state: Mutex<State>,
}

impl MockChainClient {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            entry_point: entry_point::ADDRESS.parse().unwrap_or_default(),
            state: Mutex::new(State {
                nonces: HashMap::new(),
                deployed: HashSet::new(),
                fees: (U256::from(2_000_000_000u64), U256::from(1_000_000_000u64)),
                call_gas: Ok(U256::from(50_000)),
                failures: VecDeque::new(),
                revert_next: false,
                read_error: None,
                auto_mine: true,
                next_hash: 1,
                next_block: FIRST_BLOCK,
                unmined: Vec::new(),
                receipts: HashMap::new(),
                credentials: BTreeMap::new(),
                issued: Vec::new(),
                next_credential_id: U256::from(FIRST_ON_CHAIN_ID),
                handle_ops: Vec::new(),
                transactions: Vec::new(),
            }),
        }
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point
    }

    /// Address the factory assigns to `(owner, salt)`
    pub fn account_address(owner: &Address, salt: U256) -> Address {
        let mut buf = owner.as_bytes().to_vec();
        let mut word = [0u8; 32];
        salt.to_big_endian(&mut word);
        buf.extend_from_slice(&word);
        Address::from_slice(&keccak256(buf)[12..])
    }

    pub fn set_nonce(&self, sender: Address, nonce: U256) {
        self.state.lock().nonces.insert(sender, nonce);
    }

    pub fn set_call_gas(&self, gas: U256) {
        self.state.lock().call_gas = Ok(gas);
    }

    pub fn fail_call_gas_estimation(&self, message: &str) {
        self.state.lock().call_gas = Err(message.into());
    }

    /// The next submission is rejected and never reaches the chain
    pub fn fail_next_submission(&self, message: &str) {
        let failure = SubmissionFailure { message: message.into(), mined: false };
        self.state.lock().failures.push_back(failure);
    }

    /// The next submission is included, but the node answers with an error
    pub fn fail_next_submission_after_mining(&self, message: &str) {
        let failure = SubmissionFailure { message: message.into(), mined: true };
        self.state.lock().failures.push_back(failure);
    }

    /// The next relayed user operation reverts inside `handleOps`
    pub fn revert_next_user_operation(&self) {
        self.state.lock().revert_next = true;
    }

    /// Makes every registry read fail with `message` (`None` restores them)
    pub fn fail_reads(&self, message: Option<&str>) {
        self.state.lock().read_error = message.map(String::from);
    }

    pub fn set_auto_mine(&self, auto_mine: bool) {
        self.state.lock().auto_mine = auto_mine;
    }

    /// Mines every transaction broadcast while auto mining was off
    pub fn mine(&self) {
        let mut state = self.state.lock();
        let unmined = std::mem::take(&mut state.unmined);
        for (hash, submission) in unmined {
            self.include(&mut state, hash, submission);
        }
    }

    pub fn deploy(&self, address: Address) {
        self.state.lock().deployed.insert(address);
    }

    /// Issues a credential directly on the registry
    pub fn issue(&self, issuer: Address, subject: Address, name: &str, description: &str) -> U256 {
        let mut state = self.state.lock();
        Self::issue_credential(&mut state, issuer, subject, name.into(), description.into())
    }

    /// `handleOps` bundles broadcast so far
    pub fn handle_ops_calls(&self) -> Vec<Vec<UserOperationSigned>> {
        self.state.lock().handle_ops.clone()
    }

    /// Plain transactions broadcast so far
    pub fn transactions(&self) -> Vec<(Address, U256, Bytes)> {
        self.state.lock().transactions.clone()
    }

    /// Number of broadcasts, failed or not
    pub fn submissions(&self) -> usize {
        let state = self.state.lock();
        state.handle_ops.len() + state.transactions.len()
    }

    pub fn credential(&self, id: U256) -> Option<OnChainCredential> {
        self.state.lock().credentials.get(&id).map(|(credential, _)| credential.clone())
    }

    fn issue_credential(
        state: &mut State,
        issuer: Address,
        subject: Address,
        name: String,
        description: String,
    ) -> U256 {
        let id = state.next_credential_id;
        state.next_credential_id = id + 1;
        state.credentials.insert(
            id,
            (
                OnChainCredential {
                    issuer,
                    subject,
                    name,
                    description,
                    status: OnChainStatus::Pending,
                },
                subject,
            ),
        );
        state.issued.push((subject, id));
        id
    }

    /// Applies a registry call made by `sender`, returning the ids it issued
    fn apply_registry_call(state: &mut State, sender: Address, data: &[u8]) -> Vec<U256> {
        if let Ok(call) = IssueCredentialCall::decode(data) {
            return vec![Self::issue_credential(
                state,
                sender,
                call.subject,
                call.name,
                call.description,
            )];
        }
        if let Ok(call) = VerifyCredentialCall::decode(data) {
            if let Some((credential, _)) = state.credentials.get_mut(&call.credential_id) {
                credential.status = OnChainStatus::from(call.status);
            }
        } else if let Ok(call) = RevokeCredentialCall::decode(data) {
            if let Some((credential, _)) = state.credentials.get_mut(&call.credential_id) {
                credential.status = OnChainStatus::Revoked;
            }
        }
        vec![]
    }

    fn include(&self, state: &mut State, hash: H256, submission: Submission) {
        let block_number = state.next_block;
        state.next_block += 1;

        let mut user_operations = vec![];
        let mut issued_credentials = vec![];
        match submission {
            Submission::Operations(ops) => {
                for uo in ops {
                    let nonce = state.nonces.entry(uo.sender).or_default();
                    *nonce = *nonce + 1;

                    let success = !std::mem::take(&mut state.revert_next);
                    if success {
                        if let Ok(call) = ExecuteCall::decode(uo.call_data.as_ref()) {
                            issued_credentials.extend(Self::apply_registry_call(
                                state,
                                uo.sender,
                                call.func.as_ref(),
                            ));
                        }
                    }
                    user_operations.push((uo.hash(&self.entry_point, self.chain_id), success));
                }
            }
            Submission::Transaction { data } => {
                if let Ok(call) = CreateAccountCall::decode(data.as_ref()) {
                    state.deployed.insert(Self::account_address(&call.owner, call.salt));
                }
            }
        }

        state.receipts.insert(
            hash,
            ChainReceipt {
                transaction_hash: hash,
                block_number,
                success: true,
                user_operations,
                issued_credentials,
            },
        );
    }

    fn submit(&self, submission: Submission) -> Result<H256, ChainError> {
        let mut state = self.state.lock();
        let hash = H256::from_low_u64_be(state.next_hash);
        state.next_hash += 1;

        match &submission {
            Submission::Operations(ops) => state.handle_ops.push(ops.clone()),
            Submission::Transaction { data } => {
                state.transactions.push((Address::zero(), U256::zero(), data.clone()))
            }
        }

        if let Some(failure) = state.failures.pop_front() {
            if failure.mined {
                self.include(&mut state, hash, submission);
            }
            return Err(ChainError::Provider(failure.message));
        }

        if state.auto_mine {
            self.include(&mut state, hash, submission);
        } else {
            state.unmined.push((hash, submission));
        }
        Ok(hash)
    }

    fn read_error(&self) -> Result<(), ChainError> {
        match &self.state.lock().read_error {
            Some(message) => Err(ChainError::Provider(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn chain_id(&self) -> Result<u64, ChainError> {
        Ok(self.chain_id)
    }

    async fn get_nonce(&self, sender: &Address) -> Result<U256, ChainError> {
        Ok(self.state.lock().nonces.get(sender).copied().unwrap_or_default())
    }

    async fn estimate_fees(&self) -> Result<(U256, U256), ChainError> {
        Ok(self.state.lock().fees)
    }

    async fn estimate_call_gas(
        &self,
        _sender: &Address,
        _call_data: &Bytes,
    ) -> Result<U256, ChainError> {
        self.state.lock().call_gas.clone().map_err(ChainError::Provider)
    }

    async fn handle_ops(
        &self,
        ops: Vec<UserOperationSigned>,
        _beneficiary: Address,
    ) -> Result<H256, ChainError> {
        self.submit(Submission::Operations(ops))
    }

    async fn send_transaction(
        &self,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<H256, ChainError> {
        let res = self.submit(Submission::Transaction { data });
        if let Some(last) = self.state.lock().transactions.last_mut() {
            last.0 = to;
            last.1 = value;
        }
        res
    }

    async fn receipt(&self, tx_hash: &H256) -> Result<Option<ChainReceipt>, ChainError> {
        Ok(self.state.lock().receipts.get(tx_hash).cloned())
    }

    async fn get_account_address(
        &self,
        owner: &Address,
        salt: U256,
    ) -> Result<Address, ChainError> {
        Ok(Self::account_address(owner, salt))
    }

    async fn is_deployed(&self, address: &Address) -> Result<bool, ChainError> {
        Ok(self.state.lock().deployed.contains(address))
    }

    async fn issued_credentials(&self, subject: &Address) -> Result<Vec<U256>, ChainError> {
        self.read_error()?;
        Ok(self
            .state
            .lock()
            .issued
            .iter()
            .filter(|(s, _)| s == subject)
            .map(|(_, id)| *id)
            .collect())
    }

    async fn get_credential(&self, id: U256) -> Result<Option<OnChainCredential>, ChainError> {
        self.read_error()?;
        Ok(self.credential(id))
    }

    async fn owner_of(&self, id: U256) -> Result<Option<Address>, ChainError> {
        self.read_error()?;
        Ok(self.state.lock().credentials.get(&id).map(|(_, owner)| *owner))
    }
}

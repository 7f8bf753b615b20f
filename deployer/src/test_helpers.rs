//! In-memory ledger and reporter used to drive the sequencer in tests

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy::json_abi::JsonAbi;
use alloy_primitives::{address, Address, Log, TxHash};
use alloy_sol_types::{SolCall, SolEvent};

use crate::{
    artifacts::{ArtifactDescriptor, ArtifactRegistry},
    constants::{
        IMPLEMENTATION_ARTIFACT, MASTER_MINTER_ARTIFACT, PROXY_ARTIFACT,
        SIGNATURE_CHECKER_ARTIFACT, SIGNATURE_CHECKER_PLACEHOLDER,
    },
    errors::DeployError,
    ledger::{ConfirmationWaiter, Operation, Outcome, PendingHandle, SubmissionGateway},
    params::{DeploymentParameters, RoleAssignment, TokenMetadata},
    reporter::{ProgressEvent, ProgressReporter},
    sequencer::{CancelToken, Sequencer, SequencerConfig, Topology},
    solidity::ITokenDeploymentHelper,
};

/// The first Anvil dev account, used as the caller
pub const ALICE: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
/// The second Anvil dev account, used as the proxy admin
pub const BOB: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
/// The address of the batched deployment helper
pub const HELPER: Address = address!("9fE46736679d2D9a65F0992F2272dE9f3c7fa6e0");

/// The library creation payload
pub const LIBRARY_PAYLOAD: &str = "6080600a";
/// The proxy creation payload
pub const PROXY_PAYLOAD: &str = "60806001";
/// The master minter creation payload
pub const MASTER_MINTER_PAYLOAD: &str = "60806002";

/// The implementation creation payload, referencing the library twice
pub fn implementation_payload() -> String {
    format!("6080{SIGNATURE_CHECKER_PLACEHOLDER}5050{SIGNATURE_CHECKER_PLACEHOLDER}00")
}

/// An ABI exposing argument-less functions with the given names
pub fn abi_with(functions: &[&str]) -> JsonAbi {
    let items: Vec<serde_json::Value> = functions
        .iter()
        .map(|name| {
            serde_json::json!({
                "type": "function",
                "name": name,
                "inputs": [],
                "outputs": [],
                "stateMutability": "nonpayable",
            })
        })
        .collect();
    serde_json::from_value(serde_json::Value::Array(items)).unwrap()
}

/// A registry holding the four artifacts a deployment needs
pub fn test_artifacts() -> ArtifactRegistry {
    let mut registry = ArtifactRegistry::new();
    registry.insert(ArtifactDescriptor::new(
        SIGNATURE_CHECKER_ARTIFACT,
        JsonAbi::default(),
        LIBRARY_PAYLOAD,
    ));
    registry.insert(ArtifactDescriptor::new(
        IMPLEMENTATION_ARTIFACT,
        abi_with(&["initialize", "initializeV2", "initializeV2_1", "initializeV2_2"]),
        &implementation_payload(),
    ));
    registry.insert(ArtifactDescriptor::new(
        PROXY_ARTIFACT,
        abi_with(&["changeAdmin", "upgradeTo"]),
        PROXY_PAYLOAD,
    ));
    registry.insert(ArtifactDescriptor::new(
        MASTER_MINTER_ARTIFACT,
        abi_with(&["transferOwnership"]),
        MASTER_MINTER_PAYLOAD,
    ));
    registry
}

/// A "USD Coin" deployment with every role held by `caller`
pub fn usdc_params(caller: Address, proxy_admin: Address) -> DeploymentParameters {
    DeploymentParameters::new(
        TokenMetadata {
            name: "USD Coin".to_string(),
            symbol: "USDC".to_string(),
            currency: "USD".to_string(),
            decimals: 6,
        },
        RoleAssignment::Caller,
        proxy_admin,
        caller,
    )
}

/// A sequencer over the fake ledger with no retry backoff
pub fn test_sequencer(
    artifacts: ArtifactRegistry,
    ledger: &FakeLedger,
    reporter: &RecordingReporter,
    topology: Topology,
) -> Sequencer<FakeLedger, FakeLedger, RecordingReporter> {
    let config = SequencerConfig {
        topology,
        retry_backoff: Duration::ZERO,
        ..Default::default()
    };
    Sequencer::new(artifacts, ledger.clone(), ledger.clone(), reporter.clone(), config)
}

// ---------------
// | Fake Ledger |
// ---------------

/// An entry in the fake ledger's journal, keyed by submission ordinal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEvent {
    /// The ledger accepted the submission
    Submitted(usize),
    /// The submission finalized
    Confirmed(usize),
}

/// The shared state of a fake ledger
#[derive(Default)]
struct FakeLedgerInner {
    /// Every call to `submit`, including failed ones
    attempts: usize,
    /// The nonce each call to `submit` carried
    attempt_nonces: Vec<u64>,
    /// The accepted submissions, in order
    submissions: Vec<Operation>,
    /// Submissions and confirmations, in the order they happened
    journal: Vec<LedgerEvent>,
    /// Errors to return from `submit` before accepting the given ordinal
    submit_failures: HashMap<usize, VecDeque<DeployError>>,
    /// Ordinals the ledger accepts but whose acceptance the caller never hears of
    lost_responses: HashSet<usize>,
    /// Errors to return when confirming the given ordinal
    confirm_failures: HashMap<usize, DeployError>,
    /// A token to cancel once the given ordinal is confirmed
    cancel_on_confirm: Option<(usize, CancelToken)>,
    /// Whether the batch helper forgets to emit its event
    omit_batch_event: bool,
    /// Accepted submissions awaiting confirmation
    pending: HashMap<TxHash, (usize, Outcome)>,
}

/// A ledger that accepts everything unless scripted otherwise.
///
/// Submissions are numbered by the order the ledger accepts them
#[derive(Clone)]
pub struct FakeLedger {
    /// The signing account
    caller: Address,
    /// The ledger state, shared by the gateway and waiter halves
    inner: Arc<Mutex<FakeLedgerInner>>,
}

impl FakeLedger {
    /// A ledger signing as `caller`
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            inner: Arc::default(),
        }
    }

    /// The address the deployment at the given ordinal creates
    pub fn deployed_address(ordinal: usize) -> Address {
        Address::repeat_byte(0x10 + ordinal as u8)
    }

    /// The batch helper's proxy address
    pub fn batched_proxy() -> Address {
        Address::repeat_byte(0xb1)
    }

    /// The batch helper's master minter address
    pub fn batched_master_minter() -> Address {
        Address::repeat_byte(0xb2)
    }

    /// Fail the next submission attempt targeting the given ordinal
    pub fn fail_submission(&self, ordinal: usize, err: DeployError) {
        let mut inner = self.inner.lock().unwrap();
        inner.submit_failures.entry(ordinal).or_default().push_back(err);
    }

    /// Accept the given ordinal, but fail the submission as if the response
    /// was lost in transit
    pub fn lose_submission_response(&self, ordinal: usize) {
        self.inner.lock().unwrap().lost_responses.insert(ordinal);
    }

    /// Fail the confirmation of the given ordinal
    pub fn fail_confirmation(&self, ordinal: usize, err: DeployError) {
        self.inner.lock().unwrap().confirm_failures.insert(ordinal, err);
    }

    /// Cancel the token as soon as the given ordinal is confirmed
    pub fn cancel_after_confirmation(&self, ordinal: usize, token: CancelToken) {
        self.inner.lock().unwrap().cancel_on_confirm = Some((ordinal, token));
    }

    /// Make the batch helper succeed without emitting `TokenDeployed`
    pub fn omit_batch_event(&self) {
        self.inner.lock().unwrap().omit_batch_event = true;
    }

    /// Every accepted submission
    pub fn submissions(&self) -> Vec<Operation> {
        self.inner.lock().unwrap().submissions.clone()
    }

    /// The number of calls to `submit`
    pub fn attempts(&self) -> usize {
        self.inner.lock().unwrap().attempts
    }

    /// The nonce each call to `submit` carried
    pub fn attempt_nonces(&self) -> Vec<u64> {
        self.inner.lock().unwrap().attempt_nonces.clone()
    }

    /// The journal of submissions and confirmations
    pub fn journal(&self) -> Vec<LedgerEvent> {
        self.inner.lock().unwrap().journal.clone()
    }

    /// The hash of the transaction at the given ordinal
    pub fn tx_hash(ordinal: usize) -> TxHash {
        TxHash::with_last_byte(ordinal as u8 + 1)
    }

    /// The `TokenDeployed` log the helper emits for a batch
    fn batch_logs(target: Address, calldata: &[u8]) -> Vec<Log> {
        let Ok(call) = ITokenDeploymentHelper::deployAndInitializeCall::abi_decode(calldata, true)
        else {
            return Vec::new();
        };
        let event = ITokenDeploymentHelper::TokenDeployed {
            proxy: Self::batched_proxy(),
            masterMinter: Self::batched_master_minter(),
            implementation: call.implementation,
        };
        vec![Log {
            address: target,
            data: event.encode_log_data(),
        }]
    }
}

impl SubmissionGateway for FakeLedger {
    fn caller(&self) -> Address {
        self.caller
    }

    async fn next_nonce(&self) -> Result<u64, DeployError> {
        Ok(self.inner.lock().unwrap().submissions.len() as u64)
    }

    async fn submit(&self, operation: Operation, nonce: u64) -> Result<PendingHandle, DeployError> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts += 1;
        inner.attempt_nonces.push(nonce);

        let ordinal = inner.submissions.len();
        if nonce != ordinal as u64 {
            return Err(DeployError::InvalidOperation(format!(
                "nonce too low: next nonce {ordinal}, tx nonce {nonce}"
            )));
        }
        if let Some(err) = inner
            .submit_failures
            .get_mut(&ordinal)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let tx_hash = Self::tx_hash(ordinal);
        let (contract_address, logs) = match &operation {
            Operation::Deploy { .. } => (Some(Self::deployed_address(ordinal)), Vec::new()),
            Operation::Invoke {
                target,
                method,
                calldata,
            } if *method == "deployAndInitialize" && !inner.omit_batch_event => {
                (None, Self::batch_logs(*target, calldata))
            }
            Operation::Invoke { .. } => (None, Vec::new()),
        };
        let outcome = Outcome {
            tx_hash,
            contract_address,
            logs,
        };

        inner.submissions.push(operation.clone());
        inner.journal.push(LedgerEvent::Submitted(ordinal));
        inner.pending.insert(tx_hash, (ordinal, outcome));

        if inner.lost_responses.remove(&ordinal) {
            return Err(DeployError::Network("response dropped".to_string()));
        }

        Ok(PendingHandle {
            tx_hash,
            from: self.caller,
            nonce,
            operation,
        })
    }
}

impl ConfirmationWaiter for FakeLedger {
    async fn await_confirmation(&self, handle: &PendingHandle) -> Result<Outcome, DeployError> {
        let mut inner = self.inner.lock().unwrap();
        let (ordinal, outcome) = inner
            .pending
            .remove(&handle.tx_hash)
            .expect("confirmation awaited for an unknown submission");

        if let Some(err) = inner.confirm_failures.remove(&ordinal) {
            return Err(err);
        }

        inner.journal.push(LedgerEvent::Confirmed(ordinal));
        if let Some((at, token)) = &inner.cancel_on_confirm {
            if *at == ordinal {
                token.cancel();
            }
        }

        Ok(outcome)
    }
}

// ----------------------
// | Recording Reporter |
// ----------------------

/// Records every event it receives
#[derive(Clone, Default)]
pub struct RecordingReporter {
    /// The events received so far
    events: Arc<Mutex<Vec<ProgressEvent>>>,
}

impl RecordingReporter {
    /// The events received so far
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressReporter for RecordingReporter {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

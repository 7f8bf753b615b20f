//! The boundary between the sequencer and the remote ledger
//!
//! Submission and confirmation are separate seams: a submission that the
//! ledger has accepted must never be repeated under a fresh nonce, so the
//! sequencer needs to know exactly which side of that line a failure happened
//! on, and pins one nonce per step.

use std::future::Future;

use alloy_primitives::{Address, Bytes, Log, TxHash};

use crate::errors::DeployError;

/// A ledger-mutating operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create a contract from the given creation payload
    Deploy {
        /// The fully linked creation bytecode
        payload: Bytes,
        /// The ABI-encoded constructor arguments, appended to the payload
        constructor_args: Bytes,
    },
    /// Call a method on a deployed contract
    Invoke {
        /// The contract to call
        target: Address,
        /// The name of the method, for reporting
        method: &'static str,
        /// The ABI-encoded calldata, selector included
        calldata: Bytes,
    },
}

impl Operation {
    /// The input data of the transaction carrying this operation
    pub fn input(&self) -> Bytes {
        match self {
            Operation::Deploy {
                payload,
                constructor_args,
            } => [&payload[..], &constructor_args[..]].concat().into(),
            Operation::Invoke { calldata, .. } => calldata.clone(),
        }
    }

    /// The call target, `None` for a contract creation
    pub fn target(&self) -> Option<Address> {
        match self {
            Operation::Deploy { .. } => None,
            Operation::Invoke { target, .. } => Some(*target),
        }
    }
}

/// A submission the ledger has accepted but not yet finalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHandle {
    /// The hash of the submitted transaction
    pub tx_hash: TxHash,
    /// The account that submitted it
    pub from: Address,
    /// The nonce it was signed with
    pub nonce: u64,
    /// The submitted operation
    pub operation: Operation,
}

/// The finalized result of a submission that executed successfully
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The hash of the finalized transaction
    pub tx_hash: TxHash,
    /// The address of the created contract, for deployments
    pub contract_address: Option<Address>,
    /// The logs emitted by the transaction
    pub logs: Vec<Log>,
}

/// Submits operations to the remote ledger
pub trait SubmissionGateway {
    /// The account submissions are signed by
    fn caller(&self) -> Address;

    /// The nonce the caller's next submission must carry
    fn next_nonce(&self) -> impl Future<Output = Result<u64, DeployError>> + Send;

    /// Submit one operation signed with `nonce`, returning once the ledger has
    /// accepted it.
    ///
    /// Fails with `UserDeclined`, `Network` or `InvalidOperation`. Resubmitting
    /// after `Network` is only safe with the same nonce: if the first attempt
    /// landed, the ledger rejects the second as `InvalidOperation`
    fn submit(
        &self,
        operation: Operation,
        nonce: u64,
    ) -> impl Future<Output = Result<PendingHandle, DeployError>> + Send;
}

/// Waits for accepted submissions to finalize
pub trait ConfirmationWaiter {
    /// Suspend until the submission is finalized.
    ///
    /// Fails with `Reverted` if it executed and failed, or `Timeout` if no
    /// finalization was observed within the wait window
    fn await_confirmation(
        &self,
        handle: &PendingHandle,
    ) -> impl Future<Output = Result<Outcome, DeployError>> + Send;
}

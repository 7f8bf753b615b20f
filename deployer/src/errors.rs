//! Definitions of errors that can occur while provisioning a token deployment

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
    time::Duration,
};

use alloy_primitives::TxHash;

use crate::sequencer::StepId;

/// Errors that can occur while resolving, linking, submitting, or confirming
/// the steps of a deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployError {
    /// The signer refused to authorize a submission
    UserDeclined(String),
    /// A transient transport failure before the ledger accepted the submission
    Network(String),
    /// The submission was malformed or rejected outright by the node
    InvalidOperation(String),
    /// The operation executed on the ledger but failed logically
    Reverted {
        /// The reason reported by the contract
        reason: String,
    },
    /// No finalized receipt was observed within the wait window.
    ///
    /// The ledger state is unknown; the operator must verify it by hand
    Timeout {
        /// The hash of the transaction that was being awaited
        tx_hash: TxHash,
        /// How long we waited before giving up
        waited: Duration,
    },
    /// A placeholder in a template payload has no matching dependency address
    UnresolvedPlaceholder(String),
    /// A placeholder in a template payload does not match the fixed format
    MalformedTemplate {
        /// The offset of the offending placeholder in the template
        offset: usize,
        /// A description of what is wrong with it
        reason: String,
    },
    /// A pre-flight check on the deployment parameters failed
    InvariantViolation(String),
    /// No artifact with the given name is known
    ArtifactNotFound(String),
    /// An artifact could not be parsed
    ArtifactParsing(String),
    /// A deployment receipt carried no contract address
    MissingContractAddress(StepId),
    /// A confirmed receipt did not carry an event the step depends on
    MissingEvent(StepId),
    /// The run was cancelled between steps
    Cancelled,
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error reading a file
    ReadFile(String),
    /// Error writing a file
    WriteFile(String),
}

impl DeployError {
    /// Whether the step that produced this error may be resubmitted.
    ///
    /// Only transport failures that occurred before the ledger accepted the
    /// submission qualify
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeployError::Network(_))
    }
}

impl Display for DeployError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DeployError::UserDeclined(s) => write!(f, "signer declined the request: {}", s),
            DeployError::Network(s) => write!(f, "network error: {}", s),
            DeployError::InvalidOperation(s) => write!(f, "invalid operation: {}", s),
            DeployError::Reverted { reason } => write!(f, "transaction reverted: {}", reason),
            DeployError::Timeout { tx_hash, waited } => write!(
                f,
                "no finalized receipt for {:#x} after {}s, ledger state unknown",
                tx_hash,
                waited.as_secs()
            ),
            DeployError::UnresolvedPlaceholder(token) => {
                write!(f, "no address supplied for placeholder {}", token)
            }
            DeployError::MalformedTemplate { offset, reason } => {
                write!(f, "malformed placeholder at offset {}: {}", offset, reason)
            }
            DeployError::InvariantViolation(s) => write!(f, "invariant violation: {}", s),
            DeployError::ArtifactNotFound(name) => write!(f, "artifact not found: {}", name),
            DeployError::ArtifactParsing(s) => write!(f, "error parsing artifact: {}", s),
            DeployError::MissingContractAddress(step) => {
                write!(f, "receipt for {} carried no contract address", step)
            }
            DeployError::MissingEvent(step) => {
                write!(f, "receipt for {} did not emit the expected event", step)
            }
            DeployError::Cancelled => write!(f, "run cancelled"),
            DeployError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            DeployError::ReadFile(s) => write!(f, "error reading file: {}", s),
            DeployError::WriteFile(s) => write!(f, "error writing file: {}", s),
        }
    }
}

impl Error for DeployError {}

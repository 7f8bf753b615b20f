//! The state a single run accumulates as it advances

use std::{
    fmt::{self, Display},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use alloy_primitives::{Address, TxHash};
use serde::Serialize;

use crate::{errors::DeployError, params::DeploymentParameters};

/// The steps of a deployment, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum StepId {
    /// Deploy the `SignatureChecker` library
    DeployLibrary,
    /// Link the library address into the implementation bytecode
    LinkImplementation,
    /// Deploy the token implementation
    DeployImplementation,
    /// Deploy the proxy pointing at the implementation
    DeployProxy,
    /// Deploy the master minter pointing at the proxy
    DeployMasterMinter,
    /// Hand the master minter to its owner
    TransferMasterMinterOwnership,
    /// Hand the proxy to its admin
    ChangeProxyAdmin,
    /// Run the V1 initializer through the proxy
    InitializeV1,
    /// Run the V2 initializer through the proxy
    InitializeV2,
    /// Run the V2.1 initializer through the proxy
    InitializeV2_1,
    /// Run the V2.2 initializer through the proxy
    InitializeV2_2,
}

impl StepId {
    /// Every step, in order
    pub const ALL: [StepId; 11] = [
        StepId::DeployLibrary,
        StepId::LinkImplementation,
        StepId::DeployImplementation,
        StepId::DeployProxy,
        StepId::DeployMasterMinter,
        StepId::TransferMasterMinterOwnership,
        StepId::ChangeProxyAdmin,
        StepId::InitializeV1,
        StepId::InitializeV2,
        StepId::InitializeV2_1,
        StepId::InitializeV2_2,
    ];

    /// The steps the batched topology folds into one helper invocation
    pub const BATCHED: [StepId; 8] = [
        StepId::DeployProxy,
        StepId::DeployMasterMinter,
        StepId::TransferMasterMinterOwnership,
        StepId::ChangeProxyAdmin,
        StepId::InitializeV1,
        StepId::InitializeV2,
        StepId::InitializeV2_1,
        StepId::InitializeV2_2,
    ];

    /// The position of the step in the run
    pub fn index(self) -> usize {
        self as usize
    }

    /// The contract method the step invokes, for invocation steps
    pub fn method(self) -> Option<&'static str> {
        match self {
            StepId::TransferMasterMinterOwnership => Some("transferOwnership"),
            StepId::ChangeProxyAdmin => Some("changeAdmin"),
            StepId::InitializeV1 => Some("initialize"),
            StepId::InitializeV2 => Some("initializeV2"),
            StepId::InitializeV2_1 => Some("initializeV2_1"),
            StepId::InitializeV2_2 => Some("initializeV2_2"),
            _ => None,
        }
    }
}

impl Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepId::DeployLibrary => "deploy-library",
            StepId::LinkImplementation => "link-implementation",
            StepId::DeployImplementation => "deploy-implementation",
            StepId::DeployProxy => "deploy-proxy",
            StepId::DeployMasterMinter => "deploy-master-minter",
            StepId::TransferMasterMinterOwnership => "transfer-master-minter-ownership",
            StepId::ChangeProxyAdmin => "change-proxy-admin",
            StepId::InitializeV1 => "initialize-v1",
            StepId::InitializeV2 => "initialize-v2",
            StepId::InitializeV2_1 => "initialize-v2-1",
            StepId::InitializeV2_2 => "initialize-v2-2",
        };
        write!(f, "{name}")
    }
}

/// The status of a recorded step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepStatus {
    /// Submitted, not yet finalized
    Pending,
    /// Durably confirmed
    Confirmed,
    /// Failed; the run stopped here
    Failed,
}

/// The recorded result of one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepResult {
    /// The step
    pub step: StepId,
    /// The address the step produced, for deployments
    pub produced_address: Option<Address>,
    /// The transaction carrying the step, absent for the link step
    pub tx_hash: Option<TxHash>,
    /// The status of the step
    pub status: StepStatus,
    /// Why the step failed
    pub error: Option<String>,
}

impl StepResult {
    /// A confirmed step
    pub fn confirmed(
        step: StepId,
        produced_address: Option<Address>,
        tx_hash: Option<TxHash>,
    ) -> Self {
        Self {
            step,
            produced_address,
            tx_hash,
            status: StepStatus::Confirmed,
            error: None,
        }
    }

    /// A failed step
    pub fn failed(step: StepId, tx_hash: Option<TxHash>, error: &DeployError) -> Self {
        Self {
            step,
            produced_address: None,
            tx_hash,
            status: StepStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// The addresses produced by a fully confirmed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeploymentBundle {
    /// The token implementation
    pub implementation: Address,
    /// The proxy, i.e. the token's public address
    pub proxy: Address,
    /// The master minter
    pub master_minter: Address,
}

/// The state of one run, owned by the sequencer for the run's lifetime
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationState {
    /// The parameters the run was started with
    parameters: DeploymentParameters,
    /// The append-only ledger of step results
    results: Vec<StepResult>,
    /// The index of the next step to run
    current_step: usize,
}

impl OrchestrationState {
    /// The state at the start of a run
    pub fn new(parameters: DeploymentParameters) -> Self {
        Self {
            parameters,
            results: Vec::with_capacity(StepId::ALL.len()),
            current_step: 0,
        }
    }

    /// The parameters of the run
    pub fn parameters(&self) -> &DeploymentParameters {
        &self.parameters
    }

    /// The recorded results, in order
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    /// The next step to run, `None` once every step is confirmed
    pub fn current_step(&self) -> Option<StepId> {
        StepId::ALL.get(self.current_step).copied()
    }

    /// The address produced by a confirmed step
    pub fn produced_address(&self, step: StepId) -> Option<Address> {
        self.results
            .iter()
            .find(|r| r.step == step && r.status == StepStatus::Confirmed)
            .and_then(|r| r.produced_address)
    }

    /// Record the outcome of the current step.
    ///
    /// Results must arrive in step order; a confirmed result advances the run
    pub(crate) fn record(&mut self, result: StepResult) {
        debug_assert_eq!(Some(result.step), self.current_step(), "step recorded out of order");
        if result.status == StepStatus::Confirmed {
            self.current_step += 1;
        }
        self.results.push(result);
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalStatus {
    /// Every step is confirmed
    AllConfirmed(DeploymentBundle),
    /// The run stopped early
    Aborted {
        /// The step the run stopped at, `None` if it stopped pre-flight
        at_step: Option<StepId>,
        /// Why it stopped
        error: DeployError,
    },
}

/// The final state and status of a run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The state the run ended in
    pub state: OrchestrationState,
    /// How it ended
    pub status: TerminalStatus,
}

impl RunReport {
    /// The deployed addresses, if the run completed
    pub fn bundle(&self) -> Option<&DeploymentBundle> {
        match &self.status {
            TerminalStatus::AllConfirmed(bundle) => Some(bundle),
            TerminalStatus::Aborted { .. } => None,
        }
    }

    /// Convert into the bundle, or the error that stopped the run
    pub fn into_result(self) -> Result<DeploymentBundle, DeployError> {
        match self.status {
            TerminalStatus::AllConfirmed(bundle) => Ok(bundle),
            TerminalStatus::Aborted { error, .. } => Err(error),
        }
    }
}

/// A cooperative cancellation flag, checked between steps
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the step in flight still runs to completion
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::Address;

    use crate::params::{DeploymentParameters, RoleAssignment, TokenMetadata};

    use super::{OrchestrationState, StepId, StepResult};

    #[test]
    fn test_step_order_matches_indices() {
        for (i, step) in StepId::ALL.iter().enumerate() {
            assert_eq!(step.index(), i);
        }
        assert_eq!(StepId::BATCHED[0].index(), 3);
        assert_eq!(StepId::BATCHED[7], StepId::InitializeV2_2);
    }

    #[test]
    fn test_state_advances_only_on_confirmation() {
        let params = DeploymentParameters::new(
            TokenMetadata {
                name: "T".to_string(),
                symbol: "T".to_string(),
                currency: "USD".to_string(),
                decimals: 2,
            },
            RoleAssignment::Caller,
            Address::repeat_byte(2),
            Address::repeat_byte(1),
        );
        let mut state = OrchestrationState::new(params);
        assert_eq!(state.current_step(), Some(StepId::DeployLibrary));

        let library = Address::repeat_byte(9);
        state.record(StepResult::confirmed(StepId::DeployLibrary, Some(library), None));
        assert_eq!(state.current_step(), Some(StepId::LinkImplementation));
        assert_eq!(state.produced_address(StepId::DeployLibrary), Some(library));

        let err = crate::errors::DeployError::Cancelled;
        state.record(StepResult::failed(StepId::LinkImplementation, None, &err));
        assert_eq!(state.current_step(), Some(StepId::LinkImplementation));
        assert_eq!(state.results().len(), 2);
    }
}

//! The step sequencer: the state machine that provisions a deployment
//!
//! A run deploys the `SignatureChecker` library, links it into the
//! `FiatTokenV2_2` implementation, deploys the implementation, and then either
//! performs the proxy, master minter, handoff, and initialization steps one
//! submission at a time or hands them to a helper contract in one submission.
//!
//! Every step waits for the previous one to be durably confirmed, and the first
//! failure ends the run. Nothing already committed to the ledger is rolled back:
//! contracts confirmed before the failure stay deployed, and their addresses are
//! in the run's results for an operator to pick up.

pub mod state;

use std::{collections::HashMap, future::Future, time::Duration};

use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolEvent;
use tracing::{debug, error, info, warn};

use crate::{
    artifacts::{ArtifactDescriptor, ArtifactRegistry},
    constants::{
        DEFAULT_RETRY_BACKOFF, DEFAULT_SUBMIT_RETRIES, IMPLEMENTATION_ARTIFACT,
        MASTER_MINTER_ARTIFACT, PROXY_ARTIFACT, SIGNATURE_CHECKER_ARTIFACT,
        SIGNATURE_CHECKER_PLACEHOLDER,
    },
    errors::DeployError,
    ledger::{ConfirmationWaiter, Operation, Outcome, PendingHandle, SubmissionGateway},
    linker::{link, scan_placeholders},
    params::DeploymentParameters,
    reporter::{ProgressEvent, ProgressReporter},
    solidity::{
        address_constructor_args, change_admin_calldata, deploy_and_initialize_calldata,
        initialize_v1_calldata, initialize_v2_1_calldata, initialize_v2_2_calldata,
        initialize_v2_calldata, transfer_ownership_calldata, ITokenDeploymentHelper,
    },
};

pub use state::{
    CancelToken, DeploymentBundle, OrchestrationState, RunReport, StepId, StepResult, StepStatus,
    TerminalStatus,
};

/// The name of the batched helper's entrypoint
const BATCH_METHOD: &str = "deployAndInitialize";

/// How the steps after the implementation deployment reach the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    /// One submission per step
    Stepwise,
    /// One submission to a helper contract that deploys the proxy and master
    /// minter, hands off ownership and admin, and runs every initializer
    Batched {
        /// The address of the helper contract
        helper: Address,
    },
}

/// Tunables for a run
#[derive(Debug, Clone)]
pub struct SequencerConfig {
    /// The topology to run
    pub topology: Topology,
    /// Extra attempts for a submission that failed before reaching the ledger
    pub submit_retries: u32,
    /// The delay between submission attempts
    pub retry_backoff: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            topology: Topology::Stepwise,
            submit_retries: DEFAULT_SUBMIT_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// The point at which a run stopped
struct Abort {
    /// The step, `None` before the first step
    at_step: Option<StepId>,
    /// Why the run stopped
    error: DeployError,
}

/// The artifacts a run needs, resolved and checked before anything is submitted
struct Plan<'a> {
    /// The library artifact
    library: &'a ArtifactDescriptor,
    /// The implementation artifact
    implementation: &'a ArtifactDescriptor,
    /// The placeholder the library address is linked into
    library_placeholder: String,
    /// The topology-specific part of the plan
    topology: TopologyPlan<'a>,
}

/// The part of a plan that depends on the topology
enum TopologyPlan<'a> {
    /// The stepwise topology deploys the proxy and master minter itself
    Stepwise {
        /// The proxy artifact
        proxy: &'a ArtifactDescriptor,
        /// The master minter artifact
        master_minter: &'a ArtifactDescriptor,
    },
    /// The batched topology delegates to the helper
    Batched {
        /// The helper contract
        helper: Address,
    },
}

/// Runs deployments against a ledger
pub struct Sequencer<G, W, R> {
    /// The artifacts to deploy from
    artifacts: ArtifactRegistry,
    /// Submits operations to the ledger
    gateway: G,
    /// Waits for submissions to finalize
    waiter: W,
    /// Receives progress events
    reporter: R,
    /// Tunables
    config: SequencerConfig,
}

impl<G, W, R> Sequencer<G, W, R>
where
    G: SubmissionGateway,
    W: ConfirmationWaiter,
    R: ProgressReporter,
{
    /// Create a sequencer
    pub fn new(
        artifacts: ArtifactRegistry,
        gateway: G,
        waiter: W,
        reporter: R,
        config: SequencerConfig,
    ) -> Self {
        Self {
            artifacts,
            gateway,
            waiter,
            reporter,
            config,
        }
    }

    /// Run the pre-flight checks without submitting anything
    pub fn check(&self, params: &DeploymentParameters) -> Result<(), DeployError> {
        self.preflight(params).map(|_| ())
    }

    /// Provision a deployment.
    ///
    /// The run stops at the first failure or at a cancellation checkpoint;
    /// either way the report holds every result recorded up to that point
    pub async fn run(&self, params: DeploymentParameters, cancel: &CancelToken) -> RunReport {
        info!(
            caller = %format!("{:#x}", self.gateway.caller()),
            topology = ?self.config.topology,
            token = %params.token_symbol,
            "starting deployment"
        );

        let mut state = OrchestrationState::new(params);
        let status = match self.execute(&mut state, cancel).await {
            Ok(bundle) => {
                self.reporter.report(ProgressEvent::RunComplete { bundle });
                TerminalStatus::AllConfirmed(bundle)
            }
            Err(Abort { at_step, error }) => {
                match at_step {
                    Some(step) => error!(%step, %error, "deployment aborted"),
                    None => error!(%error, "deployment rejected before submitting anything"),
                }
                TerminalStatus::Aborted { at_step, error }
            }
        };

        RunReport { state, status }
    }

    /// Validate the parameters and resolve every artifact the run touches
    fn preflight(&self, params: &DeploymentParameters) -> Result<Plan<'_>, DeployError> {
        plan(
            &self.artifacts,
            self.config.topology,
            self.gateway.caller(),
            params,
        )
    }

    // -------------
    // | Execution |
    // -------------

    /// Run every step in order
    async fn execute(
        &self,
        state: &mut OrchestrationState,
        cancel: &CancelToken,
    ) -> Result<DeploymentBundle, Abort> {
        let plan = self
            .preflight(state.parameters())
            .map_err(|error| Abort {
                at_step: None,
                error,
            })?;

        let library = self
            .deploy_step(
                state,
                cancel,
                StepId::DeployLibrary,
                plan.library.payload_template(),
                Bytes::new(),
            )
            .await?;

        let linked = self.link_step(state, cancel, &plan, library)?;

        let implementation = self
            .deploy_step(
                state,
                cancel,
                StepId::DeployImplementation,
                &linked,
                Bytes::new(),
            )
            .await?;

        match plan.topology {
            TopologyPlan::Stepwise {
                proxy,
                master_minter,
            } => {
                self.run_stepwise(state, cancel, implementation, proxy, master_minter)
                    .await
            }
            TopologyPlan::Batched { helper } => {
                self.run_batched(state, cancel, implementation, helper).await
            }
        }
    }

    /// Link the library into the implementation template
    fn link_step(
        &self,
        state: &mut OrchestrationState,
        cancel: &CancelToken,
        plan: &Plan<'_>,
        library: Address,
    ) -> Result<String, Abort> {
        let step = StepId::LinkImplementation;
        self.begin(state, cancel, step)?;

        let dependencies = HashMap::from([(plan.library_placeholder.clone(), library)]);
        let linked = link(plan.implementation.payload_template(), &dependencies)
            .map_err(|e| self.fail(state, step, None, e))?;

        self.confirm(state, step, None, None);
        Ok(linked)
    }

    /// Steps 4 through 11, one submission each
    async fn run_stepwise(
        &self,
        state: &mut OrchestrationState,
        cancel: &CancelToken,
        implementation: Address,
        proxy_artifact: &ArtifactDescriptor,
        master_minter_artifact: &ArtifactDescriptor,
    ) -> Result<DeploymentBundle, Abort> {
        let params = state.parameters().clone();

        let proxy = self
            .deploy_step(
                state,
                cancel,
                StepId::DeployProxy,
                proxy_artifact.payload_template(),
                address_constructor_args(implementation),
            )
            .await?;

        let master_minter = self
            .deploy_step(
                state,
                cancel,
                StepId::DeployMasterMinter,
                master_minter_artifact.payload_template(),
                address_constructor_args(proxy),
            )
            .await?;

        let invocations = [
            (
                StepId::TransferMasterMinterOwnership,
                master_minter,
                transfer_ownership_calldata(params.master_minter_owner),
            ),
            (
                StepId::ChangeProxyAdmin,
                proxy,
                change_admin_calldata(params.proxy_admin),
            ),
            (
                StepId::InitializeV1,
                proxy,
                initialize_v1_calldata(&params, master_minter),
            ),
            (StepId::InitializeV2, proxy, initialize_v2_calldata(&params)),
            (
                StepId::InitializeV2_1,
                proxy,
                initialize_v2_1_calldata(&params),
            ),
            (
                StepId::InitializeV2_2,
                proxy,
                initialize_v2_2_calldata(&params),
            ),
        ];
        for (step, target, calldata) in invocations {
            self.invoke_step(state, cancel, step, target, calldata)
                .await?;
        }

        Ok(DeploymentBundle {
            implementation,
            proxy,
            master_minter,
        })
    }

    /// Steps 4 through 11 in a single helper invocation.
    ///
    /// The steps are still recorded and reported one by one, in order, once
    /// the batch is confirmed
    async fn run_batched(
        &self,
        state: &mut OrchestrationState,
        cancel: &CancelToken,
        implementation: Address,
        helper: Address,
    ) -> Result<DeploymentBundle, Abort> {
        let step = StepId::DeployProxy;
        self.begin(state, cancel, step)?;

        let calldata = deploy_and_initialize_calldata(implementation, state.parameters());
        let operation = Operation::Invoke {
            target: helper,
            method: BATCH_METHOD,
            calldata,
        };
        let outcome = self.submit_and_confirm(state, step, operation).await?;

        let deployed = outcome
            .logs
            .iter()
            .filter(|log| log.address == helper)
            .filter_map(|log| {
                ITokenDeploymentHelper::TokenDeployed::decode_log_data(&log.data, true).ok()
            })
            .find(|event| event.implementation == implementation)
            .ok_or_else(|| {
                self.fail(
                    state,
                    step,
                    Some(outcome.tx_hash),
                    DeployError::MissingEvent(step),
                )
            })?;

        let tx_hash = Some(outcome.tx_hash);
        self.confirm(state, step, Some(deployed.proxy), tx_hash);
        for step in &StepId::BATCHED[1..] {
            self.reporter
                .report(ProgressEvent::StepStarted { step: *step });
            let produced = (*step == StepId::DeployMasterMinter).then_some(deployed.masterMinter);
            self.confirm(state, *step, produced, tx_hash);
        }

        Ok(DeploymentBundle {
            implementation,
            proxy: deployed.proxy,
            master_minter: deployed.masterMinter,
        })
    }

    // -----------
    // | Helpers |
    // -----------

    /// Deploy a contract, returning its address
    async fn deploy_step(
        &self,
        state: &mut OrchestrationState,
        cancel: &CancelToken,
        step: StepId,
        payload_hex: &str,
        constructor_args: Bytes,
    ) -> Result<Address, Abort> {
        self.begin(state, cancel, step)?;

        let payload = hex::decode(payload_hex)
            .map(Bytes::from)
            .map_err(|e| {
                let err = DeployError::InvalidOperation(format!("payload is not valid hex: {e}"));
                self.fail(state, step, None, err)
            })?;
        let operation = Operation::Deploy {
            payload,
            constructor_args,
        };

        let outcome = self.submit_and_confirm(state, step, operation).await?;
        let address = outcome.contract_address.ok_or_else(|| {
            self.fail(
                state,
                step,
                Some(outcome.tx_hash),
                DeployError::MissingContractAddress(step),
            )
        })?;

        self.confirm(state, step, Some(address), Some(outcome.tx_hash));
        Ok(address)
    }

    /// Invoke a method on a deployed contract
    async fn invoke_step(
        &self,
        state: &mut OrchestrationState,
        cancel: &CancelToken,
        step: StepId,
        target: Address,
        calldata: Bytes,
    ) -> Result<(), Abort> {
        self.begin(state, cancel, step)?;

        let operation = Operation::Invoke {
            target,
            method: step.method().unwrap_or_default(),
            calldata,
        };
        let outcome = self.submit_and_confirm(state, step, operation).await?;

        self.confirm(state, step, None, Some(outcome.tx_hash));
        Ok(())
    }

    /// Submit an operation and wait for it to finalize
    async fn submit_and_confirm(
        &self,
        state: &mut OrchestrationState,
        step: StepId,
        operation: Operation,
    ) -> Result<Outcome, Abort> {
        let handle = self
            .submit_with_retries(step, operation)
            .await
            .map_err(|e| self.fail(state, step, None, e))?;

        debug!(%step, tx_hash = %format!("{:#x}", handle.tx_hash), "awaiting confirmation");
        self.reporter.report(ProgressEvent::StepSubmitted {
            step,
            tx_hash: handle.tx_hash,
        });

        self.waiter
            .await_confirmation(&handle)
            .await
            .map_err(|e| self.fail(state, step, Some(handle.tx_hash), e))
    }

    /// Submit an operation, retrying failures that happened before the ledger
    /// accepted it.
    ///
    /// The nonce is read once, so a retry after an attempt that landed despite
    /// the error is rejected by the ledger instead of executing the step twice
    async fn submit_with_retries(
        &self,
        step: StepId,
        operation: Operation,
    ) -> Result<PendingHandle, DeployError> {
        let nonce = self.with_retries(step, || self.gateway.next_nonce()).await?;
        debug!(%step, nonce, "submitting");
        self.with_retries(step, || self.gateway.submit(operation.clone(), nonce))
            .await
    }

    /// Run a ledger request, retrying it while it fails with a retryable error
    async fn with_retries<T, F, Fut>(&self, step: StepId, mut request: F) -> Result<T, DeployError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DeployError>>,
    {
        let mut attempt = 0;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.submit_retries => {
                    attempt += 1;
                    warn!(%step, attempt, error = %e, "request did not reach the ledger, retrying");
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Check for cancellation, then mark the step as started
    fn begin(
        &self,
        state: &OrchestrationState,
        cancel: &CancelToken,
        step: StepId,
    ) -> Result<(), Abort> {
        debug_assert_eq!(state.current_step(), Some(step));
        if cancel.is_cancelled() {
            self.reporter
                .report(ProgressEvent::RunCancelled { before_step: step });
            return Err(Abort {
                at_step: Some(step),
                error: DeployError::Cancelled,
            });
        }

        self.reporter.report(ProgressEvent::StepStarted { step });
        Ok(())
    }

    /// Record and report a confirmed step
    fn confirm(
        &self,
        state: &mut OrchestrationState,
        step: StepId,
        produced_address: Option<Address>,
        tx_hash: Option<alloy_primitives::TxHash>,
    ) {
        state.record(StepResult::confirmed(step, produced_address, tx_hash));
        self.reporter.report(ProgressEvent::StepConfirmed {
            step,
            produced_address,
        });
    }

    /// Record and report a failed step, producing the abort that ends the run
    fn fail(
        &self,
        state: &mut OrchestrationState,
        step: StepId,
        tx_hash: Option<alloy_primitives::TxHash>,
        error: DeployError,
    ) -> Abort {
        state.record(StepResult::failed(step, tx_hash, &error));
        self.reporter.report(ProgressEvent::StepFailed {
            step,
            error: error.clone(),
        });

        Abort {
            at_step: Some(step),
            error,
        }
    }
}

// --------------
// | Pre-flight |
// --------------

/// Run the pre-flight checks for a deployment signed by `caller`, without a
/// ledger
pub fn check(
    artifacts: &ArtifactRegistry,
    topology: Topology,
    caller: Address,
    params: &DeploymentParameters,
) -> Result<(), DeployError> {
    plan(artifacts, topology, caller, params).map(|_| ())
}

/// Validate the parameters and resolve every artifact the run touches
fn plan<'a>(
    artifacts: &'a ArtifactRegistry,
    topology: Topology,
    caller: Address,
    params: &DeploymentParameters,
) -> Result<Plan<'a>, DeployError> {
    let proxy_callers = match topology {
        Topology::Stepwise => vec![caller],
        Topology::Batched { helper } => vec![caller, helper],
    };
    params.validate(&proxy_callers)?;

    let library = artifacts.resolve(SIGNATURE_CHECKER_ARTIFACT)?;
    let implementation = artifacts.resolve(IMPLEMENTATION_ARTIFACT)?;
    ensure_untemplated(library)?;

    // The library is the only dependency we can supply, so any other
    // placeholder in the implementation can never be resolved
    let library_placeholder = implementation
        .placeholder_for_library(SIGNATURE_CHECKER_ARTIFACT)
        .unwrap_or_else(|| SIGNATURE_CHECKER_PLACEHOLDER.to_string());
    if let Some(foreign) = scan_placeholders(implementation.payload_template())?
        .into_iter()
        .find(|p| p.token != library_placeholder)
    {
        return Err(DeployError::UnresolvedPlaceholder(foreign.token));
    }

    let topology = match topology {
        Topology::Stepwise => {
            let proxy = artifacts.resolve(PROXY_ARTIFACT)?;
            let master_minter = artifacts.resolve(MASTER_MINTER_ARTIFACT)?;
            ensure_untemplated(proxy)?;
            ensure_untemplated(master_minter)?;

            for step in StepId::ALL {
                let Some(method) = step.method() else {
                    continue;
                };
                let artifact = match step {
                    StepId::TransferMasterMinterOwnership => master_minter,
                    StepId::ChangeProxyAdmin => proxy,
                    _ => implementation,
                };
                artifact.require_function(method)?;
            }

            TopologyPlan::Stepwise {
                proxy,
                master_minter,
            }
        }
        Topology::Batched { helper } => TopologyPlan::Batched { helper },
    };

    Ok(Plan {
        library,
        implementation,
        library_placeholder,
        topology,
    })
}

/// Reject an artifact that would need linking we do not perform
fn ensure_untemplated(artifact: &ArtifactDescriptor) -> Result<(), DeployError> {
    match scan_placeholders(artifact.payload_template())?.into_iter().next() {
        Some(placeholder) => Err(DeployError::UnresolvedPlaceholder(placeholder.token)),
        None => Ok(()),
    }
}

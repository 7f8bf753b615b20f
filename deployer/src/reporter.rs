//! Progress events emitted by the sequencer, and the sinks that consume them

use alloy_primitives::{Address, TxHash};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{error, info, warn};

use crate::{
    errors::DeployError,
    sequencer::{DeploymentBundle, StepId},
};

/// A structured progress event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A step has begun
    StepStarted {
        /// The step
        step: StepId,
    },
    /// The ledger accepted the step's submission
    StepSubmitted {
        /// The step
        step: StepId,
        /// The hash of the submitted transaction
        tx_hash: TxHash,
    },
    /// The step is durably confirmed
    StepConfirmed {
        /// The step
        step: StepId,
        /// The address the step produced, if any
        produced_address: Option<Address>,
    },
    /// The step failed and the run has stopped
    StepFailed {
        /// The step
        step: StepId,
        /// Why it failed
        error: DeployError,
    },
    /// The run was cancelled before the given step began
    RunCancelled {
        /// The first step that was not run
        before_step: StepId,
    },
    /// Every step is confirmed
    RunComplete {
        /// The deployed addresses
        bundle: DeploymentBundle,
    },
}

/// A sink for progress events.
///
/// Implementations must not block, the sequencer reports inline
pub trait ProgressReporter {
    /// Consume an event
    fn report(&self, event: ProgressEvent);
}

/// Forwards events onto an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    /// The sending half of the channel
    sender: UnboundedSender<ProgressEvent>,
}

impl ChannelReporter {
    /// Create a reporter along with the receiver its events arrive on
    pub fn new() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ProgressReporter for ChannelReporter {
    fn report(&self, event: ProgressEvent) {
        // A dropped receiver means nobody is listening, which is not the
        // sequencer's concern
        let _ = self.sender.send(event);
    }
}

/// Renders events as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::StepStarted { step } => info!(%step, "step started"),
            ProgressEvent::StepSubmitted { step, tx_hash } => {
                info!(%step, tx_hash = %format!("{tx_hash:#x}"), "step submitted")
            }
            ProgressEvent::StepConfirmed {
                step,
                produced_address: Some(address),
            } => info!(%step, address = %format!("{address:#x}"), "step confirmed"),
            ProgressEvent::StepConfirmed { step, .. } => info!(%step, "step confirmed"),
            ProgressEvent::StepFailed { step, error } => error!(%step, %error, "step failed"),
            ProgressEvent::RunCancelled { before_step } => {
                warn!(%before_step, "run cancelled")
            }
            ProgressEvent::RunComplete { bundle } => info!(
                implementation = %format!("{:#x}", bundle.implementation),
                proxy = %format!("{:#x}", bundle.proxy),
                master_minter = %format!("{:#x}", bundle.master_minter),
                "deployment complete"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::sequencer::StepId;

    use super::{ChannelReporter, ProgressEvent, ProgressReporter};

    #[test]
    fn test_channel_reporter_preserves_order() {
        let (reporter, mut receiver) = ChannelReporter::new();
        reporter.report(ProgressEvent::StepStarted {
            step: StepId::DeployLibrary,
        });
        reporter.report(ProgressEvent::StepConfirmed {
            step: StepId::DeployLibrary,
            produced_address: None,
        });

        assert_eq!(
            receiver.try_recv().unwrap(),
            ProgressEvent::StepStarted {
                step: StepId::DeployLibrary
            }
        );
        assert!(matches!(
            receiver.try_recv().unwrap(),
            ProgressEvent::StepConfirmed { .. }
        ));
    }

    #[test]
    fn test_channel_reporter_survives_dropped_receiver() {
        let (reporter, receiver) = ChannelReporter::new();
        drop(receiver);
        reporter.report(ProgressEvent::RunCancelled {
            before_step: StepId::DeployProxy,
        });
    }
}

//! The JSON-RPC ledger: submits transactions through an alloy provider and
//! polls the node for their receipts

use std::{future::Future, str::FromStr, time::Duration};

use alloy::{
    network::{Ethereum, EthereumWallet, TransactionBuilder, TransactionBuilderError},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{BlockId, TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::{http::reqwest::Url, RpcError, TransportError},
};
use alloy_primitives::{Address, Bytes, Log, TxHash};
use alloy_sol_types::decode_revert_reason;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

use crate::{
    constants::{
        DEFAULT_CONFIRMATIONS, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
        RATE_LIMIT_CODES, USER_REJECTED_CODE,
    },
    errors::DeployError,
    ledger::{ConfirmationWaiter, Operation, Outcome, PendingHandle, SubmissionGateway},
};

/// How long, and how deep, to wait for a submission to finalize
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationConfig {
    /// The delay between receipt polls
    pub poll_interval: Duration,
    /// How long to wait before giving up on a submission, node requests
    /// included
    pub timeout: Duration,
    /// The number of blocks, including the inclusion block, a receipt must be
    /// buried under
    pub confirmations: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            confirmations: DEFAULT_CONFIRMATIONS,
        }
    }
}

/// A ledger reached over JSON-RPC, signing with a local key
#[derive(Clone)]
pub struct RpcLedger {
    /// The signing provider
    provider: DynProvider,
    /// The address of the signing key
    sender: Address,
    /// Confirmation tunables
    config: ConfirmationConfig,
}

impl RpcLedger {
    /// Connect to the node at `rpc_url`, signing with `priv_key`
    pub fn connect(
        priv_key: &str,
        rpc_url: &str,
        config: ConfirmationConfig,
    ) -> Result<Self, DeployError> {
        let signer = PrivateKeySigner::from_str(priv_key)
            .map_err(|e| DeployError::ClientInitialization(e.to_string()))?;
        let sender = signer.address();
        let url = Url::parse(rpc_url)
            .map_err(|e| DeployError::ClientInitialization(e.to_string()))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .on_http(url);

        Ok(Self {
            provider: DynProvider::new(provider),
            sender,
            config,
        })
    }
}

/// The transaction carrying an operation, without a nonce
fn transaction_request(from: Address, operation: &Operation) -> TransactionRequest {
    let tx = TransactionRequest::default().from(from);
    match operation.target() {
        Some(target) => tx.with_to(target).with_input(operation.input()),
        None => tx.with_deploy_code(operation.input()),
    }
}

impl SubmissionGateway for RpcLedger {
    fn caller(&self) -> Address {
        self.sender
    }

    async fn next_nonce(&self) -> Result<u64, DeployError> {
        self.provider
            .get_transaction_count(self.sender)
            .pending()
            .await
            .map_err(classify_rpc_error)
    }

    async fn submit(&self, operation: Operation, nonce: u64) -> Result<PendingHandle, DeployError> {
        // A pinned nonce keeps the provider's nonce filler out of the way
        let tx = transaction_request(self.sender, &operation).with_nonce(nonce);
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(classify_rpc_error)?;

        Ok(PendingHandle {
            tx_hash: *pending.tx_hash(),
            from: self.sender,
            nonce,
            operation,
        })
    }
}

impl ConfirmationWaiter for RpcLedger {
    async fn await_confirmation(&self, handle: &PendingHandle) -> Result<Outcome, DeployError> {
        wait_for_outcome(self, handle, &self.config).await
    }
}

// --------------------
// | Receipt Polling |
// --------------------

/// The parts of a receipt confirmation looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReceiptSummary {
    /// The block the transaction was included in
    pub block_number: Option<u64>,
    /// Whether the transaction executed successfully
    pub status: bool,
    /// The address of the created contract, for deployments
    pub contract_address: Option<Address>,
    /// The logs emitted by the transaction
    pub logs: Vec<Log>,
}

impl From<TransactionReceipt> for ReceiptSummary {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            block_number: receipt.block_number,
            status: receipt.status(),
            contract_address: receipt.contract_address,
            logs: receipt.inner.logs().iter().map(|log| log.inner.clone()).collect(),
        }
    }
}

/// The node queries a confirmation wait is made of
pub(crate) trait ReceiptSource {
    /// The receipt of a transaction, if the node has one yet
    fn receipt(
        &self,
        tx_hash: TxHash,
    ) -> impl Future<Output = Result<Option<ReceiptSummary>, TransportError>> + Send;

    /// The current head block number
    fn block_number(&self) -> impl Future<Output = Result<u64, TransportError>> + Send;

    /// Re-execute a submission with `eth_call` against the given block
    fn replay(
        &self,
        handle: &PendingHandle,
        block: BlockId,
    ) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

impl ReceiptSource for RpcLedger {
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<ReceiptSummary>, TransportError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(ReceiptSummary::from))
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        self.provider.get_block_number().await
    }

    async fn replay(
        &self,
        handle: &PendingHandle,
        block: BlockId,
    ) -> Result<Bytes, TransportError> {
        let tx = transaction_request(handle.from, &handle.operation);
        self.provider.call(&tx).block(block).await
    }
}

/// Poll until the submission is final, failing with `Timeout` once the wait
/// window closes, even if a node request is still in flight
pub(crate) async fn wait_for_outcome<S: ReceiptSource>(
    source: &S,
    handle: &PendingHandle,
    config: &ConfirmationConfig,
) -> Result<Outcome, DeployError> {
    let tx_hash = handle.tx_hash;
    let start = Instant::now();
    let deadline = start + config.timeout;
    let timed_out = || DeployError::Timeout {
        tx_hash,
        waited: start.elapsed(),
    };

    loop {
        let receipt = match timeout_at(deadline, source.receipt(tx_hash)).await {
            Err(_) => return Err(timed_out()),
            Ok(Ok(receipt)) => receipt,
            Ok(Err(e)) => {
                warn!(tx_hash = %format!("{tx_hash:#x}"), error = %e, "receipt poll failed");
                None
            }
        };

        if let Some(receipt) = receipt {
            let buried = timeout_at(deadline, is_final(source, &receipt, config.confirmations))
                .await
                .map_err(|_| timed_out())?;

            if buried {
                debug!(
                    tx_hash = %format!("{tx_hash:#x}"),
                    block = ?receipt.block_number,
                    "receipt final"
                );
                if !receipt.status {
                    let reason = match timeout_at(
                        deadline,
                        revert_reason(source, handle, receipt.block_number),
                    )
                    .await
                    {
                        Ok(reason) => reason,
                        Err(_) => "reverted without a reason (replay timed out)".to_string(),
                    };
                    return Err(DeployError::Reverted { reason });
                }

                return Ok(Outcome {
                    tx_hash,
                    contract_address: receipt.contract_address,
                    logs: receipt.logs,
                });
            }
        }

        if Instant::now() >= deadline {
            return Err(timed_out());
        }
        sleep_until((Instant::now() + config.poll_interval).min(deadline)).await;
    }
}

/// Whether a receipt is buried deep enough to count as final
async fn is_final<S: ReceiptSource>(
    source: &S,
    receipt: &ReceiptSummary,
    confirmations: u64,
) -> bool {
    let Some(included) = receipt.block_number else {
        return false;
    };
    if confirmations <= 1 {
        return true;
    }

    match source.block_number().await {
        Ok(head) => head.saturating_sub(included) + 1 >= confirmations,
        Err(e) => {
            warn!(error = %e, "block number poll failed");
            false
        }
    }
}

/// Recover the revert reason of a failed submission by replaying it against
/// the state it executed on
async fn revert_reason<S: ReceiptSource>(
    source: &S,
    handle: &PendingHandle,
    block: Option<u64>,
) -> String {
    let block = block
        .map(|n| BlockId::number(n.saturating_sub(1)))
        .unwrap_or_else(BlockId::latest);

    match source.replay(handle, block).await {
        Err(RpcError::ErrorResp(payload)) => payload
            .as_revert_data()
            .and_then(|data| decode_revert_reason(&data))
            .unwrap_or_else(|| payload.message.to_string()),
        Err(e) => format!("reverted without a reason (replay failed: {e})"),
        Ok(_) => "reverted without a reason".to_string(),
    }
}

/// Map a failed submission onto the error kinds the sequencer acts on.
///
/// Only failures where the node never took the request in, or turned it away
/// before looking at it, are classified as `Network`
pub(crate) fn classify_rpc_error(err: TransportError) -> DeployError {
    match err {
        RpcError::ErrorResp(payload) => {
            if payload.code == USER_REJECTED_CODE {
                return DeployError::UserDeclined(payload.message.to_string());
            }
            if RATE_LIMIT_CODES.contains(&payload.code) {
                return DeployError::Network(payload.message.to_string());
            }

            match payload.as_revert_data().and_then(|data| decode_revert_reason(&data)) {
                Some(reason) => {
                    DeployError::InvalidOperation(format!("execution would revert: {reason}"))
                }
                None => DeployError::InvalidOperation(format!(
                    "{} (code {})",
                    payload.message, payload.code
                )),
            }
        }
        RpcError::Transport(kind) => DeployError::Network(kind.to_string()),
        RpcError::NullResp => DeployError::Network("null response from node".to_string()),
        // Fillers and request building fail here too; only the signer refusing
        // is the user's doing
        RpcError::LocalUsageError(e) => {
            match e.downcast_ref::<TransactionBuilderError<Ethereum>>() {
                Some(TransactionBuilderError::Signer(signer)) => {
                    DeployError::UserDeclined(signer.to_string())
                }
                _ => DeployError::InvalidOperation(e.to_string()),
            }
        }
        other => DeployError::InvalidOperation(other.to_string()),
    }
}

mod abi;
mod contract;
mod deploy;
mod rpc;
#[cfg(test)]
mod stub;

use async_trait::async_trait;
use dv_api_types::{AccountAddress, ChainId, ContractAddress};
use dv_chain_client::{
    EventHub, METHOD_NOT_FOUND_CODE, ProviderError, VotingContract, WalletProvider,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub use contract::EvmVotingContract;
pub use deploy::{DEFAULT_CANDIDATES, DeployedContract, TruffleArtifact};
pub use rpc::ReceiptPolling;

pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:7545";

/// JSON-RPC wallet provider backed by a node's unlocked accounts.
///
/// Reads `VOTING_RPC_URL` from environment at construction time
/// (default: `http://127.0.0.1:7545`, a local Ganache).
pub struct JsonRpcProvider {
    rpc: Arc<rpc::RpcClient>,
    events: EventHub,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl Default for JsonRpcProvider {
    fn default() -> Self {
        Self::new(None)
    }
}

impl JsonRpcProvider {
    pub fn new(endpoint: Option<String>) -> Self {
        Self::with_receipt_polling(endpoint, ReceiptPolling::default())
    }

    pub fn with_receipt_polling(endpoint: Option<String>, receipts: ReceiptPolling) -> Self {
        let endpoint = endpoint
            .or_else(|| std::env::var("VOTING_RPC_URL").ok())
            .unwrap_or_else(|| DEFAULT_RPC_URL.to_string());
        Self {
            rpc: Arc::new(rpc::RpcClient::new(
                endpoint.trim_end_matches('/').to_string(),
                receipts,
            )),
            events: EventHub::new(),
            watcher: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.rpc.endpoint()
    }

    /// A node cannot push wallet notifications, so poll `eth_chainId` and
    /// `eth_accounts` and emit through the event hub when either changes.
    /// Replaces any previous watcher; stops when the provider is dropped.
    pub fn watch(&self, interval: Duration) {
        let rpc = self.rpc.clone();
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            let mut last_chain: Option<ChainId> = None;
            let mut last_accounts: Option<Vec<AccountAddress>> = None;

            loop {
                ticker.tick().await;

                match fetch_chain_id(&rpc).await {
                    Ok(chain_id) => {
                        if last_chain.is_some_and(|previous| previous != chain_id) {
                            info!(%chain_id, "provider chain changed");
                            events.emit_chain_changed(chain_id);
                        }
                        last_chain = Some(chain_id);
                    }
                    Err(err) => debug!("chain id poll failed: {err}"),
                }

                match fetch_accounts(&rpc).await {
                    Ok(accounts) => {
                        if last_accounts.as_ref().is_some_and(|previous| *previous != accounts) {
                            info!(count = accounts.len(), "provider accounts changed");
                            events.emit_accounts_changed(&accounts);
                        }
                        last_accounts = Some(accounts);
                    }
                    Err(err) => debug!("accounts poll failed: {err}"),
                }
            }
        });

        let mut guard = self.watcher.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(previous) = guard.replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for JsonRpcProvider {
    fn drop(&mut self) {
        let slot = self.watcher.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

async fn fetch_chain_id(rpc: &rpc::RpcClient) -> Result<ChainId, ProviderError> {
    let raw: String = rpc.call("eth_chainId", json!([])).await?;
    Ok(ChainId(rpc::parse_quantity(&raw)?))
}

async fn fetch_accounts(rpc: &rpc::RpcClient) -> Result<Vec<AccountAddress>, ProviderError> {
    let raw: Vec<String> = rpc.call("eth_accounts", json!([])).await?;
    Ok(raw.into_iter().map(AccountAddress).collect())
}

fn is_unsupported_method(err: &ProviderError) -> bool {
    match err {
        ProviderError::Rpc { code, message } => {
            *code == METHOD_NOT_FOUND_CODE
                || message.contains("not supported")
                || message.contains("does not exist")
        }
        _ => false,
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, ProviderError> {
        match self.rpc.call::<Vec<String>>("eth_requestAccounts", json!([])).await {
            Ok(raw) => Ok(raw.into_iter().map(AccountAddress).collect()),
            // Plain nodes have no permission prompt; their accounts are already exposed.
            Err(err) if is_unsupported_method(&err) => fetch_accounts(&self.rpc).await,
            Err(err) => Err(err),
        }
    }

    async fn accounts(&self) -> Result<Vec<AccountAddress>, ProviderError> {
        fetch_accounts(&self.rpc).await
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        fetch_chain_id(&self.rpc).await
    }

    fn events(&self) -> &EventHub {
        &self.events
    }

    fn contract(&self, address: &ContractAddress) -> Arc<dyn VotingContract> {
        Arc::new(EvmVotingContract::new(self.rpc.clone(), address.clone()))
    }
}

pub mod events;
pub mod memory;

use async_trait::async_trait;
use dv_api_types::{AccountAddress, Candidate, ChainId, ContractAddress, VoteReceipt};
use std::sync::Arc;

pub use events::{EventHub, Subscription};
pub use memory::InMemoryChain;

/// EIP-1193 "user rejected the request".
pub const USER_REJECTED_CODE: i64 = 4001;
/// JSON-RPC "method not found".
pub const METHOD_NOT_FOUND_CODE: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("no wallet provider available")]
    NoProvider,
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

impl ProviderError {
    pub fn rpc(code: i64, message: impl Into<String>) -> Self {
        ProviderError::Rpc {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> Option<i64> {
        match self {
            ProviderError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoteTxRequest {
    pub from: AccountAddress,
    pub candidate_id: u64,
    pub gas_limit: u64,
}

/// Remote calls of a deployed Voting contract, bound to one address.
#[async_trait]
pub trait VotingContract: Send + Sync {
    fn address(&self) -> &ContractAddress;
    async fn get_all_candidates(&self) -> Result<Vec<Candidate>, ProviderError>;
    async fn get_voter_status(&self, voter: &AccountAddress) -> Result<bool, ProviderError>;
    async fn get_total_votes(&self) -> Result<u64, ProviderError>;
    async fn candidates_count(&self) -> Result<u64, ProviderError>;
    async fn vote(&self, req: VoteTxRequest) -> Result<VoteReceipt, ProviderError>;
}

/// The wallet side: account access, chain queries, change notifications and
/// contract handles that sign with the wallet's accounts.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, ProviderError>;
    async fn accounts(&self) -> Result<Vec<AccountAddress>, ProviderError>;
    async fn chain_id(&self) -> Result<ChainId, ProviderError>;
    fn events(&self) -> &EventHub;
    fn contract(&self, address: &ContractAddress) -> Arc<dyn VotingContract>;
}

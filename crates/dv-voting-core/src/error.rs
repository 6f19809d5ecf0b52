use dv_api_types::ChainId;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VoteError {
    #[error("no wallet provider detected")]
    NoProvider,
    #[error("wallet access denied: {0}")]
    AccessDenied(String),
    #[error(
        "contract not deployed on network {chain_id}; supported networks: {}",
        .supported.join(", ")
    )]
    UnsupportedNetwork {
        chain_id: ChainId,
        supported: Vec<String>,
    },
    #[error("no contract bound to this session")]
    ContractUnavailable,
    #[error("{operation} failed: {cause}")]
    RemoteCallFailed {
        operation: &'static str,
        cause: String,
    },
    #[error("this account has already voted")]
    AlreadyVoted,
    #[error("transaction was denied by user")]
    TransactionDenied,
    #[error("gas limit {gas_limit} is insufficient: {cause}")]
    ResourceLimitExceeded { gas_limit: u64, cause: String },
    #[error("a vote is already being submitted")]
    OperationInProgress,
    #[error("no account connected")]
    NotConnected,
    #[error("invalid candidate id {0}; candidate ids start at 1")]
    InvalidCandidate(u64),
    #[error("session was reset while {0} was in flight")]
    Superseded(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoProvider,
    AccessDenied,
    UnsupportedNetwork,
    ContractUnavailable,
    RemoteCallFailed,
    AlreadyVoted,
    TransactionDenied,
    ResourceLimitExceeded,
    OperationInProgress,
    NotConnected,
    InvalidCandidate,
    Superseded,
}

impl VoteError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoteError::NoProvider => ErrorKind::NoProvider,
            VoteError::AccessDenied(_) => ErrorKind::AccessDenied,
            VoteError::UnsupportedNetwork { .. } => ErrorKind::UnsupportedNetwork,
            VoteError::ContractUnavailable => ErrorKind::ContractUnavailable,
            VoteError::RemoteCallFailed { .. } => ErrorKind::RemoteCallFailed,
            VoteError::AlreadyVoted => ErrorKind::AlreadyVoted,
            VoteError::TransactionDenied => ErrorKind::TransactionDenied,
            VoteError::ResourceLimitExceeded { .. } => ErrorKind::ResourceLimitExceeded,
            VoteError::OperationInProgress => ErrorKind::OperationInProgress,
            VoteError::NotConnected => ErrorKind::NotConnected,
            VoteError::InvalidCandidate(_) => ErrorKind::InvalidCandidate,
            VoteError::Superseded(_) => ErrorKind::Superseded,
        }
    }
}

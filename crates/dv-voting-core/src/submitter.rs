use crate::error::VoteError;
use crate::resolver::BoundContract;
use dv_api_types::{AccountAddress, Candidate, VoteReceipt};
use dv_chain_client::{ProviderError, USER_REJECTED_CODE, VoteTxRequest};
use tracing::{info, warn};

/// Best-effort reading of a provider failure. The wording belongs to the
/// wallet and the node, so this is the only place that looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    AlreadyVoted,
    Denied,
    OutOfGas,
    Unclassified,
}

const OUT_OF_GAS_MARKERS: &[&str] = &[
    "out of gas",
    "gas required exceeds",
    "intrinsic gas too low",
];

pub fn classify_provider_error(err: &ProviderError) -> ErrorClass {
    if err.code() == Some(USER_REJECTED_CODE) {
        return ErrorClass::Denied;
    }
    let message = err.to_string().to_ascii_lowercase();
    if message.contains("already voted") {
        ErrorClass::AlreadyVoted
    } else if message.contains("denied") || message.contains("rejected") {
        ErrorClass::Denied
    } else if OUT_OF_GAS_MARKERS.iter().any(|marker| message.contains(marker)) {
        ErrorClass::OutOfGas
    } else {
        ErrorClass::Unclassified
    }
}

#[derive(Debug, Clone)]
pub struct VoteSubmitter {
    contract: Option<BoundContract>,
    gas_limit: u64,
}

impl VoteSubmitter {
    pub fn new(contract: Option<BoundContract>, gas_limit: u64) -> Self {
        Self {
            contract,
            gas_limit,
        }
    }

    pub fn contract(&self) -> Option<&BoundContract> {
        self.contract.as_ref()
    }

    fn bound(&self) -> Result<&BoundContract, VoteError> {
        self.contract.as_ref().ok_or(VoteError::ContractUnavailable)
    }

    /// Candidates in ascending id order, whatever order the contract returns.
    pub async fn list_candidates(&self) -> Result<Vec<Candidate>, VoteError> {
        let mut candidates = self
            .bound()?
            .handle
            .get_all_candidates()
            .await
            .map_err(|err| read_error("getAllCandidates", err))?;
        candidates.sort_by_key(|candidate| candidate.id);
        Ok(candidates)
    }

    pub async fn voting_status(&self, account: &AccountAddress) -> Result<bool, VoteError> {
        self.bound()?
            .handle
            .get_voter_status(account)
            .await
            .map_err(|err| read_error("getVoterStatus", err))
    }

    pub async fn total_votes(&self) -> Result<u64, VoteError> {
        self.bound()?
            .handle
            .get_total_votes()
            .await
            .map_err(|err| read_error("getTotalVotes", err))
    }

    pub async fn candidates_count(&self) -> Result<u64, VoteError> {
        self.bound()?
            .handle
            .candidates_count()
            .await
            .map_err(|err| read_error("candidatesCount", err))
    }

    /// Submits one `vote` transaction. Never retried here: a failed
    /// submission is reported and the caller decides.
    pub async fn cast_vote(
        &self,
        account: Option<&AccountAddress>,
        candidate_id: u64,
    ) -> Result<VoteReceipt, VoteError> {
        let contract = self.bound()?;
        let account = account.ok_or(VoteError::NotConnected)?;
        if candidate_id == 0 {
            return Err(VoteError::InvalidCandidate(candidate_id));
        }

        info!(
            contract = %contract.address,
            voter = %account,
            candidate_id,
            gas_limit = self.gas_limit,
            "submitting vote"
        );

        let receipt = contract
            .handle
            .vote(VoteTxRequest {
                from: account.clone(),
                candidate_id,
                gas_limit: self.gas_limit,
            })
            .await
            .map_err(|err| self.write_error(err))?;

        info!(tx = %receipt.transaction_hash, candidate_id, "vote confirmed");
        Ok(receipt)
    }

    fn write_error(&self, err: ProviderError) -> VoteError {
        if err == ProviderError::NoProvider {
            return VoteError::NoProvider;
        }
        let class = classify_provider_error(&err);
        warn!(?class, error = %err, "vote transaction failed");
        match class {
            ErrorClass::AlreadyVoted => VoteError::AlreadyVoted,
            ErrorClass::Denied => VoteError::TransactionDenied,
            ErrorClass::OutOfGas => VoteError::ResourceLimitExceeded {
                gas_limit: self.gas_limit,
                cause: err.to_string(),
            },
            ErrorClass::Unclassified => VoteError::RemoteCallFailed {
                operation: "vote",
                cause: err.to_string(),
            },
        }
    }
}

fn read_error(operation: &'static str, err: ProviderError) -> VoteError {
    match err {
        ProviderError::NoProvider => VoteError::NoProvider,
        other => VoteError::RemoteCallFailed {
            operation,
            cause: other.to_string(),
        },
    }
}

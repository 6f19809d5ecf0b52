use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(pub u64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AccountAddress(pub String);

impl AccountAddress {
    /// Addresses arrive checksummed from some providers and lowercase from others.
    pub fn same_as(&self, other: &AccountAddress) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ContractAddress(pub String);

impl ContractAddress {
    /// `0x` followed by 40 hex digits. Says nothing about what lives there.
    pub fn is_well_formed(&self) -> bool {
        let Some(digits) = self.0.strip_prefix("0x").or_else(|| self.0.strip_prefix("0X")) else {
            return false;
        };
        digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for ContractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentEnvironment {
    #[default]
    Production,
    Development,
}

impl DeploymentEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentEnvironment::Production => "production",
            DeploymentEnvironment::Development => "development",
        }
    }
}

impl FromStr for DeploymentEnvironment {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(DeploymentEnvironment::Production),
            "development" | "dev" => Ok(DeploymentEnvironment::Development),
            other => Err(format!("unknown deployment environment: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkEntry {
    pub chain_id: ChainId,
    pub contract_address: ContractAddress,
    pub network_name: String,
}

/// Candidate as stored by the contract. Ids start at 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub id: u64,
    pub name: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteReceipt {
    pub transaction_hash: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Resolving,
    Ready,
    Voting,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BindingMode {
    #[default]
    AutoDetect,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub state: SessionState,
    pub mode: BindingMode,
    pub account: Option<String>,
    pub chain_id: Option<u64>,
    pub network_name: Option<String>,
    pub contract_address: Option<String>,
    pub has_voted: Option<bool>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkListResponse {
    pub environment: DeploymentEnvironment,
    pub networks: Vec<NetworkEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualContractRequest {
    pub contract_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTally {
    pub id: u64,
    pub name: String,
    pub vote_count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingDataResponse {
    pub candidates: Vec<CandidateTally>,
    pub total_votes: u64,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteRequest {
    pub candidate_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub transaction_hash: String,
}

/// Share of `total` held by `vote_count`, in percent with one decimal.
pub fn vote_percentage(vote_count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = vote_count as f64 * 100.0 / total as f64;
    (raw * 10.0).round() / 10.0
}

pub fn tally(candidates: &[Candidate], total_votes: u64) -> Vec<CandidateTally> {
    candidates
        .iter()
        .map(|candidate| CandidateTally {
            id: candidate.id,
            name: candidate.name.clone(),
            vote_count: candidate.vote_count,
            percentage: vote_percentage(candidate.vote_count, total_votes),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_address_shape() {
        assert!(ContractAddress("0xafD7BD6ba24b94bF45d0C09C6D87890F5ad3feBB".to_owned()).is_well_formed());
        assert!(!ContractAddress("0x1234".to_owned()).is_well_formed());
        assert!(!ContractAddress("afD7BD6ba24b94bF45d0C09C6D87890F5ad3feBB".to_owned()).is_well_formed());
        assert!(!ContractAddress("0xZZD7BD6ba24b94bF45d0C09C6D87890F5ad3feBB".to_owned()).is_well_formed());
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        assert_eq!(vote_percentage(0, 0), 0.0);
        assert_eq!(vote_percentage(1, 3), 33.3);
        assert_eq!(vote_percentage(2, 3), 66.7);
        assert_eq!(vote_percentage(5, 5), 100.0);
    }

    #[test]
    fn environment_parses_short_names() {
        assert_eq!("dev".parse::<DeploymentEnvironment>(), Ok(DeploymentEnvironment::Development));
        assert_eq!(" Production ".parse::<DeploymentEnvironment>(), Ok(DeploymentEnvironment::Production));
        assert!("staging".parse::<DeploymentEnvironment>().is_err());
    }

    #[test]
    fn session_state_serializes_snake_case() {
        let json = serde_json::to_string(&SessionState::Ready).unwrap();
        assert_eq!(json, "\"ready\"");
        let json = serde_json::to_string(&BindingMode::AutoDetect).unwrap();
        assert_eq!(json, "\"auto_detect\"");
    }
}

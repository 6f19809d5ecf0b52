use alloy_primitives::U256;
use alloy_sol_types::sol;
use dv_api_types::Candidate;
use dv_chain_client::ProviderError;

sol! {
    interface IVoting {
        struct Candidate {
            uint256 id;
            string name;
            uint256 voteCount;
        }

        function vote(uint256 _candidateId) external;
        function getAllCandidates() external view returns (Candidate[] memory);
        function getVoterStatus(address _voter) external view returns (bool);
        function getTotalVotes() external view returns (uint256);
        function candidatesCount() external view returns (uint256);
    }
}

pub(crate) fn to_u64(value: U256, field: &str) -> Result<u64, ProviderError> {
    u64::try_from(value)
        .map_err(|_| ProviderError::InvalidResponse(format!("{field} does not fit in u64: {value}")))
}

pub(crate) fn to_candidate(raw: IVoting::Candidate) -> Result<Candidate, ProviderError> {
    Ok(Candidate {
        id: to_u64(raw.id, "candidate id")?,
        name: raw.name,
        vote_count: to_u64(raw.voteCount, "vote count")?,
    })
}

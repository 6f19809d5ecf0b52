use crate::abi::{IVoting, to_candidate, to_u64};
use crate::rpc::{RpcClient, to_quantity};
use alloy_primitives::{Address, U256, hex};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use dv_api_types::{AccountAddress, Candidate, ContractAddress, VoteReceipt};
use dv_chain_client::{ProviderError, VoteTxRequest, VotingContract};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Voting contract reached through `eth_call` / `eth_sendTransaction`.
pub struct EvmVotingContract {
    rpc: Arc<RpcClient>,
    address: ContractAddress,
}

impl EvmVotingContract {
    pub(crate) fn new(rpc: Arc<RpcClient>, address: ContractAddress) -> Self {
        Self { rpc, address }
    }

    fn target(&self) -> Result<Address, ProviderError> {
        self.address
            .0
            .parse::<Address>()
            .map_err(|err| ProviderError::InvalidAddress(format!("{}: {err}", self.address)))
    }

    async fn call_view<C: SolCall>(&self, call: C) -> Result<C::Return, ProviderError> {
        let to = self.target()?;
        let data = hex::encode_prefixed(call.abi_encode());
        let raw: String = self
            .rpc
            .call("eth_call", json!([{ "to": to.to_string(), "data": data }, "latest"]))
            .await?;

        let bytes = hex::decode(&raw)
            .map_err(|err| ProviderError::InvalidResponse(format!("{}: {err}", C::SIGNATURE)))?;
        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse(format!(
                "{} on {} returned no data (\"0x\")",
                C::SIGNATURE,
                self.address
            )));
        }

        C::abi_decode_returns(&bytes, true)
            .map_err(|err| ProviderError::InvalidResponse(format!("{}: {err}", C::SIGNATURE)))
    }
}

#[async_trait]
impl VotingContract for EvmVotingContract {
    fn address(&self) -> &ContractAddress {
        &self.address
    }

    async fn get_all_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        let ret = self.call_view(IVoting::getAllCandidatesCall {}).await?;
        ret._0.into_iter().map(to_candidate).collect()
    }

    async fn get_voter_status(&self, voter: &AccountAddress) -> Result<bool, ProviderError> {
        let voter = voter
            .0
            .parse::<Address>()
            .map_err(|err| ProviderError::InvalidAddress(format!("{voter}: {err}")))?;
        let ret = self.call_view(IVoting::getVoterStatusCall { _voter: voter }).await?;
        Ok(ret._0)
    }

    async fn get_total_votes(&self) -> Result<u64, ProviderError> {
        let ret = self.call_view(IVoting::getTotalVotesCall {}).await?;
        to_u64(ret._0, "total votes")
    }

    async fn candidates_count(&self) -> Result<u64, ProviderError> {
        let ret = self.call_view(IVoting::candidatesCountCall {}).await?;
        to_u64(ret._0, "candidates count")
    }

    async fn vote(&self, req: VoteTxRequest) -> Result<VoteReceipt, ProviderError> {
        let to = self.target()?;
        let data = IVoting::voteCall {
            _candidateId: U256::from(req.candidate_id),
        }
        .abi_encode();

        let tx = json!({
            "from": req.from.0,
            "to": to.to_string(),
            "data": hex::encode_prefixed(data),
            "gas": to_quantity(req.gas_limit),
        });

        let tx_hash: String = self.rpc.call("eth_sendTransaction", json!([tx])).await?;
        info!(tx_hash = %tx_hash, candidate_id = req.candidate_id, "vote transaction sent");

        let receipt = self
            .rpc
            .wait_for_receipt(&tx_hash, Some(req.gas_limit), Some(&tx))
            .await?;
        Ok(VoteReceipt {
            transaction_hash: receipt.transaction_hash,
        })
    }
}

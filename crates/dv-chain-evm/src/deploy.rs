use crate::JsonRpcProvider;
use crate::rpc::{parse_quantity, to_quantity};
use alloy_primitives::hex;
use alloy_sol_types::SolValue;
use anyhow::{Context, Result, anyhow};
use dv_api_types::{AccountAddress, ContractAddress};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use tracing::info;

pub const DEFAULT_CANDIDATES: [&str; 4] = ["Alice Johnson", "Bob Smith", "Carol Davis", "David Wilson"];

/// The parts of a Truffle build artifact (`build/contracts/Voting.json`) we need.
#[derive(Debug, Clone, Deserialize)]
pub struct TruffleArtifact {
    pub bytecode: String,
}

impl TruffleArtifact {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("contract artifact not found at {}; compile the contract first", path.display()))?;
        let artifact: TruffleArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse contract artifact {}", path.display()))?;
        if artifact.bytecode.trim_start_matches("0x").is_empty() {
            return Err(anyhow!("artifact {} has empty bytecode", path.display()));
        }
        Ok(artifact)
    }

    /// Creation code followed by the ABI-encoded `string[]` constructor argument.
    pub fn creation_data(&self, candidates: &[String]) -> Result<Vec<u8>> {
        let mut data = hex::decode(&self.bytecode).context("artifact bytecode is not hex")?;
        data.extend((candidates.to_vec(),).abi_encode_params());
        Ok(data)
    }
}

#[derive(Debug, Clone)]
pub struct DeployedContract {
    pub address: ContractAddress,
    pub transaction_hash: String,
}

impl JsonRpcProvider {
    pub async fn deploy_voting(
        &self,
        from: &AccountAddress,
        artifact: &TruffleArtifact,
        candidates: &[String],
    ) -> Result<DeployedContract> {
        let data = hex::encode_prefixed(artifact.creation_data(candidates)?);

        let estimate: String = self
            .rpc
            .call("eth_estimateGas", json!([{ "from": from.0, "data": data }]))
            .await
            .context("eth_estimateGas for deployment")?;
        let gas = parse_quantity(&estimate)?;
        info!(gas, from = %from, "deploying voting contract");

        let tx_hash: String = self
            .rpc
            .call(
                "eth_sendTransaction",
                json!([{ "from": from.0, "data": data, "gas": to_quantity(gas) }]),
            )
            .await
            .context("eth_sendTransaction for deployment")?;

        let receipt = self
            .rpc
            .wait_for_receipt(&tx_hash, Some(gas), None)
            .await
            .context("waiting for deployment receipt")?;

        let address = receipt
            .contract_address
            .ok_or_else(|| anyhow!("deployment receipt for {tx_hash} has no contract address"))?;

        Ok(DeployedContract {
            address: ContractAddress(address),
            transaction_hash: receipt.transaction_hash,
        })
    }
}

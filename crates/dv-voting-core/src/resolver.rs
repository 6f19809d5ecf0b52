use crate::binding::ChainBinding;
use crate::error::VoteError;
use crate::registry::NetworkRegistry;
use dv_api_types::{BindingMode, ChainId, ContractAddress};
use dv_chain_client::VotingContract;
use std::sync::Arc;
use tracing::info;

/// A contract handle plus where it came from.
#[derive(Clone)]
pub struct BoundContract {
    pub address: ContractAddress,
    pub chain_id: Option<ChainId>,
    pub network_name: Option<String>,
    pub mode: BindingMode,
    pub handle: Arc<dyn VotingContract>,
}

impl std::fmt::Debug for BoundContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundContract")
            .field("address", &self.address)
            .field("chain_id", &self.chain_id)
            .field("network_name", &self.network_name)
            .field("mode", &self.mode)
            .finish()
    }
}

#[derive(Clone)]
pub struct ContractResolver {
    registry: Arc<NetworkRegistry>,
    binding: ChainBinding,
}

impl ContractResolver {
    pub fn new(registry: Arc<NetworkRegistry>, binding: ChainBinding) -> Self {
        Self { registry, binding }
    }

    pub fn registry(&self) -> &NetworkRegistry {
        &self.registry
    }

    pub fn resolve(&self, chain_id: ChainId) -> Result<BoundContract, VoteError> {
        let Some(entry) = self.registry.lookup(chain_id) else {
            return Err(VoteError::UnsupportedNetwork {
                chain_id,
                supported: self.registry.supported_names(),
            });
        };

        let handle = self.binding.bind_contract(&entry.contract_address)?;
        info!(
            %chain_id,
            network = %entry.network_name,
            address = %entry.contract_address,
            "resolved voting contract"
        );

        Ok(BoundContract {
            address: entry.contract_address.clone(),
            chain_id: Some(chain_id),
            network_name: Some(entry.network_name.clone()),
            mode: BindingMode::AutoDetect,
            handle,
        })
    }

    /// Binds to a user-supplied address. Whether a Voting contract lives
    /// there is only known after the first read.
    pub fn resolve_manual(&self, address: ContractAddress) -> Result<BoundContract, VoteError> {
        let handle = self.binding.bind_contract(&address)?;
        info!(address = %address, "bound voting contract manually");

        Ok(BoundContract {
            address,
            chain_id: None,
            network_name: None,
            mode: BindingMode::Manual,
            handle,
        })
    }
}

//! Chain id → deployed contract address and display name.
//!
//! One table per deployment environment. Tables are never merged: a registry
//! is built from exactly one table and the resolver is handed exactly one
//! registry.

use dv_api_types::{ChainId, ContractAddress, DeploymentEnvironment, NetworkEntry};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("chain id {0} appears more than once in the network table")]
    DuplicateChainId(ChainId),
    #[error("chain id {chain_id} maps to malformed contract address '{address}'")]
    InvalidAddress { chain_id: ChainId, address: String },
    #[error("network table is for {registry} but the session is configured for {configured}")]
    EnvironmentMismatch {
        registry: &'static str,
        configured: &'static str,
    },
    #[error("failed to read network table {path}: {cause}")]
    Io { path: String, cause: String },
    #[error("malformed network table {path}: {cause}")]
    Parse { path: String, cause: String },
}

const PRODUCTION_TABLE: &[(u64, &str, &str)] = &[
    (1, "0x1234567890123456789012345678901234567890", "Ethereum Mainnet"),
    (11155111, "0x2345678901234567890123456789012345678901", "Sepolia Testnet"),
    (5, "0x2345678901234567890123456789012345678901", "Goerli Testnet"),
    (137, "0x3456789012345678901234567890123456789012", "Polygon"),
    (80001, "0x4567890123456789012345678901234567890123", "Mumbai Testnet"),
    (1337, "0xafD7BD6ba24b94bF45d0C09C6D87890F5ad3feBB", "Ganache Local"),
    (31337, "0x5678901234567890123456789012345678901234", "Hardhat Local"),
];

const DEVELOPMENT_TABLE: &[(u64, &str, &str)] = &[
    (1337, "0xafD7BD6ba24b94bF45d0C09C6D87890F5ad3feBB", "Ganache Local"),
    (31337, "0x5678901234567890123456789012345678901234", "Hardhat Local"),
];

#[derive(Debug, Deserialize)]
struct TableRow {
    chain_id: u64,
    contract_address: String,
    network_name: String,
}

#[derive(Debug, Clone)]
pub struct NetworkRegistry {
    environment: DeploymentEnvironment,
    entries: Vec<NetworkEntry>,
    index: HashMap<ChainId, usize>,
}

impl NetworkRegistry {
    pub fn new(
        environment: DeploymentEnvironment,
        entries: Vec<NetworkEntry>,
    ) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            if !entry.contract_address.is_well_formed() {
                return Err(RegistryError::InvalidAddress {
                    chain_id: entry.chain_id,
                    address: entry.contract_address.0.clone(),
                });
            }
            if index.insert(entry.chain_id, position).is_some() {
                return Err(RegistryError::DuplicateChainId(entry.chain_id));
            }
        }
        Ok(Self {
            environment,
            entries,
            index,
        })
    }

    pub fn production() -> Self {
        Self::from_static(DeploymentEnvironment::Production, PRODUCTION_TABLE)
    }

    pub fn development() -> Self {
        Self::from_static(DeploymentEnvironment::Development, DEVELOPMENT_TABLE)
    }

    pub fn for_environment(environment: DeploymentEnvironment) -> Self {
        match environment {
            DeploymentEnvironment::Production => Self::production(),
            DeploymentEnvironment::Development => Self::development(),
        }
    }

    /// Loads a replacement table: a JSON array of
    /// `{chain_id, contract_address, network_name}` objects.
    pub fn from_json_file(
        path: &Path,
        environment: DeploymentEnvironment,
    ) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path).map_err(|err| RegistryError::Io {
            path: path.display().to_string(),
            cause: err.to_string(),
        })?;
        let rows: Vec<TableRow> = serde_json::from_str(&raw).map_err(|err| RegistryError::Parse {
            path: path.display().to_string(),
            cause: err.to_string(),
        })?;
        let entries = rows
            .into_iter()
            .map(|row| NetworkEntry {
                chain_id: ChainId(row.chain_id),
                contract_address: ContractAddress(row.contract_address),
                network_name: row.network_name,
            })
            .collect();
        Self::new(environment, entries)
    }

    fn from_static(environment: DeploymentEnvironment, table: &[(u64, &str, &str)]) -> Self {
        let entries: Vec<NetworkEntry> = table
            .iter()
            .map(|(chain_id, address, name)| NetworkEntry {
                chain_id: ChainId(*chain_id),
                contract_address: ContractAddress((*address).to_owned()),
                network_name: (*name).to_owned(),
            })
            .collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.chain_id, position))
            .collect();
        Self {
            environment,
            entries,
            index,
        }
    }

    pub fn environment(&self) -> DeploymentEnvironment {
        self.environment
    }

    pub fn entries(&self) -> &[NetworkEntry] {
        &self.entries
    }

    pub fn lookup(&self, chain_id: ChainId) -> Option<&NetworkEntry> {
        self.index.get(&chain_id).map(|position| &self.entries[*position])
    }

    pub fn is_supported(&self, chain_id: ChainId) -> bool {
        self.index.contains_key(&chain_id)
    }

    pub fn name_of(&self, chain_id: ChainId) -> String {
        match self.lookup(chain_id) {
            Some(entry) => entry.network_name.clone(),
            None => format!("Unknown Network ({chain_id})"),
        }
    }

    /// Display names in table order.
    pub fn supported_names(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.network_name.clone()).collect()
    }
}

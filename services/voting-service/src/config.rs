use anyhow::{Context, Result};
use dv_api_types::DeploymentEnvironment;
use dv_chain_evm::DEFAULT_RPC_URL;
use dv_voting_core::VotingConfig;
use dv_voting_core::config::DEFAULT_VOTE_GAS_LIMIT;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_WATCH_INTERVAL_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub(crate) struct ServiceConfig {
    pub(crate) rpc_url: String,
    pub(crate) bind_addr: SocketAddr,
    pub(crate) networks_file: Option<PathBuf>,
    pub(crate) manual_contract: Option<String>,
    pub(crate) watch_interval: Duration,
    pub(crate) voting: VotingConfig,
}

impl ServiceConfig {
    pub(crate) fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let environment = match get("VOTING_ENV") {
            Some(raw) => raw
                .parse::<DeploymentEnvironment>()
                .map_err(anyhow::Error::msg)
                .context("VOTING_ENV")?,
            None => DeploymentEnvironment::default(),
        };

        let gas_limit = match get("VOTING_GAS_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("VOTING_GAS_LIMIT must be an integer, got {raw}"))?,
            None => DEFAULT_VOTE_GAS_LIMIT,
        };

        let manual_contract = get("VOTING_CONTRACT_ADDRESS").map(|raw| raw.trim().to_owned());
        let auto_detect = match get("VOTING_AUTO_DETECT") {
            Some(raw) => parse_bool(&raw).context("VOTING_AUTO_DETECT")?,
            None => manual_contract.is_none(),
        };

        let bind_addr = get("VOTING_BIND_ADDR")
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned())
            .parse::<SocketAddr>()
            .context("VOTING_BIND_ADDR")?;

        let watch_interval_ms = match get("VOTING_WATCH_INTERVAL_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("VOTING_WATCH_INTERVAL_MS must be an integer, got {raw}"))?,
            None => DEFAULT_WATCH_INTERVAL_MS,
        };

        Ok(Self {
            rpc_url: get("VOTING_RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_owned()),
            bind_addr,
            networks_file: get("VOTING_NETWORKS_FILE").map(PathBuf::from),
            manual_contract,
            watch_interval: Duration::from_millis(watch_interval_ms.max(1)),
            voting: VotingConfig {
                gas_limit,
                auto_detect,
                environment,
            },
        })
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other}"),
    }
}

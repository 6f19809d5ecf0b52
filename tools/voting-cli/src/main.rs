use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use dv_api_types::{BindingMode, Candidate, ContractAddress, DeploymentEnvironment, tally};
use dv_chain_client::WalletProvider;
use dv_chain_evm::{DEFAULT_CANDIDATES, DEFAULT_RPC_URL, JsonRpcProvider, TruffleArtifact};
use dv_storage::{DeploymentRecord, DeploymentStore, JsonFileDeploymentStore};
use dv_voting_core::config::DEFAULT_VOTE_GAS_LIMIT;
use dv_voting_core::{BoundContract, NetworkRegistry, VoteSubmitter};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Deploy and interact with the Voting contract", author, version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the network table for a deployment environment
    Networks {
        #[arg(long, default_value = "production")]
        env: DeploymentEnvironment,
        /// JSON file replacing the built-in table
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Deploy a Voting contract from a compiled Truffle artifact
    Deploy {
        #[arg(long, env = "NETWORK_URL", default_value = DEFAULT_RPC_URL)]
        rpc_url: String,
        #[arg(long, default_value = "build/contracts/Voting.json")]
        artifact: PathBuf,
        /// Initial candidate; repeat for several
        #[arg(long = "candidate")]
        candidates: Vec<String>,
        #[arg(long, default_value = "deployment.json")]
        out: PathBuf,
    },
    /// Show results from a deployment record and optionally vote
    Interact {
        #[arg(long, env = "NETWORK_URL", default_value = DEFAULT_RPC_URL)]
        rpc_url: String,
        #[arg(long, default_value = "deployment.json")]
        deployment: PathBuf,
        /// Candidate id to vote for, if the account has not voted yet
        #[arg(long)]
        vote: Option<u64>,
        #[arg(long, default_value_t = DEFAULT_VOTE_GAS_LIMIT)]
        gas_limit: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Command::Networks { env, file } => {
            let registry = match file {
                Some(path) => NetworkRegistry::from_json_file(&path, env)?,
                None => NetworkRegistry::for_environment(env),
            };
            print!("{}", render_networks(&registry));
        }
        Command::Deploy {
            rpc_url,
            artifact,
            candidates,
            out,
        } => {
            let provider = JsonRpcProvider::new(Some(rpc_url));
            let store = JsonFileDeploymentStore::new(out);
            let record = deploy(&provider, &artifact, candidates, &store).await?;
            println!("Voting contract deployed at {}", record.address);
            println!("Transaction: {}", record.transaction_hash);
            println!("Deployment record written to {}", store.path().display());
        }
        Command::Interact {
            rpc_url,
            deployment,
            vote,
            gas_limit,
        } => {
            let provider = JsonRpcProvider::new(Some(rpc_url));
            let store = JsonFileDeploymentStore::new(deployment);
            let report = interact(&provider, &store, vote, gas_limit).await?;
            print!("{report}");
        }
    }

    Ok(())
}

fn render_networks(registry: &NetworkRegistry) -> String {
    let mut out = format!("{} networks:\n", registry.environment().as_str());
    for entry in registry.entries() {
        let _ = writeln!(
            out,
            "  {:>10}  {:<18} {}",
            entry.chain_id, entry.network_name, entry.contract_address
        );
    }
    out
}

async fn deploy(
    provider: &JsonRpcProvider,
    artifact_path: &std::path::Path,
    candidates: Vec<String>,
    store: &dyn DeploymentStore,
) -> Result<DeploymentRecord> {
    let artifact = TruffleArtifact::load(artifact_path)?;
    let candidates = if candidates.is_empty() {
        DEFAULT_CANDIDATES.iter().map(|name| (*name).to_owned()).collect()
    } else {
        candidates
    };

    let deployer = provider
        .request_accounts()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("node exposes no unlocked accounts"))?;
    let chain_id = provider.chain_id().await.ok();
    info!(deployer = %deployer, ?chain_id, "deploying with {} candidates", candidates.len());

    let deployed = provider.deploy_voting(&deployer, &artifact, &candidates).await?;

    let record = DeploymentRecord {
        address: deployed.address.0,
        transaction_hash: deployed.transaction_hash,
        network: provider.endpoint().to_owned(),
        chain_id: chain_id.map(|id| id.0),
        deployed_at_epoch_ms: epoch_ms()?,
        candidates,
    };
    store.save_deployment(&record).await?;
    Ok(record)
}

async fn interact(
    provider: &dyn WalletProvider,
    store: &dyn DeploymentStore,
    vote: Option<u64>,
    gas_limit: u64,
) -> Result<String> {
    let record = store
        .load_deployment()
        .await?
        .ok_or_else(|| anyhow!("no deployment record found; run `voting deploy` first"))?;

    let account = provider
        .accounts()
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("node exposes no accounts"))?;

    let address = ContractAddress(record.address.clone());
    let submitter = VoteSubmitter::new(
        Some(BoundContract {
            handle: provider.contract(&address),
            address,
            chain_id: None,
            network_name: None,
            mode: BindingMode::Manual,
        }),
        gas_limit,
    );

    let mut out = String::new();
    let _ = writeln!(out, "Contract: {}", record.address);
    let _ = writeln!(out, "Account: {account}");

    let candidates = submitter.list_candidates().await?;
    let total = submitter.total_votes().await?;
    let has_voted = submitter.voting_status(&account).await?;
    render_results(&mut out, &candidates, total);
    let _ = writeln!(out, "Has voted: {has_voted}");

    if let Some(candidate_id) = vote {
        if has_voted {
            let _ = writeln!(out, "Account already voted; skipping vote for candidate {candidate_id}");
        } else {
            let receipt = submitter
                .cast_vote(Some(&account), candidate_id)
                .await
                .with_context(|| format!("voting for candidate {candidate_id}"))?;
            let _ = writeln!(out, "Voted for candidate {candidate_id}: {}", receipt.transaction_hash);

            let candidates = submitter.list_candidates().await?;
            let total = submitter.total_votes().await?;
            let _ = writeln!(out, "Updated results:");
            render_results(&mut out, &candidates, total);
        }
    }

    Ok(out)
}

fn render_results(out: &mut String, candidates: &[Candidate], total_votes: u64) {
    for row in tally(candidates, total_votes) {
        let _ = writeln!(
            out,
            "  {}. {}: {} votes ({:.1}%)",
            row.id, row.name, row.vote_count, row.percentage
        );
    }
    let _ = writeln!(out, "Total votes: {total_votes}");
}

fn epoch_ms() -> Result<u128> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis())
}

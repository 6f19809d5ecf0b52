//! In-process chain with a wallet and Voting contracts.
//!
//! Mirrors what a browser wallet connected to a local node does, including
//! the revert messages the node produces, so error classification can be
//! exercised without a network. Calls can be parked with `hold_votes` /
//! `hold_chain_queries` to observe a request while it is in flight.

use crate::events::EventHub;
use crate::{ProviderError, USER_REJECTED_CODE, VoteTxRequest, VotingContract, WalletProvider};
use async_trait::async_trait;
use dv_api_types::{AccountAddress, Candidate, ChainId, ContractAddress, VoteReceipt};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

const EXECUTION_ERROR_CODE: i64 = -32000;
/// Gas a single `vote` consumes on the simulated chain.
pub const DEFAULT_VOTE_GAS: u64 = 75_000;

struct Ballot {
    candidates: Vec<Candidate>,
    voters: HashSet<String>,
}

struct ChainState {
    chain_id: ChainId,
    accounts: Vec<AccountAddress>,
    reject_access: bool,
    reject_signing: bool,
    vote_gas: u64,
    contracts: HashMap<(ChainId, String), Ballot>,
}

struct ChainInner {
    state: Mutex<ChainState>,
    events: EventHub,
    chain_query_hold: Arc<tokio::sync::Mutex<()>>,
    vote_hold: Arc<tokio::sync::Mutex<()>>,
    chain_queries_entered: AtomicUsize,
    votes_entered: AtomicUsize,
    votes_submitted: AtomicUsize,
    tx_counter: AtomicU64,
}

impl ChainInner {
    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone)]
pub struct InMemoryChain {
    inner: Arc<ChainInner>,
}

impl InMemoryChain {
    pub fn new(chain_id: u64, accounts: &[&str]) -> Self {
        Self {
            inner: Arc::new(ChainInner {
                state: Mutex::new(ChainState {
                    chain_id: ChainId(chain_id),
                    accounts: accounts.iter().map(|a| AccountAddress((*a).to_owned())).collect(),
                    reject_access: false,
                    reject_signing: false,
                    vote_gas: DEFAULT_VOTE_GAS,
                    contracts: HashMap::new(),
                }),
                events: EventHub::new(),
                chain_query_hold: Arc::new(tokio::sync::Mutex::new(())),
                vote_hold: Arc::new(tokio::sync::Mutex::new(())),
                chain_queries_entered: AtomicUsize::new(0),
                votes_entered: AtomicUsize::new(0),
                votes_submitted: AtomicUsize::new(0),
                tx_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Deploys a Voting contract on the current chain. Candidate ids start at 1.
    pub fn deploy_voting(&self, address: &str, names: &[&str]) {
        let candidates = names
            .iter()
            .enumerate()
            .map(|(index, name)| Candidate {
                id: index as u64 + 1,
                name: (*name).to_owned(),
                vote_count: 0,
            })
            .collect();
        let mut state = self.inner.lock();
        let key = (state.chain_id, address.to_ascii_lowercase());
        state.contracts.insert(
            key,
            Ballot {
                candidates,
                voters: HashSet::new(),
            },
        );
    }

    /// Changes the active chain and notifies listeners, like a wallet network switch.
    pub fn switch_chain(&self, chain_id: u64) {
        self.inner.lock().chain_id = ChainId(chain_id);
        self.inner.events.emit_chain_changed(ChainId(chain_id));
    }

    /// Replaces the exposed accounts and notifies listeners.
    pub fn switch_accounts(&self, accounts: &[&str]) {
        let accounts: Vec<AccountAddress> =
            accounts.iter().map(|a| AccountAddress((*a).to_owned())).collect();
        self.inner.lock().accounts = accounts.clone();
        self.inner.events.emit_accounts_changed(&accounts);
    }

    pub fn reject_access(&self, reject: bool) {
        self.inner.lock().reject_access = reject;
    }

    pub fn reject_signing(&self, reject: bool) {
        self.inner.lock().reject_signing = reject;
    }

    pub fn set_vote_gas(&self, gas: u64) {
        self.inner.lock().vote_gas = gas;
    }

    /// Parks `vote` transactions until the guard is dropped.
    pub async fn hold_votes(&self) -> OwnedMutexGuard<()> {
        self.inner.vote_hold.clone().lock_owned().await
    }

    /// Parks `chain_id` queries until the guard is dropped.
    pub async fn hold_chain_queries(&self) -> OwnedMutexGuard<()> {
        self.inner.chain_query_hold.clone().lock_owned().await
    }

    /// Yields until at least `count` vote transactions have reached the chain.
    pub async fn wait_for_vote_calls(&self, count: usize) {
        while self.inner.votes_entered.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    /// Yields until at least `count` chain id queries have been issued.
    pub async fn wait_for_chain_queries(&self, count: usize) {
        while self.inner.chain_queries_entered.load(Ordering::SeqCst) < count {
            tokio::task::yield_now().await;
        }
    }

    /// Vote transactions that were signed and sent, successful or not.
    pub fn votes_submitted(&self) -> usize {
        self.inner.votes_submitted.load(Ordering::SeqCst)
    }

    pub fn has_voted(&self, address: &str, voter: &str) -> bool {
        let state = self.inner.lock();
        state
            .contracts
            .get(&(state.chain_id, address.to_ascii_lowercase()))
            .is_some_and(|ballot| ballot.voters.contains(&voter.to_ascii_lowercase()))
    }
}

#[async_trait]
impl WalletProvider for InMemoryChain {
    async fn request_accounts(&self) -> Result<Vec<AccountAddress>, ProviderError> {
        let state = self.inner.lock();
        if state.reject_access {
            return Err(ProviderError::rpc(
                USER_REJECTED_CODE,
                "User denied account authorization",
            ));
        }
        Ok(state.accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<AccountAddress>, ProviderError> {
        Ok(self.inner.lock().accounts.clone())
    }

    async fn chain_id(&self) -> Result<ChainId, ProviderError> {
        self.inner.chain_queries_entered.fetch_add(1, Ordering::SeqCst);
        let _hold = self.inner.chain_query_hold.lock().await;
        Ok(self.inner.lock().chain_id)
    }

    fn events(&self) -> &EventHub {
        &self.inner.events
    }

    fn contract(&self, address: &ContractAddress) -> Arc<dyn VotingContract> {
        Arc::new(MemoryContract {
            chain: self.inner.clone(),
            address: address.clone(),
        })
    }
}

struct MemoryContract {
    chain: Arc<ChainInner>,
    address: ContractAddress,
}

impl MemoryContract {
    fn read<T>(&self, f: impl FnOnce(&Ballot) -> T) -> Result<T, ProviderError> {
        let state = self.chain.lock();
        let key = (state.chain_id, self.address.0.to_ascii_lowercase());
        match state.contracts.get(&key) {
            Some(ballot) => Ok(f(ballot)),
            None => Err(ProviderError::InvalidResponse(format!(
                "call to {} returned no data (\"0x\")",
                self.address
            ))),
        }
    }
}

fn revert(reason: &str) -> ProviderError {
    ProviderError::rpc(
        EXECUTION_ERROR_CODE,
        format!("VM Exception while processing transaction: revert {reason}"),
    )
}

#[async_trait]
impl VotingContract for MemoryContract {
    fn address(&self) -> &ContractAddress {
        &self.address
    }

    async fn get_all_candidates(&self) -> Result<Vec<Candidate>, ProviderError> {
        self.read(|ballot| ballot.candidates.clone())
    }

    async fn get_voter_status(&self, voter: &AccountAddress) -> Result<bool, ProviderError> {
        let voter = voter.0.to_ascii_lowercase();
        self.read(|ballot| ballot.voters.contains(&voter))
    }

    async fn get_total_votes(&self) -> Result<u64, ProviderError> {
        self.read(|ballot| ballot.candidates.iter().map(|c| c.vote_count).sum())
    }

    async fn candidates_count(&self) -> Result<u64, ProviderError> {
        self.read(|ballot| ballot.candidates.len() as u64)
    }

    async fn vote(&self, req: VoteTxRequest) -> Result<VoteReceipt, ProviderError> {
        // A sent transaction stays on the chain it was signed for.
        let chain_id = self.chain.lock().chain_id;
        self.chain.votes_entered.fetch_add(1, Ordering::SeqCst);
        let _hold = self.chain.vote_hold.lock().await;

        let mut state = self.chain.lock();
        if state.reject_signing {
            return Err(ProviderError::rpc(
                USER_REJECTED_CODE,
                "MetaMask Tx Signature: User denied transaction signature.",
            ));
        }
        self.chain.votes_submitted.fetch_add(1, Ordering::SeqCst);

        if req.gas_limit < state.vote_gas {
            return Err(ProviderError::rpc(
                EXECUTION_ERROR_CODE,
                "VM Exception while processing transaction: out of gas",
            ));
        }

        let key = (chain_id, self.address.0.to_ascii_lowercase());
        let Some(ballot) = state.contracts.get_mut(&key) else {
            return Err(ProviderError::rpc(EXECUTION_ERROR_CODE, "execution reverted"));
        };

        let voter = req.from.0.to_ascii_lowercase();
        if ballot.voters.contains(&voter) {
            return Err(revert("You have already voted"));
        }
        if req.candidate_id == 0 || req.candidate_id > ballot.candidates.len() as u64 {
            return Err(revert("Invalid candidate ID"));
        }

        ballot.voters.insert(voter);
        ballot.candidates[(req.candidate_id - 1) as usize].vote_count += 1;

        let nonce = self.chain.tx_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(VoteReceipt {
            transaction_hash: format!("0x{nonce:064x}"),
        })
    }
}

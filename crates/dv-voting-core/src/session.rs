//! One wallet connection and its contract binding.
//!
//! Every state change is stamped with an epoch. Provider events bump the
//! epoch synchronously, so a continuation that started under an older epoch
//! finds its context gone when it resumes and drops its result
//! (`VoteError::Superseded`) instead of writing it back.
//!
//! Contract resolution only depends on the chain, so it is checked against a
//! separate binding epoch that an account swap leaves alone.

use crate::binding::ChainBinding;
use crate::config::VotingConfig;
use crate::error::VoteError;
use crate::registry::{NetworkRegistry, RegistryError};
use crate::resolver::{BoundContract, ContractResolver};
use crate::submitter::VoteSubmitter;
use dv_api_types::{
    AccountAddress, BindingMode, Candidate, ChainId, ContractAddress, SessionState, SessionStatus,
    VoteReceipt, VotingDataResponse, tally,
};
use dv_chain_client::Subscription;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one full reload: the three reads taken together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VotingSnapshot {
    pub candidates: Vec<Candidate>,
    pub total_votes: u64,
    pub has_voted: bool,
}

impl VotingSnapshot {
    pub fn to_response(&self) -> VotingDataResponse {
        VotingDataResponse {
            candidates: tally(&self.candidates, self.total_votes),
            total_votes: self.total_votes,
            has_voted: self.has_voted,
        }
    }
}

struct SessionInner {
    epoch: u64,
    binding_epoch: u64,
    state: SessionState,
    mode: BindingMode,
    account: Option<AccountAddress>,
    chain_id: Option<ChainId>,
    contract: Option<BoundContract>,
    has_voted: Option<bool>,
    snapshot: Option<VotingSnapshot>,
    last_error: Option<String>,
}

impl SessionInner {
    fn new(mode: BindingMode) -> Self {
        Self {
            epoch: 0,
            binding_epoch: 0,
            state: SessionState::Disconnected,
            mode,
            account: None,
            chain_id: None,
            contract: None,
            has_voted: None,
            snapshot: None,
            last_error: None,
        }
    }

    fn discard_binding(&mut self) {
        self.contract = None;
        self.has_voted = None;
        self.snapshot = None;
    }

    /// Starts a new binding attempt. Invalidates everything in flight.
    fn rebind(&mut self) -> Stamp {
        self.epoch += 1;
        self.binding_epoch += 1;
        self.discard_binding();
        Stamp::Binding(self.binding_epoch)
    }

    fn reset(&mut self, mode: BindingMode) {
        self.epoch += 1;
        self.binding_epoch += 1;
        self.state = SessionState::Disconnected;
        self.mode = mode;
        self.account = None;
        self.chain_id = None;
        self.discard_binding();
        self.last_error = None;
    }
}

/// The epoch an in-flight operation started under.
#[derive(Debug, Clone, Copy)]
enum Stamp {
    Session(u64),
    Binding(u64),
}

impl Stamp {
    fn is_current(self, inner: &SessionInner) -> bool {
        match self {
            Stamp::Session(epoch) => inner.epoch == epoch,
            Stamp::Binding(epoch) => inner.binding_epoch == epoch,
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, VoteError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(flag))
            .map_err(|_| VoteError::OperationInProgress)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Session {
    id: Uuid,
    binding: ChainBinding,
    resolver: ContractResolver,
    config: VotingConfig,
    inner: Mutex<SessionInner>,
    voting: AtomicBool,
    reload_lock: tokio::sync::Mutex<()>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl Session {
    /// Builds a session over the network table for `config.environment`.
    pub fn for_environment(binding: ChainBinding, config: VotingConfig) -> Arc<Self> {
        let registry = Arc::new(NetworkRegistry::for_environment(config.environment));
        Self::build(binding, registry, config)
    }

    /// Builds a session and subscribes it to provider events. The
    /// subscriptions live as long as the session. The registry must hold the
    /// table of the configured environment.
    pub fn new(
        binding: ChainBinding,
        registry: Arc<NetworkRegistry>,
        config: VotingConfig,
    ) -> Result<Arc<Self>, RegistryError> {
        if registry.environment() != config.environment {
            return Err(RegistryError::EnvironmentMismatch {
                registry: registry.environment().as_str(),
                configured: config.environment.as_str(),
            });
        }
        Ok(Self::build(binding, registry, config))
    }

    fn build(binding: ChainBinding, registry: Arc<NetworkRegistry>, config: VotingConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Session>| {
            let mut subscriptions = Vec::with_capacity(2);

            let on_chain = weak.clone();
            match binding.on_chain_changed(move |chain_id| {
                if let Some(session) = on_chain.upgrade() {
                    session.handle_chain_changed(chain_id);
                }
            }) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => debug!(error = %err, "chain events unavailable"),
            }

            let on_accounts = weak.clone();
            match binding.on_accounts_changed(move |accounts| {
                if let Some(session) = on_accounts.upgrade() {
                    session.handle_accounts_changed(accounts);
                }
            }) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => debug!(error = %err, "account events unavailable"),
            }

            Session {
                id: Uuid::new_v4(),
                resolver: ContractResolver::new(registry, binding.clone()),
                binding,
                inner: Mutex::new(SessionInner::new(config.default_mode())),
                config,
                voting: AtomicBool::new(false),
                reload_lock: tokio::sync::Mutex::new(()),
                subscriptions: Mutex::new(subscriptions),
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` only if nothing invalidated `stamp` since it was taken.
    fn apply<T>(
        &self,
        stamp: Stamp,
        operation: &'static str,
        f: impl FnOnce(&mut SessionInner) -> T,
    ) -> Result<T, VoteError> {
        let mut inner = self.lock();
        if !stamp.is_current(&inner) {
            warn!(
                session = %self.id,
                operation,
                started = ?stamp,
                epoch = inner.epoch,
                binding_epoch = inner.binding_epoch,
                "discarding stale result"
            );
            return Err(VoteError::Superseded(operation));
        }
        Ok(f(&mut inner))
    }

    fn require_idle(&self) -> Result<(), VoteError> {
        if self.voting.load(Ordering::Acquire) {
            return Err(VoteError::OperationInProgress);
        }
        Ok(())
    }

    fn require_idle_account(&self) -> Result<(), VoteError> {
        self.require_idle()?;
        if self.lock().account.is_none() {
            return Err(VoteError::NotConnected);
        }
        Ok(())
    }

    /// Asks the wallet for access, then resolves the contract when the
    /// session is in auto-detect mode.
    pub async fn connect(&self) -> Result<AccountAddress, VoteError> {
        self.require_idle()?;
        let epoch = {
            let mut inner = self.lock();
            inner.rebind();
            inner.state = SessionState::Connecting;
            inner.last_error = None;
            Stamp::Session(inner.epoch)
        };
        info!(session = %self.id, "requesting wallet access");

        let account = match self.binding.request_access().await {
            Ok(account) => account,
            Err(err) => {
                self.apply(epoch, "connect", |inner| {
                    inner.state = SessionState::Disconnected;
                    inner.last_error = Some(err.to_string());
                })?;
                return Err(err);
            }
        };

        let mode = self.apply(epoch, "connect", |inner| {
            inner.state = SessionState::Connected;
            inner.account = Some(account.clone());
            inner.mode
        })?;
        info!(session = %self.id, account = %account, ?mode, "wallet connected");

        if mode == BindingMode::AutoDetect {
            self.autodetect().await?;
        }
        Ok(account)
    }

    /// Switches to auto-detect mode and binds the registry contract for the
    /// wallet's current chain.
    pub async fn autodetect(&self) -> Result<BoundContract, VoteError> {
        self.require_idle_account()?;
        let epoch = {
            let mut inner = self.lock();
            inner.mode = BindingMode::AutoDetect;
            inner.state = SessionState::Resolving;
            inner.rebind()
        };

        let chain_id = match self.binding.current_chain_id().await {
            Ok(chain_id) => chain_id,
            Err(err) => return self.resolution_failed(epoch, "autodetect", err),
        };

        let resolved = self.resolver.resolve(chain_id);
        self.apply(epoch, "autodetect", |inner| {
            inner.chain_id = Some(chain_id);
            match &resolved {
                Ok(contract) => {
                    inner.contract = Some(contract.clone());
                    inner.state = SessionState::Ready;
                    inner.last_error = None;
                }
                Err(err) => {
                    inner.state = SessionState::Connected;
                    inner.last_error = Some(err.to_string());
                }
            }
        })?;

        match &resolved {
            Ok(contract) => info!(session = %self.id, %chain_id, address = %contract.address, "session ready"),
            Err(err) => warn!(session = %self.id, %chain_id, error = %err, "contract resolution failed"),
        }
        resolved
    }

    /// Switches to manual mode and binds `address`. The session only becomes
    /// ready once the candidate list can be read from it.
    pub async fn bind_manual(&self, address: ContractAddress) -> Result<BoundContract, VoteError> {
        self.require_idle_account()?;
        let epoch = {
            let mut inner = self.lock();
            inner.mode = BindingMode::Manual;
            inner.state = SessionState::Resolving;
            inner.rebind()
        };

        let contract = match self.resolver.resolve_manual(address) {
            Ok(contract) => contract,
            Err(err) => return self.resolution_failed(epoch, "bind_manual", err),
        };

        let check = VoteSubmitter::new(Some(contract.clone()), self.config.gas_limit);
        if let Err(err) = check.list_candidates().await {
            return self.resolution_failed(epoch, "bind_manual", err);
        }

        self.apply(epoch, "bind_manual", |inner| {
            inner.contract = Some(contract.clone());
            inner.state = SessionState::Ready;
            inner.last_error = None;
        })?;
        info!(session = %self.id, address = %contract.address, "session ready");
        Ok(contract)
    }

    fn resolution_failed<T>(
        &self,
        epoch: Stamp,
        operation: &'static str,
        err: VoteError,
    ) -> Result<T, VoteError> {
        self.apply(epoch, operation, |inner| {
            inner.state = SessionState::Connected;
            inner.last_error = Some(err.to_string());
        })?;
        warn!(session = %self.id, operation, error = %err, "binding failed");
        Err(err)
    }

    /// Reads candidates, total votes and the account's voter status as one
    /// unit. Reloads never overlap.
    pub async fn reload(&self) -> Result<VotingSnapshot, VoteError> {
        let _serial = self.reload_lock.lock().await;

        let (epoch, submitter, account) = {
            let inner = self.lock();
            (
                Stamp::Session(inner.epoch),
                VoteSubmitter::new(inner.contract.clone(), self.config.gas_limit),
                inner.account.clone(),
            )
        };
        let account = account.ok_or(VoteError::NotConnected)?;

        let reads = tokio::try_join!(
            submitter.list_candidates(),
            submitter.total_votes(),
            submitter.voting_status(&account),
        );
        let (candidates, total_votes, has_voted) = match reads {
            Ok(reads) => reads,
            Err(err) => {
                self.apply(epoch, "reload", |inner| {
                    inner.last_error = Some(err.to_string());
                })?;
                return Err(err);
            }
        };

        let snapshot = VotingSnapshot {
            candidates,
            total_votes,
            has_voted,
        };
        self.apply(epoch, "reload", |inner| {
            inner.has_voted = Some(has_voted);
            inner.snapshot = Some(snapshot.clone());
        })?;
        debug!(session = %self.id, total_votes, has_voted, "voting data reloaded");
        Ok(snapshot)
    }

    /// Submits a vote from the connected account. At most one vote is
    /// outstanding per session; a second call fails with
    /// `OperationInProgress` without reaching the wallet.
    pub async fn cast_vote(&self, candidate_id: u64) -> Result<VoteReceipt, VoteError> {
        let _busy = BusyGuard::acquire(&self.voting)?;

        let (epoch, submitter, account) = {
            let mut inner = self.lock();
            if inner.has_voted == Some(true) {
                return Err(VoteError::AlreadyVoted);
            }
            if inner.contract.is_some() && inner.state == SessionState::Ready {
                inner.state = SessionState::Voting;
            }
            (
                Stamp::Session(inner.epoch),
                VoteSubmitter::new(inner.contract.clone(), self.config.gas_limit),
                inner.account.clone(),
            )
        };

        match submitter.cast_vote(account.as_ref(), candidate_id).await {
            Ok(receipt) => {
                let applied = self.apply(epoch, "cast_vote", |inner| {
                    inner.state = SessionState::Ready;
                    inner.has_voted = Some(true);
                    inner.last_error = None;
                });
                if applied.is_ok() {
                    if let Err(err) = self.reload().await {
                        warn!(session = %self.id, error = %err, "refresh after vote failed");
                    }
                }
                Ok(receipt)
            }
            Err(err) => {
                let _ = self.apply(epoch, "cast_vote", |inner| {
                    if inner.state == SessionState::Voting {
                        inner.state = SessionState::Ready;
                    }
                    if err == VoteError::AlreadyVoted {
                        inner.has_voted = Some(true);
                    }
                    inner.last_error = Some(err.to_string());
                });
                Err(err)
            }
        }
    }

    /// Drops the connection and any binding.
    pub fn disconnect(&self) {
        self.lock().reset(self.config.default_mode());
        info!(session = %self.id, "session disconnected");
    }

    /// Unregisters the provider event handlers. Dropping the session does
    /// the same.
    pub fn teardown(&self) {
        self.subscriptions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn handle_chain_changed(&self, chain_id: ChainId) {
        let mut inner = self.lock();
        info!(session = %self.id, %chain_id, from = ?inner.state, "chain changed, resetting session");
        inner.reset(self.config.default_mode());
    }

    fn handle_accounts_changed(&self, accounts: &[AccountAddress]) {
        let mut inner = self.lock();
        let Some(account) = accounts.first() else {
            info!(session = %self.id, "wallet exposed no accounts, resetting session");
            inner.reset(self.config.default_mode());
            return;
        };

        if matches!(inner.state, SessionState::Disconnected | SessionState::Connecting) {
            debug!(session = %self.id, account = %account, "account change before connection, ignored");
            return;
        }
        if inner.account.as_ref().is_some_and(|current| current.same_as(account)) {
            return;
        }

        inner.epoch += 1;
        inner.account = Some(account.clone());
        inner.has_voted = None;
        inner.snapshot = None;
        inner.last_error = None;
        inner.state = if inner.state == SessionState::Resolving {
            SessionState::Resolving
        } else if inner.contract.is_some() {
            SessionState::Ready
        } else {
            SessionState::Connected
        };
        info!(session = %self.id, account = %account, state = ?inner.state, "account switched");
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    pub fn registry(&self) -> &NetworkRegistry {
        self.resolver.registry()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn mode(&self) -> BindingMode {
        self.lock().mode
    }

    pub fn account(&self) -> Option<AccountAddress> {
        self.lock().account.clone()
    }

    pub fn contract(&self) -> Option<BoundContract> {
        self.lock().contract.clone()
    }

    pub fn has_voted(&self) -> Option<bool> {
        self.lock().has_voted
    }

    pub fn snapshot(&self) -> Option<VotingSnapshot> {
        self.lock().snapshot.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        let network_name = match (&inner.contract, inner.chain_id) {
            (Some(BoundContract { network_name: Some(name), .. }), _) => Some(name.clone()),
            (_, Some(chain_id)) => Some(self.registry().name_of(chain_id)),
            _ => None,
        };
        SessionStatus {
            session_id: self.id.to_string(),
            state: inner.state,
            mode: inner.mode,
            account: inner.account.as_ref().map(|account| account.0.clone()),
            chain_id: inner.chain_id.map(|chain_id| chain_id.0),
            network_name,
            contract_address: inner.contract.as_ref().map(|contract| contract.address.0.clone()),
            has_voted: inner.has_voted,
            last_error: inner.last_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dv_api_types::{DeploymentEnvironment, NetworkEntry};
    use dv_chain_client::{InMemoryChain, WalletProvider};

    const SEPOLIA_BALLOT: &str = "0xAAA0000000000000000000000000000000000001";
    const GANACHE_BALLOT: &str = "0xBBB0000000000000000000000000000000000002";
    const NOT_A_BALLOT: &str = "0xCCC0000000000000000000000000000000000003";
    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";

    fn registry() -> Arc<NetworkRegistry> {
        let entries = vec![
            NetworkEntry {
                chain_id: ChainId(11155111),
                contract_address: ContractAddress(SEPOLIA_BALLOT.to_owned()),
                network_name: "Sepolia Testnet".to_owned(),
            },
            NetworkEntry {
                chain_id: ChainId(1337),
                contract_address: ContractAddress(GANACHE_BALLOT.to_owned()),
                network_name: "Ganache Local".to_owned(),
            },
        ];
        Arc::new(NetworkRegistry::new(DeploymentEnvironment::Production, entries).unwrap())
    }

    fn ganache() -> InMemoryChain {
        let chain = InMemoryChain::new(1337, &[ALICE, BOB]);
        chain.deploy_voting(GANACHE_BALLOT, &["Alice Johnson", "Bob Smith", "Carol Davis"]);
        chain
    }

    fn session_with(chain: &InMemoryChain, config: VotingConfig) -> Arc<Session> {
        Session::new(ChainBinding::new(Arc::new(chain.clone())), registry(), config)
            .expect("registry matches configured environment")
    }

    fn session(chain: &InMemoryChain) -> Arc<Session> {
        session_with(chain, VotingConfig::default())
    }

    fn manual_config() -> VotingConfig {
        VotingConfig {
            auto_detect: false,
            ..VotingConfig::default()
        }
    }

    #[tokio::test]
    async fn connect_auto_detects_registry_contract() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);

        let account = session.connect().await?;
        assert_eq!(account.0, ALICE);
        assert_eq!(session.state(), SessionState::Ready);

        let status = session.status();
        assert_eq!(status.contract_address.as_deref(), Some(GANACHE_BALLOT));
        assert_eq!(status.network_name.as_deref(), Some("Ganache Local"));
        assert_eq!(status.chain_id, Some(1337));
        Ok(())
    }

    #[tokio::test]
    async fn unsupported_chain_leaves_session_connected() {
        let chain = InMemoryChain::new(999, &[ALICE]);
        let session = session(&chain);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, VoteError::UnsupportedNetwork { chain_id: ChainId(999), .. }));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.contract().is_none());
        assert_eq!(session.status().network_name.as_deref(), Some("Unknown Network (999)"));
        assert!(session.last_error().is_some());
    }

    #[tokio::test]
    async fn chain_switch_during_resolution_discards_result() {
        let chain = ganache();
        let session = session(&chain);
        let hold = chain.hold_chain_queries().await;

        let (result, ()) = tokio::join!(session.connect(), async {
            chain.wait_for_chain_queries(1).await;
            assert_eq!(session.state(), SessionState::Resolving);
            chain.switch_chain(11155111);
            drop(hold);
        });

        assert_eq!(result.unwrap_err(), VoteError::Superseded("autodetect"));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.contract().is_none());
        assert!(session.account().is_none());
    }

    #[tokio::test]
    async fn account_switch_during_resolution_keeps_result() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        let hold = chain.hold_chain_queries().await;

        let (result, ()) = tokio::join!(session.connect(), async {
            chain.wait_for_chain_queries(1).await;
            chain.switch_accounts(&[BOB]);
            assert_eq!(session.state(), SessionState::Resolving);
            drop(hold);
        });

        assert_eq!(result?.0, ALICE);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.account().map(|a| a.0), Some(BOB.to_owned()));
        assert_eq!(
            session.contract().map(|c| c.address.0),
            Some(GANACHE_BALLOT.to_owned())
        );
        Ok(())
    }

    #[tokio::test]
    async fn chain_switch_during_vote_returns_receipt_and_resets() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;
        let hold = chain.hold_votes().await;

        let (vote, ()) = tokio::join!(session.cast_vote(2), async {
            chain.wait_for_vote_calls(1).await;
            chain.switch_chain(11155111);
            drop(hold);
        });

        assert!(vote?.transaction_hash.starts_with("0x"));
        assert_eq!(chain.votes_submitted(), 1);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.contract().is_none());
        assert_eq!(session.has_voted(), None);
        // busy flag is free again
        assert_eq!(session.cast_vote(1).await.unwrap_err(), VoteError::ContractUnavailable);
        Ok(())
    }

    #[tokio::test]
    async fn reconnect_while_vote_outstanding_is_rejected() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;
        let hold = chain.hold_votes().await;

        let (vote, reconnect) = tokio::join!(session.cast_vote(1), async {
            chain.wait_for_vote_calls(1).await;
            let reconnect = session.connect().await;
            assert_eq!(session.state(), SessionState::Voting);
            assert!(session.contract().is_some());
            drop(hold);
            reconnect
        });

        assert!(vote.is_ok());
        assert_eq!(reconnect.unwrap_err(), VoteError::OperationInProgress);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.has_voted(), Some(true));
        Ok(())
    }

    #[test]
    fn registry_must_match_configured_environment() {
        let chain = ganache();
        let result = Session::new(
            ChainBinding::new(Arc::new(chain.clone())),
            Arc::new(NetworkRegistry::development()),
            VotingConfig::default(),
        );
        assert!(matches!(
            result,
            Err(RegistryError::EnvironmentMismatch {
                registry: "development",
                configured: "production",
            })
        ));
        assert_eq!(chain.events().listener_count(), 0);

        let development = Session::for_environment(
            ChainBinding::new(Arc::new(chain)),
            VotingConfig {
                environment: DeploymentEnvironment::Development,
                ..VotingConfig::default()
            },
        );
        assert_eq!(development.registry().environment(), DeploymentEnvironment::Development);
    }

    #[tokio::test]
    async fn second_vote_while_outstanding_is_rejected_locally() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;
        let hold = chain.hold_votes().await;

        let (first, second) = tokio::join!(session.cast_vote(1), async {
            chain.wait_for_vote_calls(1).await;
            assert_eq!(session.state(), SessionState::Voting);
            let second = session.cast_vote(2).await;
            drop(hold);
            second
        });

        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), VoteError::OperationInProgress);
        assert_eq!(chain.votes_submitted(), 1);
        assert_eq!(session.state(), SessionState::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn successful_vote_marks_account_as_voted() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;

        let receipt = session.cast_vote(2).await?;
        assert!(receipt.transaction_hash.starts_with("0x"));
        assert_eq!(session.has_voted(), Some(true));
        let snapshot = session.snapshot().expect("reloaded after vote");
        assert!(snapshot.has_voted);
        assert_eq!(snapshot.total_votes, 1);

        assert_eq!(session.cast_vote(1).await.unwrap_err(), VoteError::AlreadyVoted);
        assert_eq!(chain.votes_submitted(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn contract_rejects_repeat_vote_from_fresh_session() -> anyhow::Result<()> {
        let chain = ganache();
        let first = session(&chain);
        first.connect().await?;
        first.cast_vote(1).await?;

        let second = session(&chain);
        second.connect().await?;
        assert_eq!(second.has_voted(), None);
        assert_eq!(second.cast_vote(3).await.unwrap_err(), VoteError::AlreadyVoted);
        assert_eq!(second.has_voted(), Some(true));
        assert_eq!(second.state(), SessionState::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn reload_reports_consistent_tally() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;
        session.cast_vote(1).await?;
        chain.switch_accounts(&[BOB]);
        session.cast_vote(2).await?;

        let snapshot = session.reload().await?;
        assert_eq!(snapshot.total_votes, 2);
        let counts: Vec<(u64, u64)> = snapshot
            .candidates
            .iter()
            .map(|c| (c.id, c.vote_count))
            .collect();
        assert_eq!(counts, vec![(1, 1), (2, 1), (3, 0)]);

        let response = snapshot.to_response();
        assert_eq!(response.candidates[0].percentage, 50.0);
        assert_eq!(response.candidates[2].percentage, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn manual_binding_to_non_voting_address_stays_connected() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session_with(&chain, manual_config());

        session.connect().await?;
        assert_eq!(session.state(), SessionState::Connected);

        let err = session
            .bind_manual(ContractAddress(NOT_A_BALLOT.to_owned()))
            .await
            .unwrap_err();
        assert!(matches!(err, VoteError::RemoteCallFailed { .. }));
        assert_eq!(session.state(), SessionState::Connected);
        assert!(session.contract().is_none());

        session.bind_manual(ContractAddress(GANACHE_BALLOT.to_owned())).await?;
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.mode(), BindingMode::Manual);
        Ok(())
    }

    #[tokio::test]
    async fn switching_modes_discards_binding() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session_with(&chain, manual_config());
        session.connect().await?;
        session.bind_manual(ContractAddress(GANACHE_BALLOT.to_owned())).await?;

        let bound = session.autodetect().await?;
        assert_eq!(bound.mode, BindingMode::AutoDetect);
        assert_eq!(session.mode(), BindingMode::AutoDetect);
        assert_eq!(session.contract().map(|c| c.mode), Some(BindingMode::AutoDetect));
        Ok(())
    }

    #[tokio::test]
    async fn binding_requires_connected_account() {
        let chain = ganache();
        let session = session(&chain);
        assert_eq!(session.autodetect().await.unwrap_err(), VoteError::NotConnected);
        assert_eq!(
            session
                .bind_manual(ContractAddress(GANACHE_BALLOT.to_owned()))
                .await
                .unwrap_err(),
            VoteError::NotConnected
        );
    }

    #[tokio::test]
    async fn chain_change_resets_ready_session() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;

        chain.switch_chain(11155111);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.contract().is_none());
        assert_eq!(session.cast_vote(1).await.unwrap_err(), VoteError::ContractUnavailable);
        Ok(())
    }

    #[tokio::test]
    async fn account_change_keeps_binding_and_clears_cache() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session(&chain);
        session.connect().await?;
        session.cast_vote(1).await?;

        chain.switch_accounts(&[BOB]);
        assert_eq!(session.account().map(|a| a.0), Some(BOB.to_owned()));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.has_voted(), None);
        assert!(session.contract().is_some());

        chain.switch_accounts(&[]);
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.account().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn insufficient_gas_is_reported_not_retried() -> anyhow::Result<()> {
        let chain = ganache();
        let session = session_with(
            &chain,
            VotingConfig {
                gas_limit: 50_000,
                ..VotingConfig::default()
            },
        );
        session.connect().await?;

        let err = session.cast_vote(1).await.unwrap_err();
        assert!(matches!(err, VoteError::ResourceLimitExceeded { gas_limit: 50_000, .. }));
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.has_voted(), None);
        assert_eq!(chain.votes_submitted(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn denied_signature_leaves_session_ready() -> anyhow::Result<()> {
        let chain = ganache();
        chain.reject_signing(true);
        let session = session(&chain);
        session.connect().await?;

        assert_eq!(session.cast_vote(1).await.unwrap_err(), VoteError::TransactionDenied);
        assert_eq!(session.state(), SessionState::Ready);
        assert!(session.last_error().is_some());

        chain.reject_signing(false);
        session.cast_vote(1).await?;
        Ok(())
    }

    #[tokio::test]
    async fn denied_access_returns_to_disconnected() {
        let chain = ganache();
        chain.reject_access(true);
        let session = session(&chain);

        assert!(matches!(session.connect().await, Err(VoteError::AccessDenied(_))));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn missing_provider_is_reported() {
        let session = Session::new(ChainBinding::detached(), registry(), VotingConfig::default())
            .expect("registry matches configured environment");
        assert_eq!(session.connect().await.unwrap_err(), VoteError::NoProvider);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn subscriptions_end_with_the_session() {
        let chain = ganache();
        let session = session(&chain);
        assert_eq!(chain.events().listener_count(), 2);

        session.teardown();
        assert_eq!(chain.events().listener_count(), 0);

        let other = self::session(&chain);
        assert_eq!(chain.events().listener_count(), 2);
        drop(other);
        assert_eq!(chain.events().listener_count(), 0);
    }
}

use crate::error::VoteError;
use crate::submitter::{ErrorClass, classify_provider_error};
use dv_api_types::{AccountAddress, ChainId, ContractAddress};
use dv_chain_client::{ProviderError, Subscription, VotingContract, WalletProvider};
use std::sync::Arc;

/// The session's view of the wallet. `detached()` models a browser with no
/// wallet extension: every operation fails with `NoProvider`.
#[derive(Clone)]
pub struct ChainBinding {
    provider: Option<Arc<dyn WalletProvider>>,
}

impl ChainBinding {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self {
            provider: Some(provider),
        }
    }

    pub fn detached() -> Self {
        Self { provider: None }
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, VoteError> {
        self.provider.as_ref().ok_or(VoteError::NoProvider)
    }

    pub async fn request_access(&self) -> Result<AccountAddress, VoteError> {
        let accounts = self
            .provider()?
            .request_accounts()
            .await
            .map_err(access_error)?;

        accounts
            .into_iter()
            .next()
            .ok_or_else(|| VoteError::AccessDenied("wallet exposed no accounts".to_owned()))
    }

    pub async fn current_chain_id(&self) -> Result<ChainId, VoteError> {
        self.provider()?
            .chain_id()
            .await
            .map_err(|err| remote("eth_chainId", err))
    }

    pub async fn current_account(&self) -> Result<Option<AccountAddress>, VoteError> {
        let accounts = self
            .provider()?
            .accounts()
            .await
            .map_err(|err| remote("eth_accounts", err))?;
        Ok(accounts.into_iter().next())
    }

    pub fn on_accounts_changed<F>(&self, handler: F) -> Result<Subscription, VoteError>
    where
        F: Fn(&[AccountAddress]) + Send + Sync + 'static,
    {
        Ok(self.provider()?.events().on_accounts_changed(handler))
    }

    pub fn on_chain_changed<F>(&self, handler: F) -> Result<Subscription, VoteError>
    where
        F: Fn(ChainId) + Send + Sync + 'static,
    {
        Ok(self.provider()?.events().on_chain_changed(handler))
    }

    pub fn bind_contract(&self, address: &ContractAddress) -> Result<Arc<dyn VotingContract>, VoteError> {
        Ok(self.provider()?.contract(address))
    }
}

fn access_error(err: ProviderError) -> VoteError {
    match classify_provider_error(&err) {
        ErrorClass::Denied => VoteError::AccessDenied(err.to_string()),
        _ => remote("eth_requestAccounts", err),
    }
}

fn remote(operation: &'static str, err: ProviderError) -> VoteError {
    match err {
        ProviderError::NoProvider => VoteError::NoProvider,
        other => VoteError::RemoteCallFailed {
            operation,
            cause: other.to_string(),
        },
    }
}

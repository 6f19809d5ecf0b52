//! Provider notifications.
//!
//! Handlers are registered per topic and receive an owning [`Subscription`];
//! dropping the subscription unregisters the handler. Emission snapshots the
//! handler list first, so a handler may subscribe or unsubscribe re-entrantly.

use dv_api_types::{AccountAddress, ChainId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

pub type AccountsHandler = Arc<dyn Fn(&[AccountAddress]) + Send + Sync>;
pub type ChainHandler = Arc<dyn Fn(ChainId) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Topic {
    AccountsChanged,
    ChainChanged,
}

#[derive(Default)]
struct Listeners {
    accounts: BTreeMap<u64, AccountsHandler>,
    chain: BTreeMap<u64, ChainHandler>,
}

#[derive(Default)]
struct HubInner {
    next_id: AtomicU64,
    listeners: Mutex<Listeners>,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Default, Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_accounts_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[AccountAddress]) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().accounts.insert(id, Arc::new(handler));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            topic: Topic::AccountsChanged,
            id,
        }
    }

    pub fn on_chain_changed<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ChainId) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().chain.insert(id, Arc::new(handler));
        Subscription {
            hub: Arc::downgrade(&self.inner),
            topic: Topic::ChainChanged,
            id,
        }
    }

    pub fn emit_accounts_changed(&self, accounts: &[AccountAddress]) {
        let handlers: Vec<AccountsHandler> = self.inner.lock().accounts.values().cloned().collect();
        for handler in handlers {
            handler(accounts);
        }
    }

    pub fn emit_chain_changed(&self, chain_id: ChainId) {
        let handlers: Vec<ChainHandler> = self.inner.lock().chain.values().cloned().collect();
        for handler in handlers {
            handler(chain_id);
        }
    }

    pub fn listener_count(&self) -> usize {
        let guard = self.inner.lock();
        guard.accounts.len() + guard.chain.len()
    }
}

/// Registration handle. Unregisters on drop.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    hub: Weak<HubInner>,
    topic: Topic,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut guard = hub.lock();
        match self.topic {
            Topic::AccountsChanged => {
                guard.accounts.remove(&self.id);
            }
            Topic::ChainChanged => {
                guard.chain.remove(&self.id);
            }
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("id", &self.id)
            .finish()
    }
}

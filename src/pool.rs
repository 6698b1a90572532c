//! Named client cache.
//!
//! A [`ClientPool`] hands out one shared instance per name, building it on
//! first use. Applications that want one `Account` per symbol (or a single
//! `Quote`) keep a pool next to their own state instead of a process global.
//!
//! ```rust,ignore
//! let accounts: ClientPool<Account> = ClientPool::new();
//! let acc = accounts
//!     .get_or_try_insert_with("okex/demo", || Account::from_config("okex/demo", &config))
//!     .await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use async_lock::Mutex;

pub struct ClientPool<C> {
    clients: Mutex<HashMap<String, Arc<C>>>,
}

impl<C> Default for ClientPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClientPool<C> {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// The client cached under `name`, built with `make` if there is none.
    pub async fn get_or_insert_with(&self, name: &str, make: impl FnOnce() -> C) -> Arc<C> {
        let mut clients = self.clients.lock().await;
        Arc::clone(
            clients
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(make())),
        )
    }

    /// Like [`get_or_insert_with`](Self::get_or_insert_with) for fallible
    /// constructors. Nothing is cached when `make` fails.
    pub async fn get_or_try_insert_with<E>(
        &self,
        name: &str,
        make: impl FnOnce() -> Result<C, E>,
    ) -> Result<Arc<C>, E> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(name) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(make()?);
        clients.insert(name.to_string(), Arc::clone(&client));
        Ok(client)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<C>> {
        self.clients.lock().await.get(name).cloned()
    }

    /// Forget `name`. Holders of the returned handle keep the client alive.
    pub async fn remove(&self, name: &str) -> Option<Arc<C>> {
        self.clients.lock().await.remove(name)
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.clients.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Empty the pool, returning every client so the caller can stop them.
    pub async fn drain(&self) -> Vec<(String, Arc<C>)> {
        self.clients.lock().await.drain().collect()
    }
}

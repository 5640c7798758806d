use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// 1. KeyValueStore Contract
/// KeyValueStore
///
/// The abstract contract for the per-client stores the gateway reads and writes. Session and
/// lockout logic receive a store instead of reaching for ambient globals, which keeps every
/// decision deterministic under test.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: String);

    fn remove(&self, key: &str);

    /// Executes every operation of `batch` under a single write lock.
    ///
    /// Records spanning several keys (the session, the lockout counter and its deadline)
    /// must be written through here so a concurrent reader never sees half an update.
    fn apply(&self, batch: Vec<StoreOp>);

    /// update
    ///
    /// Read-modify-write of a whole record: reads `keys`, hands their current values (in
    /// the same order) to `f` and applies the batch it returns, all under one write lock.
    fn update(&self, keys: &[&str], f: &mut dyn FnMut(&[Option<String>]) -> Vec<StoreOp>);

    fn clear(&self);

    fn is_empty(&self) -> bool;
}

/// StoreOp
///
/// One write inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Set(String, String),
    Remove(String),
}

impl StoreOp {
    pub fn set(key: &str, value: impl Into<String>) -> Self {
        StoreOp::Set(key.to_string(), value.into())
    }

    pub fn remove(key: &str) -> Self {
        StoreOp::Remove(key.to_string())
    }
}

// 2. The In-Memory Implementation
/// MemoryStore
///
/// A process-local store. Reads take a shared lock, every write path takes the exclusive one.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn apply(&self, batch: Vec<StoreOp>) {
        apply_ops(&mut self.entries.write(), batch);
    }

    fn update(&self, keys: &[&str], f: &mut dyn FnMut(&[Option<String>]) -> Vec<StoreOp>) {
        let mut entries = self.entries.write();
        let current: Vec<Option<String>> = keys.iter().map(|k| entries.get(*k).cloned()).collect();
        let batch = f(&current);
        apply_ops(&mut entries, batch);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

fn apply_ops(entries: &mut HashMap<String, String>, batch: Vec<StoreOp>) {
    for op in batch {
        match op {
            StoreOp::Set(key, value) => {
                entries.insert(key, value);
            }
            StoreOp::Remove(key) => {
                entries.remove(&key);
            }
        }
    }
}

/// KvState
///
/// The shared handle type used wherever a store is injected.
pub type KvState = Arc<dyn KeyValueStore>;

/// ClientStores
///
/// The two stores a single client owns: `session` lives until logout, `local` survives it
/// and carries the login lockout.
#[derive(Clone)]
pub struct ClientStores {
    pub session: KvState,
    pub local: KvState,
}

impl ClientStores {
    /// Fresh, unregistered stores. Used for requests that carry no client id: they read as
    /// an empty (unauthenticated, unlocked) client and nothing written to them is kept.
    pub fn ephemeral() -> Self {
        Self {
            session: Arc::new(MemoryStore::new()),
            local: Arc::new(MemoryStore::new()),
        }
    }
}

/// StoreRegistry
///
/// Maps a client id to its pair of stores, creating them on first use.
#[derive(Default)]
pub struct StoreRegistry {
    clients: RwLock<HashMap<Uuid, ClientStores>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// stores_for
    ///
    /// Returns the stores of `client`, registering empty ones if this is the first request
    /// seen from it.
    pub fn stores_for(&self, client: Uuid) -> ClientStores {
        if let Some(stores) = self.clients.read().get(&client) {
            return stores.clone();
        }
        self.clients
            .write()
            .entry(client)
            .or_insert_with(ClientStores::ephemeral)
            .clone()
    }

    /// Stores of an already registered client. Never registers anything.
    pub fn get(&self, client: Uuid) -> Option<ClientStores> {
        self.clients.read().get(&client).cloned()
    }

    pub fn contains(&self, client: Uuid) -> bool {
        self.clients.read().contains_key(&client)
    }

    /// Drops both stores of `client`.
    pub fn forget(&self, client: Uuid) {
        self.clients.write().remove(&client);
    }

    /// release_if_empty
    ///
    /// Unregisters `client` when neither of its stores holds anything: no session and no
    /// lockout record. Returns whether the client was dropped.
    pub fn release_if_empty(&self, client: Uuid) -> bool {
        let mut clients = self.clients.write();
        let idle = clients
            .get(&client)
            .is_some_and(|stores| stores.session.is_empty() && stores.local.is_empty());
        if idle {
            clients.remove(&client);
        }
        idle
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }
}

/// StoreState
///
/// The concrete type used to share the registry across the application state.
pub type StoreState = Arc<StoreRegistry>;

//! Running application instances.
//!
//! Every open application gets an instance ID, and every window it shows
//! gets a window ID. Both come from their own [`IdAllocator`], so neither
//! space is ever shared with connection IDs. Singleton apps have at most
//! one instance; opening them again returns the live one.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use remolacha_core::IdAllocator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::backend::Backend;
use crate::connection::Connection;
use crate::error::{ClientError, ClientResult};

/// Static description of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_singleton: bool,
}

impl AppManifest {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_singleton: false,
        }
    }

    /// Builder: mark as singleton.
    pub fn singleton(mut self) -> Self {
        self.is_singleton = true;
        self
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Table {
    instances: BTreeMap<u64, AppInstance>,
    instance_ids: IdAllocator,
    windows: HashMap<u64, u64>,
    window_ids: IdAllocator,
}

impl Table {
    fn remove_instance(&mut self, instance_id: u64) -> Option<AppInstance> {
        self.windows.retain(|_, owner| *owner != instance_id);
        self.instances.remove(&instance_id)
    }
}

/// Registry of known apps and their running instances.
pub struct AppInstances {
    backend: Backend,
    manifests: HashMap<String, Arc<AppManifest>>,
    table: Arc<Mutex<Table>>,
}

impl AppInstances {
    /// Creates an empty registry with unbounded instance and window IDs.
    pub fn new(backend: Backend) -> Self {
        Self::with_limits(backend, u64::MAX, u64::MAX)
    }

    /// Instance IDs are drawn from `1..=max_instances`, window IDs from
    /// `1..=max_windows`.
    pub fn with_limits(backend: Backend, max_instances: u64, max_windows: u64) -> Self {
        Self {
            backend,
            manifests: HashMap::new(),
            table: Arc::new(Mutex::new(Table {
                instances: BTreeMap::new(),
                instance_ids: IdAllocator::new(1, max_instances),
                windows: HashMap::new(),
                window_ids: IdAllocator::new(1, max_windows),
            })),
        }
    }

    /// Makes an app known. Replaces an earlier manifest with the same ID.
    pub fn register_app(&mut self, manifest: AppManifest) {
        debug!(app_id = %manifest.id, singleton = manifest.is_singleton, "registered app");
        self.manifests
            .insert(manifest.id.clone(), Arc::new(manifest));
    }

    pub fn manifest(&self, app_id: &str) -> Option<&AppManifest> {
        self.manifests.get(app_id).map(Arc::as_ref)
    }

    /// Starts an instance of `app_id`, or returns the running one for a
    /// singleton app.
    pub fn open_app(&self, app_id: &str) -> ClientResult<AppInstance> {
        let manifest = self
            .manifests
            .get(app_id)
            .ok_or_else(|| ClientError::AppNotFound(app_id.to_string()))?;

        let mut table = lock(&self.table);

        if manifest.is_singleton
            && let Some(existing) = table
                .instances
                .values()
                .find(|instance| instance.app_id() == app_id)
        {
            debug!(app_id, instance_id = existing.id(), "reusing singleton instance");
            return Ok(existing.clone());
        }

        let Table {
            instances,
            instance_ids,
            ..
        } = &mut *table;
        let id = instance_ids
            .allocate(|n| instances.contains_key(&n))
            .map_err(|_| ClientError::MaxInstancesReached(app_id.to_string()))?;

        let instance = AppInstance {
            inner: Arc::new(InstanceInner {
                id,
                manifest: manifest.clone(),
                backend: self.backend.clone(),
                table: Arc::downgrade(&self.table),
                streams: Mutex::new(Vec::new()),
            }),
        };
        instances.insert(id, instance.clone());
        info!(app_id, instance_id = id, "app instance started");

        Ok(instance)
    }

    /// Running instances, ordered by ID.
    pub fn running(&self) -> Vec<AppInstance> {
        lock(&self.table).instances.values().cloned().collect()
    }

    pub fn get(&self, instance_id: u64) -> Option<AppInstance> {
        lock(&self.table).instances.get(&instance_id).cloned()
    }

    /// Instance owning `window_id`.
    pub fn window_owner(&self, window_id: u64) -> Option<AppInstance> {
        let table = lock(&self.table);
        let owner = table.windows.get(&window_id)?;
        table.instances.get(owner).cloned()
    }
}

/// Handle to one running application instance. Cloning is cheap.
#[derive(Clone)]
pub struct AppInstance {
    inner: Arc<InstanceInner>,
}

struct InstanceInner {
    id: u64,
    manifest: Arc<AppManifest>,
    backend: Backend,
    table: Weak<Mutex<Table>>,
    streams: Mutex<Vec<Connection>>,
}

impl AppInstance {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn app_id(&self) -> &str {
        &self.inner.manifest.id
    }

    pub fn manifest(&self) -> &AppManifest {
        &self.inner.manifest
    }

    /// True until [`exit`](Self::exit).
    pub fn is_running(&self) -> bool {
        self.inner
            .table
            .upgrade()
            .is_some_and(|table| lock(&table).instances.contains_key(&self.inner.id))
    }

    /// One-shot call to a service of this instance's app.
    pub async fn call(&self, service: &str, params: impl Serialize) -> ClientResult<Value> {
        self.inner.backend.call(self.app_id(), service, params).await
    }

    /// Unopened stream to a service of this instance's app. Closed
    /// automatically when the instance exits.
    pub fn open_stream(&self, service: &str, params: impl Serialize) -> ClientResult<Connection> {
        let connection = self
            .inner
            .backend
            .open_stream(self.app_id(), service, params)?;

        let mut streams = lock(&self.inner.streams);
        streams.retain(|stream| !stream.is_closed());
        streams.push(connection.clone());
        Ok(connection)
    }

    /// Allocates a window ID owned by this instance.
    pub fn add_window(&self) -> ClientResult<u64> {
        let table = self.table()?;
        let mut table = lock(&table);
        let Table {
            windows,
            window_ids,
            ..
        } = &mut *table;
        let window_id = window_ids.allocate(|n| windows.contains_key(&n))?;
        windows.insert(window_id, self.inner.id);
        debug!(instance_id = self.inner.id, window_id, "window added");
        Ok(window_id)
    }

    /// Releases a window ID. Returns false if this instance did not own it.
    pub fn remove_window(&self, window_id: u64) -> bool {
        let Some(table) = self.inner.table.upgrade() else {
            return false;
        };
        let mut table = lock(&table);
        if table.windows.get(&window_id) == Some(&self.inner.id) {
            table.windows.remove(&window_id);
            true
        } else {
            false
        }
    }

    /// Window IDs owned by this instance, sorted.
    pub fn windows(&self) -> Vec<u64> {
        let Some(table) = self.inner.table.upgrade() else {
            return Vec::new();
        };
        let mut ids: Vec<u64> = lock(&table)
            .windows
            .iter()
            .filter(|(_, owner)| **owner == self.inner.id)
            .map(|(window, _)| *window)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Stops the instance: frees its ID and windows and closes its streams.
    pub fn exit(&self) {
        if let Some(table) = self.inner.table.upgrade() {
            lock(&table).remove_instance(self.inner.id);
        }

        let streams: Vec<Connection> = lock(&self.inner.streams).drain(..).collect();
        for stream in streams {
            stream.close();
        }
        info!(app_id = self.app_id(), instance_id = self.inner.id, "app instance exited");
    }

    fn table(&self) -> ClientResult<Arc<Mutex<Table>>> {
        self.inner
            .table
            .upgrade()
            .ok_or_else(|| ClientError::AppNotFound(self.app_id().to_string()))
    }
}

impl std::fmt::Debug for AppInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppInstance")
            .field("id", &self.inner.id)
            .field("app_id", &self.app_id())
            .finish()
    }
}

//! Map Registry
//!
//! Names to live maps. Registration resolves the requested kind against the
//! probed feature table, opens the kernel map and starts its controller.
//!
//! Register, reset and close are serialized per name; desired-state updates
//! and snapshots never wait for them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bpfmap_caps::{FeatureSupportTable, MapDef};
use log::{info, warn};
use tokio::sync::OwnedMutexGuard;

use crate::config::SyncConfig;
use crate::controller::{ControllerHandle, Waker};
use crate::entry::DesiredAction;
use crate::error::{RegistryError, RegistryResult};
use crate::kernel::MapProvider;
use crate::state::{MapSnapshot, MapState};

struct Registered {
    state: Arc<MapState>,
    controller: ControllerHandle,
}

/// Registry of reconciled maps.
pub struct MapRegistry {
    features: Arc<FeatureSupportTable>,
    provider: Arc<dyn MapProvider>,
    config: SyncConfig,
    maps: RwLock<HashMap<String, Registered>>,
    lifecycle: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MapRegistry {
    /// Create a registry.
    ///
    /// `features` must be the finished probe result; it is never re-read.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid.
    pub fn new(
        features: Arc<FeatureSupportTable>,
        provider: Arc<dyn MapProvider>,
        config: SyncConfig,
    ) -> RegistryResult<Self> {
        config.validate()?;
        Ok(Self {
            features,
            provider,
            config,
            maps: RwLock::new(HashMap::new()),
            lifecycle: Mutex::new(HashMap::new()),
        })
    }

    pub fn features(&self) -> &FeatureSupportTable {
        &self.features
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Register `name`, replacing any previous registration.
    ///
    /// A replaced map's controller is stopped, and its in-flight pass
    /// finished, before the new state becomes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if the resolved definition is invalid or the
    /// provider cannot open the map. A previous registration survives
    /// either error untouched.
    pub async fn register(&self, name: &str, def: MapDef) -> RegistryResult<Arc<MapState>> {
        let _lifecycle = self.lock_name(name).await;
        self.register_locked(name, def).await
    }

    async fn register_locked(&self, name: &str, def: MapDef) -> RegistryResult<Arc<MapState>> {
        let resolved = def.resolve(&self.features, self.config.preallocate_maps);
        resolved.validate()?;
        if resolved.kind != def.kind {
            warn!(
                "{name}: {} maps are not supported by the kernel, falling back to {}",
                def.kind, resolved.kind
            );
        }

        let map = self
            .provider
            .open(name, &resolved)
            .map_err(|source| RegistryError::Open {
                name: name.to_string(),
                source,
            })?;

        let previous = self.write_maps().remove(name);
        if let Some(previous) = previous {
            info!("{name}: replacing existing registration");
            previous.controller.shutdown().await;
        }

        let state = Arc::new(MapState::new(name, def, resolved));
        let controller = ControllerHandle::spawn(Arc::clone(&state), map, self.config.clone());
        self.write_maps().insert(
            name.to_string(),
            Registered {
                state: Arc::clone(&state),
                controller,
            },
        );

        info!(
            "{name}: registered {} map ({} byte keys, {} byte values, {} entries)",
            resolved.kind, resolved.key_size, resolved.value_size, resolved.max_entries
        );
        Ok(state)
    }

    /// Record a desired change for one key of `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is unknown or the request is malformed.
    pub fn set_desired(
        &self,
        name: &str,
        key: &[u8],
        action: DesiredAction,
        value: Option<&[u8]>,
    ) -> RegistryResult<()> {
        let (state, waker) = self.lookup(name)?;
        if state.set_desired(key, action, value)? {
            waker.wake();
        }
        Ok(())
    }

    /// Desire `key` to hold `value`.
    pub fn insert(&self, name: &str, key: &[u8], value: &[u8]) -> RegistryResult<()> {
        self.set_desired(name, key, DesiredAction::Insert, Some(value))
    }

    /// Desire `key` to be absent.
    pub fn delete(&self, name: &str, key: &[u8]) -> RegistryResult<()> {
        self.set_desired(name, key, DesiredAction::Delete, None)
    }

    /// Shared state of `name`.
    pub fn state(&self, name: &str) -> RegistryResult<Arc<MapState>> {
        self.lookup(name).map(|(state, _)| state)
    }

    pub fn snapshot(&self, name: &str) -> RegistryResult<MapSnapshot> {
        Ok(self.state(name)?.snapshot())
    }

    /// Snapshot of `name`, or an error if the map has failed.
    pub fn check(&self, name: &str) -> RegistryResult<MapSnapshot> {
        let snapshot = self.snapshot(name)?;
        if snapshot.failed {
            return Err(RegistryError::MapFailed {
                name: snapshot.name,
                errors: snapshot.errors,
            });
        }
        Ok(snapshot)
    }

    /// Snapshots of every map, sorted by name.
    pub fn snapshots(&self) -> Vec<MapSnapshot> {
        let states: Vec<_> = self
            .read_maps()
            .values()
            .map(|registered| Arc::clone(&registered.state))
            .collect();
        let mut out: Vec<_> = states.iter().map(|state| state.snapshot()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Wait until `name` has nothing scheduled or running.
    pub async fn wait_quiescent(&self, name: &str) -> RegistryResult<MapSnapshot> {
        let state = self.state(name)?;
        let mut phase = state.subscribe();
        // The sender lives in `state`, which we hold.
        let _ = phase.wait_for(|phase| phase.is_quiescent()).await;
        Ok(state.snapshot())
    }

    /// Start over with the originally requested definition: empty cache,
    /// zero errors, not failed.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is unknown or cannot be reopened; the
    /// existing registration is kept in the latter case.
    pub async fn reset(&self, name: &str) -> RegistryResult<Arc<MapState>> {
        let _lifecycle = self.lock_name(name).await;
        let requested = *self.state(name)?.requested();
        info!("{name}: resetting");
        self.register_locked(name, requested).await
    }

    /// Stop reconciling `name` and forget it. The kernel map is left alone.
    pub async fn close(&self, name: &str) -> RegistryResult<()> {
        let _lifecycle = self.lock_name(name).await;
        let registered = self
            .write_maps()
            .remove(name)
            .ok_or_else(|| RegistryError::UnknownMap(name.to_string()))?;
        registered.controller.shutdown().await;
        info!("{name}: closed");
        Ok(())
    }

    /// Close every map.
    pub async fn shutdown(&self) {
        let names: Vec<_> = self.read_maps().keys().cloned().collect();
        for name in names {
            // Closed concurrently.
            let _ = self.close(&name).await;
        }
    }

    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            self.lifecycle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(name.to_string())
                .or_default(),
        );
        lock.lock_owned().await
    }

    fn lookup(&self, name: &str) -> RegistryResult<(Arc<MapState>, Waker)> {
        let maps = self.read_maps();
        let registered = maps
            .get(name)
            .ok_or_else(|| RegistryError::UnknownMap(name.to_string()))?;
        Ok((Arc::clone(&registered.state), registered.controller.waker()))
    }

    fn read_maps(&self) -> RwLockReadGuard<'_, HashMap<String, Registered>> {
        self.maps.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_maps(&self) -> RwLockWriteGuard<'_, HashMap<String, Registered>> {
        self.maps.write().unwrap_or_else(PoisonError::into_inner)
    }
}

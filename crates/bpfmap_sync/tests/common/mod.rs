//! Instrumented kernel maps for engine tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bpfmap_caps::{FeatureSupportTable, MapDef, MapKind};
use bpfmap_sync::{KernelMap, MapOpError, MapOpResult, MapProvider, MapRegistry, SyncConfig};
use tokio::time::Instant;

/// Kernel map stub that fails a scripted number of operations and records
/// what it was asked to do.
#[derive(Default)]
pub struct ScriptedMap {
    data: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    fail_remaining: AtomicUsize,
    /// Real time spent inside each operation
    delay: Option<Duration>,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub op_times: Mutex<Vec<Instant>>,
}

impl ScriptedMap {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the first `n` operations.
    pub fn failing(n: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_remaining: AtomicUsize::new(n),
            ..Self::default()
        })
    }

    pub fn always_failing() -> Arc<Self> {
        Self::failing(usize::MAX)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            ..Self::default()
        })
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.data.lock().expect("data lock").contains_key(key)
    }

    pub fn seed(&self, key: &[u8], value: &[u8]) {
        self.data
            .lock()
            .expect("data lock")
            .insert(key.to_vec(), value.to_vec());
    }

    pub fn op_times(&self) -> Vec<Instant> {
        self.op_times.lock().expect("times lock").clone()
    }

    fn enter(&self) -> MapOpResult<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.op_times.lock().expect("times lock").push(Instant::now());

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        let fail = self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            Err(MapOpError::MapFull)
        } else {
            Ok(())
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl KernelMap for ScriptedMap {
    fn lookup(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.lock().expect("data lock").get(key).cloned()
    }

    fn update(&self, key: &[u8], value: &[u8]) -> MapOpResult<()> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let result = self.enter().map(|()| {
            self.data
                .lock()
                .expect("data lock")
                .insert(key.to_vec(), value.to_vec());
        });
        self.leave();
        result
    }

    fn delete(&self, key: &[u8]) -> MapOpResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let result = self.enter().map(|()| {
            self.data.lock().expect("data lock").remove(key);
        });
        self.leave();
        result
    }
}

/// Hands out pre-built scripted maps by name.
#[derive(Default)]
pub struct ScriptedProvider {
    maps: Mutex<HashMap<String, Arc<ScriptedMap>>>,
    refuse_opens: AtomicBool,
    pub opened: Mutex<Vec<(String, MapDef)>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, name: &str, map: Arc<ScriptedMap>) {
        self.maps
            .lock()
            .expect("maps lock")
            .insert(name.to_string(), map);
    }

    /// Make every following open fail until called with `false`.
    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse_opens.store(refuse, Ordering::SeqCst);
    }

    pub fn opened(&self) -> Vec<(String, MapDef)> {
        self.opened.lock().expect("opened lock").clone()
    }
}

impl MapProvider for ScriptedProvider {
    fn open(&self, name: &str, def: &MapDef) -> MapOpResult<Arc<dyn KernelMap>> {
        if self.refuse_opens.load(Ordering::SeqCst) {
            return Err(MapOpError::Os(std::io::Error::other("open refused")));
        }
        self.opened
            .lock()
            .expect("opened lock")
            .push((name.to_string(), *def));
        let map = Arc::clone(
            self.maps
                .lock()
                .expect("maps lock")
                .entry(name.to_string())
                .or_insert_with(ScriptedMap::new),
        );
        Ok(map)
    }
}

/// Registry over `provider` with every probed kind supported and default
/// timing.
pub fn registry(provider: Arc<ScriptedProvider>) -> MapRegistry {
    let features = FeatureSupportTable::new()
        .with(MapKind::LpmTrie, true)
        .with(MapKind::LruHash, true);
    registry_with(provider, features, SyncConfig::default())
}

pub fn registry_with(
    provider: Arc<ScriptedProvider>,
    features: FeatureSupportTable,
    config: SyncConfig,
) -> MapRegistry {
    MapRegistry::new(Arc::new(features), provider, config).expect("registry")
}

pub fn key(n: u32) -> [u8; 4] {
    n.to_ne_bytes()
}

pub fn value(n: u64) -> [u8; 8] {
    n.to_ne_bytes()
}

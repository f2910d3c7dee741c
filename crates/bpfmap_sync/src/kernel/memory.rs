//! In-Memory Kernel Maps
//!
//! Byte-keyed maps that enforce the same size and capacity rules as the
//! kernel: fixed key and value sizes, `max_entries` as a hard limit, and
//! `u32` index keys below `max_entries` for array-like kinds.

use std::collections::HashMap;
use std::sync::Arc;

use bpfmap_caps::MapDef;
use log::{debug, warn};
use spin::{Mutex, RwLock};

use super::{KernelMap, MapOpError, MapOpResult, MapProvider};

/// Hash storage behind a [`MemoryMap`].
struct Storage {
    entries: HashMap<Vec<u8>, Vec<u8>>,
}

/// In-memory stand-in for one kernel map.
pub struct MemoryMap {
    /// Map definition
    def: MapDef,
    /// Storage
    storage: RwLock<Storage>,
}

impl MemoryMap {
    /// Create a new map.
    ///
    /// # Errors
    ///
    /// Returns an error if the map definition is invalid.
    pub fn new(def: MapDef) -> MapOpResult<Self> {
        def.validate()?;
        let capacity = if def.is_dynamic() {
            0
        } else {
            def.max_entries as usize
        };

        Ok(Self {
            def,
            storage: RwLock::new(Storage {
                entries: HashMap::with_capacity(capacity),
            }),
        })
    }

    /// Get the map definition.
    pub fn def(&self) -> &MapDef {
        &self.def
    }

    /// Get the number of entries in the map.
    pub fn len(&self) -> usize {
        self.storage.read().entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all entries, sorted by key.
    pub fn entries(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        let mut out: Vec<_> = self
            .storage
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort();
        out
    }

    fn check_key(&self, key: &[u8]) -> MapOpResult<()> {
        if key.len() != self.def.key_size as usize {
            return Err(MapOpError::InvalidKey {
                expected: self.def.key_size,
                actual: key.len(),
            });
        }

        if self.def.kind.is_indexed() {
            let index = u32::from_ne_bytes([key[0], key[1], key[2], key[3]]);
            if index >= self.def.max_entries {
                return Err(MapOpError::IndexOutOfRange {
                    index,
                    max_entries: self.def.max_entries,
                });
            }
        }

        Ok(())
    }
}

impl KernelMap for MemoryMap {
    fn lookup(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.check_key(key).ok()?;
        self.storage.read().entries.get(key).cloned()
    }

    fn update(&self, key: &[u8], value: &[u8]) -> MapOpResult<()> {
        self.check_key(key)?;
        if value.len() != self.def.value_size as usize {
            return Err(MapOpError::InvalidValue {
                expected: self.def.value_size,
                actual: value.len(),
            });
        }

        let mut guard = self.storage.write();
        if !guard.entries.contains_key(key) && guard.entries.len() >= self.def.max_entries as usize
        {
            return Err(MapOpError::MapFull);
        }
        guard.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> MapOpResult<()> {
        self.check_key(key)?;
        self.storage.write().entries.remove(key);
        Ok(())
    }
}

/// Named in-memory maps with lookup-or-create semantics.
#[derive(Default)]
pub struct MemoryProvider {
    maps: Mutex<HashMap<String, Arc<MemoryMap>>>,
}

impl MemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map previously opened under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<MemoryMap>> {
        self.maps.lock().get(name).cloned()
    }

    /// Names of all maps, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.maps.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

impl MapProvider for MemoryProvider {
    fn open(&self, name: &str, def: &MapDef) -> MapOpResult<Arc<dyn KernelMap>> {
        let mut maps = self.maps.lock();

        if let Some(existing) = maps.get(name) {
            if existing.def() == def {
                debug!("Reusing existing map {name}");
                return Ok(Arc::clone(existing) as Arc<dyn KernelMap>);
            }
            warn!(
                "Map {name} exists with an incompatible definition ({} vs {}), recreating",
                existing.def().kind,
                def.kind
            );
        }

        let map = Arc::new(MemoryMap::new(*def)?);
        maps.insert(name.to_string(), Arc::clone(&map));
        Ok(map)
    }
}

//=========================================================================
// Preload Cache
//=========================================================================
//
// Reference-counted, deduplicated asset acquisition in front of a Loader.
//
// Architecture:
//   PreloadCache
//     ├─ loader: Box<dyn Loader>
//     └─ entries: HashMap<key, PreloadEntry { handle, refcount, cancel }>
//
// Flow:
//   load_or_get(key) ─ hit ──> refcount += 1, same handle
//                    └ miss ─> exists? ─> loader.load() ─> new entry
//   release(key) ──> refcount -= 1 ─ 0 ─> cancel pending, loader.unload()
//
// Situations acquire through their PhaseContext; the container releases
// what they acquired exactly once when they are unloaded or rolled back.
//
//=========================================================================

//=== Module Declarations =================================================

mod loader;
mod threaded;

//=== Public API ==========================================================

pub use loader::{LoadHandle, LoadStatus, Loader, NullLoader, Resource};
pub use threaded::{ThreadedLoader, ThreadedLoaderBuilder};

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use crate::core::cancel::CancelSource;
use crate::core::error::FlowError;

//=== PreloadEntry ========================================================

/// Cache record for one key.
#[derive(Debug)]
pub struct PreloadEntry {
    key: String,
    handle: LoadHandle,
    refcount: usize,
    cancel: CancelSource,
}

impl PreloadEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn handle(&self) -> &LoadHandle {
        &self.handle
    }

    pub fn refcount(&self) -> usize {
        self.refcount
    }
}

//=== PreloadCache ========================================================

/// Keyed, reference-counted cache of load handles.
pub struct PreloadCache {
    loader: Box<dyn Loader>,
    entries: HashMap<String, PreloadEntry>,
}

impl PreloadCache {
    //--- Construction -----------------------------------------------------

    pub fn new<L: Loader + 'static>(loader: L) -> Self {
        Self {
            loader: Box::new(loader),
            entries: HashMap::new(),
        }
    }

    //--- Acquisition ------------------------------------------------------

    /// Returns the handle for `key`, starting a load on first request.
    ///
    /// Every successful call must be balanced by one [`release`](Self::release).
    pub fn load_or_get(&mut self, key: &str) -> Result<LoadHandle, FlowError> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.refcount += 1;
            debug!("Preload hit for {:?} (refcount {})", key, entry.refcount);
            return Ok(entry.handle.clone());
        }

        if !self.loader.exists(key) {
            return Err(FlowError::AssetNotFound(key.to_string()));
        }

        let cancel = CancelSource::new();
        let handle = self.loader.load(key, cancel.token());
        debug!("Preload miss for {:?}, load started", key);

        self.entries.insert(
            key.to_string(),
            PreloadEntry {
                key: key.to_string(),
                handle: handle.clone(),
                refcount: 1,
                cancel,
            },
        );

        Ok(handle)
    }

    /// Warms `key` ahead of need. Identical to [`load_or_get`](Self::load_or_get);
    /// the caller owns one reference.
    pub fn preload(&mut self, key: &str) -> Result<LoadHandle, FlowError> {
        self.load_or_get(key)
    }

    /// Drops one reference to `key`. Returns true if the entry was freed.
    pub fn release(&mut self, key: &str) -> bool {
        let Some(entry) = self.entries.get_mut(key) else {
            warn!("Released {:?} which is not held by the preload cache", key);
            return false;
        };

        entry.refcount -= 1;
        if entry.refcount > 0 {
            return false;
        }

        let Some(entry) = self.entries.remove(key) else {
            return false;
        };

        if !entry.handle.is_done() {
            debug!("Cancelling pending load of {:?}", key);
            entry.cancel.cancel();
            entry.handle.cancel();
        }

        self.loader.unload(key, entry.handle.resource());
        debug!("Preload entry {:?} freed", key);
        true
    }

    //--- Tick -------------------------------------------------------------

    /// Lets the loader settle handles on the flow thread.
    pub fn update(&mut self) {
        self.loader.poll();
    }

    //--- Queries ----------------------------------------------------------

    pub fn exists(&self, key: &str) -> bool {
        self.loader.exists(key)
    }

    pub fn refcount(&self, key: &str) -> usize {
        self.entries.get(key).map_or(0, |e| e.refcount)
    }

    pub fn entry(&self, key: &str) -> Option<&PreloadEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PreloadCache {
    fn default() -> Self {
        Self::new(NullLoader)
    }
}

//=========================================================================
// Tests
//=========================================================================

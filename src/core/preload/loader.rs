//=========================================================================
// Loader Contract
//=========================================================================
//
// Interface between the orchestrator and whatever actually produces
// assets (scene files, atlases, prefabs...).
//
// Architecture:
//   Loader::load(key, cancel) ──> LoadHandle (shared slot)
//                                     ↑
//   producer (worker thread / tick) ──┘ complete(result)
//
// The orchestrator never blocks on a handle: suspendable hooks poll it
// once per tick and return Pending until it settles.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::task::Poll;

use parking_lot::Mutex;

//=== Internal Dependencies ===============================================

use crate::core::cancel::CancelToken;
use crate::core::error::{FlowError, HookError};

//=== Resource ============================================================

/// Type-erased loaded asset, shared between every holder of the key.
#[derive(Clone)]
pub struct Resource(Arc<dyn Any + Send + Sync>);

impl Resource {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrows the asset as `T` if it has that type.
    pub fn downcast_ref<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns a shared pointer to the asset as `T` if it has that type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Resource(..)")
    }
}

//=== LoadStatus ==========================================================

/// Settlement state of a [`LoadHandle`].
#[derive(Debug, Clone)]
pub enum LoadStatus {
    Pending,
    Ready(Resource),
    Failed(String),
    Cancelled,
}

impl LoadStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

//=== LoadHandle ==========================================================

/// Shared, settle-once slot for one in-flight or finished load.
///
/// Clones refer to the same slot. The first settlement wins; later
/// `complete`/`cancel` calls are ignored.
#[derive(Clone)]
pub struct LoadHandle {
    key: Arc<str>,
    status: Arc<Mutex<LoadStatus>>,
}

impl LoadHandle {
    /// Creates an unsettled handle for `key`.
    pub fn pending(key: &str) -> Self {
        Self::with_status(key, LoadStatus::Pending)
    }

    /// Creates a handle that is already ready.
    pub fn ready(key: &str, resource: Resource) -> Self {
        Self::with_status(key, LoadStatus::Ready(resource))
    }

    /// Creates a handle that has already failed.
    pub fn failed(key: &str, reason: impl Into<String>) -> Self {
        Self::with_status(key, LoadStatus::Failed(reason.into()))
    }

    fn with_status(key: &str, status: LoadStatus) -> Self {
        Self {
            key: Arc::from(key),
            status: Arc::new(Mutex::new(status)),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    //--- Settlement -------------------------------------------------------

    /// Settles the handle with the producer's result.
    pub fn complete(&self, result: Result<Resource, HookError>) {
        let mut status = self.status.lock();
        if !status.is_pending() {
            return;
        }
        *status = match result {
            Ok(resource) => LoadStatus::Ready(resource),
            Err(err) => LoadStatus::Failed(format!("{err:#}")),
        };
    }

    /// Marks a still-pending handle as cancelled.
    pub fn cancel(&self) {
        let mut status = self.status.lock();
        if status.is_pending() {
            *status = LoadStatus::Cancelled;
        }
    }

    //--- Queries ----------------------------------------------------------

    pub fn status(&self) -> LoadStatus {
        self.status.lock().clone()
    }

    pub fn is_done(&self) -> bool {
        !self.status.lock().is_pending()
    }

    pub fn resource(&self) -> Option<Resource> {
        match &*self.status.lock() {
            LoadStatus::Ready(resource) => Some(resource.clone()),
            _ => None,
        }
    }

    /// Polls the handle from inside a suspendable hook.
    ///
    /// `Ok(Poll::Pending)` while loading, the resource once ready, and an
    /// error when the load failed or was cancelled.
    pub fn poll_resource(&self) -> Result<Poll<Resource>, FlowError> {
        match &*self.status.lock() {
            LoadStatus::Pending => Ok(Poll::Pending),
            LoadStatus::Ready(resource) => Ok(Poll::Ready(resource.clone())),
            LoadStatus::Failed(reason) => Err(FlowError::LoadFailed {
                key: self.key.to_string(),
                reason: reason.clone(),
            }),
            LoadStatus::Cancelled => Err(FlowError::Cancelled),
        }
    }

    /// Returns true if both handles refer to the same slot.
    pub fn ptr_eq(&self, other: &LoadHandle) -> bool {
        Arc::ptr_eq(&self.status, &other.status)
    }
}

impl fmt::Debug for LoadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle")
            .field("key", &self.key)
            .field("status", &*self.status.lock())
            .finish()
    }
}

//=== Loader Trait ========================================================

/// Asset provider consumed by the [`PreloadCache`](super::PreloadCache).
pub trait Loader {
    /// Whether `key` names an asset this loader can produce.
    fn exists(&self, key: &str) -> bool;

    /// Starts loading `key`. The returned handle settles later (or
    /// immediately for synchronous loaders). `cancel` fires when the last
    /// holder releases the key before it settled.
    fn load(&mut self, key: &str, cancel: CancelToken) -> LoadHandle;

    /// Called when the last reference to `key` is released.
    fn unload(&mut self, _key: &str, _resource: Option<Resource>) {}

    /// Per-tick pump for loaders that settle handles on the flow thread.
    fn poll(&mut self) {}
}

//=== NullLoader ==========================================================

/// Loader that knows no assets. Used when a flow has no asset layer.
#[derive(Debug, Default)]
pub struct NullLoader;

impl Loader for NullLoader {
    fn exists(&self, _key: &str) -> bool {
        false
    }

    fn load(&mut self, key: &str, _cancel: CancelToken) -> LoadHandle {
        LoadHandle::failed(key, "no loader configured")
    }
}

//=========================================================================
// Tests
//=========================================================================

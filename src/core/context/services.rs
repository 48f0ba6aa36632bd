//=========================================================================
// Services
//=========================================================================
//
// Type-keyed collaborator storage handed to situations explicitly.
//
// Architecture:
//   host ── insert<T>(value) ──> HashMap<TypeId, Box<dyn Any>>
//                                        ↓
//   Situation hooks ←── get<T>() / get_mut<T>() / require<T>()
//
// One value per type. Replaces a global service locator: whatever a
// situation needs must have been inserted by the host beforehand.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use log::warn;

//=== Internal Dependencies ===============================================

use crate::core::error::FlowError;

//=== Services ============================================================

/// Type-safe container of collaborators (UI surface owner, audio, save...).
#[derive(Default)]
pub struct Services {
    entries: HashMap<TypeId, Box<dyn Any>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Registration -----------------------------------------------------

    /// Inserts `value`, replacing any previous value of the same type.
    pub fn insert<T: 'static>(&mut self, value: T) {
        if self.entries.insert(TypeId::of::<T>(), Box::new(value)).is_some() {
            warn!("Service {} was already registered and has been replaced", type_name::<T>());
        }
    }

    /// Removes and returns the service of type `T`.
    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast::<T>().ok())
            .map(|boxed| *boxed)
    }

    //--- Access -----------------------------------------------------------

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.entries
            .get_mut(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_mut::<T>())
    }

    /// Like [`get`](Self::get) but reports a missing service as an error,
    /// so hooks can use `?`.
    pub fn require<T: 'static>(&self) -> Result<&T, FlowError> {
        self.get::<T>()
            .ok_or(FlowError::MissingService(type_name::<T>()))
    }

    /// Mutable variant of [`require`](Self::require).
    pub fn require_mut<T: 'static>(&mut self) -> Result<&mut T, FlowError> {
        self.get_mut::<T>()
            .ok_or(FlowError::MissingService(type_name::<T>()))
    }

    //--- Query API --------------------------------------------------------

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//=========================================================================
// Tests
//=========================================================================

//=========================================================================
// Situation Registry
//=========================================================================
//
// Owns every situation instance together with its bookkeeping.
//
// Architecture:
//   SituationRegistry
//     ├─ slots: Vec<SituationSlot>   (indexed by SituationId)
//     │    └─ name, parent, phase, scope, Box<dyn Situation>
//     └─ by_name: HashMap<String, SituationId>
//
// Parents must be registered before their children and cannot change
// afterwards, so every parent chain is acyclic by construction.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::any::{Any, TypeId};
use std::collections::HashMap;

use log::debug;

//=== Internal Dependencies ===============================================

use super::{AsAny, Phase, PhaseContext, Situation, SituationId, SituationScope};
use crate::core::cancel::CancelToken;
use crate::core::context::FlowContext;
use crate::core::error::FlowError;

//=== SituationSlot =======================================================

struct SituationSlot {
    name: String,
    parent: Option<SituationId>,
    phase: Phase,
    type_id: TypeId,
    scope: SituationScope,
    situation: Box<dyn Situation>,
}

//=== SituationRegistry ===================================================

/// Storage for situations and their lifecycle state.
#[derive(Default)]
pub struct SituationRegistry {
    slots: Vec<SituationSlot>,
    by_name: HashMap<String, SituationId>,
}

impl SituationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    //--- Registration -----------------------------------------------------

    /// Registers `situation` under a unique `name`, nested under `parent`.
    pub fn insert<S: Situation>(
        &mut self,
        name: &str,
        situation: S,
        parent: Option<SituationId>,
    ) -> Result<SituationId, FlowError> {
        self.insert_boxed(name, Box::new(situation), parent)
    }

    /// Registers an already boxed situation (factory output).
    pub fn insert_boxed(
        &mut self,
        name: &str,
        situation: Box<dyn Situation>,
        parent: Option<SituationId>,
    ) -> Result<SituationId, FlowError> {
        if self.by_name.contains_key(name) {
            return Err(FlowError::DuplicateSituation(name.to_string()));
        }
        if let Some(parent) = parent {
            self.slot(parent)?;
        }

        let type_id = Any::type_id(AsAny::as_any(&*situation));
        let id = SituationId(self.slots.len());

        self.slots.push(SituationSlot {
            name: name.to_string(),
            parent,
            phase: Phase::Standby,
            type_id,
            scope: SituationScope::default(),
            situation,
        });
        self.by_name.insert(name.to_string(), id);

        debug!("Registered situation {:?} as {} (parent {:?})", name, id, parent);
        Ok(id)
    }

    //--- Lookup -----------------------------------------------------------

    pub fn contains(&self, id: SituationId) -> bool {
        id.0 < self.slots.len()
    }

    pub fn find_by_name(&self, name: &str) -> Option<SituationId> {
        self.by_name.get(name).copied()
    }

    /// First registered situation of concrete type `S`.
    pub fn find<S: Situation>(&self) -> Option<SituationId> {
        let wanted = TypeId::of::<S>();
        self.slots
            .iter()
            .position(|slot| slot.type_id == wanted)
            .map(SituationId)
    }

    pub fn name(&self, id: SituationId) -> &str {
        self.slots.get(id.0).map_or("<unknown>", |slot| slot.name.as_str())
    }

    pub fn parent(&self, id: SituationId) -> Option<SituationId> {
        self.slots.get(id.0).and_then(|slot| slot.parent)
    }

    pub fn phase(&self, id: SituationId) -> Option<Phase> {
        self.slots.get(id.0).map(|slot| slot.phase)
    }

    pub fn scope(&self, id: SituationId) -> Option<&SituationScope> {
        self.slots.get(id.0).map(|slot| &slot.scope)
    }

    /// Borrows the situation as its concrete type.
    pub fn get<S: Situation>(&self, id: SituationId) -> Option<&S> {
        self.slots
            .get(id.0)
            .and_then(|slot| AsAny::as_any(&*slot.situation).downcast_ref::<S>())
    }

    pub fn get_mut<S: Situation>(&mut self, id: SituationId) -> Option<&mut S> {
        self.slots
            .get_mut(id.0)
            .and_then(|slot| AsAny::as_any_mut(&mut *slot.situation).downcast_mut::<S>())
    }

    /// Root-to-leaf chain ending at `id`.
    pub fn chain(&self, id: SituationId) -> Result<Vec<SituationId>, FlowError> {
        self.slot(id)?;

        let mut chain = vec![id];
        let mut cursor = self.parent(id);
        while let Some(parent) = cursor {
            chain.push(parent);
            cursor = self.parent(parent);
        }
        chain.reverse();
        Ok(chain)
    }

    pub fn ids(&self) -> impl Iterator<Item = SituationId> + '_ {
        (0..self.slots.len()).map(SituationId)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    //--- Lifecycle Access (container only) --------------------------------

    pub(crate) fn set_phase(&mut self, id: SituationId, phase: Phase) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            debug!("Situation {:?}: {} -> {}", slot.name, slot.phase, phase);
            slot.phase = phase;
        }
    }

    pub(crate) fn open_scope(&mut self, id: SituationId) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.scope.open();
        }
    }

    pub(crate) fn close_scope(&mut self, id: SituationId, cx: &mut FlowContext) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            slot.scope.close(cx);
        }
    }

    /// Runs `hook` against the situation with a freshly built phase context.
    pub(crate) fn with_hook<R>(
        &mut self,
        id: SituationId,
        cx: &mut FlowContext,
        cancel: &CancelToken,
        hook: impl FnOnce(&mut dyn Situation, &mut PhaseContext<'_>) -> R,
    ) -> Option<R> {
        let SituationSlot {
            name,
            scope,
            situation,
            ..
        } = self.slots.get_mut(id.0)?;

        let mut pcx = PhaseContext::new(cx, scope, cancel, name);
        Some(hook(&mut **situation, &mut pcx))
    }

    /// Runs a per-frame hook against the situation.
    pub(crate) fn with_situation(
        &mut self,
        id: SituationId,
        cx: &mut FlowContext,
        hook: impl FnOnce(&mut dyn Situation, &mut FlowContext),
    ) {
        if let Some(slot) = self.slots.get_mut(id.0) {
            hook(&mut *slot.situation, cx);
        }
    }

    fn slot(&self, id: SituationId) -> Result<&SituationSlot, FlowError> {
        self.slots.get(id.0).ok_or(FlowError::UnknownSituation(id))
    }
}

//=========================================================================
// Tests
//=========================================================================

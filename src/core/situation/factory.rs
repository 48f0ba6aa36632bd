//=========================================================================
// Situation Factory
//=========================================================================
//
// Explicit key → constructor mapping, so flows can be declared by name
// (from data or tooling) without runtime reflection.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;

use log::warn;

//=== Internal Dependencies ===============================================

use super::Situation;
use crate::core::error::FlowError;

//=== Type Aliases ========================================================

type Constructor = Box<dyn Fn() -> Box<dyn Situation>>;

//=== SituationFactory ====================================================

/// Registry of situation constructors keyed by string.
#[derive(Default)]
pub struct SituationFactory {
    constructors: HashMap<String, Constructor>,
}

impl SituationFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `build` under `key`, replacing any previous constructor.
    pub fn register<S, F>(&mut self, key: &str, build: F)
    where
        S: Situation,
        F: Fn() -> S + 'static,
    {
        let constructor: Constructor = Box::new(move || Box::new(build()) as Box<dyn Situation>);
        if self.constructors.insert(key.to_string(), constructor).is_some() {
            warn!("Situation factory {:?} was already registered and has been replaced", key);
        }
    }

    /// Builds a new situation instance for `key`.
    pub fn build(&self, key: &str) -> Result<Box<dyn Situation>, FlowError> {
        self.constructors
            .get(key)
            .map(|construct| construct())
            .ok_or_else(|| FlowError::UnknownFactory(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.constructors.contains_key(key)
    }

    /// Registered keys in arbitrary order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }
}

//=========================================================================
// Tests
//=========================================================================

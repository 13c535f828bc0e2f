//! Per-analysis scratch storage.
//!
//! A [`Context`] references (never owns) a translation unit and carries an
//! opaque store keyed by [`ContextId`]. Each analysis run is paired with a
//! fresh context id and keeps its working state, most importantly the fact
//! map, under that key. The store accepts any `'static` value; readers
//! downcast to what they stored.

use std::any::Any;
use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashMap;

use crate::ir::id::ContextId;
use crate::ir::unit::TranslationUnit;

static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Returns a process-unique context id.
#[must_use]
pub fn next_context_id() -> ContextId {
    ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Scratch state attached to a translation unit for the duration of one or
/// more analysis runs.
pub struct Context<'tu> {
    unit: &'tu TranslationUnit,
    info: FxHashMap<ContextId, Box<dyn Any>>,
}

impl<'tu> Context<'tu> {
    /// Creates a context over `unit`.
    #[must_use]
    pub fn new(unit: &'tu TranslationUnit) -> Self {
        Context {
            unit,
            info: FxHashMap::default(),
        }
    }

    /// The translation unit this context belongs to.
    #[must_use]
    pub fn unit(&self) -> &'tu TranslationUnit {
        self.unit
    }

    /// Stores `value` under `key`.
    ///
    /// Returns `false` without storing when the key is already present.
    pub fn set_info(&mut self, key: ContextId, value: Box<dyn Any>) -> bool {
        if self.info.contains_key(&key) {
            return false;
        }
        self.info.insert(key, value);
        true
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get_info(&self, key: ContextId) -> Option<&dyn Any> {
        self.info.get(&key).map(Box::as_ref)
    }

    /// Removes and returns the value stored under `key`.
    ///
    /// The fixpoint driver uses this to own the fact map for the duration
    /// of a run and reinstall it afterwards.
    pub fn take_info(&mut self, key: ContextId) -> Option<Box<dyn Any>> {
        self.info.remove(&key)
    }

    /// Removes the value stored under `key`; `false` when absent.
    pub fn remove_info(&mut self, key: ContextId) -> bool {
        self.info.remove(&key).is_some()
    }
}

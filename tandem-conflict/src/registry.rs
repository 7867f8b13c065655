//! Process-wide catalog of conflict types, keyed by reference name.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tandem_core::errors::{ConflictError, TandemResult};
use uuid::Uuid;

use crate::builtin;
use crate::conflict_type::ConflictTypeDescriptor;

#[derive(Debug, Default)]
pub struct ConflictRegistry {
    types: DashMap<Uuid, Arc<ConflictTypeDescriptor>>,
}

impl ConflictRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in conflict types.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for descriptor in builtin::builtin_conflict_types() {
            registry.types.insert(descriptor.reference_name, Arc::new(descriptor));
        }
        registry
    }

    /// Idempotent for an identical shape; a different shape under the same
    /// reference name is rejected.
    pub fn register(&self, descriptor: ConflictTypeDescriptor) -> TandemResult<Arc<ConflictTypeDescriptor>> {
        match self.types.entry(descriptor.reference_name) {
            Entry::Occupied(existing) => match existing.get().shape_difference(&descriptor) {
                None => Ok(Arc::clone(existing.get())),
                Some(reason) => Err(ConflictError::DuplicateRegistration {
                    reference_name: descriptor.reference_name.to_string(),
                    reason,
                }
                .into()),
            },
            Entry::Vacant(slot) => {
                tracing::debug!(
                    conflict_type = %descriptor.reference_name,
                    name = %descriptor.friendly_name,
                    "registered conflict type"
                );
                let descriptor = Arc::new(descriptor);
                slot.insert(Arc::clone(&descriptor));
                Ok(descriptor)
            }
        }
    }

    pub fn lookup(&self, reference_name: &Uuid) -> TandemResult<Arc<ConflictTypeDescriptor>> {
        self.types
            .get(reference_name)
            .map(|d| Arc::clone(d.value()))
            .ok_or_else(|| ConflictError::UnknownConflictType(reference_name.to_string()).into())
    }

    pub fn contains(&self, reference_name: &Uuid) -> bool {
        self.types.contains_key(reference_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

//! Source-to-target identity mapping for one clone operation

use crate::error::{CloneError, Result};
use crate::types::{obj_key, same_obj, ObjKey, ObjRef};
use std::collections::{HashMap, HashSet};

struct MapEntry {
    source: ObjRef,
    target: ObjRef,
    late_setup_done: bool,
}

/// Bidirectional source→target instance mapping, built incrementally during
/// the setup phase of a single clone operation.
///
/// Keys compare by pointer identity, never by value equality: two distinct
/// but equal-valued instances remain distinct nodes in the graph. Entries are
/// kept in insertion order so the copy phase visits pairs in the same order
/// the setup walk discovered them.
#[derive(Default)]
pub struct IdentityMap {
    entries: HashMap<ObjKey, MapEntry>,
    order: Vec<ObjKey>,
    targets: HashSet<ObjKey>,
}

impl IdentityMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded mappings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no mapping has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target mapped to the given source instance, if it has been visited.
    pub fn get_target(&self, source: &ObjRef) -> Option<ObjRef> {
        self.entries
            .get(&obj_key(source))
            .map(|entry| entry.target.clone())
    }

    /// Register a new (source, target) pair.
    ///
    /// Recording the same pair twice is a no-op. Recording a second, distinct
    /// target for an already-mapped source is a contract violation, as is
    /// aliasing a second source onto an existing target; both abort the
    /// operation because the graph invariant is broken.
    pub fn record(&mut self, source: &ObjRef, target: &ObjRef) -> Result<()> {
        let source_key = obj_key(source);
        let target_key = obj_key(target);
        if let Some(existing) = self.entries.get(&source_key) {
            if same_obj(&existing.target, target) {
                return Ok(());
            }
            return Err(CloneError::IdentityConflict {
                source_key: source_key.addr(),
            });
        }
        if self.targets.contains(&target_key) {
            return Err(CloneError::TargetAliased {
                target_key: target_key.addr(),
            });
        }
        self.entries.insert(
            source_key,
            MapEntry {
                source: source.clone(),
                target: target.clone(),
                late_setup_done: false,
            },
        );
        self.order.push(source_key);
        self.targets.insert(target_key);
        Ok(())
    }

    /// Replace the target of an existing mapping.
    ///
    /// This is the only sanctioned way to overwrite a mapping, reserved for
    /// the late-setup step once the whole graph has been provisionally
    /// mapped.
    pub fn reassign(&mut self, source: &ObjRef, target: ObjRef) -> Result<()> {
        let source_key = obj_key(source);
        let target_key = obj_key(&target);
        let entry = self
            .entries
            .get_mut(&source_key)
            .ok_or(CloneError::MappingMissing {
                source_key: source_key.addr(),
            })?;
        if same_obj(&entry.target, &target) {
            return Ok(());
        }
        if self.targets.contains(&target_key) {
            return Err(CloneError::TargetAliased {
                target_key: target_key.addr(),
            });
        }
        self.targets.remove(&obj_key(&entry.target));
        self.targets.insert(target_key);
        entry.target = target;
        Ok(())
    }

    /// Returns true if the candidate instance belongs to the target graph of
    /// this operation, as opposed to untouched external state.
    pub fn is_target(&self, candidate: &ObjRef) -> bool {
        self.targets.contains(&obj_key(candidate))
    }

    /// Mark the late-setup step of a source's target as completed.
    pub fn mark_late_setup_done(&mut self, source: &ObjRef) {
        if let Some(entry) = self.entries.get_mut(&obj_key(source)) {
            entry.late_setup_done = true;
        }
    }

    /// Whether the late-setup step has run for the given source.
    pub fn late_setup_done(&self, source: &ObjRef) -> bool {
        self.entries
            .get(&obj_key(source))
            .map(|entry| entry.late_setup_done)
            .unwrap_or(false)
    }

    /// Keys of all mappings in insertion order.
    pub(crate) fn keys_in_order(&self) -> Vec<ObjKey> {
        self.order.clone()
    }

    /// The (source, target) pair recorded under a key.
    pub(crate) fn pair(&self, key: ObjKey) -> Option<(ObjRef, ObjRef)> {
        self.entries
            .get(&key)
            .map(|entry| (entry.source.clone(), entry.target.clone()))
    }
}

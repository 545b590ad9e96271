//! Pluggable clone surrogates and their registry

use crate::behavior::CloneBehavior;
use crate::context::CloneProviderContext;
use crate::error::{CloneError, Result};
use crate::types::ObjRef;
use dashmap::DashMap;
use smallvec::SmallVec;
use std::any::{Any, TypeId};
use std::sync::Arc;
use tracing::debug;

/// Setup-phase environment handed to surrogates while the source graph is
/// walked.
///
/// The purpose of the setup phase is to discover which instances exist, which
/// are owned versus referenced, and to create (or reuse) their target-graph
/// counterparts. Surrogates walk their client object's members through this
/// interface instead of recursing themselves.
pub trait CloneTargetSetup {
    /// Settings of the running operation.
    fn context(&self) -> &CloneProviderContext;

    /// Walk a reference-typed member of the current object.
    ///
    /// `source` is the member's value in the source graph, `target` its
    /// already-existing counterpart in the target graph when cloning onto a
    /// pre-populated target. A `Default` behavior resolves from the member
    /// instance's runtime type registration. `Reference` members are not
    /// recursed into; their identity is resolved during the copy phase. When
    /// the source side is absent but a target-side member exists, surrogates
    /// requiring a merge are scheduled for target-side cleanup.
    fn handle_object(
        &mut self,
        source: Option<&ObjRef>,
        target: Option<&ObjRef>,
        behavior: CloneBehavior,
    ) -> Result<()>;

    /// Push a member name onto the diagnostic field path.
    fn enter_field(&mut self, name: &str);

    /// Pop the innermost member name from the diagnostic field path.
    fn leave_field(&mut self);
}

/// Copy-phase interface exposed to surrogates once the identity map is
/// complete.
///
/// No instances may be created through this interface; the copy phase only
/// moves data between already-mapped instances.
pub trait CloneOperation {
    /// Settings of the running operation.
    fn context(&self) -> &CloneProviderContext;

    /// Target mapped to the given source instance.
    ///
    /// Instances that were never mapped are external to the cloned graph and
    /// resolve to themselves, preserving truly external references.
    fn get_target(&self, source: &ObjRef) -> ObjRef;

    /// Returns true if the candidate belongs to the target graph of this
    /// operation.
    fn is_target(&self, candidate: &ObjRef) -> bool;

    /// Rewrite a reference-typed member to its target-graph counterpart.
    ///
    /// Unmapped references resolve to the original instance; references to
    /// instances dropped under the skip policy resolve to `None`.
    fn handle_object(&self, source: Option<&ObjRef>, target: &mut Option<ObjRef>);

    /// Copy a value-typed member field-by-field through its registered type
    /// descriptor, resolving nested references through the identity map.
    fn handle_value(&self, source: &dyn Any, target: &mut dyn Any) -> Result<()>;
}

/// A pluggable cloning strategy claiming responsibility for a subset of
/// types.
///
/// Surrogates are stateless: all per-operation state lives in the operation
/// itself, so a single surrogate instance is shared across concurrent
/// operations.
pub trait CloneSurrogate: Send + Sync {
    /// Name used in diagnostics and error reports.
    fn name(&self) -> &str;

    /// Selection priority; when more than one registered surrogate matches a
    /// type, the one with the highest priority is picked.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether the copy step of this surrogate must run even when the source
    /// side is absent, allowing target-side cleanup of stale state.
    fn require_merge(&self) -> bool {
        false
    }

    /// Checks whether this surrogate is able to clone the given runtime type.
    fn matches(&self, type_id: TypeId) -> bool;

    /// Produce a fresh target instance for the given source. Only called when
    /// no target was supplied externally.
    fn create_target(&self, source: &ObjRef, context: &CloneProviderContext) -> Result<ObjRef>;

    /// Walk the source object's members during the setup phase.
    ///
    /// Returns true if this object requires a late-setup step, i.e. its
    /// correct construction depends on the rest of the graph being mapped
    /// first.
    fn setup_targets(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        setup: &mut dyn CloneTargetSetup,
    ) -> Result<bool>;

    /// Late setup, run after the entire graph has been provisionally mapped.
    ///
    /// The provisional target may be replaced by re-assigning `target`; the
    /// engine updates the identity map accordingly. Most surrogates never
    /// need this step.
    fn late_setup(
        &self,
        _source: &ObjRef,
        _target: &mut ObjRef,
        _op: &dyn CloneOperation,
    ) -> Result<()> {
        Ok(())
    }

    /// Copy all data from source to target during the copy phase.
    ///
    /// `source` is absent only for surrogates with [`require_merge`] set,
    /// when a target-side member exists without a source-side counterpart.
    ///
    /// [`require_merge`]: CloneSurrogate::require_merge
    fn copy_data(
        &self,
        source: Option<&ObjRef>,
        target: &ObjRef,
        op: &dyn CloneOperation,
    ) -> Result<()>;
}

/// Ordered set of registered surrogates with cached per-type selection.
///
/// The registry is populated once at startup and shared read-only across
/// operations; selection results are cached in a concurrent map so repeated
/// lookups are amortized. Registering or removing a surrogate invalidates
/// the cache and requires exclusive access, which the `&mut self` receivers
/// enforce.
#[derive(Default)]
pub struct SurrogateRegistry {
    surrogates: Vec<Arc<dyn CloneSurrogate>>,
    cache: DashMap<TypeId, Option<usize>>,
}

impl SurrogateRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered surrogates.
    pub fn len(&self) -> usize {
        self.surrogates.len()
    }

    /// Returns true if no surrogate has been registered.
    pub fn is_empty(&self) -> bool {
        self.surrogates.is_empty()
    }

    /// Register a surrogate.
    pub fn register(&mut self, surrogate: Arc<dyn CloneSurrogate>) {
        debug!(
            surrogate = surrogate.name(),
            priority = surrogate.priority(),
            "registered clone surrogate"
        );
        self.surrogates.push(surrogate);
        self.cache.clear();
    }

    /// Remove a surrogate by name, e.g. when the plugin providing it is
    /// unloaded. Returns true if one was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.surrogates.len();
        self.surrogates.retain(|s| s.name() != name);
        let removed = self.surrogates.len() != before;
        if removed {
            debug!(surrogate = name, "removed clone surrogate");
            self.cache.clear();
        }
        removed
    }

    /// Select the surrogate responsible for the given runtime type.
    ///
    /// The highest-priority matching surrogate wins. An exact priority tie
    /// between two matching surrogates is a configuration bug and is
    /// reported instead of silently resolved.
    pub fn select(&self, type_id: TypeId) -> Result<Option<Arc<dyn CloneSurrogate>>> {
        if let Some(cached) = self.cache.get(&type_id) {
            return Ok(cached.value().map(|index| self.surrogates[index].clone()));
        }

        let matching: SmallVec<[(usize, i32); 4]> = self
            .surrogates
            .iter()
            .enumerate()
            .filter(|(_, s)| s.matches(type_id))
            .map(|(index, s)| (index, s.priority()))
            .collect();

        // First-registered maximum, so tie reporting follows registration
        // order.
        let mut best: Option<(usize, i32)> = None;
        for (index, priority) in matching.iter().copied() {
            if best.map_or(true, |(_, best_priority)| priority > best_priority) {
                best = Some((index, priority));
            }
        }
        if let Some((best_index, best_priority)) = best {
            if let Some((tied_index, _)) = matching
                .iter()
                .copied()
                .find(|(index, priority)| *index != best_index && *priority == best_priority)
            {
                return Err(CloneError::AmbiguousSurrogate {
                    type_name: format!("{type_id:?}"),
                    first: self.surrogates[best_index].name().to_string(),
                    second: self.surrogates[tied_index].name().to_string(),
                    priority: best_priority,
                });
            }
        }

        let selected = best.map(|(index, _)| index);
        self.cache.insert(type_id, selected);
        Ok(selected.map(|index| self.surrogates[index].clone()))
    }
}

//! The two-phase clone operation engine

use crate::behavior::CloneBehavior;
use crate::context::{CloneProviderContext, UnmappablePolicy};
use crate::descriptor::{DescriptorSurrogate, TypeRegistry};
use crate::error::{CloneError, Result};
use crate::identity::IdentityMap;
use crate::surrogate::{CloneOperation, CloneSurrogate, CloneTargetSetup, SurrogateRegistry};
use crate::types::{obj_key, obj_type_id, same_obj, ObjKey, ObjRef};
use compact_str::CompactString;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Counters describing one finished clone operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CloneStats {
    /// Instances mapped from source to target during setup.
    pub objects_mapped: usize,
    /// Pairs processed during the copy phase.
    pub objects_copied: usize,
    /// Deferred late-setup steps that ran.
    pub late_setups: usize,
    /// Merge-only copy invocations for orphaned target-side members.
    pub merge_copies: usize,
    /// Instances dropped under the unmappable skip policy.
    pub unmappable_skipped: usize,
}

/// Entry point for clone operations, holding the shared registries.
///
/// A provider is cheap to share and reusable: all per-operation state is
/// created fresh for each invocation and discarded when it completes.
pub struct CloneProvider {
    surrogates: Arc<SurrogateRegistry>,
    types: Arc<TypeRegistry>,
    fallback: Arc<DescriptorSurrogate>,
}

impl CloneProvider {
    /// Create a provider over the given registries.
    pub fn new(surrogates: Arc<SurrogateRegistry>, types: Arc<TypeRegistry>) -> Self {
        let fallback = Arc::new(DescriptorSurrogate::new(types.clone()));
        Self {
            surrogates,
            types,
            fallback,
        }
    }

    /// Deep-clone a source graph, returning the new root.
    pub fn clone_object(&self, root: &ObjRef, context: &CloneProviderContext) -> Result<ObjRef> {
        self.clone_object_with_stats(root, context)
            .map(|(target, _)| target)
    }

    /// Deep-clone a source graph, returning the new root and operation
    /// counters.
    pub fn clone_object_with_stats(
        &self,
        root: &ObjRef,
        context: &CloneProviderContext,
    ) -> Result<(ObjRef, CloneStats)> {
        let mut operation = OperationState::new(self, context.clone());
        operation.run(root, None)?;
        let target = operation
            .map
            .get_target(root)
            .ok_or_else(|| CloneError::UnmappableType {
                type_name: operation.type_name(obj_type_id(root)),
                field_path: "<root>".to_string(),
            })?;
        Ok((target, operation.finish()))
    }

    /// Deep-clone a source graph onto an already-allocated target root,
    /// reusing matching target-side instances instead of creating new ones.
    pub fn clone_onto(
        &self,
        root: &ObjRef,
        target: &ObjRef,
        context: &CloneProviderContext,
    ) -> Result<CloneStats> {
        if same_obj(root, target) {
            return Err(CloneError::TargetMismatch {
                expected: "a distinct target instance".to_string(),
                found: "the source instance itself".to_string(),
            });
        }
        let mut operation = OperationState::new(self, context.clone());
        operation.run(root, Some(target.clone()))?;
        // The skip policy only applies to fields; a root that cannot be
        // mapped has cloned nothing.
        if operation.map.get_target(root).is_none() {
            return Err(CloneError::UnmappableType {
                type_name: operation.type_name(obj_type_id(root)),
                field_path: "<root>".to_string(),
            });
        }
        Ok(operation.finish())
    }
}

/// Mutable state of one running clone operation.
///
/// Implements [`CloneTargetSetup`] for the setup phase and [`CloneOperation`]
/// for the copy phase; surrogates only ever see those two interfaces.
struct OperationState<'a> {
    surrogates: &'a SurrogateRegistry,
    types: &'a TypeRegistry,
    fallback: Arc<dyn CloneSurrogate>,
    context: CloneProviderContext,
    map: IdentityMap,
    owners: HashMap<ObjKey, Arc<dyn CloneSurrogate>>,
    late_queue: Vec<ObjRef>,
    merge_queue: Vec<(ObjRef, Arc<dyn CloneSurrogate>)>,
    merge_seen: HashSet<ObjKey>,
    skipped: HashSet<ObjKey>,
    path: Vec<CompactString>,
    stats: CloneStats,
    op_id: Uuid,
}

impl<'a> OperationState<'a> {
    fn new(provider: &'a CloneProvider, context: CloneProviderContext) -> Self {
        Self {
            surrogates: &provider.surrogates,
            types: &provider.types,
            fallback: provider.fallback.clone(),
            context,
            map: IdentityMap::new(),
            owners: HashMap::new(),
            late_queue: Vec::new(),
            merge_queue: Vec::new(),
            merge_seen: HashSet::new(),
            skipped: HashSet::new(),
            path: Vec::new(),
            stats: CloneStats::default(),
            op_id: Uuid::new_v4(),
        }
    }

    /// Run both phases to completion. Setup, including every deferred
    /// late-setup step, finishes before the first byte of data is copied.
    fn run(&mut self, root: &ObjRef, onto: Option<ObjRef>) -> Result<()> {
        debug!(operation = %self.op_id, "clone setup phase");
        self.prepare_object(root, onto)?;
        self.run_late_setups()?;
        debug!(
            operation = %self.op_id,
            mapped = self.map.len(),
            "clone copy phase"
        );
        self.copy_all()?;
        debug!(
            operation = %self.op_id,
            copied = self.stats.objects_copied,
            late_setups = self.stats.late_setups,
            merges = self.stats.merge_copies,
            skipped = self.stats.unmappable_skipped,
            "clone operation complete"
        );
        Ok(())
    }

    fn finish(mut self) -> CloneStats {
        self.stats.objects_mapped = self.map.len();
        self.stats
    }

    /// Phase 1 entry for a single instance: map it (creating or reusing a
    /// target) and recurse into its owned members.
    fn prepare_object(&mut self, source: &ObjRef, existing: Option<ObjRef>) -> Result<Option<ObjRef>> {
        if let Some(target) = self.map.get_target(source) {
            return Ok(Some(target));
        }
        if self.skipped.contains(&obj_key(source)) {
            return Ok(None);
        }

        let type_id = obj_type_id(source);
        let surrogate: Arc<dyn CloneSurrogate> = match self.surrogates.select(type_id)? {
            Some(surrogate) => surrogate,
            None if self.fallback.matches(type_id) => self.fallback.clone(),
            None => return self.handle_unmappable(source, type_id),
        };

        if let Some(existing_target) = &existing {
            if same_obj(source, existing_target) {
                return Err(CloneError::TargetMismatch {
                    expected: "a distinct target instance".to_string(),
                    found: "the source instance itself".to_string(),
                });
            }
            let target_type = obj_type_id(existing_target);
            if target_type != type_id {
                return Err(CloneError::TargetMismatch {
                    expected: self.type_name(type_id),
                    found: self.type_name(target_type),
                });
            }
        }

        let target = match existing {
            Some(target) => target,
            None => surrogate
                .create_target(source, &self.context)
                .map_err(|e| self.wrap_surrogate_err(surrogate.name(), type_id, e))?,
        };

        // Recorded before recursing so cycles resolve to the in-progress
        // target instead of recursing forever.
        self.map.record(source, &target)?;
        self.owners.insert(obj_key(source), surrogate.clone());
        trace!(
            operation = %self.op_id,
            type_name = %self.type_name(type_id),
            path = %self.render_path(),
            "mapped instance"
        );

        let needs_late_setup = surrogate
            .setup_targets(source, &target, self)
            .map_err(|e| self.wrap_surrogate_err(surrogate.name(), type_id, e))?;
        if needs_late_setup {
            self.late_queue.push(source.clone());
        }
        Ok(Some(target))
    }

    fn handle_unmappable(&mut self, source: &ObjRef, type_id: TypeId) -> Result<Option<ObjRef>> {
        match self.context.unmappable {
            UnmappablePolicy::SkipField => {
                warn!(
                    operation = %self.op_id,
                    type_name = %self.type_name(type_id),
                    path = %self.render_path(),
                    "no surrogate or type descriptor; dropping reference"
                );
                self.skipped.insert(obj_key(source));
                self.stats.unmappable_skipped += 1;
                Ok(None)
            }
            UnmappablePolicy::Fail => Err(CloneError::UnmappableType {
                type_name: self.type_name(type_id),
                field_path: self.render_path(),
            }),
        }
    }

    /// Second sweep of phase 1: invoke deferred late-setup steps in the
    /// order they were requested, now that a complete source→target mapping
    /// is available.
    fn run_late_setups(&mut self) -> Result<()> {
        let queue = std::mem::take(&mut self.late_queue);
        for source in queue {
            let key = obj_key(&source);
            let Some(owner) = self.owners.get(&key).cloned() else {
                continue;
            };
            let mut target = self.map.get_target(&source).ok_or(CloneError::MappingMissing {
                source_key: key.addr(),
            })?;
            owner
                .late_setup(&source, &mut target, &*self)
                .map_err(|e| self.wrap_surrogate_err(owner.name(), obj_type_id(&source), e))?;
            self.map.reassign(&source, target)?;
            self.map.mark_late_setup_done(&source);
            self.stats.late_setups += 1;
        }
        Ok(())
    }

    /// Phase 2: visit every recorded pair in setup order and let the owning
    /// surrogate copy data; no instances are created here.
    fn copy_all(&mut self) -> Result<()> {
        for key in self.map.keys_in_order() {
            let Some((source, target)) = self.map.pair(key) else {
                continue;
            };
            if same_obj(&source, &target) {
                continue;
            }
            let Some(owner) = self.owners.get(&key).cloned() else {
                continue;
            };
            owner
                .copy_data(Some(&source), &target, &*self)
                .map_err(|e| self.wrap_surrogate_err(owner.name(), obj_type_id(&source), e))?;
            self.stats.objects_copied += 1;
        }

        let merges = std::mem::take(&mut self.merge_queue);
        for (target, surrogate) in merges {
            surrogate
                .copy_data(None, &target, &*self)
                .map_err(|e| self.wrap_surrogate_err(surrogate.name(), obj_type_id(&target), e))?;
            self.stats.merge_copies += 1;
        }
        Ok(())
    }

    fn type_name(&self, type_id: TypeId) -> String {
        self.types
            .type_name(type_id)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{type_id:?}"))
    }

    fn render_path(&self) -> String {
        if self.path.is_empty() {
            "<root>".to_string()
        } else {
            self.path
                .iter()
                .map(|segment| segment.as_str())
                .collect::<Vec<_>>()
                .join(".")
        }
    }

    /// Attach source type and field path to surrogate-internal failures;
    /// engine errors pass through untouched.
    fn wrap_surrogate_err(&self, surrogate: &str, type_id: TypeId, err: CloneError) -> CloneError {
        match err {
            CloneError::Custom(message) => CloneError::SurrogateFailure {
                surrogate: surrogate.to_string(),
                type_name: self.type_name(type_id),
                field_path: self.render_path(),
                message,
            },
            other => other,
        }
    }
}

impl CloneTargetSetup for OperationState<'_> {
    fn context(&self) -> &CloneProviderContext {
        &self.context
    }

    fn handle_object(
        &mut self,
        source: Option<&ObjRef>,
        target: Option<&ObjRef>,
        behavior: CloneBehavior,
    ) -> Result<()> {
        match source {
            Some(source) => {
                let effective = match behavior {
                    CloneBehavior::Default => self.types.default_behavior(obj_type_id(source)),
                    explicit => explicit,
                };
                if effective == CloneBehavior::ChildObject {
                    self.prepare_object(source, target.cloned())?;
                }
                // Reference members are not walked; their identity resolves
                // during the copy phase against the completed map.
                Ok(())
            }
            None => {
                let Some(target) = target else {
                    return Ok(());
                };
                // Orphaned target-side member: schedule a merge-only copy if
                // its surrogate asks for one. Reference members are
                // externally owned and stay untouched.
                let effective = match behavior {
                    CloneBehavior::Default => self.types.default_behavior(obj_type_id(target)),
                    explicit => explicit,
                };
                if effective != CloneBehavior::ChildObject {
                    return Ok(());
                }
                if !self.merge_seen.insert(obj_key(target)) {
                    return Ok(());
                }
                if let Some(surrogate) = self.surrogates.select(obj_type_id(target))? {
                    if surrogate.require_merge() {
                        self.merge_queue.push((target.clone(), surrogate));
                    }
                }
                Ok(())
            }
        }
    }

    fn enter_field(&mut self, name: &str) {
        self.path.push(CompactString::new(name));
    }

    fn leave_field(&mut self) {
        self.path.pop();
    }
}

impl CloneOperation for OperationState<'_> {
    fn context(&self) -> &CloneProviderContext {
        &self.context
    }

    fn get_target(&self, source: &ObjRef) -> ObjRef {
        self.map
            .get_target(source)
            .unwrap_or_else(|| source.clone())
    }

    fn is_target(&self, candidate: &ObjRef) -> bool {
        self.map.is_target(candidate)
    }

    fn handle_object(&self, source: Option<&ObjRef>, target: &mut Option<ObjRef>) {
        *target = match source {
            None => None,
            Some(source) if self.skipped.contains(&obj_key(source)) => None,
            Some(source) => Some(CloneOperation::get_target(self, source)),
        };
    }

    fn handle_value(&self, source: &dyn Any, target: &mut dyn Any) -> Result<()> {
        let type_id = source.type_id();
        match self.types.get(type_id) {
            Some(descriptor) => descriptor.copy_fields(source, target, self),
            None => Err(CloneError::UnmappableType {
                type_name: self.type_name(type_id),
                field_path: self.render_path(),
            }),
        }
    }
}

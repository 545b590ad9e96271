//! Surrogates for containers holding references to other graph nodes

use clone_system::{
    new_obj, with_obj, with_obj_mut, CloneBehavior, CloneError, CloneOperation,
    CloneProviderContext, CloneSurrogate, CloneTargetSetup, ObjRef, Result,
};
use std::any::TypeId;
use std::collections::HashMap;

/// Ordered collection of graph nodes.
pub type ObjVec = Vec<ObjRef>;

/// String-keyed collection of graph nodes.
pub type ObjMap = HashMap<String, ObjRef>;

fn not_a(container: &str) -> CloneError {
    CloneError::Custom(format!("expected an {container}"))
}

/// Surrogate for [`ObjVec`].
///
/// Elements are walked with `Default` behavior, so each element resolves its
/// own ownership from its type registration. Elements dropped under the skip
/// policy are removed from the cloned collection rather than left as holes.
/// Merge copies are required so a target-side collection with no source
/// counterpart is emptied instead of keeping stale content.
pub struct ObjVecSurrogate;

impl CloneSurrogate for ObjVecSurrogate {
    fn name(&self) -> &str {
        "obj_vec"
    }

    fn require_merge(&self) -> bool {
        true
    }

    fn matches(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<ObjVec>()
    }

    fn create_target(&self, _source: &ObjRef, _context: &CloneProviderContext) -> Result<ObjRef> {
        Ok(new_obj(ObjVec::new()))
    }

    fn setup_targets(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        setup: &mut dyn CloneTargetSetup,
    ) -> Result<bool> {
        let elements =
            with_obj(source, |v: &ObjVec| v.clone()).ok_or_else(|| not_a("object vector"))?;
        let existing = with_obj(target, |v: &ObjVec| v.clone()).unwrap_or_default();

        for (index, element) in elements.iter().enumerate() {
            setup.enter_field(&format!("[{index}]"));
            let result =
                setup.handle_object(Some(element), existing.get(index), CloneBehavior::Default);
            setup.leave_field();
            result?;
        }
        // Target-side elements beyond the source length are orphans.
        for (index, orphan) in existing.iter().enumerate().skip(elements.len()) {
            setup.enter_field(&format!("[{index}]"));
            let result = setup.handle_object(None, Some(orphan), CloneBehavior::Default);
            setup.leave_field();
            result?;
        }
        Ok(false)
    }

    fn copy_data(
        &self,
        source: Option<&ObjRef>,
        target: &ObjRef,
        op: &dyn CloneOperation,
    ) -> Result<()> {
        let Some(source) = source else {
            with_obj_mut(target, |v: &mut ObjVec| v.clear())
                .ok_or_else(|| not_a("object vector"))?;
            return Ok(());
        };
        let elements =
            with_obj(source, |v: &ObjVec| v.clone()).ok_or_else(|| not_a("object vector"))?;
        let mut rebuilt = ObjVec::with_capacity(elements.len());
        for element in &elements {
            let mut mapped = None;
            op.handle_object(Some(element), &mut mapped);
            if let Some(mapped) = mapped {
                rebuilt.push(mapped);
            }
        }
        with_obj_mut(target, move |v: &mut ObjVec| *v = rebuilt)
            .ok_or_else(|| not_a("object vector"))?;
        Ok(())
    }
}

/// Surrogate for [`ObjMap`].
///
/// Entries are walked in sorted key order so operations over the same graph
/// are deterministic regardless of hash iteration order.
pub struct ObjMapSurrogate;

fn sorted_entries(map: &ObjRef) -> Result<Vec<(String, ObjRef)>> {
    let mut entries: Vec<(String, ObjRef)> = with_obj(map, |m: &ObjMap| {
        m.iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    })
    .ok_or_else(|| not_a("object map"))?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

impl CloneSurrogate for ObjMapSurrogate {
    fn name(&self) -> &str {
        "obj_map"
    }

    fn require_merge(&self) -> bool {
        true
    }

    fn matches(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<ObjMap>()
    }

    fn create_target(&self, _source: &ObjRef, _context: &CloneProviderContext) -> Result<ObjRef> {
        Ok(new_obj(ObjMap::new()))
    }

    fn setup_targets(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        setup: &mut dyn CloneTargetSetup,
    ) -> Result<bool> {
        let entries = sorted_entries(source)?;
        let existing = with_obj(target, |m: &ObjMap| m.clone()).unwrap_or_default();

        for (key, element) in &entries {
            setup.enter_field(key);
            let result =
                setup.handle_object(Some(element), existing.get(key), CloneBehavior::Default);
            setup.leave_field();
            result?;
        }
        // Target-side entries without a source counterpart are orphans.
        let mut orphans: Vec<(&String, &ObjRef)> = existing
            .iter()
            .filter(|(key, _)| {
                entries
                    .binary_search_by(|(entry_key, _)| entry_key.as_str().cmp(key.as_str()))
                    .is_err()
            })
            .collect();
        orphans.sort_by(|a, b| a.0.cmp(b.0));
        for (key, orphan) in orphans {
            setup.enter_field(key);
            let result = setup.handle_object(None, Some(orphan), CloneBehavior::Default);
            setup.leave_field();
            result?;
        }
        Ok(false)
    }

    fn copy_data(
        &self,
        source: Option<&ObjRef>,
        target: &ObjRef,
        op: &dyn CloneOperation,
    ) -> Result<()> {
        let Some(source) = source else {
            with_obj_mut(target, |m: &mut ObjMap| m.clear()).ok_or_else(|| not_a("object map"))?;
            return Ok(());
        };
        let entries = sorted_entries(source)?;
        let mut rebuilt = ObjMap::with_capacity(entries.len());
        for (key, element) in entries {
            let mut mapped = None;
            op.handle_object(Some(&element), &mut mapped);
            if let Some(mapped) = mapped {
                rebuilt.insert(key, mapped);
            }
        }
        with_obj_mut(target, move |m: &mut ObjMap| *m = rebuilt)
            .ok_or_else(|| not_a("object map"))?;
        Ok(())
    }
}

//! Surrogate for plain-data leaf types

use clone_system::{
    new_obj, with_obj, with_obj_mut, CloneError, CloneOperation, CloneProviderContext,
    CloneSurrogate, CloneTargetSetup, ObjRef, Result,
};
use std::any::{Any, TypeId};
use std::marker::PhantomData;

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}

/// Surrogate for a self-contained value type with no references to other
/// graph nodes.
///
/// The target is produced directly from `Clone`, so the setup phase has
/// nothing to walk and the copy phase is a single assignment.
pub struct PodSurrogate<T> {
    name: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Clone + Send + Sync> PodSurrogate<T> {
    pub fn new() -> Self {
        Self {
            name: format!("pod<{}>", short_type_name::<T>()),
            _marker: PhantomData,
        }
    }

    fn value_of(&self, obj: &ObjRef) -> Result<T> {
        with_obj(obj, |value: &T| value.clone()).ok_or_else(|| {
            CloneError::Custom(format!(
                "expected a {}",
                std::any::type_name::<T>()
            ))
        })
    }
}

impl<T: Any + Clone + Send + Sync> Default for PodSurrogate<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Any + Clone + Send + Sync> CloneSurrogate for PodSurrogate<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, type_id: TypeId) -> bool {
        type_id == TypeId::of::<T>()
    }

    fn create_target(&self, source: &ObjRef, _context: &CloneProviderContext) -> Result<ObjRef> {
        Ok(new_obj(self.value_of(source)?))
    }

    fn setup_targets(
        &self,
        _source: &ObjRef,
        _target: &ObjRef,
        _setup: &mut dyn CloneTargetSetup,
    ) -> Result<bool> {
        Ok(false)
    }

    fn copy_data(
        &self,
        source: Option<&ObjRef>,
        target: &ObjRef,
        _op: &dyn CloneOperation,
    ) -> Result<()> {
        let Some(source) = source else {
            return Ok(());
        };
        let value = self.value_of(source)?;
        with_obj_mut(target, move |slot: &mut T| *slot = value).ok_or_else(|| {
            CloneError::Custom(format!(
                "expected a {}",
                std::any::type_name::<T>()
            ))
        })?;
        Ok(())
    }
}

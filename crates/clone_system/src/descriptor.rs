//! Ahead-of-time field descriptor tables and the default descriptor-driven
//! surrogate
//!
//! Instead of runtime reflection, every type participating in generic cloning
//! registers a [`TypeDescriptor`] once at startup: its name, a factory, and a
//! table of field accessors with optional per-field overrides. The
//! [`DescriptorSurrogate`] walks these tables and is the fallback strategy
//! whenever no registered surrogate claims a type.

use crate::behavior::{CloneBehavior, FieldOverride};
use crate::context::CloneProviderContext;
use crate::error::{CloneError, Result};
use crate::surrogate::{CloneOperation, CloneSurrogate, CloneTargetSetup};
use crate::types::{new_obj, obj_type_id, ObjRef};
use compact_str::CompactString;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

type ObjectGetter = Box<dyn Fn(&dyn Any) -> Option<ObjRef> + Send + Sync>;
type ObjectSetter = Box<dyn Fn(&mut dyn Any, Option<ObjRef>) + Send + Sync>;
type ValueSetupFn = Box<dyn Fn(&dyn Any, &mut dyn CloneTargetSetup) -> Result<()> + Send + Sync>;
type ValueCopyFn = Box<dyn Fn(&dyn Any, &mut dyn Any, &dyn CloneOperation) -> Result<()> + Send + Sync>;
type ExplicitSetupFn = Box<dyn Fn(&ObjRef, &ObjRef, &mut dyn CloneTargetSetup) -> Result<bool> + Send + Sync>;
type ExplicitCopyFn = Box<dyn Fn(&ObjRef, &ObjRef, &dyn CloneOperation) -> Result<()> + Send + Sync>;
type ExplicitLateFn = Box<dyn Fn(&ObjRef, &mut ObjRef, &dyn CloneOperation) -> Result<()> + Send + Sync>;
type FactoryFn = Box<dyn Fn() -> ObjRef + Send + Sync>;

enum FieldAccessor {
    /// Reference-typed member: read and write the shared handle.
    Object { get: ObjectGetter, set: ObjectSetter },
    /// Value-typed member: copied inline; `setup` walks references nested
    /// inside the value during the setup phase, when there are any.
    Value {
        setup: Option<ValueSetupFn>,
        copy: ValueCopyFn,
    },
}

/// One field of a registered type: name, accessor, and the optional override
/// refining its clone behavior.
pub struct FieldDescriptor {
    name: CompactString,
    overrides: FieldOverride,
    accessor: FieldAccessor,
}

impl FieldDescriptor {
    fn skip_in_setup(&self, context: &CloneProviderContext) -> bool {
        let flags = self.overrides.flags;
        flags.skip
            || flags.shallow
            || (flags.identity_relevant && !context.preserve_identity)
    }

    fn skip_in_copy(&self, context: &CloneProviderContext) -> bool {
        let flags = self.overrides.flags;
        flags.skip || (flags.identity_relevant && !context.preserve_identity)
    }
}

/// Explicit clone hooks for types that handle their own cloning instead of
/// going through the field table.
pub struct ExplicitHooks {
    setup: ExplicitSetupFn,
    copy: ExplicitCopyFn,
    late: Option<ExplicitLateFn>,
}

/// Registered cloning metadata of one concrete type.
pub struct TypeDescriptor {
    type_id: TypeId,
    name: CompactString,
    factory: FactoryFn,
    fields: Vec<FieldDescriptor>,
    explicit: Option<ExplicitHooks>,
}

impl TypeDescriptor {
    /// Start a descriptor for a type constructible through `Default`.
    pub fn of<T: Any + Default + Send + Sync>(name: &str) -> TypeDescriptorBuilder<T> {
        Self::with_factory(name, T::default)
    }

    /// Start a descriptor with an explicit factory.
    pub fn with_factory<T: Any + Send + Sync>(
        name: &str,
        factory: impl Fn() -> T + Send + Sync + 'static,
    ) -> TypeDescriptorBuilder<T> {
        TypeDescriptorBuilder {
            name: CompactString::new(name),
            factory: Box::new(move || new_obj(factory())),
            fields: Vec::new(),
            explicit: None,
            _marker: PhantomData,
        }
    }

    /// The described type.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Registered type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a fresh, default-initialized instance of the described type.
    pub fn create(&self) -> ObjRef {
        (self.factory)()
    }

    fn explicit(&self) -> Option<&ExplicitHooks> {
        self.explicit.as_ref()
    }

    /// Copy all fields from `source` into `target`, resolving reference
    /// members through the operation's identity map.
    pub(crate) fn copy_fields(
        &self,
        source: &dyn Any,
        target: &mut dyn Any,
        op: &dyn CloneOperation,
    ) -> Result<()> {
        for field in &self.fields {
            if field.skip_in_copy(op.context()) {
                continue;
            }
            match &field.accessor {
                FieldAccessor::Object { get, set } => {
                    let source_value = get(source);
                    if field.overrides.flags.shallow {
                        set(target, source_value);
                        continue;
                    }
                    let mut mapped = None;
                    op.handle_object(source_value.as_ref(), &mut mapped);
                    set(target, mapped);
                }
                FieldAccessor::Value { copy, .. } => copy(source, target, op)?,
            }
        }
        Ok(())
    }

    /// Walk all reference-carrying fields during the setup phase.
    ///
    /// Member handles are snapshotted first so no lock on `source`/`target`
    /// is held while the walk recurses into children.
    fn setup_fields(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        setup: &mut dyn CloneTargetSetup,
    ) -> Result<()> {
        struct MemberJob {
            name: CompactString,
            source: Option<ObjRef>,
            target: Option<ObjRef>,
            behavior: CloneBehavior,
        }

        let mut jobs: Vec<MemberJob> = Vec::new();
        {
            let source_guard = source.read_recursive();
            let target_guard = target.read_recursive();
            for field in &self.fields {
                if field.skip_in_setup(setup.context()) {
                    continue;
                }
                if let FieldAccessor::Object { get, .. } = &field.accessor {
                    jobs.push(MemberJob {
                        name: field.name.clone(),
                        source: get(&*source_guard),
                        target: get(&*target_guard),
                        behavior: field.overrides.behavior,
                    });
                }
            }
        }
        for job in jobs {
            setup.enter_field(&job.name);
            let result = setup.handle_object(job.source.as_ref(), job.target.as_ref(), job.behavior);
            setup.leave_field();
            result?;
        }

        let value_walks: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, field)| {
                !field.skip_in_setup(setup.context())
                    && matches!(
                        field.accessor,
                        FieldAccessor::Value { setup: Some(_), .. }
                    )
            })
            .map(|(index, _)| index)
            .collect();
        for index in value_walks {
            let field = &self.fields[index];
            if let FieldAccessor::Value {
                setup: Some(walk), ..
            } = &field.accessor
            {
                let source_guard = source.read_recursive();
                setup.enter_field(&field.name);
                let result = walk(&*source_guard, setup);
                setup.leave_field();
                result?;
            }
        }
        Ok(())
    }
}

/// Builder for [`TypeDescriptor`]s; closes over the concrete type so field
/// accessors are written against `&T` instead of `&dyn Any`.
pub struct TypeDescriptorBuilder<T> {
    name: CompactString,
    factory: FactoryFn,
    fields: Vec<FieldDescriptor>,
    explicit: Option<ExplicitHooks>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> TypeDescriptorBuilder<T> {
    /// Add a reference-typed field with default behavior and no flags.
    pub fn object_field(
        self,
        name: &str,
        get: impl Fn(&T) -> Option<ObjRef> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<ObjRef>) + Send + Sync + 'static,
    ) -> Self {
        self.object_field_with(name, FieldOverride::default(), get, set)
    }

    /// Add a reference-typed field with an explicit override.
    pub fn object_field_with(
        mut self,
        name: &str,
        overrides: FieldOverride,
        get: impl Fn(&T) -> Option<ObjRef> + Send + Sync + 'static,
        set: impl Fn(&mut T, Option<ObjRef>) + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name: CompactString::new(name),
            overrides,
            accessor: FieldAccessor::Object {
                get: Box::new(move |any| any.downcast_ref::<T>().and_then(|value| get(value))),
                set: Box::new(move |any, handle| {
                    if let Some(value) = any.downcast_mut::<T>() {
                        set(value, handle);
                    }
                }),
            },
        });
        self
    }

    /// Add a plain value field, copied inline.
    pub fn value_field(
        self,
        name: &str,
        copy: impl Fn(&T, &mut T) + Send + Sync + 'static,
    ) -> Self {
        self.value_field_flags(name, FieldOverride::default(), copy)
    }

    /// Add a plain value field with an override (flags only; value members
    /// are always copied inline).
    pub fn value_field_flags(
        mut self,
        name: &str,
        overrides: FieldOverride,
        copy: impl Fn(&T, &mut T) + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name: CompactString::new(name),
            overrides,
            accessor: FieldAccessor::Value {
                setup: None,
                copy: Box::new(move |source, target, _op| {
                    if let (Some(source), Some(target)) =
                        (source.downcast_ref::<T>(), target.downcast_mut::<T>())
                    {
                        copy(source, target);
                    }
                    Ok(())
                }),
            },
        });
        self
    }

    /// Add a value field that carries object references nested inside it.
    ///
    /// `setup` walks the nested references during the setup phase; `copy`
    /// transfers the value during the copy phase, resolving references
    /// through the operation.
    pub fn value_field_deep(
        mut self,
        name: &str,
        setup: impl Fn(&T, &mut dyn CloneTargetSetup) -> Result<()> + Send + Sync + 'static,
        copy: impl Fn(&T, &mut T, &dyn CloneOperation) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name: CompactString::new(name),
            overrides: FieldOverride::default(),
            accessor: FieldAccessor::Value {
                setup: Some(Box::new(move |any, env| match any.downcast_ref::<T>() {
                    Some(value) => setup(value, env),
                    None => Ok(()),
                })),
                copy: Box::new(move |source, target, op| {
                    match (source.downcast_ref::<T>(), target.downcast_mut::<T>()) {
                        (Some(source), Some(target)) => copy(source, target, op),
                        _ => Ok(()),
                    }
                }),
            },
        });
        self
    }

    /// Let the type handle its own cloning through explicit hooks instead of
    /// the field table. `setup` returns whether a late-setup step is needed.
    pub fn explicit(
        mut self,
        setup: impl Fn(&ObjRef, &ObjRef, &mut dyn CloneTargetSetup) -> Result<bool> + Send + Sync + 'static,
        copy: impl Fn(&ObjRef, &ObjRef, &dyn CloneOperation) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.explicit = Some(ExplicitHooks {
            setup: Box::new(setup),
            copy: Box::new(copy),
            late: None,
        });
        self
    }

    /// Attach a late-setup hook to previously registered explicit hooks.
    pub fn explicit_late(
        mut self,
        late: impl Fn(&ObjRef, &mut ObjRef, &dyn CloneOperation) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        if let Some(hooks) = self.explicit.as_mut() {
            hooks.late = Some(Box::new(late));
        }
        self
    }

    /// Finish the descriptor.
    pub fn build(self) -> TypeDescriptor {
        TypeDescriptor {
            type_id: TypeId::of::<T>(),
            name: self.name,
            factory: self.factory,
            fields: self.fields,
            explicit: self.explicit,
        }
    }
}

/// Process-wide registry of type descriptors and ownership declarations.
///
/// Populated once at startup, shared read-only across operations. Types
/// declared external are copied by reference by default; everything else
/// defaults to owned child data.
#[derive(Default)]
pub struct TypeRegistry {
    descriptors: HashMap<TypeId, Arc<TypeDescriptor>>,
    external: HashMap<TypeId, CompactString>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type descriptor, replacing any previous one for the type.
    pub fn register(&mut self, descriptor: TypeDescriptor) {
        debug!(
            type_name = descriptor.name(),
            fields = descriptor.fields.len(),
            "registered type descriptor"
        );
        self.descriptors
            .insert(descriptor.type_id, Arc::new(descriptor));
    }

    /// Declare a type as externally owned: references to its instances are
    /// shared, never deep-cloned, unless a field override says otherwise.
    pub fn declare_external<T: Any>(&mut self) {
        self.external
            .insert(TypeId::of::<T>(), CompactString::new(std::any::type_name::<T>()));
    }

    /// Descriptor registered for a runtime type.
    pub fn get(&self, type_id: TypeId) -> Option<Arc<TypeDescriptor>> {
        self.descriptors.get(&type_id).cloned()
    }

    /// Whether the type was declared externally owned.
    pub fn is_external(&self, type_id: TypeId) -> bool {
        self.external.contains_key(&type_id)
    }

    /// Type-level default behavior: `Reference` for declared-external types,
    /// `ChildObject` otherwise.
    pub fn default_behavior(&self, type_id: TypeId) -> CloneBehavior {
        if self.is_external(type_id) {
            CloneBehavior::Reference
        } else {
            CloneBehavior::ChildObject
        }
    }

    /// Human-readable name for a runtime type, when known.
    pub fn type_name(&self, type_id: TypeId) -> Option<&str> {
        self.descriptors
            .get(&type_id)
            .map(|descriptor| descriptor.name())
            .or_else(|| self.external.get(&type_id).map(|name| name.as_str()))
    }
}

/// The default, descriptor-driven surrogate.
///
/// Treats an object as a flat set of fields resolved through the behavior
/// model. It is not part of the surrogate registry; the engine falls back to
/// it whenever no registered surrogate matches a type that has a descriptor.
pub struct DescriptorSurrogate {
    types: Arc<TypeRegistry>,
}

impl DescriptorSurrogate {
    pub fn new(types: Arc<TypeRegistry>) -> Self {
        Self { types }
    }

    fn descriptor_for(&self, source: &ObjRef) -> Result<Arc<TypeDescriptor>> {
        let type_id = obj_type_id(source);
        self.types.get(type_id).ok_or_else(|| {
            CloneError::Custom(format!(
                "type descriptor for {type_id:?} disappeared during the operation"
            ))
        })
    }
}

impl CloneSurrogate for DescriptorSurrogate {
    fn name(&self) -> &str {
        "descriptor"
    }

    fn priority(&self) -> i32 {
        i32::MIN
    }

    fn matches(&self, type_id: TypeId) -> bool {
        self.types.get(type_id).is_some()
    }

    fn create_target(&self, source: &ObjRef, _context: &CloneProviderContext) -> Result<ObjRef> {
        Ok(self.descriptor_for(source)?.create())
    }

    fn setup_targets(
        &self,
        source: &ObjRef,
        target: &ObjRef,
        setup: &mut dyn CloneTargetSetup,
    ) -> Result<bool> {
        let descriptor = self.descriptor_for(source)?;
        if let Some(hooks) = descriptor.explicit() {
            return (hooks.setup)(source, target, setup);
        }
        descriptor.setup_fields(source, target, setup)?;
        Ok(false)
    }

    fn late_setup(
        &self,
        source: &ObjRef,
        target: &mut ObjRef,
        op: &dyn CloneOperation,
    ) -> Result<()> {
        let descriptor = self.descriptor_for(source)?;
        if let Some(ExplicitHooks {
            late: Some(late), ..
        }) = descriptor.explicit()
        {
            return late(source, target, op);
        }
        Ok(())
    }

    fn copy_data(
        &self,
        source: Option<&ObjRef>,
        target: &ObjRef,
        op: &dyn CloneOperation,
    ) -> Result<()> {
        let Some(source) = source else {
            return Ok(());
        };
        let descriptor = self.descriptor_for(source)?;
        if let Some(hooks) = descriptor.explicit() {
            return (hooks.copy)(source, target, op);
        }
        let source_guard = source.read_recursive();
        let mut target_guard = target.write();
        descriptor.copy_fields(&*source_guard, &mut *target_guard, op)
    }
}

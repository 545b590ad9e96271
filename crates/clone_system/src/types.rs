//! Type-erased object references and pointer identity

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A shared, type-erased graph node.
///
/// Every object participating in a clone operation is held behind one of
/// these handles. Two `ObjRef`s denote the same graph node exactly when they
/// point at the same allocation; value equality plays no role anywhere in the
/// cloning system.
pub type ObjRef = Arc<RwLock<dyn Any + Send + Sync>>;

/// Stable identity key for an [`ObjRef`], derived from its allocation address.
///
/// Keys are only meaningful while the operation holds the graph alive, which
/// is guaranteed because the source graph owns its nodes for the duration of
/// a clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjKey(usize);

impl ObjKey {
    /// Raw address value, used in diagnostics.
    pub fn addr(self) -> usize {
        self.0
    }
}

/// Wrap a value into a shared graph node.
pub fn new_obj<T: Any + Send + Sync>(value: T) -> ObjRef {
    Arc::new(RwLock::new(value))
}

/// Identity key of a graph node.
pub fn obj_key(obj: &ObjRef) -> ObjKey {
    ObjKey(Arc::as_ptr(obj) as *const () as usize)
}

/// Returns true if both handles denote the same graph node.
pub fn same_obj(a: &ObjRef, b: &ObjRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// Runtime type of the value behind a graph node.
///
/// Uses a recursive read lock because it is frequently called while an
/// ancestor of the node is already read-locked during the setup walk.
pub fn obj_type_id(obj: &ObjRef) -> TypeId {
    let guard = obj.read_recursive();
    (*guard).type_id()
}

/// Run a closure against the concrete value behind a node, if it has type `T`.
pub fn with_obj<T: Any, R>(obj: &ObjRef, f: impl FnOnce(&T) -> R) -> Option<R> {
    let guard = obj.read_recursive();
    guard.downcast_ref::<T>().map(f)
}

/// Run a closure against the mutable concrete value behind a node.
pub fn with_obj_mut<T: Any, R>(obj: &ObjRef, f: impl FnOnce(&mut T) -> R) -> Option<R> {
    let mut guard = obj.write();
    guard.downcast_mut::<T>().map(f)
}

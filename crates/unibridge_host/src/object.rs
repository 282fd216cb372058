//! Host-owned objects referenced from the handle table.
//!
//! Objects are single-threaded (`Rc` + `RefCell`). The runtime type is
//! recorded at boxing time, so it can be read while the value is borrowed.

use std::any::{Any, TypeId};
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

pub struct Object<T: ?Sized = dyn Any> {
    type_id: TypeId,
    type_name: &'static str,
    value: RefCell<T>,
}

/// Shared reference to a host object of any type.
pub type ObjectRef = Rc<Object>;

/// Boxes a value as a host object.
pub fn boxed<T: Any>(value: T) -> ObjectRef {
    Rc::new(Object {
        type_id: TypeId::of::<T>(),
        type_name: std::any::type_name::<T>(),
        value: RefCell::new(value),
    })
}

impl Object {
    /// The exact runtime type of the boxed value.
    pub fn runtime_type(&self) -> TypeId {
        self.type_id
    }

    /// Rust type name, for diagnostics only.
    pub fn rust_type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the value as `T`. `None` on a type mismatch or while the
    /// value is mutably borrowed elsewhere.
    pub fn borrow<T: Any>(&self) -> Option<Ref<'_, T>> {
        let value = self.value.try_borrow().ok()?;
        Ref::filter_map(value, |value| value.downcast_ref::<T>()).ok()
    }

    pub fn borrow_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        let value = self.value.try_borrow_mut().ok()?;
        RefMut::filter_map(value, |value| value.downcast_mut::<T>()).ok()
    }

    /// Copies the value out as `T`.
    pub fn read<T: Any + Clone>(&self) -> Option<T> {
        self.borrow::<T>().map(|value| value.clone())
    }

    /// Replaces the value, provided `T` is its exact runtime type.
    pub fn write<T: Any>(&self, value: T) -> bool {
        match self.borrow_mut::<T>() {
            Some(mut slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Reads argument `index` as `T`.
pub fn arg<T: Any + Clone>(args: &[ObjectRef], index: usize) -> Option<T> {
    args.get(index)?.read::<T>()
}

/// `TypeId` shorthand for parameter lists.
pub fn param<T: Any>() -> TypeId {
    TypeId::of::<T>()
}

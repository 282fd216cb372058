//! The function table the host hands to a native module at init.
//!
//! Field order is the wire contract. New slots are only ever appended at the
//! end, as nullable pointers, and `GLUE_ABI_VERSION` is bumped whenever the
//! table changes shape.

use crate::handle::Handle;
use crate::slice::{Slice, SliceMut};

/// Shape version of [`GlueTable`]. Exported by every module through
/// `bridge_abi_version` and checked by the host before `bridge_init`.
pub const GLUE_ABI_VERSION: u32 = 2;

/// Result of a primitive coercion. Never raises: a mismatch is
/// `success == false` with a default `value`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TypeCast<T> {
    pub success: bool,
    pub value: T,
}

impl<T> TypeCast<T> {
    pub const fn ok(value: T) -> Self {
        Self {
            success: true,
            value,
        }
    }

    pub fn into_option(self) -> Option<T> {
        self.success.then_some(self.value)
    }
}

impl<T: Default> TypeCast<T> {
    pub fn failed() -> Self {
        Self {
            success: false,
            value: T::default(),
        }
    }
}

impl<T: Default> From<Option<T>> for TypeCast<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(Self::failed, Self::ok)
    }
}

pub type PanicHandlerFn = extern "C" fn();
pub type LogFn = for<'a> extern "C" fn(message: Slice<'a, u8>);

pub type NewInstanceFn =
    for<'a, 'b> extern "C" fn(class_name: Slice<'a, u8>, args: Slice<'b, Handle>) -> Handle;
pub type DisposeInstanceFn = extern "C" fn(handle: Handle);
pub type InvokeMethodFn = for<'a, 'b> extern "C" fn(
    handle: Handle,
    method: Slice<'a, u8>,
    args: Slice<'b, Handle>,
) -> Handle;
pub type InvokeAsFn = for<'a, 'b, 'c> extern "C" fn(
    handle: Handle,
    class_name: Slice<'a, u8>,
    method: Slice<'b, u8>,
    args: Slice<'c, Handle>,
) -> Handle;

pub type CloneInstanceFn = extern "C" fn(handle: Handle) -> Handle;
pub type GetMemberFn = for<'a, 'b> extern "C" fn(
    handle: Handle,
    class_name: Slice<'a, u8>,
    name: Slice<'b, u8>,
) -> Handle;
pub type SetMemberFn = for<'a, 'b> extern "C" fn(
    handle: Handle,
    class_name: Slice<'a, u8>,
    name: Slice<'b, u8>,
    value: Handle,
) -> bool;
pub type SizedBytesFn = for<'a> extern "C" fn(bytes: Slice<'a, u8>) -> Handle;
pub type ToStringFn = for<'a> extern "C" fn(text: Slice<'a, u8>) -> Handle;
pub type ToF32Fn = extern "C" fn(value: f32) -> Handle;
pub type TryF32Fn = extern "C" fn(handle: Handle) -> TypeCast<f32>;
pub type TryBoolFn = extern "C" fn(handle: Handle) -> TypeCast<bool>;
pub type TryStringFn =
    for<'a> extern "C" fn(handle: Handle, buffer: SliceMut<'a, u8>) -> TypeCast<usize>;

/// Callback addresses exchanged once per load cycle.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct GlueTable {
    // fault reporting
    pub handle_panic: PanicHandlerFn,
    pub error_log: LogFn,
    pub warn_log: LogFn,
    pub info_log: LogFn,

    // construction and dispatch
    pub new_instance: NewInstanceFn,
    pub dispose_instance: DisposeInstanceFn,
    pub invoke_method: InvokeMethodFn,
    pub invoke_as: InvokeAsFn,

    // extended slots
    pub clone_instance: Option<CloneInstanceFn>,
    pub get_field: Option<GetMemberFn>,
    pub set_field: Option<SetMemberFn>,
    pub get_property: Option<GetMemberFn>,
    pub set_property: Option<SetMemberFn>,
    pub sized_bytes: Option<SizedBytesFn>,
    pub to_string: Option<ToStringFn>,
    pub to_f32: Option<ToF32Fn>,
    pub try_f32: Option<TryF32Fn>,
    pub try_bool: Option<TryBoolFn>,
    pub try_string: Option<TryStringFn>,
}

impl std::fmt::Debug for GlueTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlueTable")
            .field("clone_instance", &self.clone_instance.is_some())
            .field("get_field", &self.get_field.is_some())
            .field("set_field", &self.set_field.is_some())
            .field("get_property", &self.get_property.is_some())
            .field("set_property", &self.set_property.is_some())
            .field("sized_bytes", &self.sized_bytes.is_some())
            .field("to_string", &self.to_string.is_some())
            .field("to_f32", &self.to_f32.is_some())
            .field("try_f32", &self.try_f32.is_some())
            .field("try_bool", &self.try_bool.is_some())
            .field("try_string", &self.try_string.is_some())
            .finish_non_exhaustive()
    }
}

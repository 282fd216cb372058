//! Owned references to host objects.

use std::fmt;
use std::mem::ManuallyDrop;

use thiserror::Error;
use unibridge_core::glue::{GetMemberFn, SetMemberFn};
use unibridge_core::{GlueTable, Handle, Slice, SliceMut};

use crate::glue::glue;

/// The host object does not hold a value of the requested type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("host object has a different type")]
pub struct CastError;

/// One reference to a host object.
///
/// Dropping an `Instance` releases the reference and cloning takes another
/// one, so the host object lives exactly as long as some `Instance` (or the
/// host itself) holds it. The null instance owns nothing.
#[repr(transparent)]
#[derive(PartialEq, Eq, Hash)]
pub struct Instance(Handle);

impl Instance {
    pub const fn null() -> Self {
        Self(Handle::NULL)
    }

    pub const fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Takes ownership of a handle the host handed out.
    pub const fn from_raw(handle: Handle) -> Self {
        Self(handle)
    }

    /// Gives up ownership without releasing the reference.
    pub fn into_raw(self) -> Handle {
        ManuallyDrop::new(self).0
    }

    /// The handle, still owned by `self`.
    pub const fn as_raw(&self) -> Handle {
        self.0
    }

    /// Views borrowed argument handles as instances. Nothing is released
    /// when the view goes away.
    pub fn borrowed(handles: &[Handle]) -> &[Instance] {
        // SAFETY: Instance is a transparent wrapper around Handle
        unsafe { std::slice::from_raw_parts(handles.as_ptr().cast::<Instance>(), handles.len()) }
    }

    fn handles(args: &[Instance]) -> Slice<'_, Handle> {
        // SAFETY: Instance is a transparent wrapper around Handle
        unsafe { Slice::from_raw_parts(args.as_ptr().cast::<Handle>(), args.len()) }
    }

    /// Constructs a host object of the named type.
    pub fn new(class_name: &str, args: &[Instance]) -> Self {
        let Some(glue) = glue() else {
            return Self::null();
        };
        Self((glue.new_instance)(Slice::text(class_name), Self::handles(args)))
    }

    /// Calls a method found on this object's runtime type.
    pub fn invoke(&self, method: &str, args: &[Instance]) -> Self {
        let Some(glue) = glue() else {
            return Self::null();
        };
        Self((glue.invoke_method)(self.0, Slice::text(method), Self::handles(args)))
    }

    /// Calls a method found on `class_name`.
    pub fn invoke_as(&self, class_name: &str, method: &str, args: &[Instance]) -> Self {
        let Some(glue) = glue() else {
            return Self::null();
        };
        Self((glue.invoke_as)(
            self.0,
            Slice::text(class_name),
            Slice::text(method),
            Self::handles(args),
        ))
    }

    pub fn invoke_static(class_name: &str, method: &str, args: &[Instance]) -> Self {
        Self::null().invoke_as(class_name, method, args)
    }

    pub fn get_field(&self, name: &str) -> Self {
        self.get_member(name, "", |glue| glue.get_field)
    }

    pub fn set_field(&self, name: &str, value: &Instance) -> bool {
        self.set_member(name, "", value, |glue| glue.set_field)
    }

    pub fn get_property(&self, name: &str) -> Self {
        self.get_member(name, "", |glue| glue.get_property)
    }

    pub fn set_property(&self, name: &str, value: &Instance) -> bool {
        self.set_member(name, "", value, |glue| glue.set_property)
    }

    pub fn get_static_field(class_name: &str, name: &str) -> Self {
        Self::null().get_member(name, class_name, |glue| glue.get_field)
    }

    pub fn get_static_property(class_name: &str, name: &str) -> Self {
        Self::null().get_member(name, class_name, |glue| glue.get_property)
    }

    fn get_member(
        &self,
        name: &str,
        class_name: &str,
        slot: impl FnOnce(&GlueTable) -> Option<GetMemberFn>,
    ) -> Self {
        let Some(get) = glue().as_ref().and_then(slot) else {
            return Self::null();
        };
        Self(get(self.0, Slice::text(class_name), Slice::text(name)))
    }

    fn set_member(
        &self,
        name: &str,
        class_name: &str,
        value: &Instance,
        slot: impl FnOnce(&GlueTable) -> Option<SetMemberFn>,
    ) -> bool {
        let Some(set) = glue().as_ref().and_then(slot) else {
            return false;
        };
        set(self.0, Slice::text(class_name), Slice::text(name), value.0)
    }
}

impl Clone for Instance {
    /// A null instance, or a host without the clone slot, yields null.
    fn clone(&self) -> Self {
        if self.is_null() {
            return Self::null();
        }
        match glue().and_then(|glue| glue.clone_instance) {
            Some(clone) => Self(clone(self.0)),
            None => Self::null(),
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::null()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if self.is_null() {
            return;
        }
        if let Some(glue) = glue() {
            (glue.dispose_instance)(self.0);
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance({:?})", self.0)
    }
}

impl From<&str> for Instance {
    fn from(text: &str) -> Self {
        match glue().and_then(|glue| glue.to_string) {
            Some(to_string) => Self(to_string(Slice::text(text))),
            None => Self::null(),
        }
    }
}

impl From<f32> for Instance {
    fn from(value: f32) -> Self {
        match glue().and_then(|glue| glue.to_f32) {
            Some(to_f32) => Self(to_f32(value)),
            None => Self::null(),
        }
    }
}

impl From<&[u8]> for Instance {
    fn from(bytes: &[u8]) -> Self {
        match glue().and_then(|glue| glue.sized_bytes) {
            Some(sized_bytes) => Self(sized_bytes(Slice::from_slice(bytes))),
            None => Self::null(),
        }
    }
}

impl TryFrom<Instance> for f32 {
    type Error = CastError;

    fn try_from(instance: Instance) -> Result<Self, Self::Error> {
        let try_f32 = glue().and_then(|glue| glue.try_f32).ok_or(CastError)?;
        try_f32(instance.0).into_option().ok_or(CastError)
    }
}

impl TryFrom<Instance> for bool {
    type Error = CastError;

    /// Null reads as `false`.
    fn try_from(instance: Instance) -> Result<Self, Self::Error> {
        if instance.is_null() {
            return Ok(false);
        }
        let try_bool = glue().and_then(|glue| glue.try_bool).ok_or(CastError)?;
        try_bool(instance.0).into_option().ok_or(CastError)
    }
}

impl TryFrom<Instance> for String {
    type Error = CastError;

    fn try_from(instance: Instance) -> Result<Self, Self::Error> {
        let try_string = glue().and_then(|glue| glue.try_string).ok_or(CastError)?;
        let len = try_string(instance.0, SliceMut::empty())
            .into_option()
            .ok_or(CastError)?;
        let mut buffer = vec![0_u8; len];
        let written = try_string(instance.0, SliceMut::from_slice_mut(&mut buffer))
            .into_option()
            .ok_or(CastError)?;
        // the string changed between the two reads
        if written != len {
            return Err(CastError);
        }
        String::from_utf8(buffer).map_err(|_| CastError)
    }
}

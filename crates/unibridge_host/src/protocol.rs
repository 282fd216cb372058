//! The invocation protocol, host side.
//!
//! Every operation here is a soft-failure operation: unknown names, missing
//! members, type mismatches and stale handles produce a null handle,
//! `false` or a failed [`TypeCast`], plus a warning. Nothing is raised
//! across the boundary.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, warn};
use unibridge_core::{Handle, HandleTable, TypeCast};

use crate::object::{ObjectRef, boxed};
use crate::resolver::{Member, Resolver};

/// A handle still live after the module dropped its state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeakedHandle {
    pub handle: Handle,
    pub refcount: u32,
    pub type_name: String,
}

/// Host handle table plus the resolver used to dispatch protocol calls.
pub struct HostState {
    handles: RefCell<HandleTable<ObjectRef>>,
    resolver: Rc<dyn Resolver>,
    halted: Cell<bool>,
}

impl HostState {
    pub fn new(resolver: Rc<dyn Resolver>) -> Self {
        Self {
            handles: RefCell::new(HandleTable::new()),
            resolver,
            halted: Cell::new(false),
        }
    }

    pub fn resolver(&self) -> &dyn Resolver {
        &*self.resolver
    }

    /// Boxes an object. `None` is the null handle.
    pub fn append(&self, object: Option<ObjectRef>) -> Handle {
        self.handles.borrow_mut().append(object)
    }

    pub fn get(&self, handle: Handle) -> Option<ObjectRef> {
        self.handles.borrow().get(handle).cloned()
    }

    pub fn clone_instance(&self, handle: Handle) -> Handle {
        self.handles.borrow_mut().clone_ref(handle)
    }

    pub fn dispose_instance(&self, handle: Handle) {
        // Dropped after the table borrow ends, so a value whose Drop touches
        // the bridge cannot observe the table mid-update.
        let released = self.handles.borrow_mut().dispose(handle);
        drop(released);
    }

    pub fn live_handles(&self) -> usize {
        self.handles.borrow().len()
    }

    pub fn refcount(&self, handle: Handle) -> Option<u32> {
        self.handles.borrow().refcount(handle)
    }

    /// Name of an object's type as the resolver knows it.
    pub fn type_name_of(&self, object: &ObjectRef) -> String {
        self.resolver
            .type_name(object.runtime_type())
            .map_or_else(|| object.rust_type_name().to_owned(), str::to_owned)
    }

    /// Unboxes argument handles. A null or stale argument has no runtime
    /// type, so the whole call fails to resolve.
    fn unbox_args(
        &self,
        operation: &str,
        args: &[Handle],
    ) -> Option<(Vec<ObjectRef>, Vec<TypeId>)> {
        let handles = self.handles.borrow();
        let mut objects = Vec::with_capacity(args.len());
        for (position, &handle) in args.iter().enumerate() {
            match handles.get(handle) {
                Some(object) => objects.push(Rc::clone(object)),
                None => {
                    warn!("{operation}: argument {position} ({handle:?}) does not name an object");
                    return None;
                }
            }
        }
        let types = objects.iter().map(|object| object.runtime_type()).collect();
        Some((objects, types))
    }

    fn resolve_type(&self, operation: &str, class_name: &str) -> Option<TypeId> {
        let ty = self.resolver.resolve_type(class_name);
        if ty.is_none() {
            warn!("{operation}: unknown type `{class_name}`");
        }
        ty
    }

    /// Receiver lookup for handle-or-null calls. `Err` means the handle was
    /// non-null but stale.
    fn receiver(&self, operation: &str, handle: Handle) -> Result<Option<ObjectRef>, ()> {
        if handle.is_null() {
            return Ok(None);
        }
        match self.get(handle) {
            Some(object) => Ok(Some(object)),
            None => {
                warn!("{operation}: receiver {handle:?} does not name an object");
                Err(())
            }
        }
    }

    fn type_names(&self, types: &[TypeId]) -> String {
        types
            .iter()
            .map(|ty| self.resolver.type_name(*ty).unwrap_or("?"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn new_instance(&self, class_name: &str, args: &[Handle]) -> Handle {
        let object = self.construct(class_name, args);
        self.append(object)
    }

    fn construct(&self, class_name: &str, args: &[Handle]) -> Option<ObjectRef> {
        let ty = self.resolve_type("new_instance", class_name)?;
        let (objects, types) = self.unbox_args("new_instance", args)?;
        let Some(constructor) = self.resolver.resolve_constructor(ty, &types) else {
            warn!(
                "new_instance: `{class_name}` has no constructor taking ({})",
                self.type_names(&types)
            );
            return None;
        };
        (constructor.call)(&objects)
    }

    /// Calls a member found on the receiver's runtime type.
    pub fn invoke_method(&self, handle: Handle, method: &str, args: &[Handle]) -> Handle {
        let object = match self.get(handle) {
            Some(receiver) => self.dispatch(receiver.runtime_type(), Some(receiver), method, args),
            None => {
                warn!("invoke_method `{method}`: receiver {handle:?} does not name an object");
                None
            }
        };
        self.append(object)
    }

    /// Calls a member found on the named type. A null receiver selects a
    /// static member.
    pub fn invoke_as(
        &self,
        handle: Handle,
        class_name: &str,
        method: &str,
        args: &[Handle],
    ) -> Handle {
        let object = self
            .resolve_type("invoke_as", class_name)
            .zip(self.receiver("invoke_as", handle).ok())
            .and_then(|(ty, receiver)| self.dispatch(ty, receiver, method, args));
        self.append(object)
    }

    fn dispatch(
        &self,
        ty: TypeId,
        receiver: Option<ObjectRef>,
        method: &str,
        args: &[Handle],
    ) -> Option<ObjectRef> {
        let (objects, types) = self.unbox_args(method, args)?;
        let Some(resolved) = self.resolver.resolve_method(ty, method, &types) else {
            warn!(
                "no method `{method}({})` on `{}`",
                self.type_names(&types),
                self.resolver.type_name(ty).unwrap_or("?")
            );
            return None;
        };
        if resolved.is_static {
            return (resolved.call)(None, &objects);
        }
        let Some(receiver) = receiver else {
            warn!("instance method `{method}` called without a receiver");
            return None;
        };
        (resolved.call)(Some(&receiver), &objects)
    }

    pub fn get_field(&self, handle: Handle, class_name: &str, name: &str) -> Handle {
        self.get_member(MemberKind::Field, handle, class_name, name)
    }

    pub fn set_field(&self, handle: Handle, class_name: &str, name: &str, value: Handle) -> bool {
        self.set_member(MemberKind::Field, handle, class_name, name, value)
    }

    pub fn get_property(&self, handle: Handle, class_name: &str, name: &str) -> Handle {
        self.get_member(MemberKind::Property, handle, class_name, name)
    }

    pub fn set_property(
        &self,
        handle: Handle,
        class_name: &str,
        name: &str,
        value: Handle,
    ) -> bool {
        self.set_member(MemberKind::Property, handle, class_name, name, value)
    }

    /// Resolves a member against the receiver's runtime type, or against the
    /// named type when the receiver is null.
    fn member(
        &self,
        kind: MemberKind,
        handle: Handle,
        class_name: &str,
        name: &str,
    ) -> Option<(Member, Option<ObjectRef>)> {
        let receiver = self.receiver(kind.operation(), handle).ok()?;
        let ty = match &receiver {
            Some(object) => object.runtime_type(),
            None => self.resolve_type(kind.operation(), class_name)?,
        };
        let member = match kind {
            MemberKind::Field => self.resolver.resolve_field(ty, name),
            MemberKind::Property => self.resolver.resolve_property(ty, name),
        };
        let Some(member) = member else {
            warn!(
                "no {} `{name}` on `{}`",
                kind.noun(),
                self.resolver.type_name(ty).unwrap_or(class_name)
            );
            return None;
        };
        if !member.is_static && receiver.is_none() {
            warn!("{} `{name}` is not static and needs a receiver", kind.noun());
            return None;
        }
        Some((member, receiver))
    }

    fn get_member(&self, kind: MemberKind, handle: Handle, class_name: &str, name: &str) -> Handle {
        let object = self.read_member(kind, handle, class_name, name);
        self.append(object)
    }

    fn read_member(
        &self,
        kind: MemberKind,
        handle: Handle,
        class_name: &str,
        name: &str,
    ) -> Option<ObjectRef> {
        let (member, receiver) = self.member(kind, handle, class_name, name)?;
        let Some(get) = member.get else {
            warn!("{} `{name}` cannot be read", kind.noun());
            return None;
        };
        get(receiver.as_ref())
    }

    fn set_member(
        &self,
        kind: MemberKind,
        handle: Handle,
        class_name: &str,
        name: &str,
        value: Handle,
    ) -> bool {
        let Some((member, receiver)) = self.member(kind, handle, class_name, name) else {
            return false;
        };
        let Some(set) = member.set else {
            warn!("{} `{name}` cannot be written", kind.noun());
            return false;
        };
        let Some(value) = self.get(value) else {
            warn!("{} `{name}`: value {value:?} does not name an object", kind.noun());
            return false;
        };
        let written = set(receiver.as_ref(), &value);
        if !written {
            warn!(
                "{} `{name}` rejected a value of type `{}`",
                kind.noun(),
                self.type_name_of(&value)
            );
        }
        written
    }

    pub fn to_string(&self, text: String) -> Handle {
        self.append(Some(boxed(text)))
    }

    pub fn to_f32(&self, value: f32) -> Handle {
        self.append(Some(boxed(value)))
    }

    /// Boxes an owned copy of a byte range.
    pub fn sized_bytes(&self, bytes: &[u8]) -> Handle {
        self.append(Some(boxed(bytes.to_vec())))
    }

    /// Reads an `f32` without consuming the handle.
    pub fn try_f32(&self, handle: Handle) -> TypeCast<f32> {
        self.get(handle).and_then(|object| object.read::<f32>()).into()
    }

    pub fn try_bool(&self, handle: Handle) -> TypeCast<bool> {
        self.get(handle).and_then(|object| object.read::<bool>()).into()
    }

    /// Copies as much of a host string as fits into `buffer` and reports
    /// its full byte length.
    pub fn try_string(&self, handle: Handle, buffer: &mut [u8]) -> TypeCast<usize> {
        let Some(object) = self.get(handle) else {
            return TypeCast::failed();
        };
        let Some(text) = object.borrow::<String>() else {
            return TypeCast::failed();
        };
        let count = text.len().min(buffer.len());
        buffer[..count].copy_from_slice(&text.as_bytes()[..count]);
        TypeCast::ok(text.len())
    }

    /// Live handles, for leak reports.
    pub fn leaked(&self) -> Vec<LeakedHandle> {
        let handles = self.handles.borrow();
        handles
            .handles()
            .filter_map(|handle| {
                let object = handles.get(handle)?;
                Some(LeakedHandle {
                    handle,
                    refcount: handles.refcount(handle).unwrap_or(0),
                    type_name: self.type_name_of(object),
                })
            })
            .collect()
    }

    /// Drops every entry. Only for teardown; handles issued before the reset
    /// stay dead.
    pub fn reset(&self) {
        let mut handles = self.handles.borrow_mut();
        let count = handles.len();
        handles.reset();
        if count > 0 {
            debug!("reset host handle table ({count} entries dropped)");
        }
    }

    pub fn halt(&self) {
        self.halted.set(true);
    }

    pub fn is_halted(&self) -> bool {
        self.halted.get()
    }

    pub fn resume(&self) {
        self.halted.set(false);
    }
}

#[derive(Debug, Clone, Copy)]
enum MemberKind {
    Field,
    Property,
}

impl MemberKind {
    fn noun(self) -> &'static str {
        match self {
            MemberKind::Field => "field",
            MemberKind::Property => "property",
        }
    }

    fn operation(self) -> &'static str {
        match self {
            MemberKind::Field => "field access",
            MemberKind::Property => "property access",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{arg, param};
    use crate::resolver::TypeRegistry;

    #[derive(Debug, Clone, PartialEq, Default)]
    struct Vec2 {
        x: f32,
        y: f32,
    }

    struct Settings;

    fn state() -> HostState {
        let mut registry = TypeRegistry::with_builtins();
        registry
            .register::<Vec2>("Test.Vec2")
            .constructor(&[param::<f32>(), param::<f32>()], |args| {
                Some(Vec2 {
                    x: arg(args, 0)?,
                    y: arg(args, 1)?,
                })
            })
            .method_ref("Length", &[], |v: &Vec2, _| {
                Some(boxed((v.x * v.x + v.y * v.y).sqrt()))
            })
            .method("Scale", &[param::<f32>()], |v, args| {
                let factor: f32 = arg(args, 0)?;
                v.x *= factor;
                v.y *= factor;
                None
            })
            .field("x", |v| &v.x, |v| &mut v.x)
            .property("IsZero", |v: &Vec2| v.x == 0.0 && v.y == 0.0);
        registry
            .register::<Settings>("Test.Settings")
            .static_property("Gravity", || -9.81_f32)
            .static_method("Twice", &[param::<f32>()], |args| {
                Some(boxed(arg::<f32>(args, 0)? * 2.0))
            });
        HostState::new(Rc::new(registry))
    }

    fn text(state: &HostState, handle: Handle) -> Option<String> {
        let query = state.try_string(handle, &mut []);
        let len = query.into_option()?;
        let mut buffer = vec![0; len];
        state.try_string(handle, &mut buffer).into_option()?;
        String::from_utf8(buffer).ok()
    }

    #[test]
    fn test_hello_scenario() {
        let state = state();
        let h1 = state.to_string(String::from("hello"));
        assert!(!h1.is_null());

        let cast = state.try_f32(h1);
        assert!(!cast.success);
        assert_eq!(cast.value, 0.0);

        assert_eq!(text(&state, h1).as_deref(), Some("hello"));
        state.dispose_instance(h1);
        assert!(state.get(h1).is_none());
    }

    #[test]
    fn test_soft_failures() {
        let state = state();
        assert!(state.new_instance("does.not.Exist", &[]).is_null());

        let one = state.to_f32(1.0);
        let two = state.to_f32(2.0);
        let v = state.new_instance("Test.Vec2", &[one, two]);
        assert!(!v.is_null());
        assert!(state.invoke_method(v, "noSuchMethod", &[]).is_null());
        // arity mismatch
        assert!(state.new_instance("Test.Vec2", &[one]).is_null());
        // no implicit conversion from bool
        let flag = state.append(Some(boxed(true)));
        assert!(state.new_instance("Test.Vec2", &[one, flag]).is_null());
        // a null argument has no runtime type
        assert!(state.new_instance("Test.Vec2", &[one, Handle::NULL]).is_null());
        assert!(state.invoke_method(Handle::NULL, "Length", &[]).is_null());
    }

    #[test]
    fn test_invoke_method_mutates_receiver() {
        let state = state();
        let args = [state.to_f32(3.0), state.to_f32(4.0)];
        let v = state.new_instance("Test.Vec2", &args);

        let length = state.invoke_method(v, "Length", &[]);
        assert_eq!(state.try_f32(length).into_option(), Some(5.0));

        let factor = state.to_f32(2.0);
        assert!(state.invoke_method(v, "Scale", &[factor]).is_null());
        let object = state.get(v).unwrap();
        assert_eq!(object.read::<Vec2>(), Some(Vec2 { x: 6.0, y: 8.0 }));
    }

    #[test]
    fn test_invoke_as_static_and_instance() {
        let state = state();
        let half = state.to_f32(0.5);
        let result = state.invoke_as(Handle::NULL, "Test.Settings", "Twice", &[half]);
        assert_eq!(state.try_f32(result).into_option(), Some(1.0));

        let args = [state.to_f32(0.0), state.to_f32(2.0)];
        let v = state.new_instance("Test.Vec2", &args);
        let length = state.invoke_as(v, "Test.Vec2", "Length", &[]);
        assert_eq!(state.try_f32(length).into_option(), Some(2.0));

        // instance member without a receiver
        assert!(state.invoke_as(Handle::NULL, "Test.Vec2", "Length", &[]).is_null());
        assert!(state.invoke_as(v, "Unknown.Type", "Length", &[]).is_null());
    }

    #[test]
    fn test_fields_and_properties() {
        let state = state();
        let args = [state.to_f32(0.0), state.to_f32(0.0)];
        let v = state.new_instance("Test.Vec2", &args);

        let zero = state.get_property(v, "", "IsZero");
        assert_eq!(state.try_bool(zero).into_option(), Some(true));

        let seven = state.to_f32(7.0);
        assert!(state.set_field(v, "", "x", seven));
        let x = state.get_field(v, "", "x");
        assert_eq!(state.try_f32(x).into_option(), Some(7.0));

        let wrong = state.to_string(String::from("7"));
        assert!(!state.set_field(v, "", "x", wrong));
        // read-only property
        assert!(!state.set_property(v, "", "IsZero", seven));

        let gravity = state.get_property(Handle::NULL, "Test.Settings", "Gravity");
        assert_eq!(state.try_f32(gravity).into_option(), Some(-9.81));
        assert!(state.get_field(Handle::NULL, "Test.Vec2", "x").is_null());
    }

    #[test]
    fn test_try_string_truncates() {
        let state = state();
        let h = state.to_string(String::from("bridge"));
        let mut buffer = [0_u8; 3];
        assert_eq!(state.try_string(h, &mut buffer).into_option(), Some(6));
        assert_eq!(&buffer, b"bri");

        let number = state.to_f32(1.0);
        assert!(!state.try_string(number, &mut buffer).success);
        assert!(!state.try_string(Handle::NULL, &mut buffer).success);
    }

    #[test]
    fn test_sized_bytes_copies() {
        let state = state();
        let mut source = vec![1_u8, 2, 3];
        let h = state.sized_bytes(&source);
        source[0] = 9;
        let object = state.get(h).unwrap();
        assert_eq!(object.read::<Vec<u8>>(), Some(vec![1, 2, 3]));
        let length = state.invoke_method(h, "Length", &[]);
        assert_eq!(state.get(length).unwrap().read::<i32>(), Some(3));
    }

    #[test]
    fn test_leak_report_and_reset() {
        let state = state();
        let a = state.to_f32(1.0);
        let _b = state.to_string(String::from("kept"));
        state.clone_instance(a);

        let mut leaked = state.leaked();
        leaked.sort_by(|l, r| l.type_name.cmp(&r.type_name));
        assert_eq!(leaked.len(), 2);
        assert_eq!(leaked[0].type_name, "String");
        assert_eq!(leaked[1].type_name, "f32");
        assert_eq!(leaked[1].refcount, 2);

        state.reset();
        assert_eq!(state.live_handles(), 0);
        assert!(state.get(a).is_none());
        assert!(state.to_f32(2.0) != a);
    }

    #[test]
    fn test_identity_through_clones() {
        let state = state();
        let object = boxed(Vec2::default());
        let h = state.append(Some(Rc::clone(&object)));
        for _ in 0..3 {
            assert_eq!(state.clone_instance(h), h);
        }
        for _ in 0..3 {
            state.dispose_instance(h);
            assert!(Rc::ptr_eq(&state.get(h).unwrap(), &object));
        }
        state.dispose_instance(h);
        assert!(state.get(h).is_none());
        assert_eq!(Rc::strong_count(&object), 1);
    }
}

//! The host's glue table.
//!
//! Native modules only receive bare function pointers, so the trampolines
//! find the host state through a thread-local slot that the active
//! [`crate::BridgeContext`] fills while a module is loaded.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use tracing::{error, info, warn};
use unibridge_core::{GlueTable, Handle, Slice, SliceMut, TypeCast};

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::HostState;

/// Target under which module log lines are re-emitted.
pub const MODULE_TARGET: &str = "unibridge::module";

thread_local! {
    static ACTIVE: RefCell<Option<Rc<HostState>>> = const { RefCell::new(None) };
}

/// Routes glue calls on this thread to `state`.
pub fn activate(state: Rc<HostState>) -> BridgeResult<()> {
    ACTIVE.with_borrow_mut(|active| {
        if active.as_ref().is_some_and(|current| !Rc::ptr_eq(current, &state)) {
            return Err(BridgeError::AlreadyActive);
        }
        *active = Some(state);
        Ok(())
    })
}

/// Clears the slot if `state` is the active one.
pub fn deactivate(state: &Rc<HostState>) {
    ACTIVE.with_borrow_mut(|active| {
        if active.as_ref().is_some_and(|current| Rc::ptr_eq(current, state)) {
            *active = None;
        }
    });
}

pub fn active() -> Option<Rc<HostState>> {
    ACTIVE.with_borrow(Clone::clone)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "<non-string panic payload>"
    }
}

/// Runs `f` against the active host state. Panics in host code become the
/// soft-failure `fallback`.
fn with_host<R>(operation: &str, fallback: R, f: impl FnOnce(&HostState) -> R) -> R {
    let Some(state) = active() else {
        warn!("{operation} called with no active bridge");
        return fallback;
    };
    match panic::catch_unwind(AssertUnwindSafe(|| f(&state))) {
        Ok(result) => result,
        Err(payload) => {
            error!("{operation}: host code panicked: {}", panic_message(&*payload));
            fallback
        }
    }
}

fn text<'a>(operation: &str, what: &str, slice: Slice<'a, u8>) -> Option<&'a str> {
    match slice.as_str() {
        Ok(text) => Some(text),
        Err(err) => {
            warn!("{operation}: {what} is not valid text: {err}");
            None
        }
    }
}

extern "C" fn handle_panic() {
    error!(target: MODULE_TARGET, "native module reported a panic; halting the bridge");
    if let Some(state) = active() {
        state.halt();
    }
}

extern "C" fn error_log(message: Slice<'_, u8>) {
    error!(target: MODULE_TARGET, "{}", message.to_string_lossy());
}

extern "C" fn warn_log(message: Slice<'_, u8>) {
    warn!(target: MODULE_TARGET, "{}", message.to_string_lossy());
}

extern "C" fn info_log(message: Slice<'_, u8>) {
    info!(target: MODULE_TARGET, "{}", message.to_string_lossy());
}

extern "C" fn new_instance(class_name: Slice<'_, u8>, args: Slice<'_, Handle>) -> Handle {
    with_host("new_instance", Handle::NULL, |state| {
        let Some(class_name) = text("new_instance", "class name", class_name) else {
            return Handle::NULL;
        };
        state.new_instance(class_name, args.as_slice())
    })
}

extern "C" fn dispose_instance(handle: Handle) {
    with_host("dispose_instance", (), |state| state.dispose_instance(handle));
}

extern "C" fn invoke_method(
    handle: Handle,
    method: Slice<'_, u8>,
    args: Slice<'_, Handle>,
) -> Handle {
    with_host("invoke_method", Handle::NULL, |state| {
        let Some(method) = text("invoke_method", "method name", method) else {
            return Handle::NULL;
        };
        state.invoke_method(handle, method, args.as_slice())
    })
}

extern "C" fn invoke_as(
    handle: Handle,
    class_name: Slice<'_, u8>,
    method: Slice<'_, u8>,
    args: Slice<'_, Handle>,
) -> Handle {
    with_host("invoke_as", Handle::NULL, |state| {
        let (Some(class_name), Some(method)) = (
            text("invoke_as", "class name", class_name),
            text("invoke_as", "method name", method),
        ) else {
            return Handle::NULL;
        };
        state.invoke_as(handle, class_name, method, args.as_slice())
    })
}

extern "C" fn clone_instance(handle: Handle) -> Handle {
    with_host("clone_instance", Handle::NULL, |state| state.clone_instance(handle))
}

extern "C" fn get_field(handle: Handle, class_name: Slice<'_, u8>, name: Slice<'_, u8>) -> Handle {
    with_host("get_field", Handle::NULL, |state| {
        let (Some(class_name), Some(name)) = (
            text("get_field", "class name", class_name),
            text("get_field", "field name", name),
        ) else {
            return Handle::NULL;
        };
        state.get_field(handle, class_name, name)
    })
}

extern "C" fn set_field(
    handle: Handle,
    class_name: Slice<'_, u8>,
    name: Slice<'_, u8>,
    value: Handle,
) -> bool {
    with_host("set_field", false, |state| {
        let (Some(class_name), Some(name)) = (
            text("set_field", "class name", class_name),
            text("set_field", "field name", name),
        ) else {
            return false;
        };
        state.set_field(handle, class_name, name, value)
    })
}

extern "C" fn get_property(
    handle: Handle,
    class_name: Slice<'_, u8>,
    name: Slice<'_, u8>,
) -> Handle {
    with_host("get_property", Handle::NULL, |state| {
        let (Some(class_name), Some(name)) = (
            text("get_property", "class name", class_name),
            text("get_property", "property name", name),
        ) else {
            return Handle::NULL;
        };
        state.get_property(handle, class_name, name)
    })
}

extern "C" fn set_property(
    handle: Handle,
    class_name: Slice<'_, u8>,
    name: Slice<'_, u8>,
    value: Handle,
) -> bool {
    with_host("set_property", false, |state| {
        let (Some(class_name), Some(name)) = (
            text("set_property", "class name", class_name),
            text("set_property", "property name", name),
        ) else {
            return false;
        };
        state.set_property(handle, class_name, name, value)
    })
}

extern "C" fn sized_bytes(bytes: Slice<'_, u8>) -> Handle {
    with_host("sized_bytes", Handle::NULL, |state| state.sized_bytes(bytes.as_slice()))
}

extern "C" fn to_string(text: Slice<'_, u8>) -> Handle {
    with_host("to_string", Handle::NULL, |state| match text.to_text() {
        Ok(text) => state.to_string(text),
        Err(err) => {
            warn!("to_string: {err}");
            Handle::NULL
        }
    })
}

extern "C" fn to_f32(value: f32) -> Handle {
    with_host("to_f32", Handle::NULL, |state| state.to_f32(value))
}

extern "C" fn try_f32(handle: Handle) -> TypeCast<f32> {
    with_host("try_f32", TypeCast::failed(), |state| state.try_f32(handle))
}

extern "C" fn try_bool(handle: Handle) -> TypeCast<bool> {
    with_host("try_bool", TypeCast::failed(), |state| state.try_bool(handle))
}

extern "C" fn try_string(handle: Handle, mut buffer: SliceMut<'_, u8>) -> TypeCast<usize> {
    with_host("try_string", TypeCast::failed(), |state| {
        state.try_string(handle, buffer.as_mut_slice())
    })
}

/// The glue table handed to every module at init, with every extended slot
/// filled in.
pub fn default_glue() -> GlueTable {
    GlueTable {
        handle_panic,
        error_log,
        warn_log,
        info_log,
        new_instance,
        dispose_instance,
        invoke_method,
        invoke_as,
        clone_instance: Some(clone_instance),
        get_field: Some(get_field),
        set_field: Some(set_field),
        get_property: Some(get_property),
        set_property: Some(set_property),
        sized_bytes: Some(sized_bytes),
        to_string: Some(to_string),
        to_f32: Some(to_f32),
        try_f32: Some(try_f32),
        try_bool: Some(try_bool),
        try_string: Some(try_string),
    }
}

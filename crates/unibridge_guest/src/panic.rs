//! Panic reporting.
//!
//! Every entry point runs under [`guard`]. A panic that reaches it is sent to
//! the host's error sink and then to the panic slot, which halts the host.

use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};

use unibridge_core::Slice;

use crate::glue::glue;

thread_local! {
    static LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Replaces the default hook with one that only records where the panic
/// happened; [`guard`] does the reporting.
pub fn install_hook() {
    panic::set_hook(Box::new(|info| {
        let location = info.location().map(ToString::to_string);
        LOCATION.with_borrow_mut(|slot| *slot = location);
    }));
}

fn payload_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "Box<dyn Any>"
    }
}

fn report(payload: &(dyn Any + Send)) {
    let message = payload_message(payload);
    let line = match LOCATION.take() {
        Some(location) => format!("module panicked at '{message}', {location}"),
        None => format!("module panicked at '{message}'"),
    };
    if let Some(glue) = glue() {
        (glue.error_log)(Slice::text(&line));
        (glue.handle_panic)();
    }
}

/// Runs `f`, turning a panic into a report to the host and `fallback`.
pub fn guard<R>(fallback: R, f: impl FnOnce() -> R) -> R {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            report(&*payload);
            fallback
        }
    }
}

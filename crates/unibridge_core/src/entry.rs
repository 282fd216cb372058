//! Entry points every native module exports.

use crate::glue::GlueTable;
use crate::handle::Handle;
use crate::slice::Slice;

pub const ABI_VERSION_SYMBOL: &str = "bridge_abi_version";
pub const INIT_SYMBOL: &str = "bridge_init";
pub const DROP_SYMBOL: &str = "bridge_drop";
pub const NEW_INSTANCE_SYMBOL: &str = "module_new_instance";
pub const INVOKE_SYMBOL: &str = "module_invoke";
pub const KILL_SYMBOL: &str = "module_kill";

pub type AbiVersionFn = extern "C" fn() -> u32;
/// Called once per load cycle. The module must not call back into the table
/// before this returns.
pub type InitFn = extern "C" fn(glue: GlueTable);
/// Releases everything the module holds, including cloned host handles.
pub type DropFn = extern "C" fn();
/// Takes ownership of `ctx` and returns a module-side handle.
pub type ModuleNewInstanceFn = extern "C" fn(ctx: Handle) -> Handle;
/// Argument handles are borrowed; the returned host handle is owned by the
/// caller.
pub type ModuleInvokeFn = for<'a, 'b> extern "C" fn(
    native: Handle,
    name: Slice<'a, u8>,
    args: Slice<'b, Handle>,
) -> Handle;
pub type ModuleKillFn = extern "C" fn(native: Handle);

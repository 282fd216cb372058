//! Native module side of the bridge.
//!
//! A module implements [`Behaviour`] for its types and calls
//! [`export_behaviour!`] once. Host objects are reached through
//! [`Instance`], which owns one host reference and releases it on drop.

pub mod behaviour;
pub mod glue;
pub mod instance;
pub mod logger;
pub mod panic;

pub use behaviour::Behaviour;
pub use instance::{CastError, Instance};
pub use unibridge_core::{GLUE_ABI_VERSION, GlueTable, Handle, Slice, SliceMut, TypeCast};

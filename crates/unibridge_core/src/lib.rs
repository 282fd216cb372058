//! Types shared by the host runtime and native modules of the bridge.
//!
//! Everything here is ABI: handles, borrowed slices, the glue function table
//! and the signatures of the module entry points.

pub mod entry;
pub mod glue;
pub mod handle;
pub mod slice;

pub use glue::{GLUE_ABI_VERSION, GlueTable, TypeCast};
pub use handle::{Handle, HandleTable};
pub use slice::{Slice, SliceError, SliceMut};

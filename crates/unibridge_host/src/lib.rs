//! Host runtime side of the bridge.
//!
//! [`BridgeContext`] owns a native module for its whole load cycle. The
//! module reaches host objects exclusively through the glue table built in
//! [`glue`], which dispatches into the invocation protocol of
//! [`protocol::HostState`]. What the module can see of the host is decided by
//! the [`Resolver`] the context is created with, normally a [`TypeRegistry`].

pub mod config;
pub mod context;
pub mod error;
pub mod glue;
pub mod logging;
pub mod object;
pub mod protocol;
pub mod resolver;

pub use config::BridgeConfig;
pub use context::{BehaviourId, BridgeContext, EntryPoints, TeardownReport};
pub use error::{BridgeError, BridgeResult};
pub use glue::default_glue;
pub use logging::init_logging;
pub use object::{Object, ObjectRef, arg, boxed, param};
pub use protocol::{HostState, LeakedHandle};
pub use resolver::{Resolver, TypeBuilder, TypeRegistry};

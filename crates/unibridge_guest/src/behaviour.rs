//! Native behaviours and the module-side entry points that drive them.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::warn;
use unibridge_core::{GlueTable, Handle, HandleTable, Slice};

use crate::glue;
use crate::instance::Instance;
use crate::logger;
use crate::panic::{guard, install_hook};

/// A native object driven by the host's frame loop.
pub trait Behaviour {
    fn start(&mut self) {}

    fn update(&mut self) {}

    /// Any other message. The returned instance is handed to the host.
    fn invoke(&mut self, method: &str, _args: &[Instance]) -> Instance {
        warn!("behaviour does not handle `{method}`");
        Instance::null()
    }
}

type BehaviourRef = Rc<RefCell<dyn Behaviour>>;

thread_local! {
    static BEHAVIOURS: RefCell<HandleTable<BehaviourRef>> = RefCell::new(HandleTable::new());
}

/// Number of live behaviours in this module.
pub fn live() -> usize {
    BEHAVIOURS.with_borrow(HandleTable::len)
}

/// `bridge_init`: stores the glue and installs panic reporting and the
/// forwarding logger.
pub fn init(glue_table: GlueTable) {
    glue::install(glue_table);
    install_hook();
    logger::init();
}

/// `bridge_drop`: releases every behaviour (and the host references they
/// hold), then forgets the glue.
pub fn shutdown() {
    guard((), release_all);
    glue::uninstall();
}

/// Drops every behaviour while the glue is still installed. Handles issued
/// before stay dead.
pub fn release_all() {
    // dropped outside the table borrow
    let released = BEHAVIOURS.with_borrow_mut(HandleTable::drain);
    drop(released);
}

/// `module_new_instance`: builds a behaviour around the owned `ctx` handle.
pub fn new_instance<B, F>(ctx: Handle, factory: F) -> Handle
where
    B: Behaviour + 'static,
    F: FnOnce(Instance) -> B,
{
    guard(Handle::NULL, || {
        let behaviour: BehaviourRef = Rc::new(RefCell::new(factory(Instance::from_raw(ctx))));
        BEHAVIOURS.with_borrow_mut(|table| table.insert(behaviour))
    })
}

/// `module_invoke`: dispatches `Start`, `Update` or any other message.
pub fn invoke(native: Handle, name: Slice<'_, u8>, args: Slice<'_, Handle>) -> Handle {
    guard(Handle::NULL, || {
        let Some(behaviour) = BEHAVIOURS.with_borrow(|table| table.get(native).cloned()) else {
            warn!("invoke on unknown behaviour {native:?}");
            return Handle::NULL;
        };
        let name = match name.as_str() {
            Ok(name) => name,
            Err(err) => {
                warn!("invoke: message name is not valid text: {err}");
                return Handle::NULL;
            }
        };
        let Ok(mut behaviour) = behaviour.try_borrow_mut() else {
            warn!("behaviour {native:?} re-entered with `{name}`");
            return Handle::NULL;
        };
        match name {
            "Start" => {
                behaviour.start();
                Handle::NULL
            }
            "Update" => {
                behaviour.update();
                Handle::NULL
            }
            _ => behaviour
                .invoke(name, Instance::borrowed(args.as_slice()))
                .into_raw(),
        }
    })
}

/// `module_kill`: destroys a behaviour.
pub fn kill(native: Handle) {
    guard((), || {
        // dropped outside the table borrow
        let released = BEHAVIOURS.with_borrow_mut(|table| table.dispose(native));
        drop(released);
    });
}

/// Exports the module entry points for a behaviour type.
///
/// ```ignore
/// unibridge_guest::export_behaviour!(Spinner::new);
/// ```
#[macro_export]
macro_rules! export_behaviour {
    ($factory:expr) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn bridge_abi_version() -> u32 {
            $crate::GLUE_ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn bridge_init(glue: $crate::GlueTable) {
            $crate::behaviour::init(glue);
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn bridge_drop() {
            $crate::behaviour::shutdown();
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn module_new_instance(ctx: $crate::Handle) -> $crate::Handle {
            $crate::behaviour::new_instance(ctx, $factory)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn module_invoke(
            native: $crate::Handle,
            name: $crate::Slice<'_, u8>,
            args: $crate::Slice<'_, $crate::Handle>,
        ) -> $crate::Handle {
            $crate::behaviour::invoke(native, name, args)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn module_kill(native: $crate::Handle) {
            $crate::behaviour::kill(native);
        }
    };
}

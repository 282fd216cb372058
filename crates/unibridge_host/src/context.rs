//! Bridge lifecycle: load, init, per-frame dispatch, teardown and reload.

use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, error, info, warn};
use unibridge_core::entry::{
    ABI_VERSION_SYMBOL, AbiVersionFn, DROP_SYMBOL, DropFn, INIT_SYMBOL, INVOKE_SYMBOL, InitFn,
    KILL_SYMBOL, ModuleInvokeFn, ModuleKillFn, ModuleNewInstanceFn, NEW_INSTANCE_SYMBOL,
};
use unibridge_core::{GLUE_ABI_VERSION, Handle, Slice};
use unibridge_loader::ModuleImage;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::glue;
use crate::object::ObjectRef;
use crate::protocol::{HostState, LeakedHandle};
use crate::resolver::Resolver;

/// Message sent to a behaviour on its first tick.
pub const START: &str = "Start";
/// Message sent to a behaviour on every tick.
pub const UPDATE: &str = "Update";

/// Module entry points. Only valid while the image they came from is loaded.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub abi_version: u32,
    init: InitFn,
    drop: DropFn,
    new_instance: ModuleNewInstanceFn,
    invoke: ModuleInvokeFn,
    kill: ModuleKillFn,
}

impl EntryPoints {
    /// Resolves every entry point and checks the glue ABI version.
    ///
    /// # Safety
    /// The image must export the entry points with the signatures declared
    /// in `unibridge_core::entry`, and the result must not outlive the image.
    pub unsafe fn resolve(image: &ModuleImage) -> BridgeResult<Self> {
        let version: AbiVersionFn = unsafe { image.find_symbol(ABI_VERSION_SYMBOL)? };
        let abi_version = version();
        if abi_version != GLUE_ABI_VERSION {
            return Err(BridgeError::AbiMismatch {
                path: image.source_path().to_path_buf(),
                expected: GLUE_ABI_VERSION,
                found: abi_version,
            });
        }

        unsafe {
            Ok(Self {
                abi_version,
                init: image.find_symbol(INIT_SYMBOL)?,
                drop: image.find_symbol(DROP_SYMBOL)?,
                new_instance: image.find_symbol(NEW_INSTANCE_SYMBOL)?,
                invoke: image.find_symbol(INVOKE_SYMBOL)?,
                kill: image.find_symbol(KILL_SYMBOL)?,
            })
        }
    }

    pub fn symbols() -> [&'static str; 6] {
        [
            ABI_VERSION_SYMBOL,
            INIT_SYMBOL,
            DROP_SYMBOL,
            NEW_INSTANCE_SYMBOL,
            INVOKE_SYMBOL,
            KILL_SYMBOL,
        ]
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints")
            .field("abi_version", &self.abi_version)
            .finish_non_exhaustive()
    }
}

struct LoadedModule {
    // field order: entry points are dropped before the image
    entry: EntryPoints,
    image: ModuleImage,
}

/// Identifies a behaviour attached to a context. Stable across reloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BehaviourId(u32);

impl fmt::Display for BehaviourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct HostedBehaviour {
    id: BehaviourId,
    ctx: ObjectRef,
    native: Handle,
    started: bool,
}

/// What teardown found.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Host handles the module still held after `bridge_drop`.
    pub leaked: Vec<LeakedHandle>,
    pub killed: usize,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty()
    }
}

/// One native module driven by the host.
///
/// Owns the module image, the host handle table and the behaviours created
/// by the module. Teardown order is always: kill behaviours, `bridge_drop`,
/// reset the table, unload the image.
pub struct BridgeContext {
    config: BridgeConfig,
    state: Rc<HostState>,
    module: Option<LoadedModule>,
    behaviours: Vec<HostedBehaviour>,
    next_id: u32,
}

impl BridgeContext {
    pub fn new(config: BridgeConfig, resolver: Rc<dyn Resolver>) -> Self {
        Self {
            config,
            state: Rc::new(HostState::new(resolver)),
            module: None,
            behaviours: Vec::new(),
            next_id: 0,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> &Rc<HostState> {
        &self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.module.is_some()
    }

    pub fn is_halted(&self) -> bool {
        self.state.is_halted()
    }

    pub fn module_path(&self) -> Option<&Path> {
        self.config.module_path.as_deref()
    }

    pub fn entry_points(&self) -> Option<EntryPoints> {
        self.module.as_ref().map(|module| module.entry)
    }

    /// Loads the module and hands it the glue table. Calling `init` on an
    /// initialized context does nothing.
    pub fn init(&mut self) -> BridgeResult<()> {
        if self.module.is_some() {
            debug!("bridge already initialized");
            return Ok(());
        }
        let path: PathBuf = self.config.module_path.clone().ok_or(BridgeError::NoModule)?;

        let image = ModuleImage::load(&path, &self.config.loader)?;
        let entry = unsafe { EntryPoints::resolve(&image)? };

        glue::activate(Rc::clone(&self.state))?;
        self.state.resume();
        (entry.init)(glue::default_glue());

        info!(module = %path.display(), abi = entry.abi_version, "bridge initialized");
        self.module = Some(LoadedModule { entry, image });
        Ok(())
    }

    /// Releases the module. Safe to call when nothing is loaded.
    pub fn teardown(&mut self) -> BridgeResult<TeardownReport> {
        let Some(mut module) = self.module.take() else {
            return Ok(TeardownReport::default());
        };

        let mut report = TeardownReport::default();
        for behaviour in &mut self.behaviours {
            if !behaviour.native.is_null() {
                (module.entry.kill)(behaviour.native);
                report.killed += 1;
            }
            behaviour.native = Handle::NULL;
            behaviour.started = false;
        }
        (module.entry.drop)();

        report.leaked = self.state.leaked();
        for leak in &report.leaked {
            warn!(
                handle = %leak.handle,
                refcount = leak.refcount,
                type_name = %leak.type_name,
                "module leaked a host handle"
            );
        }
        self.state.reset();
        glue::deactivate(&self.state);

        module.image.unload()?;
        info!(killed = report.killed, leaked = report.leaked.len(), "bridge torn down");
        Ok(report)
    }

    /// Tears the module down and loads it again. Attached behaviours are
    /// recreated from their context objects and get `Start` again.
    pub fn reload(&mut self) -> BridgeResult<TeardownReport> {
        let report = self.teardown()?;
        self.init()?;
        for index in 0..self.behaviours.len() {
            let ctx = Rc::clone(&self.behaviours[index].ctx);
            let native = self.spawn(&ctx)?;
            self.behaviours[index].native = native;
        }
        info!(behaviours = self.behaviours.len(), "module reloaded");
        Ok(report)
    }

    fn loaded(&self) -> BridgeResult<&LoadedModule> {
        self.module.as_ref().ok_or(BridgeError::NotInitialized)
    }

    fn spawn(&self, ctx: &ObjectRef) -> BridgeResult<Handle> {
        let module = self.loaded()?;
        // the module owns this reference
        let ctx = self.state.append(Some(Rc::clone(ctx)));
        let native = (module.entry.new_instance)(ctx);
        if self.state.is_halted() {
            return Err(BridgeError::Halted);
        }
        if native.is_null() {
            return Err(BridgeError::AttachRejected);
        }
        Ok(native)
    }

    /// Creates a native behaviour bound to `ctx`.
    pub fn attach(&mut self, ctx: ObjectRef) -> BridgeResult<BehaviourId> {
        if self.state.is_halted() {
            return Err(BridgeError::Halted);
        }
        let native = self.spawn(&ctx)?;
        let id = BehaviourId(self.next_id);
        self.next_id += 1;
        self.behaviours.push(HostedBehaviour {
            id,
            ctx,
            native,
            started: false,
        });
        debug!(%id, %native, "behaviour attached");
        Ok(id)
    }

    /// Destroys a behaviour.
    pub fn detach(&mut self, id: BehaviourId) -> BridgeResult<()> {
        let position = self
            .behaviours
            .iter()
            .position(|behaviour| behaviour.id == id)
            .ok_or(BridgeError::UnknownBehaviour(id.0))?;
        let behaviour = self.behaviours.remove(position);
        if let Some(module) = &self.module
            && !behaviour.native.is_null()
        {
            (module.entry.kill)(behaviour.native);
        }
        Ok(())
    }

    pub fn behaviours(&self) -> impl Iterator<Item = BehaviourId> + '_ {
        self.behaviours.iter().map(|behaviour| behaviour.id)
    }

    /// Sends `message` to a behaviour. Arguments are boxed for the duration
    /// of the call only.
    pub fn invoke(
        &self,
        id: BehaviourId,
        message: &str,
        args: &[ObjectRef],
    ) -> BridgeResult<Option<ObjectRef>> {
        let behaviour = self
            .behaviours
            .iter()
            .find(|behaviour| behaviour.id == id)
            .ok_or(BridgeError::UnknownBehaviour(id.0))?;
        self.send(behaviour.native, message, args)
    }

    fn send(
        &self,
        native: Handle,
        message: &str,
        args: &[ObjectRef],
    ) -> BridgeResult<Option<ObjectRef>> {
        if self.state.is_halted() {
            return Err(BridgeError::Halted);
        }
        let module = self.loaded()?;

        let handles: Vec<Handle> = args
            .iter()
            .map(|arg| self.state.append(Some(Rc::clone(arg))))
            .collect();
        let result = (module.entry.invoke)(native, Slice::text(message), Slice::from(&handles));

        let object = self.state.get(result);
        self.state.dispose_instance(result);
        for handle in handles {
            self.state.dispose_instance(handle);
        }

        if self.state.is_halted() {
            error!(call = message, "native module panicked");
            return Err(BridgeError::Halted);
        }
        Ok(object)
    }

    /// Runs one frame: `Start` for behaviours that have not started yet,
    /// then `Update` for all of them.
    pub fn tick(&mut self) -> BridgeResult<()> {
        if self.state.is_halted() {
            return Err(BridgeError::Halted);
        }
        self.loaded()?;

        for index in 0..self.behaviours.len() {
            let native = self.behaviours[index].native;
            if !self.behaviours[index].started {
                self.behaviours[index].started = true;
                self.send(native, START, &[])?;
            }
            self.send(native, UPDATE, &[])?;
        }
        Ok(())
    }
}

impl Drop for BridgeContext {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            error!(error = %err, "bridge teardown failed");
        }
    }
}

impl fmt::Debug for BridgeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeContext")
            .field("module", &self.config.module_path)
            .field("initialized", &self.is_initialized())
            .field("halted", &self.is_halted())
            .field("behaviours", &self.behaviours.len())
            .finish()
    }
}

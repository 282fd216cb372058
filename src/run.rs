//! The engine frame loop.

use std::path::Path;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};
use unibridge_host::{BridgeConfig, BridgeContext, BridgeError, EntryPoints};
use unibridge_loader::{ImageWatcher, ModuleImage};

use crate::engine::{Scene, registry};

/// Step used when the loop is not paced by the wall clock.
pub const FIXED_STEP: f32 = 1.0 / 60.0;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Frames to run; 0 runs until the module halts.
    pub frames: u64,
    /// Target frame time. 0 runs unpaced with a fixed step.
    pub frame_ms: u64,
    /// Reload the module whenever its image changes.
    pub watch: bool,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub frames: u64,
    pub reloads: u32,
    pub leaked: usize,
    pub rotation: f32,
    pub label: String,
}

/// Loads the module from `config`, attaches it to the demo scene and runs
/// the frame loop.
pub fn run(config: BridgeConfig, options: &RunOptions) -> Result<RunSummary> {
    let scene = Scene::new();
    let mut bridge = BridgeContext::new(config, Rc::new(registry(&scene.clock)));
    bridge.init().context("failed to start the bridge")?;
    bridge
        .attach(Rc::clone(&scene.object))
        .context("failed to attach the module behaviour")?;

    let mut watcher = match (options.watch, bridge.module_path()) {
        (true, Some(path)) => Some(ImageWatcher::new(path)),
        _ => None,
    };

    let mut summary = RunSummary::default();
    let frame_time = Duration::from_millis(options.frame_ms);
    let mut last = Instant::now();

    while options.frames == 0 || summary.frames < options.frames {
        let frame_start = Instant::now();

        if let Some(watcher) = watcher.as_mut()
            && watcher.poll()
        {
            info!(module = %watcher.path().display(), "module image changed, reloading");
            let report = bridge.reload().context("hot reload failed")?;
            summary.leaked += report.leaked.len();
            summary.reloads += 1;
        }

        let delta = if options.frame_ms == 0 {
            FIXED_STEP
        } else {
            frame_start.duration_since(last).as_secs_f32()
        };
        last = frame_start;
        scene.clock.advance(delta);

        match bridge.tick() {
            Ok(()) => {}
            Err(BridgeError::Halted) => {
                bail!("native module panicked after {} frames", summary.frames)
            }
            Err(err) => return Err(err).context("frame failed"),
        }
        summary.frames += 1;

        if let Some(rest) = frame_time.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    let report = bridge.teardown().context("teardown failed")?;
    if !report.is_clean() {
        warn!(leaked = report.leaked.len(), "module leaked host handles");
    }
    summary.leaked += report.leaked.len();
    if let Some(transform) = scene.transform() {
        summary.rotation = transform.rotation.z_degrees();
    }
    summary.label = scene.label_text().unwrap_or_default();
    info!(
        frames = summary.frames,
        reloads = summary.reloads,
        rotation = summary.rotation,
        "run finished"
    );
    Ok(summary)
}

/// Entry points and ABI version of a module image.
#[derive(Debug)]
pub struct Inspection {
    pub abi_version: u32,
    pub symbols: Vec<&'static str>,
    pub image: String,
}

/// Loads the image, resolves its entry points and unloads it again without
/// initializing it.
pub fn inspect(path: &Path, config: &BridgeConfig) -> Result<Inspection> {
    let mut image = ModuleImage::load(path, &config.loader)
        .with_context(|| format!("failed to load {}", path.display()))?;
    let entry = unsafe { EntryPoints::resolve(&image) }
        .with_context(|| format!("{} is not a bridge module", path.display()))?;
    let inspection = Inspection {
        abi_version: entry.abi_version,
        symbols: EntryPoints::symbols().to_vec(),
        image: image
            .image_path()
            .map(|image| image.display().to_string())
            .unwrap_or_default(),
    };
    image.unload()?;
    Ok(inspection)
}

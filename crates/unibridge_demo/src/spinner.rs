use std::f32::consts::PI;

use tracing::{info, warn};
use unibridge_guest::{Behaviour, Instance};

use crate::math::{Euler, Vector3, advance};

const DEGREES_PER_SECOND: f32 = 180.0;

/// Rotates its game object around Z and writes the frame rate to `label`.
pub struct Spinner {
    ctx: Instance,
    label: Instance,
    rotation: f32,
    frames: u64,
}

impl Spinner {
    pub fn new(ctx: Instance) -> Self {
        let label = ctx.get_field("label");
        Self {
            ctx,
            label,
            rotation: 0.0,
            frames: 0,
        }
    }

    fn delta_time() -> f32 {
        f32::try_from(Instance::get_static_property("Engine.Time", "deltaTime")).unwrap_or(0.0)
    }
}

impl Behaviour for Spinner {
    fn start(&mut self) {
        info!("spinner started");

        if self.label.is_null() {
            warn!("label is not set, frame rate will not be shown");
        }

        match f32::try_from(Instance::from(PI)) {
            Ok(value) if value == PI => info!("f32 round trip through the host ok"),
            _ => warn!("f32 round trip through the host failed"),
        }

        self.ctx.invoke("SetPosition", &[Vector3::new(1.0, 2.0, 3.0).into()]);
    }

    fn update(&mut self) {
        let dt = Self::delta_time();
        self.rotation = advance(self.rotation, DEGREES_PER_SECOND, dt);
        self.frames += 1;

        let transform = self.ctx.get_property("transform");
        if !transform.set_property("rotation", &Euler::z(self.rotation).into()) {
            warn!(frame = self.frames, "could not set rotation");
        }

        if !self.label.is_null() && dt > 0.0 {
            let text = format!("{:.0} FPS", 1.0 / dt);
            self.label.set_property("text", &Instance::from(text.as_str()));
        }
    }

    fn invoke(&mut self, method: &str, _args: &[Instance]) -> Instance {
        match method {
            "Rotation" => self.rotation.into(),
            "Frames" => (self.frames as f32).into(),
            _ => {
                warn!("spinner does not handle `{method}`");
                Instance::null()
            }
        }
    }
}

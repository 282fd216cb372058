//! Host value types the demo builds.

use unibridge_guest::Instance;

pub const VECTOR3: &str = "Engine.Vector3";
pub const QUATERNION: &str = "Engine.Quaternion";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Vector3> for Instance {
    fn from(v: Vector3) -> Self {
        Instance::new(VECTOR3, &[v.x.into(), v.y.into(), v.z.into()])
    }
}

/// Rotation built on the host from Euler angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Euler {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Euler {
    pub const fn z(degrees: f32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: degrees,
        }
    }
}

impl From<Euler> for Instance {
    fn from(e: Euler) -> Self {
        Instance::invoke_static(QUATERNION, "Euler", &[e.x.into(), e.y.into(), e.z.into()])
    }
}

/// Advances an angle in degrees, wrapped to `[0, 360)`.
pub fn advance(angle: f32, degrees_per_second: f32, dt: f32) -> f32 {
    (angle + degrees_per_second * dt).rem_euclid(360.0)
}

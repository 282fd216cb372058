//! The small engine the CLI hosts modules in.
//!
//! Just enough of a scene for the demo module: game objects with a transform
//! and an optional text label, value types for positions and rotations, and
//! a clock exposed as `Engine.Time`.

use std::cell::Cell;
use std::rc::Rc;

use unibridge_host::{ObjectRef, TypeRegistry, arg, boxed, param};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Rotation from Euler angles in degrees (X, then Y, then Z).
    pub fn euler(x: f32, y: f32, z: f32) -> Self {
        let (sr, cr) = (x.to_radians() * 0.5).sin_cos();
        let (sp, cp) = (y.to_radians() * 0.5).sin_cos();
        let (sy, cy) = (z.to_radians() * 0.5).sin_cos();
        Self {
            x: sr * cp * cy - cr * sp * sy,
            y: cr * sp * cy + sr * cp * sy,
            z: cr * cp * sy - sr * sp * cy,
            w: cr * cp * cy + sr * sp * sy,
        }
    }

    /// Angle around Z in degrees, in `[0, 360)`, for rotations around Z only.
    pub fn z_degrees(&self) -> f32 {
        (2.0 * self.z.atan2(self.w)).to_degrees().rem_euclid(360.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transform {
    pub position: Vector3,
    pub rotation: Quaternion,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Text {
    pub text: String,
}

#[derive(Debug)]
pub struct GameObject {
    pub name: String,
    pub transform: ObjectRef,
    pub label: Option<ObjectRef>,
}

impl GameObject {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            transform: boxed(Transform::default()),
            label: None,
        }
    }
}

/// Marker type for the static `Engine.Time` members.
pub struct Time;

/// Frame timing shared with `Engine.Time`.
#[derive(Debug, Default)]
pub struct Clock {
    delta: Cell<f32>,
    frame: Cell<i32>,
}

impl Clock {
    pub fn advance(&self, delta: f32) {
        self.delta.set(delta);
        self.frame.set(self.frame.get().saturating_add(1));
    }

    pub fn delta(&self) -> f32 {
        self.delta.get()
    }

    pub fn frame(&self) -> i32 {
        self.frame.get()
    }
}

/// Registry with the builtins and every `Engine.*` type.
pub fn registry(clock: &Rc<Clock>) -> TypeRegistry {
    let mut registry = TypeRegistry::with_builtins();

    registry
        .register::<Vector3>("Engine.Vector3")
        .constructor(&[], |_| Some(Vector3::default()))
        .constructor(&[param::<f32>(), param::<f32>(), param::<f32>()], |args| {
            Some(Vector3 {
                x: arg(args, 0)?,
                y: arg(args, 1)?,
                z: arg(args, 2)?,
            })
        })
        .field("x", |v| &v.x, |v| &mut v.x)
        .field("y", |v| &v.y, |v| &mut v.y)
        .field("z", |v| &v.z, |v| &mut v.z);

    registry
        .register::<Quaternion>("Engine.Quaternion")
        .constructor(
            &[param::<f32>(), param::<f32>(), param::<f32>(), param::<f32>()],
            |args| {
                Some(Quaternion {
                    x: arg(args, 0)?,
                    y: arg(args, 1)?,
                    z: arg(args, 2)?,
                    w: arg(args, 3)?,
                })
            },
        )
        .static_method("Euler", &[param::<f32>(), param::<f32>(), param::<f32>()], |args| {
            Some(boxed(Quaternion::euler(
                arg(args, 0)?,
                arg(args, 1)?,
                arg(args, 2)?,
            )))
        })
        .static_property("identity", || Quaternion::IDENTITY)
        .property("zDegrees", Quaternion::z_degrees);

    registry
        .register::<Transform>("Engine.Transform")
        .constructor(&[], |_| Some(Transform::default()))
        .property_mut(
            "position",
            |t: &Transform| t.position,
            |t, position| t.position = position,
        )
        .property_mut(
            "rotation",
            |t: &Transform| t.rotation,
            |t, rotation| t.rotation = rotation,
        );

    registry
        .register::<Text>("Engine.Text")
        .constructor(&[], |_| Some(Text::default()))
        .property_mut("text", |t: &Text| t.text.clone(), |t, text| t.text = text);

    registry
        .register::<GameObject>("Engine.GameObject")
        .constructor(&[param::<String>()], |args| {
            Some(GameObject::new(&arg::<String>(args, 0)?))
        })
        .field("name", |o| &o.name, |o| &mut o.name)
        .object_property("transform", |o: &GameObject| Some(Rc::clone(&o.transform)))
        .object_field(
            "label",
            |o: &GameObject| o.label.clone(),
            |o, value| {
                if !value.is::<Text>() {
                    return false;
                }
                o.label = Some(Rc::clone(value));
                true
            },
        )
        .method_ref("SetPosition", &[param::<Vector3>()], |o: &GameObject, args| {
            let position = arg::<Vector3>(args, 0)?;
            o.transform.write(Transform {
                position,
                rotation: o.transform.read::<Transform>()?.rotation,
            });
            None
        });

    let delta = Rc::clone(clock);
    let frame = Rc::clone(clock);
    registry
        .register::<Time>("Engine.Time")
        .static_property("deltaTime", move || delta.delta())
        .static_property("frameCount", move || frame.frame());

    registry
}

/// The demo scene: one game object with a label.
pub struct Scene {
    pub clock: Rc<Clock>,
    pub object: ObjectRef,
    pub label: ObjectRef,
}

impl Scene {
    pub fn new() -> Self {
        let label = boxed(Text::default());
        let mut object = GameObject::new("Spinner");
        object.label = Some(Rc::clone(&label));
        Self {
            clock: Rc::new(Clock::default()),
            object: boxed(object),
            label,
        }
    }

    pub fn transform(&self) -> Option<Transform> {
        let object = self.object.borrow::<GameObject>()?;
        object.transform.read::<Transform>()
    }

    pub fn label_text(&self) -> Option<String> {
        self.label.read::<Text>().map(|label| label.text)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

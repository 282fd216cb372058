use std::rc::Rc;

use unibridge_core::{Handle, Slice, SliceMut};
use unibridge_host::glue::{activate, deactivate};
use unibridge_host::{HostState, TypeRegistry, arg, boxed, default_glue, param};

#[derive(Debug, Clone, PartialEq)]
struct Transform {
    rotation: f32,
    name: String,
}

fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::with_builtins();
    registry
        .register::<Transform>("Engine.Transform")
        .constructor(&[param::<String>()], |args| {
            Some(Transform {
                rotation: 0.0,
                name: arg(args, 0)?,
            })
        })
        .method("Rotate", &[param::<f32>()], |transform, args| {
            transform.rotation += arg::<f32>(args, 0)?;
            Some(boxed(transform.rotation))
        })
        .field("name", |t| &t.name, |t| &mut t.name)
        .property_mut(
            "rotation",
            |t: &Transform| t.rotation,
            |t, rotation| t.rotation = rotation,
        );
    registry
}

fn with_state(test: impl FnOnce(&Rc<HostState>)) {
    let state = Rc::new(HostState::new(Rc::new(registry())));
    activate(Rc::clone(&state)).unwrap();
    test(&state);
    deactivate(&state);
}

fn read_string(handle: Handle) -> Option<String> {
    let try_string = default_glue().try_string?;
    let len = try_string(handle, SliceMut::empty()).into_option()?;
    let mut buffer = vec![0; len];
    try_string(handle, SliceMut::from_slice_mut(&mut buffer)).into_option()?;
    String::from_utf8(buffer).ok()
}

#[test]
fn test_hello_end_to_end() {
    with_state(|state| {
        let glue = default_glue();
        let h1 = (glue.to_string.unwrap())(Slice::text("hello"));
        assert!(!h1.is_null());

        let cast = (glue.try_f32.unwrap())(h1);
        assert!(!cast.success);
        assert_eq!(cast.value, 0.0);
        assert_eq!(read_string(h1).as_deref(), Some("hello"));

        (glue.dispose_instance)(h1);
        assert!(state.get(h1).is_none());
        assert_eq!(state.live_handles(), 0);
    });
}

#[test]
fn test_soft_failures_from_module_side() {
    with_state(|state| {
        let glue = default_glue();
        let missing = (glue.new_instance)(Slice::text("does.not.Exist"), Slice::empty());
        assert!(missing.is_null());

        let name = (glue.to_string.unwrap())(Slice::text("cube"));
        let args = [name];
        let transform =
            (glue.new_instance)(Slice::text("Engine.Transform"), Slice::from(&args[..]));
        assert!(!transform.is_null());

        let nothing = (glue.invoke_method)(transform, Slice::text("noSuchMethod"), Slice::empty());
        assert!(nothing.is_null());
        assert!(!state.is_halted());
    });
}

#[test]
fn test_instance_calls_and_members() {
    with_state(|state| {
        let glue = default_glue();
        let name = (glue.to_string.unwrap())(Slice::text("cube"));
        let transform =
            (glue.new_instance)(Slice::text("Engine.Transform"), Slice::from(&[name][..]));
        // arguments are borrowed: the caller still owns `name`
        assert_eq!(state.refcount(name), Some(1));

        let step = (glue.to_f32.unwrap())(15.0);
        let first =
            (glue.invoke_method)(transform, Slice::text("Rotate"), Slice::from(&[step][..]));
        let second = (glue.invoke_as)(
            transform,
            Slice::text("Engine.Transform"),
            Slice::text("Rotate"),
            Slice::from(&[step][..]),
        );
        let try_f32 = glue.try_f32.unwrap();
        assert_eq!(try_f32(first).into_option(), Some(15.0));
        assert_eq!(try_f32(second).into_option(), Some(30.0));

        let field = (glue.get_field.unwrap())(transform, Slice::empty(), Slice::text("name"));
        assert_eq!(read_string(field).as_deref(), Some("cube"));

        let angle = (glue.to_f32.unwrap())(90.0);
        assert!((glue.set_property.unwrap())(
            transform,
            Slice::empty(),
            Slice::text("rotation"),
            angle
        ));
        let get_property = glue.get_property.unwrap();
        let rotation = get_property(transform, Slice::empty(), Slice::text("rotation"));
        assert_eq!(try_f32(rotation).into_option(), Some(90.0));

        let object = state.get(transform).unwrap();
        assert_eq!(
            object.read::<Transform>(),
            Some(Transform {
                rotation: 90.0,
                name: String::from("cube"),
            })
        );
    });
}

#[test]
fn test_clone_keeps_object_alive() {
    with_state(|state| {
        let glue = default_glue();
        let h = (glue.to_f32.unwrap())(2.5);
        let clone = (glue.clone_instance.unwrap())(h);
        assert_eq!(clone, h);

        (glue.dispose_instance)(h);
        assert_eq!((glue.try_f32.unwrap())(h).into_option(), Some(2.5));
        (glue.dispose_instance)(h);
        assert!(state.get(h).is_none());

        // a stale copy stays dead after the slot is reused
        let reused = (glue.to_f32.unwrap())(7.0);
        assert_ne!(reused, h);
        assert!(!(glue.try_f32.unwrap())(h).success);
        // disposing the stale copy does not touch the new object
        (glue.dispose_instance)(h);
        assert_eq!((glue.try_f32.unwrap())(reused).into_option(), Some(7.0));
    });
}

#[test]
fn test_sized_bytes() {
    with_state(|state| {
        let glue = default_glue();
        let bytes = [1_u8, 2, 3, 4];
        let h = (glue.sized_bytes.unwrap())(Slice::from_slice(&bytes));
        let object = state.get(h).unwrap();
        assert_eq!(object.read::<Vec<u8>>(), Some(bytes.to_vec()));
    });
}

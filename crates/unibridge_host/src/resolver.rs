//! Member resolution for the invocation protocol.
//!
//! The protocol only depends on the [`Resolver`] contract: exact arity and
//! exact runtime-type matching, `None` when nothing (or more than one
//! candidate) matches. [`TypeRegistry`] implements it with an explicit
//! name → function mapping filled in by [`TypeBuilder`].

use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::rc::Rc;

use ahash::AHashMap;

use crate::object::{ObjectRef, boxed, param};

pub type ConstructorFn = Rc<dyn Fn(&[ObjectRef]) -> Option<ObjectRef>>;
pub type MethodFn = Rc<dyn Fn(Option<&ObjectRef>, &[ObjectRef]) -> Option<ObjectRef>>;
pub type GetterFn = Rc<dyn Fn(Option<&ObjectRef>) -> Option<ObjectRef>>;
pub type SetterFn = Rc<dyn Fn(Option<&ObjectRef>, &ObjectRef) -> bool>;

#[derive(Clone)]
pub struct Constructor {
    pub params: Vec<TypeId>,
    pub call: ConstructorFn,
}

#[derive(Clone)]
pub struct Method {
    pub name: String,
    pub params: Vec<TypeId>,
    /// Static methods ignore the receiver; instance methods need one.
    pub is_static: bool,
    pub call: MethodFn,
}

/// A field or property.
#[derive(Clone)]
pub struct Member {
    pub name: String,
    pub is_static: bool,
    pub get: Option<GetterFn>,
    pub set: Option<SetterFn>,
}

/// Type and member lookup supplied by the host runtime.
pub trait Resolver {
    fn resolve_type(&self, name: &str) -> Option<TypeId>;

    fn type_name(&self, ty: TypeId) -> Option<&str>;

    fn resolve_constructor(&self, ty: TypeId, args: &[TypeId]) -> Option<Constructor>;

    fn resolve_method(&self, ty: TypeId, name: &str, args: &[TypeId]) -> Option<Method>;

    fn resolve_field(&self, ty: TypeId, name: &str) -> Option<Member>;

    fn resolve_property(&self, ty: TypeId, name: &str) -> Option<Member>;
}

#[derive(Default)]
struct TypeInfo {
    name: String,
    constructors: Vec<Constructor>,
    methods: AHashMap<String, Vec<Method>>,
    fields: AHashMap<String, Member>,
    properties: AHashMap<String, Member>,
}

/// Explicit registry of host types reachable from native modules.
#[derive(Default)]
pub struct TypeRegistry {
    by_name: AHashMap<String, TypeId>,
    types: AHashMap<TypeId, TypeInfo>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the primitive types the coercion slots produce.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register::<f32>("f32");
        registry.register::<bool>("bool");
        registry.register::<i32>("i32");
        registry
            .register::<String>("String")
            .method_ref("Length", &[], |text: &String, _| {
                Some(boxed(i32::try_from(text.len()).unwrap_or(i32::MAX)))
            })
            .static_method("Concat", &[param::<String>(), param::<String>()], |args| {
                let left = crate::object::arg::<String>(args, 0)?;
                let right = crate::object::arg::<String>(args, 1)?;
                Some(boxed(left + &right))
            });
        registry
            .register::<Vec<u8>>("Bytes")
            .method_ref("Length", &[], |bytes: &Vec<u8>, _| {
                Some(boxed(i32::try_from(bytes.len()).unwrap_or(i32::MAX)))
            });
        registry
    }

    /// Starts (or continues) registering `T` under `name`. Registering the
    /// same type again under another name adds an alias.
    pub fn register<T: Any>(&mut self, name: &str) -> TypeBuilder<'_, T> {
        let ty = TypeId::of::<T>();
        self.by_name.insert(name.to_owned(), ty);
        let info = self.types.entry(ty).or_insert_with(|| TypeInfo {
            name: name.to_owned(),
            ..TypeInfo::default()
        });
        TypeBuilder {
            info,
            _marker: PhantomData,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Picks the single candidate whose parameters equal `args` exactly.
fn select_exact<'a, C>(
    candidates: impl IntoIterator<Item = &'a C>,
    params: impl Fn(&C) -> &[TypeId],
    args: &[TypeId],
) -> Option<&'a C>
where
    C: 'a,
{
    let mut found = None;
    for candidate in candidates {
        if params(candidate) == args {
            if found.is_some() {
                // ambiguous
                return None;
            }
            found = Some(candidate);
        }
    }
    found
}

impl Resolver for TypeRegistry {
    fn resolve_type(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    fn type_name(&self, ty: TypeId) -> Option<&str> {
        self.types.get(&ty).map(|info| info.name.as_str())
    }

    fn resolve_constructor(&self, ty: TypeId, args: &[TypeId]) -> Option<Constructor> {
        let info = self.types.get(&ty)?;
        select_exact(&info.constructors, |c| c.params.as_slice(), args).cloned()
    }

    fn resolve_method(&self, ty: TypeId, name: &str, args: &[TypeId]) -> Option<Method> {
        let overloads = self.types.get(&ty)?.methods.get(name)?;
        select_exact(overloads, |m| m.params.as_slice(), args).cloned()
    }

    fn resolve_field(&self, ty: TypeId, name: &str) -> Option<Member> {
        self.types.get(&ty)?.fields.get(name).cloned()
    }

    fn resolve_property(&self, ty: TypeId, name: &str) -> Option<Member> {
        self.types.get(&ty)?.properties.get(name).cloned()
    }
}

/// Typed registration of constructors and members for `T`.
pub struct TypeBuilder<'r, T> {
    info: &'r mut TypeInfo,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any> TypeBuilder<'_, T> {
    pub fn constructor<F>(self, params: &[TypeId], build: F) -> Self
    where
        F: Fn(&[ObjectRef]) -> Option<T> + 'static,
    {
        self.info.constructors.push(Constructor {
            params: params.to_vec(),
            call: Rc::new(move |args: &[ObjectRef]| build(args).map(boxed)),
        });
        self
    }

    /// Instance method with mutable access to the receiver.
    pub fn method<F>(self, name: &str, params: &[TypeId], body: F) -> Self
    where
        F: Fn(&mut T, &[ObjectRef]) -> Option<ObjectRef> + 'static,
    {
        let call: MethodFn = Rc::new(move |receiver: Option<&ObjectRef>, args: &[ObjectRef]| {
            let mut this = receiver?.borrow_mut::<T>()?;
            body(&mut this, args)
        });
        self.push_method(name, params, false, call)
    }

    /// Instance method that only reads the receiver, so it may be called
    /// while other shared borrows are live.
    pub fn method_ref<F>(self, name: &str, params: &[TypeId], body: F) -> Self
    where
        F: Fn(&T, &[ObjectRef]) -> Option<ObjectRef> + 'static,
    {
        let call: MethodFn = Rc::new(move |receiver: Option<&ObjectRef>, args: &[ObjectRef]| {
            let this = receiver?.borrow::<T>()?;
            body(&this, args)
        });
        self.push_method(name, params, false, call)
    }

    pub fn static_method<F>(self, name: &str, params: &[TypeId], body: F) -> Self
    where
        F: Fn(&[ObjectRef]) -> Option<ObjectRef> + 'static,
    {
        let call: MethodFn = Rc::new(move |_: Option<&ObjectRef>, args: &[ObjectRef]| body(args));
        self.push_method(name, params, true, call)
    }

    fn push_method(self, name: &str, params: &[TypeId], is_static: bool, call: MethodFn) -> Self {
        self.info
            .methods
            .entry(name.to_owned())
            .or_default()
            .push(Method {
                name: name.to_owned(),
                params: params.to_vec(),
                is_static,
                call,
            });
        self
    }

    /// Plain value field. Reads box a copy; writes require a value of
    /// exactly type `V`.
    pub fn field<V, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        V: Any + Clone,
        G: Fn(&T) -> &V + 'static,
        S: Fn(&mut T) -> &mut V + 'static,
    {
        let member = Member {
            name: name.to_owned(),
            is_static: false,
            get: Some(Rc::new(move |receiver: Option<&ObjectRef>| {
                let this = receiver?.borrow::<T>()?;
                Some(boxed(get(&this).clone()))
            })),
            set: Some(Rc::new(move |receiver: Option<&ObjectRef>, value: &ObjectRef| {
                let (Some(receiver), Some(value)) = (receiver, value.read::<V>()) else {
                    return false;
                };
                match receiver.borrow_mut::<T>() {
                    Some(mut this) => {
                        *set(&mut this) = value;
                        true
                    }
                    None => false,
                }
            })),
        };
        self.info.fields.insert(name.to_owned(), member);
        self
    }

    /// Field holding a reference to another host object.
    pub fn object_field<G, S>(self, name: &str, get: G, set: S) -> Self
    where
        G: Fn(&T) -> Option<ObjectRef> + 'static,
        S: Fn(&mut T, &ObjectRef) -> bool + 'static,
    {
        let member = Member {
            name: name.to_owned(),
            is_static: false,
            get: Some(Rc::new(move |receiver: Option<&ObjectRef>| get(&*receiver?.borrow::<T>()?))),
            set: Some(Rc::new(move |receiver: Option<&ObjectRef>, value: &ObjectRef| {
                receiver
                    .and_then(|receiver| receiver.borrow_mut::<T>())
                    .is_some_and(|mut this| set(&mut this, value))
            })),
        };
        self.info.fields.insert(name.to_owned(), member);
        self
    }

    /// Computed read-only property.
    pub fn property<V, G>(self, name: &str, get: G) -> Self
    where
        V: Any,
        G: Fn(&T) -> V + 'static,
    {
        let member = Member {
            name: name.to_owned(),
            is_static: false,
            get: Some(Rc::new(move |receiver: Option<&ObjectRef>| {
                let this = receiver?.borrow::<T>()?;
                Some(boxed(get(&this)))
            })),
            set: None,
        };
        self.info.properties.insert(name.to_owned(), member);
        self
    }

    /// Computed property with a setter taking exactly type `V`.
    pub fn property_mut<V, G, S>(self, name: &str, get: G, set: S) -> Self
    where
        V: Any + Clone,
        G: Fn(&T) -> V + 'static,
        S: Fn(&mut T, V) + 'static,
    {
        let member = Member {
            name: name.to_owned(),
            is_static: false,
            get: Some(Rc::new(move |receiver: Option<&ObjectRef>| {
                let this = receiver?.borrow::<T>()?;
                Some(boxed(get(&this)))
            })),
            set: Some(Rc::new(move |receiver: Option<&ObjectRef>, value: &ObjectRef| {
                let (Some(receiver), Some(value)) = (receiver, value.read::<V>()) else {
                    return false;
                };
                match receiver.borrow_mut::<T>() {
                    Some(mut this) => {
                        set(&mut this, value);
                        true
                    }
                    None => false,
                }
            })),
        };
        self.info.properties.insert(name.to_owned(), member);
        self
    }

    /// Property yielding another host object.
    pub fn object_property<G>(self, name: &str, get: G) -> Self
    where
        G: Fn(&T) -> Option<ObjectRef> + 'static,
    {
        let member = Member {
            name: name.to_owned(),
            is_static: false,
            get: Some(Rc::new(move |receiver: Option<&ObjectRef>| get(&*receiver?.borrow::<T>()?))),
            set: None,
        };
        self.info.properties.insert(name.to_owned(), member);
        self
    }

    /// Class-scoped property, reached with a null receiver.
    pub fn static_property<V, G>(self, name: &str, get: G) -> Self
    where
        V: Any,
        G: Fn() -> V + 'static,
    {
        let member = Member {
            name: name.to_owned(),
            is_static: true,
            get: Some(Rc::new(move |_: Option<&ObjectRef>| Some(boxed(get())))),
            set: None,
        };
        self.info.properties.insert(name.to_owned(), member);
        self
    }
}

//! Native classes: templates backed by host data instead of a dataspace.
//!
//! A class is described once with [`NativeClass::builder`], typed by the
//! host's instance type. The builder wraps each callback so the arena can
//! hold instances as `Box<dyn Any>`; a wrapper meeting an instance of another
//! type reports a native fault instead of panicking.
//!
//! ```text
//! let class = NativeClass::builder("Counter", |_ctx| Ok(Counter::default()))
//!     .method("bump", |c: &mut Counter, ctx| { c.n += ctx.number(1)?; Ok(c.n) })
//!     .property("n", |c| c.n, |c, v| c.n = v)
//!     .build();
//! interp.register_native_class(class)?;
//! ```

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::errors::{native_fault, ExecResult};
use crate::interpreter::NativeCtx;
use crate::stack::OwnedObject;

/// Host function callable from hoc, with access to its call frame.
pub type NativeFn = Rc<dyn Fn(&mut NativeCtx<'_>) -> ExecResult<f64>>;

type Instance = Box<dyn Any>;
type ConstructorFn = Rc<dyn Fn(&mut NativeCtx<'_>) -> ExecResult<Instance>>;
type DestructorFn = Rc<dyn Fn(Instance)>;
type MethodFn = Rc<dyn Fn(&mut dyn Any, &mut NativeCtx<'_>) -> ExecResult<NativeReturn>>;
type GetterFn = Rc<dyn Fn(&dyn Any) -> Option<f64>>;
type SetterFn = Rc<dyn Fn(&mut dyn Any, f64) -> bool>;

/// Value produced by a native method.
#[derive(Debug)]
pub enum NativeReturn {
    Number(f64),
    Str(String),
    Object(OwnedObject),
}

/// Declared result kind of a native method.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReturnKind {
    Number,
    Str,
    Object,
}

#[derive(Clone)]
pub(crate) struct NativeMethod {
    pub(crate) name: Rc<str>,
    pub(crate) kind: ReturnKind,
    pub(crate) call: MethodFn,
}

#[derive(Clone)]
pub(crate) struct NativeProperty {
    pub(crate) name: Rc<str>,
    pub(crate) get: GetterFn,
    pub(crate) set: Option<SetterFn>,
}

/// A registered native class.
pub struct NativeClass {
    pub(crate) name: Rc<str>,
    pub(crate) constructor: ConstructorFn,
    pub(crate) destructor: Option<DestructorFn>,
    pub(crate) methods: Vec<NativeMethod>,
    pub(crate) properties: Vec<NativeProperty>,
}

impl NativeClass {
    /// Start describing a class whose instances are `T`.
    pub fn builder<T, F>(name: &str, constructor: F) -> NativeClassBuilder<T>
    where
        T: Any,
        F: Fn(&mut NativeCtx<'_>) -> ExecResult<T> + 'static,
    {
        NativeClassBuilder {
            class: NativeClass {
                name: Rc::from(name),
                constructor: Rc::new(move |ctx: &mut NativeCtx<'_>| {
                    Ok(Box::new(constructor(ctx)?) as Instance)
                }),
                destructor: None,
                methods: Vec::new(),
                properties: Vec::new(),
            },
            _instance: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Method names with their result kinds, in registration order.
    pub fn methods(&self) -> impl Iterator<Item = (&str, ReturnKind)> {
        self.methods.iter().map(|m| (&*m.name, m.kind))
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| &*p.name)
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .field("properties", &self.properties.len())
            .finish_non_exhaustive()
    }
}

/// Typed builder for [`NativeClass`].
#[must_use]
pub struct NativeClassBuilder<T> {
    class: NativeClass,
    _instance: PhantomData<fn() -> T>,
}

impl<T: Any> NativeClassBuilder<T> {
    /// Run `f` on the instance when the object is destroyed.
    pub fn destructor(mut self, f: impl Fn(T) + 'static) -> Self {
        self.class.destructor = Some(Rc::new(move |instance: Instance| {
            if let Ok(instance) = instance.downcast::<T>() {
                f(*instance);
            }
        }));
        self
    }

    /// A method returning a number.
    pub fn method(
        self,
        name: &str,
        f: impl Fn(&mut T, &mut NativeCtx<'_>) -> ExecResult<f64> + 'static,
    ) -> Self {
        self.add_method(name, ReturnKind::Number, move |instance, ctx| {
            f(instance, ctx).map(NativeReturn::Number)
        })
    }

    /// A method returning a string.
    pub fn method_str(
        self,
        name: &str,
        f: impl Fn(&mut T, &mut NativeCtx<'_>) -> ExecResult<String> + 'static,
    ) -> Self {
        self.add_method(name, ReturnKind::Str, move |instance, ctx| {
            f(instance, ctx).map(NativeReturn::Str)
        })
    }

    /// A method returning an object reference, owned by the caller.
    pub fn method_object(
        self,
        name: &str,
        f: impl Fn(&mut T, &mut NativeCtx<'_>) -> ExecResult<OwnedObject> + 'static,
    ) -> Self {
        self.add_method(name, ReturnKind::Object, move |instance, ctx| {
            f(instance, ctx).map(NativeReturn::Object)
        })
    }

    /// A numeric property readable and assignable as `obj.name`.
    pub fn property(
        mut self,
        name: &str,
        get: impl Fn(&T) -> f64 + 'static,
        set: impl Fn(&mut T, f64) + 'static,
    ) -> Self {
        self.class.properties.push(NativeProperty {
            name: Rc::from(name),
            get: Rc::new(move |instance: &dyn Any| instance.downcast_ref::<T>().map(&get)),
            set: Some(Rc::new(move |instance: &mut dyn Any, value: f64| {
                instance
                    .downcast_mut::<T>()
                    .map(|instance| set(instance, value))
                    .is_some()
            })),
        });
        self
    }

    /// A numeric property that faults on assignment.
    pub fn read_only_property(mut self, name: &str, get: impl Fn(&T) -> f64 + 'static) -> Self {
        self.class.properties.push(NativeProperty {
            name: Rc::from(name),
            get: Rc::new(move |instance: &dyn Any| instance.downcast_ref::<T>().map(&get)),
            set: None,
        });
        self
    }

    pub fn build(self) -> NativeClass {
        self.class
    }

    fn add_method(
        mut self,
        name: &str,
        kind: ReturnKind,
        f: impl Fn(&mut T, &mut NativeCtx<'_>) -> ExecResult<NativeReturn> + 'static,
    ) -> Self {
        let method_name: Rc<str> = Rc::from(name);
        let context = format!("{}.{name}", self.class.name);
        self.class.methods.push(NativeMethod {
            name: method_name,
            kind,
            call: Rc::new(
                move |instance: &mut dyn Any, ctx: &mut NativeCtx<'_>| match instance
                    .downcast_mut::<T>()
                {
                    Some(instance) => f(instance, ctx),
                    None => Err(native_fault(context.as_str(), "instance has the wrong type")),
                },
            ),
        });
        self
    }
}

//! # Delegate Factory
//!
//! Turns a target object and a resolved member into a [`Callable`]. Three call
//! shapes come out of the factory:
//!
//! - **accessor** - a field or property setter taking the member's value type
//! - **delegate** - a method taking its declared parameters, return value discarded
//! - **call** - any of the above with every argument fixed up front, invoked
//!   with no arguments at all
//!
//! The same `Callable` type also wraps plain Rust closures so direct delegates
//! and bound members travel through the same dispatch lists.

use crate::argument::ArgumentValue;
use crate::config::BindingSettings;
use crate::descriptor::{MemberDescriptor, MemberKind};
use crate::error::EventError;
use crate::ids::CallableId;
use crate::macros::for_each_arity;
use crate::reflect::{ObjectRef, TypeRegistry};
use crate::types::{take_argument, ArgumentList, ArgumentType, ReturnValue, Signature, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

type Invoke = Arc<dyn Fn(&[Value]) -> Result<(), EventError> + Send + Sync>;

/// Highest parameter count a callable may declare.
pub const MAX_ARITY: usize = 10;

/// How accessors and delegates reach their member.
///
/// Both strategies assign, call and fail identically; they differ only in
/// when the member table is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessorStrategy {
    /// Looks the member up and checks its signature on every invocation
    Reflective,
    /// Captures the member's registration-time trampoline once
    #[default]
    Trampoline,
}

/// Where a callable came from. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableShape {
    /// Plain Rust closure
    Closure,
    /// Field or property setter
    Accessor,
    /// Method
    Delegate,
    /// Member with fixed arguments
    Call,
}

/// Type-erased callable over an untyped argument vector.
///
/// Arguments are checked against [`Callable::signature`] before the wrapped
/// function runs. Equality is identity: clones of one callable are equal,
/// two callables built from the same closure are not.
#[derive(Clone)]
pub struct Callable {
    id: CallableId,
    signature: Signature,
    shape: CallableShape,
    label: Option<Arc<str>>,
    invoke: Invoke,
}

impl Callable {
    /// Wraps an untyped function with an explicit signature.
    pub fn new<F>(signature: Signature, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), EventError> + Send + Sync + 'static,
    {
        Self {
            id: CallableId::new(),
            signature,
            shape: CallableShape::Closure,
            label: None,
            invoke: Arc::new(function),
        }
    }

    /// Wraps a typed closure of up to ten parameters.
    ///
    /// ```rust
    /// use events_plus::{Callable, Value};
    ///
    /// let callable = Callable::from_fn(|amount: i32, source: String| {
    ///     assert_eq!((amount, source.as_str()), (42, "trap"));
    /// });
    /// assert_eq!(callable.arity(), 2);
    /// callable.invoke(&[Value::Int(42), Value::String("trap".into())]).unwrap();
    /// ```
    pub fn from_fn<M, F: IntoCallable<M>>(function: F) -> Self {
        function.into_callable()
    }

    fn bound(signature: Signature, shape: CallableShape, label: String, invoke: Invoke) -> Self {
        Self {
            id: CallableId::new(),
            signature,
            shape,
            label: Some(Arc::from(label)),
            invoke,
        }
    }

    pub fn id(&self) -> CallableId {
        self.id
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn arity(&self) -> usize {
        self.signature.arity()
    }

    /// True for zero-parameter callables, which fit publishers of any arity.
    pub fn is_void(&self) -> bool {
        self.signature.is_empty()
    }

    pub fn shape(&self) -> CallableShape {
        self.shape
    }

    /// Member token or call description, when built by the factory.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether this callable can be attached to a publisher declaring `event`.
    pub fn is_compatible_with(&self, event: &Signature) -> bool {
        self.is_void() || self.signature == *event
    }

    /// Invokes the callable. Errors raised by the wrapped function are returned
    /// unchanged.
    pub fn invoke(&self, args: &[Value]) -> Result<(), EventError> {
        self.signature.check(args)?;
        (self.invoke)(args)
    }

    /// Typed convenience over [`Callable::invoke`].
    pub fn call<L: ArgumentList>(&self, args: L) -> Result<(), EventError> {
        self.invoke(&args.into_values())
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Callable {}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("id", &self.id)
            .field("signature", &self.signature.to_string())
            .field("shape", &self.shape)
            .field("label", &self.label)
            .finish()
    }
}

/// Closures usable as [`Callable`]s. `Marker` only disambiguates arities.
pub trait IntoCallable<Marker>: Send + Sync + 'static {
    fn into_callable(self) -> Callable;
}

macro_rules! impl_into_callable {
    ($($arg:ident),*) => {
        impl<Func, Ret, $($arg),*> IntoCallable<fn($($arg),*) -> Ret> for Func
        where
            Func: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: ReturnValue,
            $($arg: ArgumentType,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_callable(self) -> Callable {
                Callable::new(Signature::of::<($($arg,)*)>(), move |args: &[Value]| {
                    let mut args = args.iter();
                    $(let $arg = take_argument::<$arg>(&mut args)?;)*
                    (self)($($arg),*).into_return().map(|_| ())
                })
            }
        }
    };
}

for_each_arity!(impl_into_callable);

/// Builds callables from serialized member references.
#[derive(Debug, Clone)]
pub struct DelegateFactory {
    types: Arc<TypeRegistry>,
    strategy: AccessorStrategy,
    max_arity: usize,
}

impl DelegateFactory {
    pub fn new(types: Arc<TypeRegistry>, settings: &BindingSettings) -> Self {
        Self {
            types,
            strategy: settings.accessor_strategy,
            max_arity: settings.effective_max_arity(),
        }
    }

    pub fn with_strategy(mut self, strategy: AccessorStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> AccessorStrategy {
        self.strategy
    }

    pub fn max_arity(&self) -> usize {
        self.max_arity
    }

    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// One-argument setter for a field or property of `target`.
    ///
    /// # Errors
    ///
    /// [`EventError::Binding`] when the descriptor names a method, or the member
    /// is missing, static, read-only, constant, or a property without a setter.
    pub fn create_accessor(
        &self,
        target: &ObjectRef,
        descriptor: &MemberDescriptor,
    ) -> Result<Callable, EventError> {
        if descriptor.kind() == MemberKind::Method {
            return Err(EventError::Binding(format!(
                "'{}' is a method, not a field or property",
                descriptor
            )));
        }
        self.bind(target, descriptor, CallableShape::Accessor)
    }

    /// Callable mirroring a method's parameters; its return value is discarded.
    ///
    /// # Errors
    ///
    /// [`EventError::Binding`] when the descriptor is not a method, declares
    /// more parameters than supported, or matches no overload on the target type.
    pub fn create_delegate(
        &self,
        target: &ObjectRef,
        descriptor: &MemberDescriptor,
    ) -> Result<Callable, EventError> {
        if descriptor.kind() != MemberKind::Method {
            return Err(EventError::Binding(format!("'{}' is not a method", descriptor)));
        }
        self.bind(target, descriptor, CallableShape::Delegate)
    }

    /// Accessor or delegate, depending on the descriptor's kind.
    pub fn create_callable(
        &self,
        target: &ObjectRef,
        descriptor: &MemberDescriptor,
    ) -> Result<Callable, EventError> {
        match descriptor.kind() {
            MemberKind::Method => self.create_delegate(target, descriptor),
            MemberKind::Field | MemberKind::Property => self.create_accessor(target, descriptor),
        }
    }

    /// Zero-argument callable invoking the member with `arguments`.
    ///
    /// The arguments are materialised and checked once, here; the returned
    /// callable owns an immutable copy of them.
    pub fn create_call(
        &self,
        target: &ObjectRef,
        descriptor: &MemberDescriptor,
        arguments: &[ArgumentValue],
    ) -> Result<Callable, EventError> {
        let member = self.create_callable(target, descriptor)?;
        if arguments.len() != member.arity() {
            return Err(EventError::Binding(format!(
                "'{}' takes {} argument(s), {} predefined",
                descriptor,
                member.arity(),
                arguments.len()
            )));
        }

        let mut values = Vec::with_capacity(arguments.len());
        for (index, (argument, expected)) in
            arguments.iter().zip(member.signature().types()).enumerate()
        {
            let value = argument.try_value(&self.types)?;
            if !value.matches(expected) {
                return Err(EventError::Binding(format!(
                    "predefined argument {} of '{}' is '{}', expected '{}'",
                    index,
                    descriptor,
                    value.type_ref(),
                    expected
                )));
            }
            if matches!(value, Value::Object { object: None, .. })
                && !member.signature().accepts_null(index)
            {
                return Err(EventError::Binding(format!(
                    "predefined argument {} of '{}' holds no '{}' object",
                    index, descriptor, expected
                )));
            }
            values.push(value);
        }

        let values: Arc<[Value]> = values.into();
        let label = format!("{} <- {} argument(s)", descriptor, values.len());
        let invoke: Invoke = Arc::new(move |_: &[Value]| member.invoke(&values));
        Ok(Callable::bound(Signature::empty(), CallableShape::Call, label, invoke))
    }

    fn bind(
        &self,
        target: &ObjectRef,
        descriptor: &MemberDescriptor,
        shape: CallableShape,
    ) -> Result<Callable, EventError> {
        if descriptor.parameter_types().len() > self.max_arity {
            return Err(EventError::Binding(format!(
                "'{}' declares {} parameters, at most {} are supported",
                descriptor,
                descriptor.parameter_types().len(),
                self.max_arity
            )));
        }

        let member = self.types.resolve(target.type_ref(), descriptor)?;
        let bound = member.bind(target, self.strategy)?;
        let signature = bound.info().signature.clone();
        trace!("🔗 Bound {} on {} as {:?}", descriptor, target.type_ref(), shape);

        let invoke = bound.into_invoke();
        Ok(Callable::bound(
            signature,
            shape,
            descriptor.to_token(),
            Arc::new(move |args: &[Value]| invoke(args).map(|_| ())),
        ))
    }
}

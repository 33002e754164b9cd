//! # Capability-Based Member Resolution
//!
//! Rust has no runtime reflection, so every type that wants its members to be
//! reachable from serialized descriptors describes them once, at registration
//! time, through a [`TypeBuilder`]. The builder turns each field, property and
//! method into a typed trampoline over an untyped argument vector; the
//! [`TypeRegistry`] keeps the resulting tables keyed by type name.
//!
//! ```rust
//! use events_plus::{Reflect, TypeBuilder, TypeRegistry, MemberDescriptor, TypeRef};
//!
//! #[derive(Default)]
//! struct Player { health: i32 }
//!
//! impl Reflect for Player {
//!     fn type_name() -> &'static str { "Game.Player" }
//!
//!     fn describe(builder: &mut TypeBuilder<Self>) {
//!         builder
//!             .field("health", |p: &mut Player| &mut p.health)
//!             .method("SetHealth", |p: &mut Player, value: i32| p.health = value);
//!     }
//! }
//!
//! let types = TypeRegistry::new();
//! types.register::<Player>().unwrap();
//!
//! let descriptor = MemberDescriptor::method("SetHealth", vec![TypeRef::of::<i32>()]).unwrap();
//! let member = types.resolve(&TypeRef::named("Game.Player"), &descriptor).unwrap();
//! assert_eq!(member.info().signature.arity(), 1);
//! ```
//!
//! Bound members lock their [`Target`] only while the member runs. Other
//! threads wait for the lock. A member that publishes back into its own
//! target on the same thread gets [`EventError::Invocation`] from the
//! re-entered member instead of blocking on itself.

use crate::delegate::AccessorStrategy;
use crate::descriptor::{MemberDescriptor, MemberKind};
use crate::error::EventError;
use crate::macros::for_each_arity;
use crate::types::{
    take_argument, ArgumentList, ArgumentType, EnumType, ReturnValue, Signature, TypeRef, Value,
};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Typed trampoline: runs one member against a locked target.
type Invoke<T> =
    Arc<dyn Fn(&mut T, &[Value]) -> Result<Option<Value>, EventError> + Send + Sync>;

/// Type-erased trampoline already closed over its target.
pub(crate) type BoundInvoke =
    Arc<dyn Fn(&[Value]) -> Result<Option<Value>, EventError> + Send + Sync>;

// ============================================================================
// Reflectable Types and Handles
// ============================================================================

/// A type whose members can be resolved from [`MemberDescriptor`]s.
pub trait Reflect: Send + Sized + 'static {
    /// Fully-qualified name used in member tokens and argument tags.
    fn type_name() -> &'static str;

    /// Declares the type's members.
    fn describe(builder: &mut TypeBuilder<Self>);
}

/// Shared, lockable handle to a live object.
pub struct Target<T>(Arc<Mutex<T>>);

impl<T: Reflect> Target<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Locks the object directly. Holding the guard while publishing into
    /// one of its members blocks that publish.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock()
    }

    /// Type-erased reference to the same object.
    pub fn object(&self) -> ObjectRef {
        let inner: Arc<dyn Any + Send + Sync> = self.0.clone();
        ObjectRef {
            type_ref: TypeRef::named(T::type_name()),
            inner,
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Runs `f` on the locked value, refusing same-thread re-entry.
    fn run<R>(
        &self,
        descriptor: &MemberDescriptor,
        f: impl FnOnce(&mut T) -> Result<R, EventError>,
    ) -> Result<R, EventError> {
        let _running = RunningMember::enter(self.key(), descriptor)?;
        let mut guard = self.0.lock();
        f(&mut *guard)
    }
}

thread_local! {
    /// Targets with a member currently running on this thread.
    static RUNNING: RefCell<SmallVec<[usize; 4]>> = RefCell::new(SmallVec::new());
}

struct RunningMember {
    key: usize,
}

impl RunningMember {
    fn enter(key: usize, descriptor: &MemberDescriptor) -> Result<Self, EventError> {
        RUNNING.with(|running| {
            let mut running = running.borrow_mut();
            if running.contains(&key) {
                return Err(EventError::Invocation(format!(
                    "target is already running a member; '{}' cannot re-enter it",
                    descriptor
                )));
            }
            running.push(key);
            Ok(Self { key })
        })
    }
}

impl Drop for RunningMember {
    fn drop(&mut self) {
        let _ = RUNNING.try_with(|running| {
            let mut running = running.borrow_mut();
            if let Some(position) = running.iter().rposition(|key| *key == self.key) {
                running.remove(position);
            }
        });
    }
}

impl<T> Clone for Target<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: Reflect> fmt::Debug for Target<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Target<{}>({:p})", T::type_name(), Arc::as_ptr(&self.0))
    }
}

/// Type-erased reference to an object held by a [`Target`].
///
/// Equality is identity: two references are equal when they point at the
/// same object.
#[derive(Clone)]
pub struct ObjectRef {
    type_ref: TypeRef,
    inner: Arc<dyn Any + Send + Sync>,
}

impl ObjectRef {
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Recovers the typed handle, or `None` when the object is not a `T`.
    pub fn downcast<T: Reflect>(&self) -> Option<Target<T>> {
        self.inner.clone().downcast::<Mutex<T>>().ok().map(Target)
    }

    fn address(&self) -> *const () {
        Arc::as_ptr(&self.inner) as *const ()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({}@{:p})", self.type_ref, self.address())
    }
}

impl<T: Reflect> ArgumentType for Target<T> {
    fn type_ref() -> TypeRef {
        TypeRef::named(T::type_name())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object { object: Some(object), .. } => object.downcast::<T>(),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Object {
            type_ref: <Self as ArgumentType>::type_ref(),
            object: Some(self.object()),
        }
    }
}

/// Nullable object parameter.
impl<T: Reflect> ArgumentType for Option<Target<T>> {
    fn type_ref() -> TypeRef {
        TypeRef::named(T::type_name())
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object { object: Some(object), .. } => object.downcast::<T>().map(Some),
            Value::Object { type_ref, object: None } if type_ref.name() == T::type_name() => {
                Some(None)
            }
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Object {
            type_ref: <Self as ArgumentType>::type_ref(),
            object: self.map(|target| target.object()),
        }
    }

    fn accepts_null() -> bool {
        true
    }
}

// ============================================================================
// Member Tables
// ============================================================================

/// How a registered member may be reached from an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberAccess {
    /// Instance member that can be assigned or called
    Writable,
    /// Read-only field, or property without a setter
    ReadOnly,
    /// Compile-time constant
    Constant,
    /// Belongs to the type rather than an instance
    Static,
}

/// Public metadata about one registered member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub descriptor: MemberDescriptor,
    pub access: MemberAccess,
    /// Parameters of the callable the member produces. Fields and properties
    /// take their single value type.
    pub signature: Signature,
    /// Declared return type of a method; always discarded when invoked.
    pub return_type: Option<TypeRef>,
}

struct MemberEntry<T> {
    info: MemberInfo,
    invoke: Option<Invoke<T>>,
}

/// Member table of one registered type.
struct TypeDescription<T> {
    type_ref: TypeRef,
    members: Vec<MemberEntry<T>>,
}

impl<T> TypeDescription<T> {
    fn find(&self, descriptor: &MemberDescriptor) -> Option<(usize, &MemberEntry<T>)> {
        self.members.iter().enumerate().find(|(_, entry)| {
            let candidate = &entry.info.descriptor;
            candidate.kind() == descriptor.kind()
                && candidate.name() == descriptor.name()
                && (descriptor.kind() != MemberKind::Method
                    || candidate.parameter_types() == descriptor.parameter_types())
        })
    }
}

fn check_count(args: &[Value], expected: usize) -> Result<(), EventError> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(EventError::ArgumentMismatch(format!(
            "expected {} argument(s), received {}",
            expected,
            args.len()
        )))
    }
}

/// Collects member declarations for a [`Reflect`] type.
pub struct TypeBuilder<T> {
    type_ref: TypeRef,
    members: Vec<MemberEntry<T>>,
    errors: Vec<EventError>,
}

impl<T: Reflect> TypeBuilder<T> {
    fn new() -> Self {
        Self {
            type_ref: TypeRef::named(T::type_name()),
            members: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn push(
        &mut self,
        descriptor: Result<MemberDescriptor, EventError>,
        access: MemberAccess,
        signature: Signature,
        return_type: Option<TypeRef>,
        invoke: Option<Invoke<T>>,
    ) -> &mut Self {
        match descriptor {
            Ok(descriptor) => self.members.push(MemberEntry {
                info: MemberInfo {
                    descriptor,
                    access,
                    signature,
                    return_type,
                },
                invoke,
            }),
            Err(error) => self.errors.push(error),
        }
        self
    }

    /// Assignable instance field, reached through a projection.
    pub fn field<V: ArgumentType>(&mut self, name: &str, project: fn(&mut T) -> &mut V) -> &mut Self {
        let invoke: Invoke<T> = Arc::new(move |target: &mut T, args: &[Value]| {
            check_count(args, 1)?;
            let value = take_argument::<V>(&mut args.iter())?;
            *project(target) = value;
            Ok(None)
        });
        self.push(
            MemberDescriptor::field(name),
            MemberAccess::Writable,
            Signature::of::<(V,)>(),
            None,
            Some(invoke),
        )
    }

    pub fn readonly_field<V: ArgumentType>(&mut self, name: &str) -> &mut Self {
        self.metadata_only(MemberDescriptor::field(name), MemberAccess::ReadOnly, V::type_ref())
    }

    pub fn constant<V: ArgumentType>(&mut self, name: &str) -> &mut Self {
        self.metadata_only(MemberDescriptor::field(name), MemberAccess::Constant, V::type_ref())
    }

    pub fn static_field<V: ArgumentType>(&mut self, name: &str) -> &mut Self {
        self.metadata_only(MemberDescriptor::field(name), MemberAccess::Static, V::type_ref())
    }

    /// Property with a setter.
    pub fn property<V, F>(&mut self, name: &str, setter: F) -> &mut Self
    where
        V: ArgumentType,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let invoke: Invoke<T> = Arc::new(move |target: &mut T, args: &[Value]| {
            check_count(args, 1)?;
            let value = take_argument::<V>(&mut args.iter())?;
            setter(target, value);
            Ok(None)
        });
        self.push(
            MemberDescriptor::property(name),
            MemberAccess::Writable,
            Signature::of::<(V,)>(),
            None,
            Some(invoke),
        )
    }

    /// Property that only has a getter.
    pub fn readonly_property<V: ArgumentType>(&mut self, name: &str) -> &mut Self {
        self.metadata_only(MemberDescriptor::property(name), MemberAccess::ReadOnly, V::type_ref())
    }

    pub fn static_property<V: ArgumentType>(&mut self, name: &str) -> &mut Self {
        self.metadata_only(MemberDescriptor::property(name), MemberAccess::Static, V::type_ref())
    }

    /// Instance method. Any `Fn(&mut T, A1, .., An) -> R` with up to ten
    /// [`ArgumentType`] parameters and a [`ReturnValue`] result qualifies;
    /// overloads are told apart by their parameter types.
    pub fn method<M, F: IntoMethod<T, M>>(&mut self, name: &str, method: F) -> &mut Self {
        let parts = method.into_method();
        let descriptor = MemberDescriptor::method(name, parts.signature.types().to_vec());
        self.push(
            descriptor,
            MemberAccess::Writable,
            parts.signature,
            parts.return_type,
            Some(parts.invoke),
        )
    }

    /// Static method, declared so that descriptors naming it fail to bind.
    pub fn static_method<L: ArgumentList>(&mut self, name: &str) -> &mut Self {
        let signature = L::signature();
        let descriptor = MemberDescriptor::method(name, signature.types().to_vec());
        self.push(descriptor, MemberAccess::Static, signature, None, None)
    }

    fn metadata_only(
        &mut self,
        descriptor: Result<MemberDescriptor, EventError>,
        access: MemberAccess,
        value_type: TypeRef,
    ) -> &mut Self {
        self.push(descriptor, access, Signature::new([value_type]), None, None)
    }

    fn finish(self) -> Result<TypeDescription<T>, EventError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }
        for (index, entry) in self.members.iter().enumerate() {
            let duplicate = self.members[..index]
                .iter()
                .any(|earlier| earlier.info.descriptor == entry.info.descriptor);
            if duplicate {
                return Err(EventError::Binding(format!(
                    "'{}' declares member '{}' twice",
                    self.type_ref, entry.info.descriptor
                )));
            }
        }
        Ok(TypeDescription {
            type_ref: self.type_ref,
            members: self.members,
        })
    }
}

/// Output of [`IntoMethod`].
pub struct MethodParts<T> {
    signature: Signature,
    return_type: Option<TypeRef>,
    invoke: Invoke<T>,
}

/// Functions usable as reflected methods of `T`.
///
/// `Marker` only disambiguates the arity-specific implementations.
pub trait IntoMethod<T, Marker>: Send + Sync + 'static {
    fn into_method(self) -> MethodParts<T>;
}

macro_rules! impl_into_method {
    ($($arg:ident),*) => {
        impl<T, Func, Ret, $($arg),*> IntoMethod<T, fn($($arg),*) -> Ret> for Func
        where
            T: 'static,
            Func: Fn(&mut T, $($arg),*) -> Ret + Send + Sync + 'static,
            Ret: ReturnValue,
            $($arg: ArgumentType,)*
        {
            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn into_method(self) -> MethodParts<T> {
                let signature = Signature::of::<($($arg,)*)>();
                let arity = signature.arity();
                let invoke: Invoke<T> = Arc::new(move |target: &mut T, args: &[Value]| {
                    check_count(args, arity)?;
                    let mut args = args.iter();
                    $(let $arg = take_argument::<$arg>(&mut args)?;)*
                    (self)(target, $($arg),*).into_return()
                });
                MethodParts {
                    signature,
                    return_type: Ret::return_type(),
                    invoke,
                }
            }
        }
    };
}

for_each_arity!(impl_into_method);

// ============================================================================
// Resolution
// ============================================================================

/// Object-safe view of a registered [`TypeDescription`].
trait ErasedType: Send + Sync {
    fn members(&self) -> Vec<MemberInfo>;

    fn resolve(self: Arc<Self>, descriptor: &MemberDescriptor) -> Result<ResolvedMember, EventError>;
}

impl<T: Reflect> ErasedType for TypeDescription<T> {
    fn members(&self) -> Vec<MemberInfo> {
        self.members.iter().map(|entry| entry.info.clone()).collect()
    }

    fn resolve(self: Arc<Self>, descriptor: &MemberDescriptor) -> Result<ResolvedMember, EventError> {
        let (index, entry) = self.find(descriptor).ok_or_else(|| {
            EventError::Binding(format!("'{}' has no {} '{}'", self.type_ref, descriptor.kind(), descriptor))
        })?;

        match (entry.info.access, descriptor.kind()) {
            (MemberAccess::Writable, _) => {}
            (MemberAccess::Static, _) => {
                return Err(EventError::Binding(format!(
                    "'{}.{}' is static",
                    self.type_ref,
                    descriptor.name()
                )))
            }
            (MemberAccess::ReadOnly, MemberKind::Property) => {
                return Err(EventError::Binding(format!(
                    "property '{}.{}' has no setter",
                    self.type_ref,
                    descriptor.name()
                )))
            }
            (MemberAccess::ReadOnly, _) | (MemberAccess::Constant, _) => {
                return Err(EventError::Binding(format!(
                    "'{}.{}' is read-only",
                    self.type_ref,
                    descriptor.name()
                )))
            }
        }

        let info = entry.info.clone();
        Ok(ResolvedMember {
            owner: self.type_ref.clone(),
            info,
            binder: Arc::new(TypedMember { description: self, index }),
        })
    }
}

trait MemberBinder: Send + Sync {
    fn bind(&self, target: &ObjectRef, strategy: AccessorStrategy) -> Result<BoundInvoke, EventError>;
}

struct TypedMember<T> {
    description: Arc<TypeDescription<T>>,
    index: usize,
}

impl<T: Reflect> MemberBinder for TypedMember<T> {
    fn bind(&self, target: &ObjectRef, strategy: AccessorStrategy) -> Result<BoundInvoke, EventError> {
        let target = target.downcast::<T>().ok_or_else(|| {
            EventError::Binding(format!(
                "target of type '{}' cannot bind members of '{}'",
                target.type_ref(),
                self.description.type_ref
            ))
        })?;
        let entry = self.description.members.get(self.index).ok_or_else(|| {
            EventError::Binding(format!("stale member index for '{}'", self.description.type_ref))
        })?;

        match strategy {
            AccessorStrategy::Trampoline => {
                let invoke = entry.invoke.clone().ok_or_else(|| {
                    EventError::Binding(format!("'{}' is not invocable", entry.info.descriptor))
                })?;
                let descriptor = entry.info.descriptor.clone();
                Ok(Arc::new(move |args: &[Value]| {
                    target.run(&descriptor, |value| invoke(value, args))
                }))
            }
            AccessorStrategy::Reflective => {
                // Looks the member up by descriptor on every call and checks the
                // declared signature before touching the target.
                let description = self.description.clone();
                let descriptor = entry.info.descriptor.clone();
                Ok(Arc::new(move |args: &[Value]| {
                    let (_, entry) = description.find(&descriptor).ok_or_else(|| {
                        EventError::Invocation(format!("member '{}' is no longer available", descriptor))
                    })?;
                    entry.info.signature.check(args)?;
                    let invoke = entry.invoke.as_ref().ok_or_else(|| {
                        EventError::Invocation(format!("'{}' is not invocable", descriptor))
                    })?;
                    target.run(&descriptor, |value| invoke(value, args))
                }))
            }
        }
    }
}

/// A member found on a registered type, not yet tied to an instance.
#[derive(Clone)]
pub struct ResolvedMember {
    owner: TypeRef,
    info: MemberInfo,
    binder: Arc<dyn MemberBinder>,
}

impl ResolvedMember {
    pub fn owner(&self) -> &TypeRef {
        &self.owner
    }

    pub fn info(&self) -> &MemberInfo {
        &self.info
    }

    /// Ties the member to a live object of the owning type.
    pub fn bind(&self, target: &ObjectRef, strategy: AccessorStrategy) -> Result<BoundMember, EventError> {
        let invoke = self.binder.bind(target, strategy)?;
        Ok(BoundMember {
            info: self.info.clone(),
            target: target.clone(),
            invoke,
        })
    }
}

impl fmt::Debug for ResolvedMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedMember")
            .field("owner", &self.owner)
            .field("info", &self.info)
            .finish()
    }
}

/// A member tied to a live target, ready to be wrapped in a callable.
#[derive(Clone)]
pub struct BoundMember {
    info: MemberInfo,
    target: ObjectRef,
    invoke: BoundInvoke,
}

impl BoundMember {
    pub fn info(&self) -> &MemberInfo {
        &self.info
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    /// Runs the member. Method return values are handed back; callers that
    /// model actions discard them.
    pub fn invoke(&self, args: &[Value]) -> Result<Option<Value>, EventError> {
        (self.invoke)(args)
    }

    pub(crate) fn into_invoke(self) -> BoundInvoke {
        self.invoke
    }
}

impl fmt::Debug for BoundMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMember")
            .field("info", &self.info)
            .field("target", &self.target)
            .finish()
    }
}

// ============================================================================
// Type Registry
// ============================================================================

static GLOBAL_TYPES: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::new()));

/// Registered object and enum types, keyed by fully-qualified name.
#[derive(Default)]
pub struct TypeRegistry {
    objects: DashMap<TypeRef, Arc<dyn ErasedType>>,
    enums: DashMap<TypeRef, &'static [(&'static str, i32)]>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry shared by the default [`EventContext`](crate::EventContext).
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL_TYPES.clone()
    }

    /// Builds and stores the member table of `T`.
    ///
    /// Returns `Ok(false)` when the type was already registered.
    pub fn register<T: Reflect>(&self) -> Result<bool, EventError> {
        let type_ref = TypeRef::named(T::type_name());
        if self.objects.contains_key(&type_ref) {
            return Ok(false);
        }

        let mut builder = TypeBuilder::<T>::new();
        T::describe(&mut builder);
        let description = builder.finish()?;
        debug!(
            "📋 Registered type '{}' with {} member(s)",
            type_ref,
            description.members.len()
        );
        let erased: Arc<dyn ErasedType> = Arc::new(description);
        Ok(self.objects.insert(type_ref, erased).is_none())
    }

    /// Makes an enum known so argument containers can decode its ordinals.
    pub fn register_enum<E: EnumType>(&self) -> bool {
        self.enums.insert(E::type_ref(), E::variants()).is_none()
    }

    pub fn is_object_type(&self, type_ref: &TypeRef) -> bool {
        self.objects.contains_key(type_ref)
    }

    pub fn is_enum_type(&self, type_ref: &TypeRef) -> bool {
        self.enums.contains_key(type_ref)
    }

    pub fn enum_variants(&self, type_ref: &TypeRef) -> Option<&'static [(&'static str, i32)]> {
        self.enums.get(type_ref).map(|entry| *entry.value())
    }

    /// Members declared by a registered object type.
    pub fn members(&self, type_ref: &TypeRef) -> Option<Vec<MemberInfo>> {
        self.objects.get(type_ref).map(|entry| entry.value().members())
    }

    /// Resolves `descriptor` against the member table of `owner`.
    pub fn resolve(
        &self,
        owner: &TypeRef,
        descriptor: &MemberDescriptor,
    ) -> Result<ResolvedMember, EventError> {
        let description = self
            .objects
            .get(owner)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| EventError::Binding(format!("type '{}' is not registered", owner)))?;
        description.resolve(descriptor)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("objects", &self.objects.len())
            .field("enums", &self.enums.len())
            .finish()
    }
}

//! Aggregate metadata: descriptors, the registry, and its builder.
//!
//! Every OFX aggregate type is a passive data holder described by an
//! [`AggregateDescriptor`]: its wire tag, a factory, and an ordered list of
//! field descriptors. The reader and writer are driven entirely by this
//! metadata; they never touch struct fields directly, so domain invariants
//! enforced by real setters (such as currency mutual exclusion) survive
//! round trips.
//!
//! Registration happens through [`RegistryBuilder`] during a single-threaded
//! startup phase. `build()` validates the declarations (duplicate tags,
//! duplicate field orders, unregistered child types are configuration
//! errors), sorts fields by their declared order, and produces an immutable
//! [`Registry`] that is safe to share across threads.

use std::any::{Any, TypeId};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use crate::coerce::{ScalarKind, ScalarValue};
use crate::error::{Error, Result};

/// Object-safe trait implemented by every registrable aggregate type.
///
/// The methods exist solely to bridge into `std::any` downcasting; domain
/// types implement them mechanically via [`impl_aggregate!`].
pub trait Aggregate: Any + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

macro_rules! impl_aggregate {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::meta::Aggregate for $ty {
                fn as_any(&self) -> &dyn ::std::any::Any {
                    self
                }
                fn as_any_mut(&mut self) -> &mut dyn ::std::any::Any {
                    self
                }
                fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
                    self
                }
            }
        )*
    };
}
pub(crate) use impl_aggregate;

pub(crate) type ScalarGetFn = Box<dyn Fn(&dyn Aggregate) -> Option<ScalarValue> + Send + Sync>;
pub(crate) type ScalarSetFn = Box<dyn Fn(&mut dyn Aggregate, ScalarValue) + Send + Sync>;
pub(crate) type ChildGetFn =
    Box<dyn for<'a> Fn(&'a dyn Aggregate) -> Option<&'a dyn Aggregate> + Send + Sync>;
pub(crate) type ChildSetFn = Box<dyn Fn(&mut dyn Aggregate, Box<dyn Aggregate>) -> bool + Send + Sync>;
pub(crate) type ChildrenGetFn =
    Box<dyn for<'a> Fn(&'a dyn Aggregate) -> Vec<&'a dyn Aggregate> + Send + Sync>;

/// What a field descriptor actually binds: a scalar leaf, a single nested
/// aggregate, or a collection of nested aggregates.
pub(crate) enum FieldKind {
    Element {
        scalar: ScalarKind,
        get: ScalarGetFn,
        set: ScalarSetFn,
    },
    Child {
        child: TypeId,
        get: ChildGetFn,
        set: ChildSetFn,
    },
    ChildList {
        /// Declared element type, or `None` for a heterogeneous list whose
        /// entries are resolved by wire tag through the registry.
        element: Option<TypeId>,
        get: ChildrenGetFn,
        push: ChildSetFn,
    },
}

/// A single field of an aggregate: wire tag, position, required flag, and
/// the typed accessor pair.
pub struct FieldDescriptor {
    /// Wire tag. Filled in at build time for child fields (from the child
    /// type's own registration); `None` for heterogeneous lists.
    pub(crate) tag: Option<&'static str>,
    pub(crate) order: u32,
    pub(crate) required: bool,
    pub(crate) kind: FieldKind,
}

impl FieldDescriptor {
    pub fn tag(&self) -> Option<&'static str> {
        self.tag
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    pub fn required(&self) -> bool {
        self.required
    }

    /// The scalar kind, for element fields.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match &self.kind {
            FieldKind::Element { scalar, .. } => Some(*scalar),
            _ => None,
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            FieldKind::Element { scalar, .. } => format!("element({})", scalar.name()),
            FieldKind::Child { .. } => "child".to_string(),
            FieldKind::ChildList { element, .. } => {
                if element.is_some() {
                    "child-list".to_string()
                } else {
                    "child-list(any)".to_string()
                }
            }
        };
        f.debug_struct("FieldDescriptor")
            .field("tag", &self.tag)
            .field("order", &self.order)
            .field("required", &self.required)
            .field("kind", &kind)
            .finish()
    }
}

/// Metadata for one registered aggregate type.
pub struct AggregateDescriptor {
    tag: &'static str,
    type_name: &'static str,
    make: fn() -> Box<dyn Aggregate>,
    fields: Vec<FieldDescriptor>,
}

impl AggregateDescriptor {
    /// The wire tag this type marshals to.
    pub fn tag(&self) -> &'static str {
        self.tag
    }

    /// Rust type name, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Field descriptors in ascending declared order.
    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Aggregate> {
        (self.make)()
    }
}

impl fmt::Debug for AggregateDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateDescriptor")
            .field("tag", &self.tag)
            .field("type_name", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}

fn make_default<T: Aggregate + Default>() -> Box<dyn Aggregate> {
    Box::<T>::default()
}

/// Accumulates aggregate registrations, then validates them into a
/// [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    by_type: HashMap<TypeId, AggregateDescriptor>,
    by_tag: HashMap<&'static str, TypeId>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        RegistryBuilder::default()
    }

    /// Register an aggregate type under its wire tag and return a typed
    /// builder for its fields. Re-registering a type, or claiming a tag
    /// already owned by a different type, is a configuration error.
    pub fn aggregate<T: Aggregate + Default>(
        &mut self,
        tag: &'static str,
    ) -> Result<TypeBuilder<'_, T>> {
        let id = TypeId::of::<T>();
        let type_name = std::any::type_name::<T>();
        if let Some(owner) = self.by_tag.get(tag) {
            if *owner != id {
                return Err(Error::Config(format!(
                    "tag {tag} is already registered to a different type"
                )));
            }
        }
        match self.by_type.entry(id) {
            Entry::Occupied(_) => Err(Error::Config(format!(
                "{type_name} is already registered"
            ))),
            Entry::Vacant(slot) => {
                self.by_tag.insert(tag, id);
                let desc = slot.insert(AggregateDescriptor {
                    tag,
                    type_name,
                    make: make_default::<T>,
                    fields: Vec::new(),
                });
                Ok(TypeBuilder {
                    desc,
                    _marker: PhantomData,
                })
            }
        }
    }

    /// Validate the accumulated declarations and freeze them.
    pub fn build(mut self) -> Result<Registry> {
        let tags: HashMap<TypeId, &'static str> = self
            .by_type
            .iter()
            .map(|(id, desc)| (*id, desc.tag))
            .collect();

        for desc in self.by_type.values_mut() {
            desc.fields.sort_by_key(|f| f.order);
            for pair in desc.fields.windows(2) {
                if pair[0].order == pair[1].order {
                    return Err(Error::Config(format!(
                        "duplicate field order {} on {}",
                        pair[0].order, desc.type_name
                    )));
                }
            }
            for field in &mut desc.fields {
                let child_type = match &field.kind {
                    FieldKind::Child { child, .. } => Some(*child),
                    FieldKind::ChildList { element, .. } => *element,
                    FieldKind::Element { .. } => None,
                };
                if let Some(child) = child_type {
                    match tags.get(&child) {
                        Some(tag) => field.tag = Some(tag),
                        None => {
                            return Err(Error::Config(format!(
                                "child field (order {}) of {} refers to an unregistered type",
                                field.order, desc.type_name
                            )));
                        }
                    }
                }
            }
        }

        Ok(Registry {
            by_type: self.by_type,
            by_tag: self.by_tag,
        })
    }
}

/// Typed field-registration handle for one aggregate type.
pub struct TypeBuilder<'a, T> {
    desc: &'a mut AggregateDescriptor,
    _marker: PhantomData<fn(T)>,
}

impl<'a, T: Aggregate> TypeBuilder<'a, T> {
    fn field(self, tag: Option<&'static str>, order: u32, required: bool, kind: FieldKind) -> Self {
        self.desc.fields.push(FieldDescriptor {
            tag,
            order,
            required,
            kind,
        });
        self
    }

    fn element(
        self,
        tag: &'static str,
        order: u32,
        required: bool,
        scalar: ScalarKind,
        get: ScalarGetFn,
        set: ScalarSetFn,
    ) -> Self {
        self.field(
            Some(tag),
            order,
            required,
            FieldKind::Element { scalar, get, set },
        )
    }

    /// Declare a string element.
    pub fn string(
        self,
        tag: &'static str,
        order: u32,
        required: bool,
        get: fn(&T) -> Option<String>,
        set: fn(&mut T, String),
    ) -> Self {
        self.element(
            tag,
            order,
            required,
            ScalarKind::String,
            Box::new(move |a: &dyn Aggregate| {
                a.as_any().downcast_ref::<T>().and_then(get).map(ScalarValue::String)
            }),
            Box::new(move |a: &mut dyn Aggregate, v: ScalarValue| {
                if let (Some(t), ScalarValue::String(s)) = (a.as_any_mut().downcast_mut::<T>(), v) {
                    set(t, s);
                }
            }),
        )
    }

    /// Declare a boolean element (wire `Y`/`N`).
    pub fn boolean(
        self,
        tag: &'static str,
        order: u32,
        required: bool,
        get: fn(&T) -> Option<bool>,
        set: fn(&mut T, bool),
    ) -> Self {
        self.element(
            tag,
            order,
            required,
            ScalarKind::Boolean,
            Box::new(move |a: &dyn Aggregate| {
                a.as_any().downcast_ref::<T>().and_then(get).map(ScalarValue::Boolean)
            }),
            Box::new(move |a: &mut dyn Aggregate, v: ScalarValue| {
                if let (Some(t), ScalarValue::Boolean(b)) = (a.as_any_mut().downcast_mut::<T>(), v) {
                    set(t, b);
                }
            }),
        )
    }

    /// Declare an integer element.
    pub fn integer(
        self,
        tag: &'static str,
        order: u32,
        required: bool,
        get: fn(&T) -> Option<i32>,
        set: fn(&mut T, i32),
    ) -> Self {
        self.element(
            tag,
            order,
            required,
            ScalarKind::Integer,
            Box::new(move |a: &dyn Aggregate| {
                a.as_any().downcast_ref::<T>().and_then(get).map(ScalarValue::Integer)
            }),
            Box::new(move |a: &mut dyn Aggregate, v: ScalarValue| {
                if let (Some(t), ScalarValue::Integer(i)) = (a.as_any_mut().downcast_mut::<T>(), v) {
                    set(t, i);
                }
            }),
        )
    }

    /// Declare a decimal amount element.
    pub fn decimal(
        self,
        tag: &'static str,
        order: u32,
        required: bool,
        get: fn(&T) -> Option<rust_decimal::Decimal>,
        set: fn(&mut T, rust_decimal::Decimal),
    ) -> Self {
        self.element(
            tag,
            order,
            required,
            ScalarKind::Decimal,
            Box::new(move |a: &dyn Aggregate| {
                a.as_any().downcast_ref::<T>().and_then(get).map(ScalarValue::Decimal)
            }),
            Box::new(move |a: &mut dyn Aggregate, v: ScalarValue| {
                if let (Some(t), ScalarValue::Decimal(d)) = (a.as_any_mut().downcast_mut::<T>(), v) {
                    set(t, d);
                }
            }),
        )
    }

    /// Declare an OFX timestamp element.
    pub fn datetime(
        self,
        tag: &'static str,
        order: u32,
        required: bool,
        get: fn(&T) -> Option<chrono::DateTime<chrono::Utc>>,
        set: fn(&mut T, chrono::DateTime<chrono::Utc>),
    ) -> Self {
        self.element(
            tag,
            order,
            required,
            ScalarKind::DateTime,
            Box::new(move |a: &dyn Aggregate| {
                a.as_any().downcast_ref::<T>().and_then(get).map(ScalarValue::DateTime)
            }),
            Box::new(move |a: &mut dyn Aggregate, v: ScalarValue| {
                if let (Some(t), ScalarValue::DateTime(d)) = (a.as_any_mut().downcast_mut::<T>(), v)
                {
                    set(t, d);
                }
            }),
        )
    }

    /// Declare a single nested aggregate. The wire tag is taken from the
    /// child type's own registration when the registry is built, so
    /// registration order does not matter. The setter is the *real* domain
    /// setter, preserving any invariant it enforces.
    pub fn child<C: Aggregate>(
        self,
        order: u32,
        required: bool,
        get: for<'x> fn(&'x T) -> Option<&'x C>,
        set: fn(&mut T, C),
    ) -> Self {
        self.field(
            None,
            order,
            required,
            FieldKind::Child {
                child: TypeId::of::<C>(),
                get: Box::new(move |a: &dyn Aggregate| -> Option<&dyn Aggregate> {
                    let t = a.as_any().downcast_ref::<T>()?;
                    get(t).map(|c| c as &dyn Aggregate)
                }),
                set: Box::new(move |a: &mut dyn Aggregate, boxed: Box<dyn Aggregate>| {
                    match (a.as_any_mut().downcast_mut::<T>(), boxed.into_any().downcast::<C>()) {
                        (Some(t), Ok(c)) => {
                            set(t, *c);
                            true
                        }
                        _ => false,
                    }
                }),
            },
        )
    }

    /// Declare a homogeneous collection of nested aggregates, kept in
    /// encounter order.
    pub fn child_list<C: Aggregate>(
        self,
        order: u32,
        get: for<'x> fn(&'x T) -> &'x [C],
        push: fn(&mut T, C),
    ) -> Self {
        self.field(
            None,
            order,
            false,
            FieldKind::ChildList {
                element: Some(TypeId::of::<C>()),
                get: Box::new(move |a: &dyn Aggregate| -> Vec<&dyn Aggregate> {
                    match a.as_any().downcast_ref::<T>() {
                        Some(t) => get(t).iter().map(|c| c as &dyn Aggregate).collect(),
                        None => Vec::new(),
                    }
                }),
                push: Box::new(move |a: &mut dyn Aggregate, boxed: Box<dyn Aggregate>| {
                    match (a.as_any_mut().downcast_mut::<T>(), boxed.into_any().downcast::<C>()) {
                        (Some(t), Ok(c)) => {
                            push(t, *c);
                            true
                        }
                        _ => false,
                    }
                }),
            },
        )
    }

    /// Declare a heterogeneous collection: entries may be any registered
    /// aggregate, resolved by wire tag at parse time. The push accessor
    /// returns `false` for entry types the owning aggregate does not accept,
    /// which the reader treats as a tolerated anomaly.
    pub fn child_list_any(
        self,
        order: u32,
        get: for<'x> fn(&'x T) -> Vec<&'x dyn Aggregate>,
        push: fn(&mut T, Box<dyn Aggregate>) -> bool,
    ) -> Self {
        self.field(
            None,
            order,
            false,
            FieldKind::ChildList {
                element: None,
                get: Box::new(move |a: &dyn Aggregate| -> Vec<&dyn Aggregate> {
                    match a.as_any().downcast_ref::<T>() {
                        Some(t) => get(t),
                        None => Vec::new(),
                    }
                }),
                push: Box::new(move |a: &mut dyn Aggregate, boxed: Box<dyn Aggregate>| {
                    match a.as_any_mut().downcast_mut::<T>() {
                        Some(t) => push(t, boxed),
                        None => false,
                    }
                }),
            },
        )
    }
}

/// Immutable table of every registered aggregate type, keyed both by type
/// identity and by wire tag.
pub struct Registry {
    by_type: HashMap<TypeId, AggregateDescriptor>,
    by_tag: HashMap<&'static str, TypeId>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Metadata for a statically known type. Asking for an unregistered type
    /// is a programmer error.
    pub fn describe<T: Aggregate>(&self) -> Result<&AggregateDescriptor> {
        self.by_type.get(&TypeId::of::<T>()).ok_or_else(|| {
            Error::Config(format!(
                "{} was never registered",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Metadata for a value's runtime type, used for polymorphic emission.
    pub fn describe_value(&self, aggregate: &dyn Aggregate) -> Result<&AggregateDescriptor> {
        self.by_type
            .get(&aggregate.as_any().type_id())
            .ok_or_else(|| Error::Config("value's type was never registered".to_string()))
    }

    /// Resolve a wire tag to its descriptor; unknown tags yield `None`.
    pub fn resolve(&self, tag: &str) -> Option<&AggregateDescriptor> {
        self.by_tag.get(tag).and_then(|id| self.by_type.get(id))
    }

    /// Number of registered aggregate types.
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.by_type.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::ScalarKind;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Toy {
        label: Option<String>,
        count: Option<i32>,
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct ToyBox {
        toys: Vec<Toy>,
    }

    impl_aggregate!(Toy, ToyBox);

    fn toy_registry() -> Registry {
        let mut builder = Registry::builder();
        builder
            .aggregate::<Toy>("TOY")
            .unwrap()
            // Declared out of order on purpose; build() sorts.
            .integer("COUNT", 20, false, |t| t.count, |t, v| t.count = Some(v))
            .string("LABEL", 10, true, |t| t.label.clone(), |t, v| t.label = Some(v));
        builder
            .aggregate::<ToyBox>("TOYBOX")
            .unwrap()
            .child_list::<Toy>(0, |b| &b.toys, |b, t| b.toys.push(t));
        builder.build().unwrap()
    }

    #[test]
    fn test_fields_sorted_by_declared_order() {
        let registry = toy_registry();
        let desc = registry.describe::<Toy>().unwrap();
        let tags: Vec<_> = desc.fields().iter().map(|f| f.tag()).collect();
        assert_eq!(tags, vec![Some("LABEL"), Some("COUNT")]);
        assert_eq!(desc.fields()[0].scalar_kind(), Some(ScalarKind::String));
    }

    #[test]
    fn test_resolve_by_tag() {
        let registry = toy_registry();
        assert_eq!(registry.resolve("TOY").unwrap().tag(), "TOY");
        assert!(registry.resolve("NOPE").is_none());
    }

    #[test]
    fn test_child_list_tag_resolved_at_build() {
        let registry = toy_registry();
        let desc = registry.describe::<ToyBox>().unwrap();
        assert_eq!(desc.fields()[0].tag(), Some("TOY"));
    }

    #[test]
    fn test_duplicate_tag_is_config_error() {
        let mut builder = Registry::builder();
        builder.aggregate::<Toy>("TOY").unwrap();
        assert!(matches!(
            builder.aggregate::<ToyBox>("TOY"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_type_is_config_error() {
        let mut builder = Registry::builder();
        builder.aggregate::<Toy>("TOY").unwrap();
        assert!(matches!(
            builder.aggregate::<Toy>("TOY2"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_order_is_config_error() {
        let mut builder = Registry::builder();
        builder
            .aggregate::<Toy>("TOY")
            .unwrap()
            .string("LABEL", 10, false, |t| t.label.clone(), |t, v| t.label = Some(v))
            .integer("COUNT", 10, false, |t| t.count, |t, v| t.count = Some(v));
        assert!(matches!(builder.build(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unregistered_child_is_config_error() {
        let mut builder = Registry::builder();
        builder
            .aggregate::<ToyBox>("TOYBOX")
            .unwrap()
            .child_list::<Toy>(0, |b| &b.toys, |b, t| b.toys.push(t));
        assert!(matches!(builder.build(), Err(Error::Config(_))));
    }

    #[test]
    fn test_describe_unregistered_is_config_error() {
        let registry = Registry::builder().build().unwrap();
        assert!(matches!(registry.describe::<Toy>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_accessors_round_trip_through_dyn() {
        let registry = toy_registry();
        let desc = registry.describe::<Toy>().unwrap();
        let mut toy = Toy::default();
        {
            let agg: &mut dyn Aggregate = &mut toy;
            if let FieldKind::Element { set, .. } = &desc.fields()[0].kind {
                set(agg, ScalarValue::String("bear".to_string()));
            }
        }
        assert_eq!(toy.label.as_deref(), Some("bear"));
        if let FieldKind::Element { get, .. } = &desc.fields()[0].kind {
            assert_eq!(
                get(&toy),
                Some(ScalarValue::String("bear".to_string()))
            );
        }
    }
}

//! Generic per-element property storage.
//!
//! Every element category (vertices, half-edges, edges, faces) owns one
//! [`PropertyContainer`]: a set of named, typed, dense arrays that always have
//! exactly one entry per allocated element. Adding an element appends one
//! default value to every array; garbage collection compacts every array
//! with the same index map. Connectivity and positions are ordinary
//! properties, so they ride on the same machinery.
//!
//! The set of storable value types is closed: [`PropertyValue`] is sealed and
//! implemented for scalars, flags, integers, 2D/3D vectors, points, colors,
//! handles and the connectivity records. Anything else fails to compile.
//!
//! A [`Property`] is a small `Copy` token caching the slot of a declared array,
//! so hot loops never look names up.
//!
//! # Example
//!
//! ```
//! use hemesh::prelude::*;
//! use nalgebra::Point3;
//!
//! let mut mesh = HalfEdgeMesh::new();
//! let v = mesh.add_vertex(Point3::new(0.0, 0.0, 0.0));
//!
//! let weight: VertexProperty<f64> = mesh.add_property("v:weight", 1.0).unwrap();
//! assert_eq!(*mesh.prop(weight, v), 1.0);
//! mesh.set_prop(weight, v, 0.25);
//! assert_eq!(*mesh.prop(weight, v), 0.25);
//! ```

use std::any::Any;
use std::fmt::{self, Debug};
use std::marker::PhantomData;

use nalgebra::{Point3, Vector2, Vector3};

use crate::error::{ElementKind, MeshError, Result};

use super::halfedge::{Face, HalfEdge, Vertex};
use super::index::{EdgeId, FaceId, HalfEdgeId, VertexId};

/// RGB color with components in `[0, 1]`.
pub type Color = Vector3<f32>;

/// Tag describing the value type stored in a property array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    /// `f64`
    Scalar,
    /// `f32`
    Float,
    /// `bool`
    Bool,
    /// `i32`
    Int,
    /// `u32`
    UInt,
    /// `Vector2<f64>`, typically texture coordinates.
    TexCoord,
    /// `Vector3<f64>`, normals and other directions.
    Vector,
    /// `Point3<f64>`
    Point,
    /// [`Color`]
    Color,
    /// A handle of the given category.
    Handle(ElementKind),
    /// A connectivity record of the given category.
    Connectivity(ElementKind),
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A value type that can be stored in a property array.
///
/// This trait is sealed; see [`PropertyKind`] for the supported set.
pub trait PropertyValue: sealed::Sealed + Clone + Debug + Send + Sync + 'static {
    /// Tag identifying this type at runtime.
    const KIND: PropertyKind;
}

macro_rules! impl_property_value {
    ($($ty:ty => $kind:expr),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}
            impl PropertyValue for $ty {
                const KIND: PropertyKind = $kind;
            }
        )*
    };
}

impl_property_value! {
    f64 => PropertyKind::Scalar,
    f32 => PropertyKind::Float,
    bool => PropertyKind::Bool,
    i32 => PropertyKind::Int,
    u32 => PropertyKind::UInt,
    Vector2<f64> => PropertyKind::TexCoord,
    Vector3<f64> => PropertyKind::Vector,
    Point3<f64> => PropertyKind::Point,
    Color => PropertyKind::Color,
    VertexId => PropertyKind::Handle(ElementKind::Vertex),
    HalfEdgeId => PropertyKind::Handle(ElementKind::HalfEdge),
    EdgeId => PropertyKind::Handle(ElementKind::Edge),
    FaceId => PropertyKind::Handle(ElementKind::Face),
    Vertex => PropertyKind::Connectivity(ElementKind::Vertex),
    HalfEdge => PropertyKind::Connectivity(ElementKind::HalfEdge),
    Face => PropertyKind::Connectivity(ElementKind::Face),
}

/// Type-erased property array.
trait PropertyArray: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> PropertyKind;
    fn len(&self) -> usize;
    fn resize(&mut self, n: usize);
    fn reserve(&mut self, additional: usize);
    fn push(&mut self);
    fn swap(&mut self, i: usize, j: usize);
    fn compact(&mut self, old_to_new: &[Option<usize>], new_len: usize);
    fn shrink_to_fit(&mut self);
    fn clone_box(&self) -> Box<dyn PropertyArray>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

struct TypedArray<T: PropertyValue> {
    name: String,
    default: T,
    data: Vec<T>,
}

impl<T: PropertyValue> PropertyArray for TypedArray<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PropertyKind {
        T::KIND
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn resize(&mut self, n: usize) {
        self.data.resize(n, self.default.clone());
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn push(&mut self) {
        self.data.push(self.default.clone());
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.data.swap(i, j);
    }

    fn compact(&mut self, old_to_new: &[Option<usize>], new_len: usize) {
        // Survivors only ever move towards the front, so a forward sweep
        // never overwrites an element that is still to be moved.
        for (old, new) in old_to_new.iter().enumerate() {
            if let Some(new) = *new {
                if new != old {
                    self.data.swap(new, old);
                }
            }
        }
        self.data.truncate(new_len);
    }

    fn shrink_to_fit(&mut self) {
        self.data.shrink_to_fit();
    }

    fn clone_box(&self) -> Box<dyn PropertyArray> {
        Box::new(TypedArray {
            name: self.name.clone(),
            default: self.default.clone(),
            data: self.data.clone(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A set of named property arrays sharing one length.
#[derive(Default)]
pub struct PropertyContainer {
    arrays: Vec<Option<Box<dyn PropertyArray>>>,
    len: usize,
}

impl PropertyContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in every array.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the arrays have no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of declared arrays.
    pub fn num_properties(&self) -> usize {
        self.arrays.iter().flatten().count()
    }

    /// Declare a property, or return the existing one with the same name.
    ///
    /// New arrays are filled with `default` up to the current length.
    /// Fails with [`MeshError::DuplicateProperty`] if `name` is already
    /// declared with another value type.
    pub fn declare<T: PropertyValue>(&mut self, name: &str, default: T) -> Result<usize> {
        if let Some((slot, array)) = self.lookup(name) {
            if array.kind() != T::KIND {
                return Err(MeshError::DuplicateProperty {
                    name: name.to_string(),
                    existing: array.kind(),
                    requested: T::KIND,
                });
            }
            return Ok(slot);
        }
        Ok(self.push_array(name, default))
    }

    /// Append a new array without checking for an existing name.
    pub(crate) fn push_array<T: PropertyValue>(&mut self, name: &str, default: T) -> usize {
        let array = TypedArray {
            name: name.to_string(),
            data: vec![default.clone(); self.len],
            default,
        };
        self.arrays.push(Some(Box::new(array)));
        self.arrays.len() - 1
    }

    /// Find the slot of a property by name and value type.
    pub fn find<T: PropertyValue>(&self, name: &str) -> Option<usize> {
        self.lookup(name)
            .filter(|(_, array)| array.kind() == T::KIND)
            .map(|(slot, _)| slot)
    }

    /// True if a property with this name exists (of any type).
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Value type of the named property.
    pub fn kind_of(&self, name: &str) -> Option<PropertyKind> {
        self.lookup(name).map(|(_, array)| array.kind())
    }

    /// Remove the array in `slot`. Returns false if it was already gone.
    ///
    /// Slots are never reused, so a stale accessor cannot alias a newer
    /// property.
    pub fn remove(&mut self, slot: usize) -> bool {
        match self.arrays.get_mut(slot) {
            Some(entry) => entry.take().is_some(),
            None => false,
        }
    }

    /// Names of all declared properties in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.arrays.iter().flatten().map(|a| a.name()).collect()
    }

    /// Typed view of the array in `slot`.
    ///
    /// # Panics
    /// Panics if the slot was removed or holds another value type.
    pub fn values<T: PropertyValue>(&self, slot: usize) -> &[T] {
        match self
            .arrays
            .get(slot)
            .and_then(|a| a.as_ref())
            .and_then(|a| a.as_any().downcast_ref::<TypedArray<T>>())
        {
            Some(array) => &array.data,
            None => panic!("stale property binding: slot {} is not a {:?} array", slot, T::KIND),
        }
    }

    /// Mutable typed view of the array in `slot`.
    ///
    /// # Panics
    /// Panics if the slot was removed or holds another value type.
    pub fn values_mut<T: PropertyValue>(&mut self, slot: usize) -> &mut [T] {
        match self
            .arrays
            .get_mut(slot)
            .and_then(|a| a.as_mut())
            .and_then(|a| a.as_any_mut().downcast_mut::<TypedArray<T>>())
        {
            Some(array) => &mut array.data,
            None => panic!("stale property binding: slot {} is not a {:?} array", slot, T::KIND),
        }
    }

    /// Grow or shrink every array to `n` entries.
    pub fn resize(&mut self, n: usize) {
        for array in self.arrays.iter_mut().flatten() {
            array.resize(n);
        }
        self.len = n;
    }

    /// Reserve room for `additional` more entries in every array.
    pub fn reserve(&mut self, additional: usize) {
        for array in self.arrays.iter_mut().flatten() {
            array.reserve(additional);
        }
    }

    /// Append one default entry to every array.
    pub fn push(&mut self) {
        for array in self.arrays.iter_mut().flatten() {
            array.push();
        }
        self.len += 1;
    }

    /// Swap entries `i` and `j` in every array.
    pub fn swap(&mut self, i: usize, j: usize) {
        for array in self.arrays.iter_mut().flatten() {
            array.swap(i, j);
        }
    }

    /// Stable compaction: entry `i` moves to `old_to_new[i]`, entries mapped
    /// to `None` are dropped, and every array ends with `new_len` entries.
    ///
    /// The map must be monotonic over its `Some` entries.
    pub fn compact(&mut self, old_to_new: &[Option<usize>], new_len: usize) {
        debug_assert_eq!(old_to_new.len(), self.len);
        for array in self.arrays.iter_mut().flatten() {
            array.compact(old_to_new, new_len);
        }
        self.len = new_len;
    }

    /// Release unused capacity.
    pub fn shrink_to_fit(&mut self) {
        for array in self.arrays.iter_mut().flatten() {
            array.shrink_to_fit();
        }
    }

    /// Drop all arrays and reset the length to zero.
    pub fn clear(&mut self) {
        self.arrays.clear();
        self.len = 0;
    }

    fn lookup(&self, name: &str) -> Option<(usize, &dyn PropertyArray)> {
        self.arrays
            .iter()
            .enumerate()
            .find_map(|(slot, a)| match a {
                Some(a) if a.name() == name => Some((slot, a.as_ref())),
                _ => None,
            })
    }
}

impl Clone for PropertyContainer {
    fn clone(&self) -> Self {
        Self {
            arrays: self
                .arrays
                .iter()
                .map(|a| a.as_ref().map(|a| a.clone_box()))
                .collect(),
            len: self.len,
        }
    }
}

impl Debug for PropertyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyContainer")
            .field("len", &self.len)
            .field("properties", &self.names())
            .finish()
    }
}

/// Typed accessor for a property array attached to elements of type `H`.
pub struct Property<H, T> {
    slot: usize,
    _marker: PhantomData<fn() -> (H, T)>,
}

impl<H, T> Property<H, T> {
    pub(crate) fn from_slot(slot: usize) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }

    /// The container slot this accessor is bound to.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }
}

impl<H, T> Clone for Property<H, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H, T> Copy for Property<H, T> {}

impl<H, T> PartialEq for Property<H, T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<H, T> Eq for Property<H, T> {}

impl<H, T> Debug for Property<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.slot)
    }
}

/// Property attached to vertices.
pub type VertexProperty<T> = Property<VertexId, T>;
/// Property attached to half-edges.
pub type HalfEdgeProperty<T> = Property<HalfEdgeId, T>;
/// Property attached to edges.
pub type EdgeProperty<T> = Property<EdgeId, T>;
/// Property attached to faces.
pub type FaceProperty<T> = Property<FaceId, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_fills_defaults() {
        let mut props = PropertyContainer::new();
        props.resize(3);
        let slot = props.declare("weight", 2.5f64).unwrap();
        assert_eq!(props.values::<f64>(slot), &[2.5, 2.5, 2.5]);

        props.push();
        assert_eq!(props.len(), 4);
        assert_eq!(props.values::<f64>(slot)[3], 2.5);
    }

    #[test]
    fn test_declare_is_get_or_create() {
        let mut props = PropertyContainer::new();
        let a = props.declare("flag", false).unwrap();
        let b = props.declare("flag", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(props.num_properties(), 1);
    }

    #[test]
    fn test_duplicate_name_other_type() {
        let mut props = PropertyContainer::new();
        props.declare("value", 0.0f64).unwrap();
        let err = props.declare("value", 0i32).unwrap_err();
        assert_eq!(
            err,
            MeshError::DuplicateProperty {
                name: "value".to_string(),
                existing: PropertyKind::Scalar,
                requested: PropertyKind::Int,
            }
        );
    }

    #[test]
    fn test_find_checks_type() {
        let mut props = PropertyContainer::new();
        let slot = props.declare("n", Vector3::<f64>::zeros()).unwrap();
        assert_eq!(props.find::<Vector3<f64>>("n"), Some(slot));
        assert_eq!(props.find::<f64>("n"), None);
        assert_eq!(props.find::<f64>("missing"), None);
        assert_eq!(props.kind_of("n"), Some(PropertyKind::Vector));
    }

    #[test]
    fn test_remove_does_not_reuse_slot() {
        let mut props = PropertyContainer::new();
        let a = props.declare("a", 0u32).unwrap();
        assert!(props.remove(a));
        assert!(!props.remove(a));
        assert!(!props.contains("a"));

        let b = props.declare("a", 0u32).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_compact_is_stable() {
        let mut props = PropertyContainer::new();
        props.resize(5);
        let slot = props.declare("i", 0i32).unwrap();
        for (i, x) in props.values_mut::<i32>(slot).iter_mut().enumerate() {
            *x = i as i32 * 10;
        }

        // Drop entries 1 and 3.
        let map = [Some(0), None, Some(1), None, Some(2)];
        props.compact(&map, 3);
        assert_eq!(props.len(), 3);
        assert_eq!(props.values::<i32>(slot), &[0, 20, 40]);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut props = PropertyContainer::new();
        props.resize(2);
        let slot = props.declare("c", Color::new(1.0, 0.0, 0.0)).unwrap();
        let copy = props.clone();
        props.values_mut::<Color>(slot)[0] = Color::new(0.0, 1.0, 0.0);
        assert_eq!(copy.values::<Color>(slot)[0], Color::new(1.0, 0.0, 0.0));
    }

    #[test]
    #[should_panic(expected = "stale property binding")]
    fn test_wrong_type_access_panics() {
        let mut props = PropertyContainer::new();
        let slot = props.declare("x", 0.0f64).unwrap();
        let _ = props.values::<f32>(slot);
    }
}

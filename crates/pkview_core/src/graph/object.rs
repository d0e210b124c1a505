//! Dynamic domain object graph.
//!
//! # Responsibility
//! - Represent host-owned analysis objects as typed bags of named properties.
//! - Provide shared handles with pointer identity for aliased sub-objects.
//!
//! # Invariants
//! - Every object carries a non-empty domain type name.
//! - `ObjectRef` equality is handle identity (`ptr_eq`), never structural.
//! - Graphs may be cyclic; `Debug` output never follows edges.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Value stored under one property name.
#[derive(Debug, Clone)]
pub enum PropertyValue {
    /// Primitive passthrough (number, string, bool, null, primitive arrays).
    Value(Value),
    /// One owned or referenced sub-object.
    Object(ObjectRef),
    /// Ordered list of sub-objects.
    Objects(Vec<ObjectRef>),
    /// Absent object handle.
    Empty,
}

impl PropertyValue {
    /// Returns whether this value holds no object and no data.
    ///
    /// `Value(Null)` and an empty object list count as empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Value(Value::Null) => true,
            Self::Objects(items) => items.is_empty(),
            Self::Value(_) | Self::Object(_) => false,
        }
    }

    /// Returns contained object handles in order.
    pub fn objects(&self) -> Vec<ObjectRef> {
        match self {
            Self::Object(object) => vec![object.clone()],
            Self::Objects(items) => items.clone(),
            Self::Value(_) | Self::Empty => Vec::new(),
        }
    }

    /// Returns the primitive payload, if any.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<ObjectRef> for PropertyValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}

impl From<Vec<ObjectRef>> for PropertyValue {
    fn from(value: Vec<ObjectRef>) -> Self {
        Self::Objects(value)
    }
}

/// One domain object: a type name plus named properties.
#[derive(Debug, Clone)]
pub struct DomainObject {
    type_name: String,
    properties: BTreeMap<String, PropertyValue>,
}

impl DomainObject {
    /// Creates an object of `type_name` with no properties.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property assignment.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Builder-style assignment of an absent object handle.
    pub fn with_empty(mut self, name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), PropertyValue::Empty);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    /// Wraps this object into a shared handle.
    pub fn into_ref(self) -> ObjectRef {
        ObjectRef::new(self)
    }
}

/// Shared, interior-mutable handle to a [`DomainObject`].
///
/// Cloning a handle aliases the same object. Lock poisoning is recovered
/// transparently since objects hold plain data with no cross-field invariants.
#[derive(Clone)]
pub struct ObjectRef(Arc<RwLock<DomainObject>>);

impl ObjectRef {
    pub fn new(object: DomainObject) -> Self {
        Self(Arc::new(RwLock::new(object)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, DomainObject> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, DomainObject> {
        self.0
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the domain type name.
    pub fn type_name(&self) -> String {
        self.read().type_name().to_string()
    }

    /// Returns a clone of one property value.
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.read().get(name).cloned()
    }

    /// Replaces one property value.
    pub fn set(&self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.write().set(name, value);
    }

    /// Returns whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable address used as identity inside one traversal.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Why: following edges here would recurse forever on cyclic graphs.
        write!(f, "ObjectRef({}@{:#x})", self.type_name(), self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::{DomainObject, PropertyValue};
    use serde_json::json;

    #[test]
    fn clones_alias_the_same_object() {
        let species = DomainObject::new("Species")
            .with("Name", json!("Drug"))
            .into_ref();
        let alias = species.clone();

        alias.set("Name", json!("Renamed"));

        assert!(species.ptr_eq(&alias));
        assert_eq!(
            species.get("Name").and_then(|value| value.as_value().cloned()),
            Some(json!("Renamed"))
        );
    }

    #[test]
    fn structurally_equal_objects_are_not_identical() {
        let first = DomainObject::new("Dose").with("Amount", json!(1)).into_ref();
        let second = DomainObject::new("Dose").with("Amount", json!(1)).into_ref();
        assert!(!first.ptr_eq(&second));
        assert_ne!(first.addr(), second.addr());
    }

    #[test]
    fn emptiness_covers_null_and_empty_lists() {
        assert!(PropertyValue::Empty.is_empty());
        assert!(PropertyValue::Value(json!(null)).is_empty());
        assert!(PropertyValue::Objects(Vec::new()).is_empty());
        assert!(!PropertyValue::Value(json!(0)).is_empty());
    }

    #[test]
    fn debug_does_not_follow_cycles() {
        let model = DomainObject::new("Model").into_ref();
        let analysis = DomainObject::new("Analysis")
            .with("ModelObj", model.clone())
            .into_ref();
        model.set("Owner", analysis.clone());

        let rendered = format!("{:?}", analysis.get("ModelObj"));
        assert!(rendered.contains("ObjectRef(Model@"));
    }
}

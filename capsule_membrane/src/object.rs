//! Capsule membrane — Local Objects
//!
//! Ordinary objects that live on one side of the membrane: a property bag
//! and a native callable. Property maps are ordered (`BTreeMap`) so any
//! enumeration over them is deterministic.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::MembraneError;
use crate::symbols::Symbol;
use crate::value::{Capability, ObjectRef, Shape, Value};

/// A normalised property key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PropertyKey {
    String(String),
    Symbol(Symbol),
}

impl PropertyKey {
    /// Coerce a live value into a property key. Primitives stringify;
    /// objects are rejected.
    pub fn from_value(value: &Value) -> Result<Self, MembraneError> {
        match value {
            Value::String(s) => Ok(PropertyKey::String(s.clone())),
            Value::Symbol(symbol) => Ok(PropertyKey::Symbol(symbol.clone())),
            Value::Number(n) => Ok(PropertyKey::String(number_key(*n))),
            Value::Bool(b) => Ok(PropertyKey::String(b.to_string())),
            Value::Null => Ok(PropertyKey::String("null".to_string())),
            Value::Undefined => Ok(PropertyKey::String("undefined".to_string())),
            Value::Object(_) => Err(MembraneError::Fault(
                "objects cannot be used as property keys".to_string(),
            )),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

fn number_key(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// A plain property bag. Writes are always accepted.
#[derive(Default)]
pub struct PlainObject {
    properties: RefCell<BTreeMap<PropertyKey, Value>>,
}

impl PlainObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties
            .get_mut()
            .insert(PropertyKey::from(key), value.into());
        self
    }

    pub fn into_ref(self) -> ObjectRef {
        ObjectRef::new(self)
    }

    pub fn len(&self) -> usize {
        self.properties.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.borrow().is_empty()
    }

    fn read(&self, key: &Value) -> Result<Value, MembraneError> {
        let key = PropertyKey::from_value(key)?;
        Ok(self
            .properties
            .borrow()
            .get(&key)
            .cloned()
            .unwrap_or(Value::Undefined))
    }

    fn write(&self, key: &Value, value: Value) -> Result<bool, MembraneError> {
        let key = PropertyKey::from_value(key)?;
        self.properties.borrow_mut().insert(key, value);
        Ok(true)
    }

    fn contains(&self, key: &Value) -> Result<bool, MembraneError> {
        let key = PropertyKey::from_value(key)?;
        Ok(self.properties.borrow().contains_key(&key))
    }
}

impl Capability for PlainObject {
    fn get(&self, key: &Value, _receiver: &Value) -> Result<Value, MembraneError> {
        self.read(key)
    }

    fn set(&self, key: &Value, value: Value, _receiver: &Value) -> Result<bool, MembraneError> {
        self.write(key, value)
    }

    fn has(&self, key: &Value) -> Result<bool, MembraneError> {
        self.contains(key)
    }
}

type NativeBody = Box<dyn Fn(&Value, &[Value]) -> Result<Value, MembraneError>>;

/// A callable backed by a Rust closure. Carries its own property bag,
/// seeded with `name`.
pub struct NativeFunction {
    name: String,
    body: NativeBody,
    properties: PlainObject,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<Value, MembraneError> + 'static,
    {
        let name = name.into();
        let properties = PlainObject::new().with("name", name.as_str());
        Self {
            name,
            body: Box::new(body),
            properties,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn into_ref(self) -> ObjectRef {
        ObjectRef::new(self)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Capability for NativeFunction {
    fn shape(&self) -> Shape {
        Shape::Callable
    }

    fn get(&self, key: &Value, _receiver: &Value) -> Result<Value, MembraneError> {
        self.properties.read(key)
    }

    fn set(&self, key: &Value, value: Value, _receiver: &Value) -> Result<bool, MembraneError> {
        self.properties.write(key, value)
    }

    fn has(&self, key: &Value) -> Result<bool, MembraneError> {
        self.properties.contains(key)
    }

    fn apply(&self, this: &Value, args: &[Value]) -> Result<Value, MembraneError> {
        (self.body)(this, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_object_reads_back_writes() {
        let obj = PlainObject::new().into_ref();
        assert!(obj.set("answer", 42).unwrap());
        assert_eq!(obj.get("answer").unwrap(), Value::Number(42.0));
        assert!(obj.has("answer").unwrap());
        assert!(!obj.has("question").unwrap());
        assert!(obj.get("question").unwrap().is_undefined());
    }

    #[test]
    fn numeric_keys_stringify() {
        let obj = PlainObject::new().with("7", "seven").into_ref();
        assert_eq!(obj.get(7).unwrap(), Value::from("seven"));
    }

    #[test]
    fn object_keys_are_rejected() {
        let obj = PlainObject::new().into_ref();
        let key = Value::Object(PlainObject::new().into_ref());
        let err = obj.get(key).unwrap_err();
        assert!(matches!(err, MembraneError::Fault(_)));
    }

    #[test]
    fn native_function_applies_body_and_exposes_name() {
        let double = NativeFunction::new("double", |_this, args| {
            let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        })
        .into_ref();

        assert_eq!(double.shape(), Shape::Callable);
        assert_eq!(double.get("name").unwrap(), Value::from("double"));
        let result = double.call(&Value::Undefined, &[Value::from(21)]).unwrap();
        assert_eq!(result, Value::Number(42.0));
    }

    #[test]
    fn call_method_binds_this() {
        let obj = PlainObject::new()
            .with(
                "whoami",
                NativeFunction::new("whoami", |this, _args| Ok(this.clone())).into_ref(),
            )
            .into_ref();
        let result = obj.call_method("whoami", &[]).unwrap();
        assert_eq!(result, Value::Object(obj));
    }
}

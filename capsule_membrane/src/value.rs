//! Capsule membrane — Live Values
//!
//! The value model seen by code on either side of the membrane. Primitives
//! are plain data; objects are reference-counted handles over a
//! [`Capability`], compared by identity.
//!
//! The four meta-operations of [`Capability`] are the only way to interact
//! with an object. Local objects implement them directly; remote handles
//! implement them by sending an action across the membrane.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::MembraneError;
use crate::symbols::{Symbol, WellKnownSymbol};

/// Coarse shape of an object, carried on every wire reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    Object,
    Callable,
}

/// The meta-operations every object exposes.
///
/// Implementations must not hold interior borrows across calls into other
/// objects: any of these may re-enter the membrane arbitrarily deeply.
pub trait Capability {
    fn shape(&self) -> Shape {
        Shape::Object
    }

    /// Read property `key`, with `receiver` as the original access target.
    fn get(&self, key: &Value, receiver: &Value) -> Result<Value, MembraneError>;

    /// Write property `key`. Returns whether the write was accepted.
    fn set(&self, key: &Value, value: Value, receiver: &Value) -> Result<bool, MembraneError>;

    /// Membership test for `key`.
    fn has(&self, key: &Value) -> Result<bool, MembraneError>;

    /// Invoke the object with an explicit this-binding.
    fn apply(&self, this: &Value, args: &[Value]) -> Result<Value, MembraneError> {
        let _ = (this, args);
        Err(MembraneError::Fault("target is not callable".to_string()))
    }
}

/// Identity of an object handle: the address of its allocation.
///
/// Only meaningful while some handle keeps the allocation alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectKey(usize);

/// Shared handle to an object.
#[derive(Clone)]
pub struct ObjectRef(Rc<dyn Capability>);

impl ObjectRef {
    pub fn new<C: Capability + 'static>(capability: C) -> Self {
        Self(Rc::new(capability))
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey(Rc::as_ptr(&self.0) as *const () as usize)
    }

    /// Reference equality.
    pub fn same(&self, other: &ObjectRef) -> bool {
        self.key() == other.key()
    }

    pub fn shape(&self) -> Shape {
        self.0.shape()
    }

    /// The underlying meta-operations, for callers that supply their own
    /// receiver or this-binding.
    pub fn capability(&self) -> &dyn Capability {
        &*self.0
    }

    /// Read a property with this object as receiver.
    pub fn get(&self, key: impl Into<Value>) -> Result<Value, MembraneError> {
        self.0.get(&key.into(), &Value::Object(self.clone()))
    }

    /// Write a property with this object as receiver.
    pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<bool, MembraneError> {
        self.0.set(&key.into(), value.into(), &Value::Object(self.clone()))
    }

    pub fn has(&self, key: impl Into<Value>) -> Result<bool, MembraneError> {
        self.0.has(&key.into())
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value, MembraneError> {
        self.0.apply(this, args)
    }

    /// Read `name` and invoke it with this object bound as `this`.
    pub fn call_method(&self, name: &str, args: &[Value]) -> Result<Value, MembraneError> {
        match self.get(name)? {
            Value::Object(method) => method.call(&Value::Object(self.clone()), args),
            other => Err(MembraneError::Fault(format!(
                "property {:?} is {}, not callable",
                name,
                other.type_name()
            ))),
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectRef({:?}@{:#x})", self.shape(), self.key().0)
    }
}

/// A live value on either side of the membrane.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Symbol(Symbol),
    Object(ObjectRef),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(obj) => match obj.shape() {
                Shape::Object => "object",
                Shape::Callable => "function",
            },
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.same(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Symbol> for Value {
    fn from(symbol: Symbol) -> Self {
        Value::Symbol(symbol)
    }
}

impl From<WellKnownSymbol> for Value {
    fn from(symbol: WellKnownSymbol) -> Self {
        Value::Symbol(Symbol::WellKnown(symbol))
    }
}

impl From<ObjectRef> for Value {
    fn from(obj: ObjectRef) -> Self {
        Value::Object(obj)
    }
}

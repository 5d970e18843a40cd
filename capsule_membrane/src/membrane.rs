//! Capsule membrane — Membrane
//!
//! One instance per side. Translates live values to wire values and back,
//! owns that side's registries, and carries out actions received from the
//! other side. No business logic lives here.
//!
//! Outbound traffic leaves through the channel supplied at construction;
//! the channel is expected to deliver the action to the peer and return
//! the peer's serialized result synchronously.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::MembraneError;
use crate::registry::Registry;
use crate::symbols::Symbol;
use crate::value::{Capability, ObjectRef, Shape, Value};
use crate::wire::{Action, CapabilityValue, Literal, RefId, WellKnownCapability};

/// Which world a membrane belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// The sandboxed (untrusted) world.
    Wet,
    /// The host (trusted) world.
    Dry,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Wet => f.write_str("wet"),
            Side::Dry => f.write_str("dry"),
        }
    }
}

/// Outbound path to the peer membrane.
pub type Channel = Rc<dyn Fn(Action) -> Result<CapabilityValue, MembraneError>>;

/// A serializing membrane for one side.
pub struct Membrane {
    side: Side,
    channel: Channel,
    registry: RefCell<Registry>,
    this: Weak<Membrane>,
}

impl Membrane {
    pub fn new(side: Side, channel: Channel) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            side,
            channel,
            registry: RefCell::new(Registry::new()),
            this: this.clone(),
        })
    }

    pub fn side(&self) -> Side {
        self.side
    }

    // -----------------------------------------------------------------
    // Value translation
    // -----------------------------------------------------------------

    /// Live value → wire value.
    pub fn serialize(&self, value: &Value) -> Result<CapabilityValue, MembraneError> {
        match value {
            Value::Undefined => Ok(CapabilityValue::undefined()),
            Value::Null => Ok(CapabilityValue::literal(Literal::Null)),
            Value::Bool(b) => Ok(CapabilityValue::literal(Literal::Bool(*b))),
            Value::Number(n) if n.is_finite() => {
                Ok(CapabilityValue::literal(Literal::Number(*n)))
            }
            Value::Number(n) => Err(MembraneError::UnsupportedValue(format!(
                "non-finite number {n} has no wire encoding"
            ))),
            Value::String(s) => Ok(CapabilityValue::literal(Literal::String(s.clone()))),
            Value::Symbol(Symbol::WellKnown(name)) => {
                Ok(CapabilityValue::WellKnown { name: *name })
            }
            Value::Symbol(Symbol::Unregistered(description)) => {
                Err(MembraneError::UnsupportedValue(format!(
                    "symbol {description:?} is not a registered marker"
                )))
            }
            Value::Object(obj) => {
                let mut registry = self.registry.borrow_mut();
                if let Some(cached) = registry.wire_form(obj) {
                    return Ok(cached);
                }
                let wire = registry.register_local(obj);
                trace!(side = %self.side, wire = ?wire, "allocated local reference");
                Ok(wire)
            }
        }
    }

    /// Wire value → live value.
    pub fn deserialize(&self, value: &CapabilityValue) -> Result<Value, MembraneError> {
        match value {
            CapabilityValue::Literal { value: None } => Ok(Value::Undefined),
            CapabilityValue::Literal { value: Some(literal) } => Ok(match literal {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
            }),
            CapabilityValue::WellKnown { name } => Ok(Value::Symbol(Symbol::WellKnown(*name))),
            CapabilityValue::OwnRef { id, shape } => {
                self.proxy_for(*id, *shape).map(Value::Object)
            }
            CapabilityValue::BounceRef { id, shape } => {
                let obj = self.registry.borrow().local(*id).ok_or_else(|| {
                    MembraneError::ProtocolViolation(format!(
                        "{} has no local object with id {id}",
                        self.side
                    ))
                })?;
                if obj.shape() != *shape {
                    return Err(MembraneError::ProtocolViolation(format!(
                        "bounce reference {id} claims shape {shape:?}, local object is {:?}",
                        obj.shape()
                    )));
                }
                Ok(Value::Object(obj))
            }
        }
    }

    // -----------------------------------------------------------------
    // Inbound actions
    // -----------------------------------------------------------------

    /// Carry out an action sent by the other side and return the
    /// serialized result.
    pub fn receive_action(&self, action: &Action) -> Result<CapabilityValue, MembraneError> {
        let result = match action {
            Action::Invoke {
                target,
                this_arg,
                args,
            } => {
                let target = self.target(target)?;
                let this = self.deserialize(this_arg)?;
                let args = args
                    .iter()
                    .map(|arg| self.deserialize(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                target.capability().apply(&this, &args)?
            }
            Action::Read {
                target,
                key,
                receiver,
            } => {
                let target = self.target(target)?;
                let receiver = self.deserialize(receiver)?;
                let key = self.deserialize(key)?;
                target.capability().get(&key, &receiver)?
            }
            Action::Has { target, key } => {
                let target = self.target(target)?;
                let key = self.deserialize(key)?;
                Value::Bool(target.capability().has(&key)?)
            }
            Action::Write {
                target,
                key,
                value,
                receiver,
            } => {
                let target = self.target(target)?;
                let receiver = self.deserialize(receiver)?;
                let value = self.deserialize(value)?;
                let key = self.deserialize(key)?;
                Value::Bool(target.capability().set(&key, value, &receiver)?)
            }
        };
        self.serialize(&result)
    }

    fn target(&self, wire: &CapabilityValue) -> Result<ObjectRef, MembraneError> {
        match self.deserialize(wire)? {
            Value::Object(obj) => Ok(obj),
            other => Err(MembraneError::ProtocolViolation(format!(
                "action target must be an object, got {}",
                other.type_name()
            ))),
        }
    }

    // -----------------------------------------------------------------
    // Well-known bindings
    // -----------------------------------------------------------------

    /// Bind a local object to the fixed id of a well-known capability.
    pub fn define_well_known_local(&self, name: WellKnownCapability, obj: ObjectRef) {
        self.registry.borrow_mut().bind_local(name.id(), obj);
    }

    /// Proxy for a well-known capability owned by the other side.
    pub fn define_well_known_remote(&self, name: WellKnownCapability) -> ObjectRef {
        if let Some(existing) = self.registry.borrow().remote(name.id()) {
            return existing;
        }
        self.create_proxy(name.id(), name.shape())
    }

    /// Wire form this side would give `obj` without registering it.
    pub fn wire_form(&self, obj: &ObjectRef) -> Option<CapabilityValue> {
        self.registry.borrow().wire_form(obj)
    }

    pub fn local_count(&self) -> usize {
        self.registry.borrow().local_count()
    }

    pub fn remote_count(&self) -> usize {
        self.registry.borrow().remote_count()
    }

    // -----------------------------------------------------------------
    // Remote proxies
    // -----------------------------------------------------------------

    fn proxy_for(&self, id: RefId, shape: Shape) -> Result<ObjectRef, MembraneError> {
        let existing = self.registry.borrow().remote(id);
        match existing {
            Some(proxy) if proxy.shape() == shape => Ok(proxy),
            Some(proxy) => Err(MembraneError::ProtocolViolation(format!(
                "remote reference {id} arrived as {shape:?}, previously {:?}",
                proxy.shape()
            ))),
            None => Ok(self.create_proxy(id, shape)),
        }
    }

    fn create_proxy(&self, id: RefId, shape: Shape) -> ObjectRef {
        let proxy = ObjectRef::new(RemoteHandle {
            membrane: self.this.clone(),
            id,
            shape,
        });
        self.registry.borrow_mut().bind_remote(id, proxy.clone());
        trace!(side = %self.side, id, ?shape, "created remote proxy");
        proxy
    }

    /// Send an action to the peer and deserialize its answer.
    fn request(&self, action: Action) -> Result<Value, MembraneError> {
        let result = (self.channel)(action)?;
        self.deserialize(&result)
    }
}

/// Local stand-in for an object owned by the other side. Every
/// meta-operation becomes a blocking request through the owning membrane.
pub struct RemoteHandle {
    membrane: Weak<Membrane>,
    id: RefId,
    shape: Shape,
}

impl RemoteHandle {
    pub fn id(&self) -> RefId {
        self.id
    }

    fn membrane(&self) -> Result<Rc<Membrane>, MembraneError> {
        self.membrane.upgrade().ok_or_else(|| {
            MembraneError::ProtocolViolation(format!(
                "remote handle {} outlived its membrane",
                self.id
            ))
        })
    }

    fn wire(&self) -> CapabilityValue {
        CapabilityValue::BounceRef {
            id: self.id,
            shape: self.shape,
        }
    }
}

fn expect_bool(operation: &str, value: Value) -> Result<bool, MembraneError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(MembraneError::ProtocolViolation(format!(
            "{operation} answered with {}, expected boolean",
            other.type_name()
        ))),
    }
}

impl Capability for RemoteHandle {
    fn shape(&self) -> Shape {
        self.shape
    }

    fn get(&self, key: &Value, receiver: &Value) -> Result<Value, MembraneError> {
        let membrane = self.membrane()?;
        let action = Action::Read {
            target: self.wire(),
            key: membrane.serialize(key)?,
            receiver: membrane.serialize(receiver)?,
        };
        membrane.request(action)
    }

    fn set(&self, key: &Value, value: Value, receiver: &Value) -> Result<bool, MembraneError> {
        let membrane = self.membrane()?;
        let action = Action::Write {
            target: self.wire(),
            key: membrane.serialize(key)?,
            value: membrane.serialize(&value)?,
            receiver: membrane.serialize(receiver)?,
        };
        expect_bool("write", membrane.request(action)?)
    }

    fn has(&self, key: &Value) -> Result<bool, MembraneError> {
        let membrane = self.membrane()?;
        let action = Action::Has {
            target: self.wire(),
            key: membrane.serialize(key)?,
        };
        expect_bool("has", membrane.request(action)?)
    }

    fn apply(&self, this: &Value, args: &[Value]) -> Result<Value, MembraneError> {
        if self.shape != Shape::Callable {
            return Err(MembraneError::Fault(format!(
                "remote object {} is not callable",
                self.id
            )));
        }
        let membrane = self.membrane()?;
        let action = Action::Invoke {
            target: self.wire(),
            this_arg: membrane.serialize(this)?,
            args: args
                .iter()
                .map(|arg| membrane.serialize(arg))
                .collect::<Result<Vec<_>, _>>()?,
        };
        membrane.request(action)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#![forbid(unsafe_code)]

//! Capsule membrane kernel.
//!
//! A reference-identity-preserving, bidirectional message protocol
//! connecting two isolated object worlds: the sandboxed (wet) side and the
//! host (dry) side. Each side owns one [`Membrane`]; everything that
//! crosses between them is a plain-data [`Action`] or [`CapabilityValue`].
//!
//! No journaling or replay lives here; see `capsule_runtime`.

/// Wire format version. Behavioural changes to the encoding bump it.
pub const WIRE_VERSION: u32 = 1;

pub mod error;
pub mod symbols;
pub mod value;
pub mod object;
pub mod wire;
pub mod registry;
pub mod membrane;

pub use error::MembraneError;
pub use membrane::{Channel, Membrane, RemoteHandle, Side};
pub use object::{NativeFunction, PlainObject, PropertyKey};
pub use symbols::{Symbol, WellKnownSymbol};
pub use value::{Capability, ObjectKey, ObjectRef, Shape, Value};
pub use wire::{Action, CapabilityValue, Literal, RefId, WellKnownCapability, FIRST_DYNAMIC_ID};

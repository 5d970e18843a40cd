//! Capsule membrane — Wire Model
//!
//! Pure data. Wire values and actions are what crosses the membrane and
//! what the journal records; they carry no behaviour.
//!
//! JSON shape (serde):
//!   {"kind":"literal","value":1.0}          value absent = undefined
//!   {"kind":"own-ref","id":16,"shape":"callable"}
//!   {"kind":"bounce-ref","id":16,"shape":"object"}
//!   {"kind":"well-known","name":"iterator"}

use serde::{Deserialize, Deserializer, Serialize};

use crate::symbols::WellKnownSymbol;
use crate::value::Shape;

/// Reference id within one side's namespace.
pub type RefId = u64;

/// First id handed out by a membrane counter. Everything below is reserved
/// for well-known capabilities.
pub const FIRST_DYNAMIC_ID: RefId = 16;

/// Capabilities bound to fixed ids by agreement, without a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownCapability {
    /// The filtered host global, owned by dry.
    Global,
    /// The code-loading channel, owned by wet.
    ControlChannel,
}

impl WellKnownCapability {
    pub fn id(self) -> RefId {
        match self {
            WellKnownCapability::Global => 1,
            WellKnownCapability::ControlChannel => 2,
        }
    }

    pub fn shape(self) -> Shape {
        Shape::Object
    }
}

/// A primitive carried verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

/// A value in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CapabilityValue {
    /// A primitive; `None` is `undefined`.
    Literal {
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "present"
        )]
        value: Option<Literal>,
    },
    /// An id in the sender's namespace.
    OwnRef { id: RefId, shape: Shape },
    /// An id in the receiver's namespace, handed back.
    BounceRef { id: RefId, shape: Shape },
    /// A registered protocol marker.
    WellKnown { name: WellKnownSymbol },
}

// A present `null` must stay `Some(Literal::Null)`; only an absent field is
// undefined.
fn present<'de, D>(deserializer: D) -> Result<Option<Literal>, D::Error>
where
    D: Deserializer<'de>,
{
    Literal::deserialize(deserializer).map(Some)
}

impl CapabilityValue {
    pub fn undefined() -> Self {
        CapabilityValue::Literal { value: None }
    }

    pub fn literal(literal: Literal) -> Self {
        CapabilityValue::Literal {
            value: Some(literal),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            CapabilityValue::OwnRef { .. } | CapabilityValue::BounceRef { .. }
        )
    }
}

/// One meta-operation requested of the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Action {
    Read {
        target: CapabilityValue,
        key: CapabilityValue,
        receiver: CapabilityValue,
    },
    Write {
        target: CapabilityValue,
        key: CapabilityValue,
        value: CapabilityValue,
        receiver: CapabilityValue,
    },
    Has {
        target: CapabilityValue,
        key: CapabilityValue,
    },
    Invoke {
        target: CapabilityValue,
        #[serde(rename = "thisArg")]
        this_arg: CapabilityValue,
        args: Vec<CapabilityValue>,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Read { .. } => "read",
            Action::Write { .. } => "write",
            Action::Has { .. } => "has",
            Action::Invoke { .. } => "invoke",
        }
    }

    pub fn target(&self) -> &CapabilityValue {
        match self {
            Action::Read { target, .. }
            | Action::Write { target, .. }
            | Action::Has { target, .. }
            | Action::Invoke { target, .. } => target,
        }
    }

    /// Every wire value carried by the action, target first.
    pub fn operands(&self) -> Vec<&CapabilityValue> {
        match self {
            Action::Read {
                target,
                key,
                receiver,
            } => vec![target, key, receiver],
            Action::Write {
                target,
                key,
                value,
                receiver,
            } => vec![target, key, value, receiver],
            Action::Has { target, key } => vec![target, key],
            Action::Invoke {
                target,
                this_arg,
                args,
            } => {
                let mut operands = vec![target, this_arg];
                operands.extend(args.iter());
                operands
            }
        }
    }
}

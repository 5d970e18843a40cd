//! Hand-written protobuf types for the durable journal log.
//!
//! Uses prost derive macros for encode/decode without prost-build.
//! Tag numbers are part of the on-disk format; never renumber.

use prost::Message;

// ── Journal Entry ──────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoJournalEntry {
    #[prost(uint64, tag = "1")]
    pub index: u64,
    #[prost(enumeration = "ProtoDirection", tag = "2")]
    pub direction: i32,
    #[prost(oneof = "EntryRecord", tags = "3, 4")]
    pub record: Option<EntryRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ProtoDirection {
    Unspecified = 0,
    TowardWet = 1,
    TowardDry = 2,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum EntryRecord {
    #[prost(message, tag = "3")]
    Action(ProtoAction),
    #[prost(message, tag = "4")]
    Return(ProtoCapabilityValue),
}

// ── Wire Value ─────────────────────────────────────────────────

/// Marker for oneof arms that carry no data.
#[derive(Clone, PartialEq, Message)]
pub struct ProtoUnit {}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoReference {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(bool, tag = "2")]
    pub callable: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoCapabilityValue {
    #[prost(oneof = "ValueKind", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub kind: Option<ValueKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ValueKind {
    #[prost(message, tag = "1")]
    Undefined(ProtoUnit),
    #[prost(message, tag = "2")]
    Null(ProtoUnit),
    #[prost(bool, tag = "3")]
    Boolean(bool),
    #[prost(double, tag = "4")]
    Number(f64),
    #[prost(string, tag = "5")]
    Text(String),
    #[prost(message, tag = "6")]
    OwnRef(ProtoReference),
    #[prost(message, tag = "7")]
    BounceRef(ProtoReference),
    /// Marker name, e.g. "iterator".
    #[prost(string, tag = "8")]
    WellKnown(String),
}

// ── Actions ────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Message)]
pub struct ProtoAction {
    #[prost(oneof = "ActionKind", tags = "1, 2, 3, 4")]
    pub kind: Option<ActionKind>,
}

#[derive(Clone, PartialEq, prost::Oneof)]
pub enum ActionKind {
    #[prost(message, tag = "1")]
    Read(ProtoRead),
    #[prost(message, tag = "2")]
    Write(ProtoWrite),
    #[prost(message, tag = "3")]
    Has(ProtoHas),
    #[prost(message, tag = "4")]
    Invoke(ProtoInvoke),
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoRead {
    #[prost(message, optional, tag = "1")]
    pub target: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "2")]
    pub key: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "3")]
    pub receiver: Option<ProtoCapabilityValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoWrite {
    #[prost(message, optional, tag = "1")]
    pub target: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "2")]
    pub key: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "3")]
    pub value: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "4")]
    pub receiver: Option<ProtoCapabilityValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoHas {
    #[prost(message, optional, tag = "1")]
    pub target: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "2")]
    pub key: Option<ProtoCapabilityValue>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoInvoke {
    #[prost(message, optional, tag = "1")]
    pub target: Option<ProtoCapabilityValue>,
    #[prost(message, optional, tag = "2")]
    pub this_arg: Option<ProtoCapabilityValue>,
    #[prost(message, repeated, tag = "3")]
    pub args: Vec<ProtoCapabilityValue>,
}

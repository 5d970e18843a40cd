//! Proto ↔ Journal conversion bridge.
//!
//! Converts between the protobuf frame types (proto_types.rs) and the
//! journal's serde model. Encoding is total; decoding rejects frames that
//! are missing a required arm or name an unknown marker, reporting them as
//! `InvalidData` so the store surfaces corruption the same way it surfaces
//! a bad frame length.

use std::io;

use capsule_membrane::{Action, CapabilityValue, Literal, Shape, WellKnownSymbol};

use crate::journal::{Direction, JournalEntry, Payload};
use crate::proto_types::*;

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

// ---------------------------------------------------------------------------
// Journal → proto
// ---------------------------------------------------------------------------

pub fn entry_to_proto(entry: &JournalEntry) -> ProtoJournalEntry {
    let direction = match entry.direction {
        Direction::TowardWet => ProtoDirection::TowardWet,
        Direction::TowardDry => ProtoDirection::TowardDry,
    };
    let record = match &entry.payload {
        Payload::Action(action) => EntryRecord::Action(action_to_proto(action)),
        Payload::Return(value) => EntryRecord::Return(value_to_proto(value)),
    };
    ProtoJournalEntry {
        index: entry.index,
        direction: direction as i32,
        record: Some(record),
    }
}

pub fn value_to_proto(value: &CapabilityValue) -> ProtoCapabilityValue {
    let reference = |id: u64, shape: Shape| ProtoReference {
        id,
        callable: shape == Shape::Callable,
    };
    let kind = match value {
        CapabilityValue::Literal { value: None } => ValueKind::Undefined(ProtoUnit {}),
        CapabilityValue::Literal {
            value: Some(literal),
        } => match literal {
            Literal::Null => ValueKind::Null(ProtoUnit {}),
            Literal::Bool(b) => ValueKind::Boolean(*b),
            Literal::Number(n) => ValueKind::Number(*n),
            Literal::String(s) => ValueKind::Text(s.clone()),
        },
        CapabilityValue::OwnRef { id, shape } => ValueKind::OwnRef(reference(*id, *shape)),
        CapabilityValue::BounceRef { id, shape } => ValueKind::BounceRef(reference(*id, *shape)),
        CapabilityValue::WellKnown { name } => ValueKind::WellKnown(name.name().to_string()),
    };
    ProtoCapabilityValue { kind: Some(kind) }
}

pub fn action_to_proto(action: &Action) -> ProtoAction {
    let some = |v: &CapabilityValue| Some(value_to_proto(v));
    let kind = match action {
        Action::Read {
            target,
            key,
            receiver,
        } => ActionKind::Read(ProtoRead {
            target: some(target),
            key: some(key),
            receiver: some(receiver),
        }),
        Action::Write {
            target,
            key,
            value,
            receiver,
        } => ActionKind::Write(ProtoWrite {
            target: some(target),
            key: some(key),
            value: some(value),
            receiver: some(receiver),
        }),
        Action::Has { target, key } => ActionKind::Has(ProtoHas {
            target: some(target),
            key: some(key),
        }),
        Action::Invoke {
            target,
            this_arg,
            args,
        } => ActionKind::Invoke(ProtoInvoke {
            target: some(target),
            this_arg: some(this_arg),
            args: args.iter().map(value_to_proto).collect(),
        }),
    };
    ProtoAction { kind: Some(kind) }
}

// ---------------------------------------------------------------------------
// Proto → journal
// ---------------------------------------------------------------------------

pub fn proto_to_entry(proto: &ProtoJournalEntry) -> io::Result<JournalEntry> {
    let direction = match ProtoDirection::try_from(proto.direction) {
        Ok(ProtoDirection::TowardWet) => Direction::TowardWet,
        Ok(ProtoDirection::TowardDry) => Direction::TowardDry,
        _ => {
            return Err(invalid(format!(
                "journal frame {} has invalid direction {}",
                proto.index, proto.direction
            )))
        }
    };
    let payload = match proto.record.as_ref() {
        Some(EntryRecord::Action(action)) => Payload::Action(proto_to_action(action)?),
        Some(EntryRecord::Return(value)) => Payload::Return(proto_to_value(value)?),
        None => {
            return Err(invalid(format!(
                "journal frame {} carries no record",
                proto.index
            )))
        }
    };
    Ok(JournalEntry::new(proto.index, direction, payload))
}

pub fn proto_to_value(proto: &ProtoCapabilityValue) -> io::Result<CapabilityValue> {
    let shape = |r: &ProtoReference| {
        if r.callable {
            Shape::Callable
        } else {
            Shape::Object
        }
    };
    let kind = proto
        .kind
        .as_ref()
        .ok_or_else(|| invalid("wire value frame carries no kind".to_string()))?;
    Ok(match kind {
        ValueKind::Undefined(_) => CapabilityValue::undefined(),
        ValueKind::Null(_) => CapabilityValue::literal(Literal::Null),
        ValueKind::Boolean(b) => CapabilityValue::literal(Literal::Bool(*b)),
        ValueKind::Number(n) => CapabilityValue::literal(Literal::Number(*n)),
        ValueKind::Text(s) => CapabilityValue::literal(Literal::String(s.clone())),
        ValueKind::OwnRef(r) => CapabilityValue::OwnRef {
            id: r.id,
            shape: shape(r),
        },
        ValueKind::BounceRef(r) => CapabilityValue::BounceRef {
            id: r.id,
            shape: shape(r),
        },
        ValueKind::WellKnown(name) => CapabilityValue::WellKnown {
            name: WellKnownSymbol::from_name(name)
                .ok_or_else(|| invalid(format!("unknown well-known marker {name:?}")))?,
        },
    })
}

fn required(
    field: &Option<ProtoCapabilityValue>,
    name: &str,
) -> io::Result<CapabilityValue> {
    match field {
        Some(value) => proto_to_value(value),
        None => Err(invalid(format!("action frame is missing `{name}`"))),
    }
}

pub fn proto_to_action(proto: &ProtoAction) -> io::Result<Action> {
    let kind = proto
        .kind
        .as_ref()
        .ok_or_else(|| invalid("action frame carries no kind".to_string()))?;
    Ok(match kind {
        ActionKind::Read(read) => Action::Read {
            target: required(&read.target, "target")?,
            key: required(&read.key, "key")?,
            receiver: required(&read.receiver, "receiver")?,
        },
        ActionKind::Write(write) => Action::Write {
            target: required(&write.target, "target")?,
            key: required(&write.key, "key")?,
            value: required(&write.value, "value")?,
            receiver: required(&write.receiver, "receiver")?,
        },
        ActionKind::Has(has) => Action::Has {
            target: required(&has.target, "target")?,
            key: required(&has.key, "key")?,
        },
        ActionKind::Invoke(invoke) => Action::Invoke {
            target: required(&invoke.target, "target")?,
            this_arg: required(&invoke.this_arg, "thisArg")?,
            args: invoke
                .args
                .iter()
                .map(proto_to_value)
                .collect::<io::Result<Vec<_>>>()?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn sample_invoke() -> Action {
        Action::Invoke {
            target: CapabilityValue::BounceRef {
                id: 17,
                shape: Shape::Callable,
            },
            this_arg: CapabilityValue::undefined(),
            args: vec![
                CapabilityValue::literal(Literal::Null),
                CapabilityValue::literal(Literal::String("tick".into())),
                CapabilityValue::OwnRef {
                    id: 20,
                    shape: Shape::Object,
                },
                CapabilityValue::WellKnown {
                    name: WellKnownSymbol::AsyncIterator,
                },
            ],
        }
    }

    #[test]
    fn entry_survives_protobuf_encoding() {
        let entry = JournalEntry::new(5, Direction::TowardDry, Payload::Action(sample_invoke()));
        let bytes = entry_to_proto(&entry).encode_to_vec();
        let decoded = ProtoJournalEntry::decode(bytes.as_slice()).unwrap();
        assert_eq!(proto_to_entry(&decoded).unwrap(), entry);
    }

    #[test]
    fn undefined_and_null_stay_distinct() {
        let undefined = value_to_proto(&CapabilityValue::undefined());
        let null = value_to_proto(&CapabilityValue::literal(Literal::Null));
        assert_ne!(undefined, null);
        assert_eq!(
            proto_to_value(&undefined).unwrap(),
            CapabilityValue::undefined()
        );
    }

    #[test]
    fn missing_record_is_invalid_data() {
        let proto = ProtoJournalEntry {
            index: 0,
            direction: ProtoDirection::TowardWet as i32,
            record: None,
        };
        let err = proto_to_entry(&proto).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unspecified_direction_is_invalid_data() {
        let mut proto = entry_to_proto(&JournalEntry::new(
            0,
            Direction::TowardWet,
            Payload::Return(CapabilityValue::undefined()),
        ));
        proto.direction = ProtoDirection::Unspecified as i32;
        assert!(proto_to_entry(&proto).is_err());
    }

    #[test]
    fn unknown_marker_is_invalid_data() {
        let proto = ProtoCapabilityValue {
            kind: Some(ValueKind::WellKnown("private".to_string())),
        };
        assert!(proto_to_value(&proto).is_err());
    }
}

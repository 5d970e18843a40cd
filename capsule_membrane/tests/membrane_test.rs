//! Membrane protocol tests — two membranes wired directly to each other,
//! exercising translation and identity through the public API only.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rstest::rstest;

use capsule_membrane::{
    Action, CapabilityValue, Channel, Literal, Membrane, MembraneError, NativeFunction,
    PlainObject, Shape, Side, Symbol, Value, WellKnownCapability, WellKnownSymbol,
    FIRST_DYNAMIC_ID,
};

type Slot = Rc<RefCell<Weak<Membrane>>>;

fn forward_to(slot: &Slot) -> Channel {
    let slot = slot.clone();
    Rc::new(move |action: Action| {
        let peer = slot
            .borrow()
            .upgrade()
            .ok_or_else(|| MembraneError::ProtocolViolation("peer dropped".to_string()))?;
        peer.receive_action(&action)
    })
}

fn linked_pair() -> (Rc<Membrane>, Rc<Membrane>) {
    let wet_slot: Slot = Rc::new(RefCell::new(Weak::new()));
    let dry_slot: Slot = Rc::new(RefCell::new(Weak::new()));
    let wet = Membrane::new(Side::Wet, forward_to(&dry_slot));
    let dry = Membrane::new(Side::Dry, forward_to(&wet_slot));
    *wet_slot.borrow_mut() = Rc::downgrade(&wet);
    *dry_slot.borrow_mut() = Rc::downgrade(&dry);
    (wet, dry)
}

#[rstest]
#[case::undefined(Value::Undefined, CapabilityValue::undefined())]
#[case::null(Value::Null, CapabilityValue::literal(Literal::Null))]
#[case::boolean(Value::Bool(false), CapabilityValue::literal(Literal::Bool(false)))]
#[case::number(Value::Number(0.5), CapabilityValue::literal(Literal::Number(0.5)))]
#[case::string(Value::from("ok"), CapabilityValue::literal(Literal::String("ok".into())))]
#[case::marker(
    Value::from(WellKnownSymbol::ToPrimitive),
    CapabilityValue::WellKnown { name: WellKnownSymbol::ToPrimitive }
)]
fn primitives_cross_by_value(#[case] value: Value, #[case] wire: CapabilityValue) {
    let (wet, dry) = linked_pair();
    assert_eq!(dry.serialize(&value).unwrap(), wire);
    assert_eq!(wet.deserialize(&wire).unwrap(), value);
}

#[rstest]
#[case::infinity(Value::Number(f64::INFINITY))]
#[case::nan(Value::Number(f64::NAN))]
#[case::private_symbol(Value::Symbol(Symbol::Unregistered("secret".to_string())))]
fn values_without_encoding_are_refused(#[case] value: Value) {
    let (wet, _dry) = linked_pair();
    assert!(matches!(
        wet.serialize(&value),
        Err(MembraneError::UnsupportedValue(_))
    ));
}

#[test]
fn every_marker_crosses_unchanged() {
    let (wet, dry) = linked_pair();
    for marker in WellKnownSymbol::ALL {
        let wire = wet.serialize(&Value::from(marker)).unwrap();
        assert_eq!(dry.deserialize(&wire).unwrap(), Value::from(marker));
    }
}

#[test]
fn ids_follow_first_serialization_order() {
    let (wet, _dry) = linked_pair();
    let objects: Vec<Value> = (0..3)
        .map(|_| Value::Object(PlainObject::new().into_ref()))
        .collect();
    for (offset, obj) in objects.iter().enumerate().rev() {
        let wire = wet.serialize(obj).unwrap();
        let expected = FIRST_DYNAMIC_ID + (objects.len() - 1 - offset) as u64;
        assert_eq!(
            wire,
            CapabilityValue::OwnRef {
                id: expected,
                shape: Shape::Object
            }
        );
    }
    assert_eq!(wet.local_count(), 3);
}

#[test]
fn callables_cross_as_callable_proxies() {
    let (wet, dry) = linked_pair();
    let add = NativeFunction::new("add", |_this, args| {
        let sum = args.iter().filter_map(Value::as_number).sum::<f64>();
        Ok(Value::Number(sum))
    })
    .into_ref();
    let wire = dry.serialize(&Value::Object(add)).unwrap();
    let proxy = wet.deserialize(&wire).unwrap();
    let proxy = proxy.as_object().unwrap();
    assert_eq!(proxy.shape(), Shape::Callable);
    let result = proxy
        .call(&Value::Undefined, &[Value::from(2), Value::from(3)])
        .unwrap();
    assert_eq!(result, Value::from(5));
    assert_eq!(proxy.get("name").unwrap(), Value::from("add"));
}

#[test]
fn receive_action_reads_well_known_global() {
    let (_wet, dry) = linked_pair();
    let global = PlainObject::new().with("answer", 42).into_ref();
    dry.define_well_known_local(WellKnownCapability::Global, global);
    let target = CapabilityValue::BounceRef {
        id: WellKnownCapability::Global.id(),
        shape: Shape::Object,
    };
    let result = dry
        .receive_action(&Action::Read {
            target: target.clone(),
            key: CapabilityValue::literal(Literal::String("answer".into())),
            receiver: target,
        })
        .unwrap();
    assert_eq!(result, CapabilityValue::literal(Literal::Number(42.0)));
}

#[test]
fn shape_mismatch_on_bounce_is_a_protocol_violation() {
    let (_wet, dry) = linked_pair();
    let obj = Value::Object(PlainObject::new().into_ref());
    let id = match dry.serialize(&obj).unwrap() {
        CapabilityValue::OwnRef { id, .. } => id,
        other => panic!("expected own-ref, got {other:?}"),
    };
    let err = dry
        .deserialize(&CapabilityValue::BounceRef {
            id,
            shape: Shape::Callable,
        })
        .unwrap_err();
    assert!(matches!(err, MembraneError::ProtocolViolation(_)));
}

#[test]
fn wire_form_looks_up_without_registering() {
    let (wet, dry) = linked_pair();
    let obj = PlainObject::new().into_ref();
    assert_eq!(dry.wire_form(&obj), None);
    assert_eq!(dry.local_count(), 0);

    let wire = dry.serialize(&Value::Object(obj.clone())).unwrap();
    assert_eq!(dry.wire_form(&obj), Some(wire.clone()));

    let proxy = wet.deserialize(&wire).unwrap();
    assert_eq!(
        wet.wire_form(proxy.as_object().unwrap()),
        Some(CapabilityValue::BounceRef {
            id: FIRST_DYNAMIC_ID,
            shape: Shape::Object
        })
    );
}

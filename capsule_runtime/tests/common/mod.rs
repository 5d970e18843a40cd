//! Shared fixtures: a host world with a recording console, and a set of
//! native modules the sandbox can load.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use capsule_membrane::{MembraneError, NativeFunction, ObjectRef, PlainObject, Value};
use capsule_runtime::{NativeModuleEvaluator, RuntimeSettings, SandboxConfig};

/// Host globals plus what the host observed through them.
pub struct Host {
    pub globals: ObjectRef,
    pub log: Rc<RefCell<Vec<Value>>>,
    pub each_calls: Rc<Cell<u32>>,
}

pub fn host() -> Host {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    let console = PlainObject::new()
        .with(
            "log",
            NativeFunction::new("log", move |_this, args| {
                sink.borrow_mut()
                    .push(args.first().cloned().unwrap_or(Value::Undefined));
                Ok(Value::Undefined)
            })
            .into_ref(),
        )
        .into_ref();

    // each(callback): calls callback(10) and callback(20), sums the results
    let each_calls = Rc::new(Cell::new(0));
    let counter = each_calls.clone();
    let each = NativeFunction::new("each", move |_this, args| {
        counter.set(counter.get() + 1);
        let callback = args
            .first()
            .and_then(Value::as_object)
            .ok_or_else(|| MembraneError::Fault("each expects a callback".to_string()))?;
        let mut sum = 0.0;
        for n in [10, 20] {
            sum += callback
                .call(&Value::Undefined, &[Value::from(n)])?
                .as_number()
                .unwrap_or(0.0);
        }
        Ok(Value::Number(sum))
    });

    let globals = PlainObject::new()
        .with("console", console)
        .with("version", "1.0")
        .with("each", each.into_ref())
        .into_ref();

    Host {
        globals,
        log,
        each_calls,
    }
}

pub fn logged_numbers(host: &Host) -> Vec<f64> {
    host.log
        .borrow()
        .iter()
        .filter_map(Value::as_number)
        .collect()
}

fn fault(message: &str) -> MembraneError {
    MembraneError::Fault(message.to_string())
}

fn exports(entries: Vec<(&str, Value)>) -> Value {
    let mut obj = PlainObject::new();
    for (key, value) in entries {
        obj = obj.with(key, value);
    }
    Value::Object(obj.into_ref())
}

/// `next()` counts up and logs every value through the host console,
/// looking the console up afresh on each call.
fn counter_module(scope: &ObjectRef) -> Result<Value, MembraneError> {
    let scope = scope.clone();
    let count = Rc::new(Cell::new(0.0));
    let next = NativeFunction::new("next", move |_this, _args| {
        count.set(count.get() + 1.0);
        let console = scope.get("console")?;
        let console = console.as_object().ok_or_else(|| fault("no console"))?;
        console.call_method("log", &[Value::Number(count.get())])?;
        Ok(Value::Number(count.get()))
    });
    Ok(exports(vec![("next", next.into_ref().into())]))
}

/// `next()` logs and returns the next multiple of 83/9.
fn ratio_module(scope: &ObjectRef) -> Result<Value, MembraneError> {
    let scope = scope.clone();
    let count = Rc::new(Cell::new(0.0));
    let next = NativeFunction::new("next", move |_this, _args| {
        count.set(count.get() + 1.0);
        let value = count.get() * 83.0 / 9.0;
        let console = scope.get("console")?;
        let console = console.as_object().ok_or_else(|| fault("no console"))?;
        console.call_method("log", &[Value::Number(value)])?;
        Ok(Value::Number(value))
    });
    Ok(exports(vec![("next", next.into_ref().into())]))
}

/// `next()` counts up without touching the host.
fn pure_counter_module(_scope: &ObjectRef) -> Result<Value, MembraneError> {
    let count = Rc::new(Cell::new(0.0));
    let next = NativeFunction::new("next", move |_this, _args| {
        count.set(count.get() + 1.0);
        Ok(Value::Number(count.get()))
    });
    Ok(exports(vec![("next", next.into_ref().into())]))
}

/// Like the counter, but keeps the console handle from its first lookup.
fn retaining_counter_module(scope: &ObjectRef) -> Result<Value, MembraneError> {
    let scope = scope.clone();
    let count = Rc::new(Cell::new(0.0));
    let console: Rc<RefCell<Option<ObjectRef>>> = Rc::new(RefCell::new(None));
    let next = NativeFunction::new("next", move |_this, _args| {
        count.set(count.get() + 1.0);
        let cached = console.borrow().clone();
        let handle = match cached {
            Some(handle) => handle,
            None => {
                let looked_up = scope.get("console")?;
                let handle = looked_up.as_object().cloned().ok_or_else(|| fault("no console"))?;
                *console.borrow_mut() = Some(handle.clone());
                handle
            }
        };
        handle.call_method("log", &[Value::Number(count.get())])?;
        Ok(Value::Number(count.get()))
    });
    Ok(exports(vec![("next", next.into_ref().into())]))
}

/// Pokes at the filtered global and reports what it saw.
fn meddler_module(scope: &ObjectRef) -> Result<Value, MembraneError> {
    let wrote = scope.set("version", "hacked")?;
    let has_missing = scope.has("definitely-not-there")?;
    let version = scope.get("version")?;
    Ok(exports(vec![
        ("wrote", wrote.into()),
        ("hasMissing", has_missing.into()),
        ("version", version),
    ]))
}

/// `run()` hands a sandbox callback to the host's `each`; returns the sum
/// plus how many times the callback has run in total.
fn visitor_module(scope: &ObjectRef) -> Result<Value, MembraneError> {
    let scope = scope.clone();
    let visits = Rc::new(Cell::new(0.0));
    let seen = visits.clone();
    let double = NativeFunction::new("double", move |_this, args| {
        seen.set(seen.get() + 1.0);
        let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
        Ok(Value::Number(n * 2.0))
    })
    .into_ref();
    let run = NativeFunction::new("run", move |_this, _args| {
        let each = scope.get("each")?;
        let each = each.as_object().ok_or_else(|| fault("no each"))?;
        let sum = each
            .call(&Value::Undefined, &[Value::Object(double.clone())])?
            .as_number()
            .unwrap_or(0.0);
        Ok(exports(vec![
            ("sum", sum.into()),
            ("visits", visits.get().into()),
        ]))
    });
    Ok(exports(vec![("run", run.into_ref().into())]))
}

/// `trigger()` always fails.
fn faulty_module(_scope: &ObjectRef) -> Result<Value, MembraneError> {
    let trigger = NativeFunction::new("trigger", |_this, _args| Err(fault("boom")));
    Ok(exports(vec![("trigger", trigger.into_ref().into())]))
}

pub fn modules() -> NativeModuleEvaluator {
    NativeModuleEvaluator::new()
        .register("counter", counter_module)
        .register("pure-counter", pure_counter_module)
        .register("ratio", ratio_module)
        .register("retaining-counter", retaining_counter_module)
        .register("meddler", meddler_module)
        .register("visitor", visitor_module)
        .register("faulty", faulty_module)
}

pub fn config(host: &Host) -> SandboxConfig {
    SandboxConfig::new(host.globals.clone(), modules().factory())
}

pub fn config_with(host: &Host, settings: RuntimeSettings) -> SandboxConfig {
    config(host).with_settings(settings)
}

/// Read an export off an exports object.
pub fn export(exports: &Value, name: &str) -> ObjectRef {
    exports
        .as_object()
        .expect("exports object")
        .get(name)
        .expect("export read")
        .as_object()
        .cloned()
        .expect("export is an object")
}

pub fn call0(function: &ObjectRef) -> Result<Value, MembraneError> {
    function.call(&Value::Undefined, &[])
}

pub fn captures(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

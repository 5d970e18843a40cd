//! Sandbox orchestrator — owns both membranes and the journal.
//!
//! Every action crossing the membrane, nested or not, passes through
//! `SandboxCore::dispatch`, which is the outbound channel of both sides:
//!   - Live:      record action, dispatch for real, record return
//!   - Replaying: host calls are re-driven against the rebuilt sandbox by
//!                `replay`; calls out to the host are answered from the
//!                journal without re-invoking the host
//!
//! A Live dispatch that fails leaves an unanswered action in the journal.
//! The sandbox is poisoned from then on: every dispatch and snapshot is
//! refused.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace, warn};

use capsule_membrane::{
    Action, Capability, CapabilityValue, Channel, MembraneError, Membrane, NativeFunction,
    ObjectRef, PlainObject, Side, Value, WellKnownCapability, FIRST_DYNAMIC_ID,
};

use crate::evaluator::{Evaluator, EvaluatorFactory};
use crate::journal::{Direction, Journal, JournalEntry, Payload};
use crate::journal_store::JournalStore;
use crate::replay;
use crate::settings::RuntimeSettings;
use crate::snapshot_codec::{decode_blob, encode_blob, SnapshotBlob, SnapshotError};

/// Whether dispatches are performed or answered from the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Live,
    Replaying,
}

/// What a sandbox is built from. Restoring needs the same globals and an
/// evaluator factory that builds the same modules.
#[derive(Clone)]
pub struct SandboxConfig {
    /// Host object the filtered global reads through to.
    pub globals: ObjectRef,
    pub evaluator: EvaluatorFactory,
    pub settings: RuntimeSettings,
}

impl SandboxConfig {
    pub fn new(globals: ObjectRef, evaluator: EvaluatorFactory) -> Self {
        Self {
            globals,
            evaluator,
            settings: RuntimeSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }
}

// ---------------------------------------------------------------------------
// Global filter
// ---------------------------------------------------------------------------

/// The only view of the host the sandbox starts with. Reads pass through,
/// writes are dropped, membership always answers true.
struct GlobalFilter {
    globals: ObjectRef,
}

impl Capability for GlobalFilter {
    fn get(&self, key: &Value, _receiver: &Value) -> Result<Value, MembraneError> {
        self.globals
            .capability()
            .get(key, &Value::Object(self.globals.clone()))
    }

    fn set(&self, _key: &Value, _value: Value, _receiver: &Value) -> Result<bool, MembraneError> {
        Ok(false)
    }

    fn has(&self, _key: &Value) -> Result<bool, MembraneError> {
        Ok(true)
    }
}

/// Wet-side control channel: `evaluate(source, name)` runs the evaluator
/// with the sandbox's global proxy as scope.
fn control_channel(evaluator: Rc<dyn Evaluator>, scope: ObjectRef) -> ObjectRef {
    let evaluate = NativeFunction::new("evaluate", move |_this, args| {
        let source = args.first().and_then(Value::as_str).ok_or_else(|| {
            MembraneError::Fault("evaluate expects source text as its first argument".to_string())
        })?;
        let name = args.get(1).and_then(Value::as_str).unwrap_or("anonymous");
        evaluator.evaluate(source, name, &scope)
    });
    PlainObject::new()
        .with("evaluate", evaluate.into_ref())
        .into_ref()
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

pub(crate) struct SandboxCore {
    pub(crate) wet: Rc<Membrane>,
    pub(crate) dry: Rc<Membrane>,
    pub(crate) journal: RefCell<Journal>,
    pub(crate) mode: Cell<Mode>,
    poisoned: RefCell<Option<String>>,
    store: RefCell<Option<JournalStore>>,
    pub(crate) settings: RuntimeSettings,
    /// Dry-side proxy for the wet control channel.
    control_channel: ObjectRef,
    /// Dry-side filtered global.
    global: ObjectRef,
}

fn outbound(core: &Weak<SandboxCore>, direction: Direction) -> Channel {
    let core = core.clone();
    Rc::new(move |action: Action| {
        let core = core.upgrade().ok_or_else(|| {
            MembraneError::ProtocolViolation("sandbox was dropped".to_string())
        })?;
        core.dispatch(direction, action)
    })
}

impl SandboxCore {
    fn build(config: &SandboxConfig, journal: Journal, mode: Mode) -> Rc<Self> {
        let evaluator = (config.evaluator)();
        Rc::new_cyclic(|this: &Weak<SandboxCore>| {
            let wet = Membrane::new(Side::Wet, outbound(this, Direction::TowardDry));
            let dry = Membrane::new(Side::Dry, outbound(this, Direction::TowardWet));

            let global = ObjectRef::new(GlobalFilter {
                globals: config.globals.clone(),
            });
            dry.define_well_known_local(WellKnownCapability::Global, global.clone());
            let scope = wet.define_well_known_remote(WellKnownCapability::Global);

            wet.define_well_known_local(
                WellKnownCapability::ControlChannel,
                control_channel(evaluator, scope),
            );
            let control_channel = dry.define_well_known_remote(WellKnownCapability::ControlChannel);

            SandboxCore {
                wet,
                dry,
                journal: RefCell::new(journal),
                mode: Cell::new(mode),
                poisoned: RefCell::new(None),
                store: RefCell::new(None),
                settings: config.settings.clone(),
                control_channel,
                global,
            }
        })
    }

    /// Outbound channel of both membranes.
    fn dispatch(&self, direction: Direction, action: Action) -> Result<CapabilityValue, MembraneError> {
        self.ensure_healthy()?;
        match (self.mode.get(), direction) {
            (Mode::Live, _) => self.dispatch_live(direction, action),
            (Mode::Replaying, Direction::TowardDry) => replay::short_circuit_toward_dry(self, action),
            (Mode::Replaying, Direction::TowardWet) => Err(MembraneError::ProtocolViolation(
                "host reached into the sandbox while it was replaying".to_string(),
            )),
        }
    }

    fn dispatch_live(
        &self,
        direction: Direction,
        action: Action,
    ) -> Result<CapabilityValue, MembraneError> {
        let receiver = match direction {
            Direction::TowardWet => &self.wet,
            Direction::TowardDry => &self.dry,
        };
        let outcome = self
            .record(direction, Payload::Action(action.clone()))
            .and_then(|()| receiver.receive_action(&action))
            .and_then(|result| {
                self.record(direction, Payload::Return(result.clone()))?;
                Ok(result)
            });
        if let Err(err) = &outcome {
            self.poison(err);
        }
        outcome
    }

    fn record(&self, direction: Direction, payload: Payload) -> Result<(), MembraneError> {
        let entry = self.journal.borrow_mut().append(direction, payload);
        if self.settings.trace_journal {
            trace!(
                index = entry.index,
                direction = ?entry.direction,
                phase = ?entry.phase,
                "journal append"
            );
        }
        if let Some(store) = self.store.borrow_mut().as_mut() {
            store.append_entry(&entry).map_err(|e| {
                MembraneError::Persistence(format!("{}: {e}", store.path().display()))
            })?;
        }
        Ok(())
    }

    fn poison(&self, err: &MembraneError) {
        let mut poisoned = self.poisoned.borrow_mut();
        if poisoned.is_none() {
            warn!(error = %err, "sandbox poisoned by failed dispatch");
            *poisoned = Some(err.to_string());
        }
    }

    fn ensure_healthy(&self) -> Result<(), MembraneError> {
        match self.poisoned.borrow().as_ref() {
            Some(reason) => Err(MembraneError::ProtocolViolation(format!(
                "sandbox is poisoned: {reason}"
            ))),
            None => Ok(()),
        }
    }

    /// Open the configured store, check it holds a prefix of the journal,
    /// and back-fill whatever it is missing.
    fn attach_store(&self) -> Result<(), MembraneError> {
        let Some(path) = self.settings.journal_path.as_ref() else {
            return Ok(());
        };
        let persistence = |e: std::io::Error| {
            MembraneError::Persistence(format!("{}: {e}", path.display()))
        };
        let mut store = JournalStore::open(path).map_err(persistence)?;
        let stored = store.load_all_entries().map_err(persistence)?;
        let journal = self.journal.borrow();
        let entries = journal.entries();
        if stored.len() > entries.len() || stored[..] != entries[..stored.len()] {
            return Err(MembraneError::Persistence(format!(
                "{}: stored journal does not match this sandbox",
                path.display()
            )));
        }
        let written = store.sync_from(entries).map_err(persistence)?;
        debug!(path = %path.display(), written, "journal store attached");
        drop(journal);
        *self.store.borrow_mut() = Some(store);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// A sandboxed world and the host's handle on it.
pub struct Sandbox {
    core: Rc<SandboxCore>,
}

/// Result of a restore: the rebuilt sandbox, live again, and the named
/// captures resolved to host-side handles.
#[derive(Debug)]
pub struct Restored {
    pub sandbox: Sandbox,
    pub captures: BTreeMap<String, Value>,
}

impl Sandbox {
    pub fn new(config: SandboxConfig) -> Result<Self, MembraneError> {
        let core = SandboxCore::build(&config, Journal::new(), Mode::Live);
        core.attach_store()?;
        debug!("sandbox created");
        Ok(Self { core })
    }

    /// Load `source` into the sandbox as module `name` and return its
    /// exports as seen from the host.
    pub fn evaluate(&self, source: &str, name: &str) -> Result<Value, MembraneError> {
        let channel = &self.core.control_channel;
        let evaluate = channel.get("evaluate")?;
        let evaluate = evaluate.as_object().ok_or_else(|| {
            MembraneError::ProtocolViolation(
                "control channel did not yield a callable evaluate".to_string(),
            )
        })?;
        evaluate.call(
            &Value::Object(channel.clone()),
            &[Value::from(source), Value::from(name)],
        )
    }

    /// Package the journal and the named values into a blob. The sandbox
    /// keeps running afterwards.
    ///
    /// Captures may be primitives, sandbox objects, or the global. Any other
    /// host object is refused: a restore has no way to name it again.
    pub fn capture(&self, captures: &BTreeMap<String, Value>) -> Result<SnapshotBlob, MembraneError> {
        self.core.ensure_healthy()?;
        if self.core.mode.get() != Mode::Live {
            return Err(MembraneError::ProtocolViolation(
                "cannot snapshot a sandbox that is replaying".to_string(),
            ));
        }
        let open = self.core.journal.borrow().open_actions();
        if open > 0 {
            return Err(MembraneError::ProtocolViolation(format!(
                "cannot snapshot with {open} action(s) still in flight"
            )));
        }
        let wire = captures
            .iter()
            .map(|(name, value)| -> Result<_, MembraneError> {
                Ok((name.clone(), self.capture_value(name, value)?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        let journal = self.core.journal.borrow().entries().to_vec();
        debug!(entries = journal.len(), captures = wire.len(), "snapshot captured");
        Ok(SnapshotBlob::new(journal, wire))
    }

    fn capture_value(&self, name: &str, value: &Value) -> Result<CapabilityValue, MembraneError> {
        if let Value::Object(obj) = value {
            match self.core.dry.wire_form(obj) {
                Some(CapabilityValue::BounceRef { .. }) => {}
                Some(CapabilityValue::OwnRef { id, .. }) if id < FIRST_DYNAMIC_ID => {}
                _ => {
                    return Err(MembraneError::UnsupportedValue(format!(
                        "capture {name:?} is a host object; only the global survives a restore"
                    )))
                }
            }
        }
        self.core.dry.serialize(value)
    }

    pub fn take_snapshot(&self, captures: &BTreeMap<String, Value>) -> Result<Vec<u8>, SnapshotError> {
        encode_blob(&self.capture(captures)?)
    }

    /// Rebuild a sandbox from a snapshot blob.
    pub fn restore(blob: &[u8], config: SandboxConfig) -> Result<Restored, SnapshotError> {
        let blob = decode_blob(blob)?;
        Ok(Self::restore_from_parts(blob.journal, blob.captures, config)?)
    }

    /// Rebuild a sandbox from a journal and separately kept captures.
    pub fn restore_from_parts(
        journal: Vec<JournalEntry>,
        captures: BTreeMap<String, CapabilityValue>,
        config: SandboxConfig,
    ) -> Result<Restored, MembraneError> {
        let journal = Journal::from_entries(journal)?;
        let core = SandboxCore::build(&config, journal, Mode::Replaying);

        replay::replay_journal(&core)?;
        let captures = captures
            .iter()
            .map(|(name, wire)| -> Result<_, MembraneError> {
                Ok((name.clone(), replay::resolve_capture(&core, wire)?))
            })
            .collect::<Result<BTreeMap<_, _>, _>>()?;
        core.attach_store()?;

        debug!(
            entries = core.journal.borrow().len(),
            captures = captures.len(),
            "sandbox restored"
        );
        Ok(Restored {
            sandbox: Sandbox { core },
            captures,
        })
    }

    /// The filtered global as the host holds it.
    pub fn global(&self) -> ObjectRef {
        self.core.global.clone()
    }

    pub fn journal(&self) -> Vec<JournalEntry> {
        self.core.journal.borrow().entries().to_vec()
    }

    pub fn journal_len(&self) -> usize {
        self.core.journal.borrow().len()
    }

    pub fn mode(&self) -> Mode {
        self.core.mode.get()
    }

    pub fn is_poisoned(&self) -> bool {
        self.core.poisoned.borrow().is_some()
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("mode", &self.mode())
            .field("journal_len", &self.journal_len())
            .field("poisoned", &self.core.poisoned.borrow())
            .finish()
    }
}

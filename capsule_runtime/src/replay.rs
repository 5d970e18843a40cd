//! Deterministic replay — rebuild a sandbox from its journal.
//!
//! The journal is walked from the start. Top-level entries are host calls
//! into the sandbox; each is re-executed against the fresh wet membrane and
//! its recorded return verified. Calls the sandbox makes back out to the host
//! are never performed: the recorded return is handed back verbatim. If the
//! host answered a call by calling into the sandbox again, those nested
//! calls sit between the outbound action and its return and are re-driven
//! the same way before the return is consumed.
//!
//! Any disagreement between what the sandbox does now and what the journal
//! says it did is a `ReplayMismatch` and aborts the restore.
//!
//! The rebuilt host side starts numbering afresh, so a deterministic
//! continuation hands the same host objects out under the same ids again.
//! Host proxies the sandbox rebuilt from recorded returns stay dangling
//! until their id is bound again; using one before that fails closed.

use tracing::{debug, trace};

use capsule_membrane::{Action, CapabilityValue, MembraneError, Value};

use crate::journal::{describe, Direction, JournalEntry, Payload};
use crate::sandbox::{Mode, SandboxCore};

/// Drive the whole journal, then switch the sandbox to Live.
pub(crate) fn replay_journal(core: &SandboxCore) -> Result<(), MembraneError> {
    debug!(entries = core.journal.borrow().len(), "replaying journal");
    core.journal.borrow_mut().rewind();

    loop {
        let next = core.journal.borrow().peek().cloned();
        let Some(entry) = next else { break };
        match entry.payload {
            Payload::Action(action) if entry.direction == Direction::TowardWet => {
                redrive_toward_wet(core, &action)?;
            }
            payload => {
                return Err(MembraneError::ReplayMismatch {
                    index: entry.index,
                    expected: "a host call toward wet".to_string(),
                    recorded: describe(entry.direction, &payload),
                })
            }
        }
    }

    core.mode.set(Mode::Live);
    debug!("replay complete");
    Ok(())
}

/// Consume a recorded host call, perform it against wet, and check the
/// result against the recorded return.
fn redrive_toward_wet(core: &SandboxCore, action: &Action) -> Result<(), MembraneError> {
    consume(core, Direction::TowardWet, &Payload::Action(action.clone()))?;
    let result = core.wet.receive_action(action)?;
    consume(core, Direction::TowardWet, &Payload::Return(result))
}

/// Answer a sandbox call to the host from the journal.
pub(crate) fn short_circuit_toward_dry(
    core: &SandboxCore,
    action: Action,
) -> Result<CapabilityValue, MembraneError> {
    consume(core, Direction::TowardDry, &Payload::Action(action))?;

    loop {
        let next = core.journal.borrow().peek().cloned();
        match next {
            Some(JournalEntry {
                direction: Direction::TowardWet,
                payload: Payload::Action(nested),
                ..
            }) => redrive_toward_wet(core, &nested)?,
            Some(JournalEntry {
                index,
                direction: Direction::TowardDry,
                payload: Payload::Return(value),
                ..
            }) => {
                core.journal.borrow_mut().advance();
                if core.settings.trace_journal {
                    trace!(index, "replayed host return");
                }
                return Ok(value);
            }
            Some(entry) => {
                return Err(MembraneError::ReplayMismatch {
                    index: entry.index,
                    expected: "a host return or nested call toward wet".to_string(),
                    recorded: describe(entry.direction, &entry.payload),
                })
            }
            None => {
                return Err(MembraneError::ReplayMismatch {
                    index: core.journal.borrow().len() as u64,
                    expected: "a host return".to_string(),
                    recorded: "end of journal".to_string(),
                })
            }
        }
    }
}

fn consume(core: &SandboxCore, direction: Direction, payload: &Payload) -> Result<(), MembraneError> {
    let mut journal = core.journal.borrow_mut();
    let index = journal.cursor();
    journal.expect_next(direction, payload)?;
    if core.settings.trace_journal {
        trace!(index, ?direction, phase = ?payload.phase(), "replayed entry");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Captures
// ---------------------------------------------------------------------------

/// Turn a capture recorded from the host side into a live host handle on
/// the rebuilt sandbox.
pub(crate) fn resolve_capture(
    core: &SandboxCore,
    wire: &CapabilityValue,
) -> Result<Value, MembraneError> {
    let inside = core.wet.deserialize(wire)?;
    let outbound = core.wet.serialize(&inside)?;
    core.dry.deserialize(&outbound)
}

//! Interaction journal — append-only record of every cross-side action.
//!
//! Rules:
//!   - Only the orchestrator appends, strictly in call order
//!   - Index == position; never mutated, never reordered
//!   - Every action is answered by exactly one return in the same
//!     direction; nested pairs are properly bracketed
//!   - Top-level entries are host calls into the sandbox (toward wet)
//!
//! During replay the same structure doubles as the cursor that recorded
//! entries are consumed from.

use serde::{Deserialize, Serialize};

use capsule_membrane::{Action, CapabilityValue, MembraneError};

/// Which side an entry travels toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    TowardWet,
    TowardDry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Action,
    Return,
}

/// Entry body: the action sent, or the value it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Action(Action),
    Return(CapabilityValue),
}

impl Payload {
    pub fn phase(&self) -> Phase {
        match self {
            Payload::Action(_) => Phase::Action,
            Payload::Return(_) => Phase::Return,
        }
    }
}

/// A single journal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JournalEntry {
    pub index: u64,
    pub direction: Direction,
    pub phase: Phase,
    pub payload: Payload,
}

impl JournalEntry {
    pub fn new(index: u64, direction: Direction, payload: Payload) -> Self {
        Self {
            index,
            direction,
            phase: payload.phase(),
            payload,
        }
    }

    fn matches(&self, direction: Direction, payload: &Payload) -> bool {
        self.direction == direction && self.phase == payload.phase() && self.payload == *payload
    }
}

/// Ordered journal plus the replay cursor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    cursor: usize,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt recorded entries after checking they are well formed.
    pub fn from_entries(entries: Vec<JournalEntry>) -> Result<Self, MembraneError> {
        validate_entries(&entries)?;
        Ok(Self { entries, cursor: 0 })
    }

    /// Append at the next index and return a copy of the new entry.
    pub fn append(&mut self, direction: Direction, payload: Payload) -> JournalEntry {
        let entry = JournalEntry::new(self.entries.len() as u64, direction, payload);
        self.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Actions recorded so far that have no return yet.
    pub fn open_actions(&self) -> usize {
        self.entries.iter().fold(0usize, |open, entry| match entry.phase {
            Phase::Action => open + 1,
            Phase::Return => open.saturating_sub(1),
        })
    }

    // ── Replay cursor ──────────────────────────────────────────────

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.entries.len()
    }

    /// Next unconsumed entry, without consuming it.
    pub fn peek(&self) -> Option<&JournalEntry> {
        self.entries.get(self.cursor)
    }

    /// Consume the next entry unconditionally.
    pub fn advance(&mut self) -> Option<JournalEntry> {
        let entry = self.entries.get(self.cursor).cloned();
        if entry.is_some() {
            self.cursor += 1;
        }
        entry
    }

    /// Consume the next entry, which must be exactly `(direction, payload)`.
    pub fn expect_next(
        &mut self,
        direction: Direction,
        payload: &Payload,
    ) -> Result<(), MembraneError> {
        let index = self.cursor as u64;
        match self.entries.get(self.cursor) {
            Some(entry) if entry.matches(direction, payload) => {
                self.cursor += 1;
                Ok(())
            }
            Some(entry) => Err(MembraneError::ReplayMismatch {
                index,
                expected: describe(direction, payload),
                recorded: describe(entry.direction, &entry.payload),
            }),
            None => Err(MembraneError::ReplayMismatch {
                index,
                expected: describe(direction, payload),
                recorded: "end of journal".to_string(),
            }),
        }
    }
}

/// Human-readable rendering of an entry, for mismatch reports.
pub fn describe(direction: Direction, payload: &Payload) -> String {
    let body = serde_json::to_string(payload).unwrap_or_else(|e| format!("<{e}>"));
    format!("{direction:?} {:?} {body}", payload.phase())
}

/// Check indexing, phase/payload agreement, and action/return bracketing.
pub fn validate_entries(entries: &[JournalEntry]) -> Result<(), MembraneError> {
    let mut open: Vec<Direction> = Vec::new();

    for (position, entry) in entries.iter().enumerate() {
        if entry.index != position as u64 {
            return Err(MembraneError::ProtocolViolation(format!(
                "journal entry at position {position} carries index {}",
                entry.index
            )));
        }
        if entry.phase != entry.payload.phase() {
            return Err(MembraneError::ProtocolViolation(format!(
                "journal entry {position} is tagged {:?} but carries a {:?} payload",
                entry.phase,
                entry.payload.phase()
            )));
        }
        match entry.phase {
            Phase::Action => {
                if open.is_empty() && entry.direction != Direction::TowardWet {
                    return Err(MembraneError::ProtocolViolation(format!(
                        "journal entry {position}: top-level actions must travel toward wet"
                    )));
                }
                open.push(entry.direction);
            }
            Phase::Return => match open.pop() {
                Some(direction) if direction == entry.direction => {}
                Some(direction) => {
                    return Err(MembraneError::ProtocolViolation(format!(
                        "journal entry {position} returns {:?} but the open action went {direction:?}",
                        entry.direction
                    )))
                }
                None => {
                    return Err(MembraneError::ProtocolViolation(format!(
                        "journal entry {position} returns with no open action"
                    )))
                }
            },
        }
    }

    if !open.is_empty() {
        return Err(MembraneError::ProtocolViolation(format!(
            "journal ends with {} unanswered action(s)",
            open.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_membrane::{Literal, Shape};

    fn read_global(key: &str) -> Action {
        let global = CapabilityValue::BounceRef {
            id: 1,
            shape: Shape::Object,
        };
        Action::Read {
            target: global.clone(),
            key: CapabilityValue::literal(Literal::String(key.to_string())),
            receiver: global,
        }
    }

    fn number(n: f64) -> Payload {
        Payload::Return(CapabilityValue::literal(Literal::Number(n)))
    }

    fn nested_journal() -> Journal {
        let mut journal = Journal::new();
        journal.append(Direction::TowardWet, Payload::Action(read_global("run")));
        journal.append(Direction::TowardDry, Payload::Action(read_global("clock")));
        journal.append(Direction::TowardDry, number(7.0));
        journal.append(Direction::TowardWet, number(1.0));
        journal
    }

    #[test]
    fn append_assigns_positional_indexes() {
        let journal = nested_journal();
        let indexes: Vec<u64> = journal.entries().iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
        assert_eq!(journal.entries()[2].phase, Phase::Return);
    }

    #[test]
    fn nested_pairs_validate() {
        let journal = nested_journal();
        validate_entries(journal.entries()).unwrap();
    }

    #[test]
    fn unanswered_action_is_rejected() {
        let journal = nested_journal();
        let err = validate_entries(&journal.entries()[..3]).unwrap_err();
        assert!(matches!(err, MembraneError::ProtocolViolation(_)));
    }

    #[test]
    fn open_actions_track_nesting_depth() {
        let mut partial = Journal::new();
        let mut depths = vec![partial.open_actions()];
        for entry in nested_journal().entries() {
            partial.append(entry.direction, entry.payload.clone());
            depths.push(partial.open_actions());
        }
        assert_eq!(depths, vec![0, 1, 2, 1, 0]);
    }

    #[test]
    fn crossed_directions_are_rejected() {
        let mut entries = nested_journal().entries().to_vec();
        entries[2].direction = Direction::TowardWet;
        assert!(validate_entries(&entries).is_err());
    }

    #[test]
    fn top_level_toward_dry_is_rejected() {
        let mut journal = Journal::new();
        journal.append(Direction::TowardDry, Payload::Action(read_global("x")));
        journal.append(Direction::TowardDry, number(0.0));
        assert!(validate_entries(journal.entries()).is_err());
    }

    #[test]
    fn expect_next_consumes_matching_entries() {
        let mut journal = nested_journal();
        journal
            .expect_next(Direction::TowardWet, &Payload::Action(read_global("run")))
            .unwrap();
        assert_eq!(journal.cursor(), 1);
    }

    #[test]
    fn expect_next_reports_mismatch_with_index() {
        let mut journal = nested_journal();
        let err = journal
            .expect_next(Direction::TowardWet, &Payload::Action(read_global("walk")))
            .unwrap_err();
        match err {
            MembraneError::ReplayMismatch { index, .. } => assert_eq!(index, 0),
            other => panic!("expected ReplayMismatch, got {other:?}"),
        }
        assert_eq!(journal.cursor(), 0);
    }

    #[test]
    fn expect_past_end_is_a_mismatch() {
        let mut journal = Journal::new();
        let err = journal
            .expect_next(Direction::TowardWet, &number(1.0))
            .unwrap_err();
        assert!(matches!(err, MembraneError::ReplayMismatch { .. }));
    }

    #[test]
    fn entries_serialize_flat() {
        let journal = nested_journal();
        let json = serde_json::to_value(&journal.entries()[3]).unwrap();
        assert_eq!(json["direction"], "towardWet");
        assert_eq!(json["phase"], "return");
        assert_eq!(json["payload"]["kind"], "literal");
        let back: JournalEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, journal.entries()[3]);
    }
}

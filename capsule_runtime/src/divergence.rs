//! Journal divergence — where two recorded runs stopped agreeing.
//!
//! Used to diagnose replay mismatches: compare the journal a sandbox
//! recorded against the one a second run (or a restored sandbox) produced.

use crate::journal::{describe, JournalEntry};

/// Entries that first differ, rendered for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDivergence {
    pub index: u64,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalDivergence {
    /// Number of leading entries both journals share.
    pub common_prefix: usize,
    pub left_len: usize,
    pub right_len: usize,
    /// First differing pair, if the journals disagree before either ends.
    pub first_divergence: Option<EntryDivergence>,
}

impl JournalDivergence {
    pub fn is_identical(&self) -> bool {
        self.first_divergence.is_none() && self.left_len == self.right_len
    }

    /// One journal is a strict extension of the other.
    pub fn is_prefix(&self) -> bool {
        self.first_divergence.is_none()
    }
}

pub fn compare_journals(left: &[JournalEntry], right: &[JournalEntry]) -> JournalDivergence {
    let common_prefix = left
        .iter()
        .zip(right)
        .take_while(|(a, b)| a == b)
        .count();

    let first_divergence = match (left.get(common_prefix), right.get(common_prefix)) {
        (Some(a), Some(b)) => Some(EntryDivergence {
            index: common_prefix as u64,
            left: describe(a.direction, &a.payload),
            right: describe(b.direction, &b.payload),
        }),
        _ => None,
    };

    JournalDivergence {
        common_prefix,
        left_len: left.len(),
        right_len: right.len(),
        first_divergence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capsule_membrane::{CapabilityValue, Literal};
    use crate::journal::{Direction, Journal, Payload};

    fn journal_of(values: &[f64]) -> Vec<JournalEntry> {
        let mut journal = Journal::new();
        for v in values {
            journal.append(
                Direction::TowardWet,
                Payload::Return(CapabilityValue::literal(Literal::Number(*v))),
            );
        }
        journal.entries().to_vec()
    }

    #[test]
    fn identical_journals() {
        let report = compare_journals(&journal_of(&[1.0, 2.0]), &journal_of(&[1.0, 2.0]));
        assert!(report.is_identical());
        assert_eq!(report.common_prefix, 2);
    }

    #[test]
    fn extension_is_a_prefix_not_identical() {
        let report = compare_journals(&journal_of(&[1.0]), &journal_of(&[1.0, 2.0]));
        assert!(report.is_prefix());
        assert!(!report.is_identical());
        assert_eq!(report.right_len, 2);
    }

    #[test]
    fn first_difference_is_reported() {
        let report = compare_journals(&journal_of(&[1.0, 2.0, 3.0]), &journal_of(&[1.0, 5.0]));
        let divergence = report.first_divergence.unwrap();
        assert_eq!(divergence.index, 1);
        assert!(divergence.left.contains('2'));
        assert!(divergence.right.contains('5'));
    }
}

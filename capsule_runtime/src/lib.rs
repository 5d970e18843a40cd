#![forbid(unsafe_code)]

//! Capsule Runtime
//!
//! Puts the membrane kernel to work: an orchestrated sandbox whose every
//! cross-side interaction is journaled, snapshots made of that journal,
//! and deterministic replay to rebuild a sandbox from one.
//!
//! No value translation lives here; that is the kernel's job.

pub mod settings;
pub mod evaluator;
pub mod journal;
pub mod proto_types;
pub mod proto_bridge;
pub mod journal_store;
pub mod sandbox;
mod replay;
pub mod snapshot_codec;
pub mod snapshot;
pub mod divergence;

pub use divergence::{compare_journals, EntryDivergence, JournalDivergence};
pub use evaluator::{Evaluator, EvaluatorFactory, ModuleBuilder, NativeModuleEvaluator};
pub use journal::{Direction, Journal, JournalEntry, Payload, Phase};
pub use journal_store::JournalStore;
pub use sandbox::{Mode, Restored, Sandbox, SandboxConfig};
pub use settings::{RuntimeSettings, SettingsError};
pub use snapshot_codec::{SnapshotBlob, SnapshotError};

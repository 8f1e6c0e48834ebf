//! # State Journal
//!
//! While a withdrawal's payout is in flight, control belongs to outside
//! code that may call back into the vault. Every state change made during
//! that window is recorded here so that, if the payout fails, the vault can
//! unwind to exactly where the withdrawal started.
//!
//! Checkpoints nest: an inner withdrawal takes its own checkpoint, and
//! reverting it only unwinds the inner call's changes.

use custody_protocol::{Address, Amount};

/// A single undoable change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    /// An account balance changed; `previous` is the value before the change.
    BalanceChanged { account: Address, previous: Amount },
    /// The aggregate total changed.
    TotalChanged { previous: Amount },
    /// An event was appended to the log.
    EventEmitted,
}

/// Opaque position in the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Append-only undo log.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the current position.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.entries.len())
    }

    pub fn record(&mut self, entry: JournalEntry) {
        self.entries.push(entry);
    }

    /// Removes every entry recorded after `checkpoint` and returns them
    /// newest first, ready to be undone in order.
    pub fn unwind(&mut self, checkpoint: Checkpoint) -> Vec<JournalEntry> {
        let start = checkpoint.0.min(self.entries.len());
        let mut undone = self.entries.split_off(start);
        undone.reverse();
        undone
    }

    /// Forgets everything. Called once the outermost call has committed.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

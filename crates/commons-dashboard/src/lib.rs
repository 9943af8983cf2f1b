//! Live run statistics for the instructor dashboard.
//!
//! Every run owns an append-only [`EventJournal`]. The journal folds each
//! appended [`RunEvent`] into a [`RunAggregate`] and publishes the result
//! through a watch channel, so snapshot reads never block game progress.

pub mod event_journal;
pub mod run_aggregate;
pub mod run_event;

pub use event_journal::{EventJournal, JournalEntry, JournalError};
pub use run_aggregate::{GameRow, GameRowStatus, RoundTally, RunAggregate};
pub use run_event::RunEvent;

//! Append-only per-run journal with watch-based snapshot publication.

use std::sync::{Arc, Mutex};

use commons_core::current_unix_timestamp_ms;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;

use crate::run_aggregate::RunAggregate;
use crate::run_event::RunEvent;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JournalError {
    #[error("event journal lock is poisoned")]
    Poisoned,
}

/// One journal record. Sequences start at 1 and have no gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub sequence: u64,
    pub recorded_unix_ms: u64,
    pub event: RunEvent,
}

#[derive(Debug, Default)]
struct JournalInner {
    entries: Vec<JournalEntry>,
    aggregate: RunAggregate,
}

/// Serializes appends for one run and publishes the folded aggregate after each.
#[derive(Debug)]
pub struct EventJournal {
    inner: Mutex<JournalInner>,
    publisher: watch::Sender<Arc<RunAggregate>>,
}

impl Default for EventJournal {
    fn default() -> Self {
        Self::new()
    }
}

impl EventJournal {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(Arc::new(RunAggregate::default()));
        Self {
            inner: Mutex::new(JournalInner::default()),
            publisher,
        }
    }

    /// Appends `event` and returns its sequence number.
    pub fn append(&self, event: RunEvent) -> Result<u64, JournalError> {
        self.append_all([event])
    }

    /// Appends several events under one lock and publishes a single snapshot.
    ///
    /// Returns the sequence of the last appended event.
    pub fn append_all<I>(&self, events: I) -> Result<u64, JournalError>
    where
        I: IntoIterator<Item = RunEvent>,
    {
        let mut inner = self.inner.lock().map_err(|_| JournalError::Poisoned)?;
        let recorded_unix_ms = current_unix_timestamp_ms();
        let before = inner.aggregate.sequence;
        for event in events {
            let aggregate = std::mem::take(&mut inner.aggregate).apply(&event);
            tracing::trace!(
                sequence = aggregate.sequence,
                kind = event.kind(),
                "journal event appended"
            );
            inner.entries.push(JournalEntry {
                sequence: aggregate.sequence,
                recorded_unix_ms,
                event,
            });
            inner.aggregate = aggregate;
        }
        let sequence = inner.aggregate.sequence;
        if sequence == before {
            return Ok(sequence);
        }
        // Published while still holding the lock so subscribers observe journal order.
        self.publisher.send_replace(Arc::new(inner.aggregate.clone()));
        Ok(sequence)
    }

    /// Latest published aggregate.
    pub fn snapshot(&self) -> Arc<RunAggregate> {
        self.publisher.borrow().clone()
    }

    /// Receiver that yields every subsequently published aggregate.
    pub fn subscribe(&self) -> watch::Receiver<Arc<RunAggregate>> {
        self.publisher.subscribe()
    }

    /// Journal entries with a sequence greater than `sequence`.
    pub fn events_since(&self, sequence: u64) -> Result<Vec<JournalEntry>, JournalError> {
        let inner = self.inner.lock().map_err(|_| JournalError::Poisoned)?;
        let start = usize::try_from(sequence)
            .unwrap_or(usize::MAX)
            .min(inner.entries.len());
        Ok(inner.entries[start..].to_vec())
    }

    pub fn len(&self) -> Result<usize, JournalError> {
        let inner = self.inner.lock().map_err(|_| JournalError::Poisoned)?;
        Ok(inner.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool, JournalError> {
        Ok(self.len()? == 0)
    }

    /// Rebuilds the aggregate from the stored events.
    pub fn refold(&self) -> Result<RunAggregate, JournalError> {
        let inner = self.inner.lock().map_err(|_| JournalError::Poisoned)?;
        Ok(RunAggregate::fold(
            inner.entries.iter().map(|entry| &entry.event),
        ))
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

/// Identity of a message within a source chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub chat_id: i64,
    pub message_id: i32,
}

impl MessageKey {
    pub fn new(chat_id: i64, message_id: i32) -> Self {
        Self {
            chat_id,
            message_id,
        }
    }
}

impl std::fmt::Display for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.chat_id, self.message_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// The message was never classified as a signal.
    NotTracked,
    /// Same text as last time, ignoring surrounding whitespace.
    Unchanged,
    /// Text changed; carries the previously stored text.
    Changed(String),
}

#[derive(Debug)]
struct SignalRecord {
    text: String,
    observed_at: DateTime<Utc>,
}

/// Tracks the last signal text per message so edits are only relayed when
/// their content actually changed.
///
/// Each operation runs under one lock with no suspension point inside, so two
/// edits of the same message cannot interleave their read and write.
#[derive(Debug, Default)]
pub struct EditReconciler {
    records: Mutex<HashMap<MessageKey, SignalRecord>>,
}

impl EditReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<MessageKey, SignalRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly classified signal, replacing any previous record.
    pub fn observe_new(&self, key: MessageKey, text: &str) {
        self.records().insert(
            key,
            SignalRecord {
                text: text.to_string(),
                observed_at: Utc::now(),
            },
        );
    }

    pub fn observe_edit(&self, key: MessageKey, text: &str) -> EditOutcome {
        let mut records = self.records();
        let Some(record) = records.get_mut(&key) else {
            return EditOutcome::NotTracked;
        };

        record.observed_at = Utc::now();
        if record.text.trim() == text.trim() {
            return EditOutcome::Unchanged;
        }

        let previous = std::mem::replace(&mut record.text, text.to_string());
        EditOutcome::Changed(previous)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop records last observed before `cutoff`. Returns how many were removed.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.records();
        let before = records.len();
        records.retain(|_, record| record.observed_at >= cutoff);
        before - records.len()
    }
}

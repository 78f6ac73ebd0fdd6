#![forbid(unsafe_code)]

//! Evaluation ledger: an append-only, bounded record of what the runtime
//! decided while resolving and reducing values.

use fa_core::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// An operand was resolved by the Force protocol.
    Force,
    /// A remote handle was handed to an invoker.
    Invoke,
    /// A reduction ran.
    Reduce,
    Failure,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Force => "force",
            Self::Invoke => "invoke",
            Self::Reduce => "reduce",
            Self::Failure => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence: u64,
    pub primitive: String,
    pub kind: EventKind,
    pub detail: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
    pub timestamp_unix_ms: u128,
}

impl LedgerEntry {
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Builder for one entry, finished with [`EvalLedger::append`].
#[derive(Debug, Clone)]
pub struct EventRecord {
    primitive: String,
    kind: EventKind,
    detail: String,
    fields: BTreeMap<String, String>,
}

impl EventRecord {
    pub fn new(primitive: impl Into<String>, kind: EventKind, detail: impl Into<String>) -> Self {
        Self {
            primitive: primitive.into(),
            kind,
            detail: detail.into(),
            fields: BTreeMap::new(),
        }
    }

    /// A failure record carrying the error's kind and message.
    pub fn failure(primitive: impl Into<String>, error: &CoreError) -> Self {
        Self::new(primitive, EventKind::Failure, error.to_string())
            .with_field("error_kind", error.kind().as_str())
    }

    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalLedger {
    entries: VecDeque<LedgerEntry>,
    capacity: usize,
    next_sequence: u64,
    evicted: u64,
}

impl Default for EvalLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl EvalLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A ledger keeping at most `capacity` entries; the oldest are evicted
    /// first. A capacity of zero keeps nothing but still counts sequences.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
            next_sequence: 0,
            evicted: 0,
        }
    }

    /// Append a record and return its sequence number.
    pub fn append(&mut self, record: EventRecord) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if self.capacity == 0 {
            self.evicted += 1;
            return sequence;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(LedgerEntry {
            sequence,
            primitive: record.primitive,
            kind: record.kind,
            detail: record.detail,
            fields: record.fields,
            timestamp_unix_ms: now_unix_ms(),
        });
        sequence
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped to honour the capacity.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    pub fn entries(&self) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter()
    }

    pub fn entries_of(&self, kind: EventKind) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.iter().filter(move |entry| entry.kind == kind)
    }

    #[must_use]
    pub fn last(&self) -> Option<&LedgerEntry> {
        self.entries.back()
    }

    #[must_use]
    pub fn count_by_kind(&self) -> BTreeMap<EventKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind).or_insert(0) += 1;
        }
        counts
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The retained entries as a JSON array.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.entries)
    }
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}

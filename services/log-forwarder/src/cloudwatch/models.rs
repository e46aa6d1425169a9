// External crates
use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// One timestamped message unit shipped to a log stream.
///
/// `ingestion_time` is only populated on events read back from the remote
/// service; events built on the write side leave it unset and it is omitted
/// from the wire shape entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_time: Option<i64>,
}

impl Event {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        debug_assert!(timestamp >= 0, "event timestamp must be non-negative");
        Self {
            timestamp,
            message: message.into(),
            ingestion_time: None,
        }
    }

    pub fn with_ingestion_time(mut self, ingestion_time: i64) -> Self {
        debug_assert!(ingestion_time >= 0, "ingestion time must be non-negative");
        self.ingestion_time = Some(ingestion_time);
        self
    }
}

fn millis_to_str(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => millis.to_string(),
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", millis_to_str(self.timestamp))?;
        if let Some(ingestion) = self.ingestion_time {
            write!(f, "[D - {}]", millis_to_str(ingestion))?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Tri-state existence knowledge for a remote destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Unknown,
    Absent,
    Present,
}

/// Cached existence state. Starts `Unknown` and is populated lazily on the
/// first remote query; once known it is never queried again for the lifetime
/// of the session, even if the remote state changes out-of-band.
#[derive(Debug)]
pub struct ExistenceCell(AtomicU8);

const EXIST_UNKNOWN: u8 = 0;
const EXIST_ABSENT: u8 = 1;
const EXIST_PRESENT: u8 = 2;

impl ExistenceCell {
    pub const fn new() -> Self {
        Self(AtomicU8::new(EXIST_UNKNOWN))
    }

    pub fn get(&self) -> Existence {
        match self.0.load(Ordering::Acquire) {
            EXIST_ABSENT => Existence::Absent,
            EXIST_PRESENT => Existence::Present,
            _ => Existence::Unknown,
        }
    }

    pub fn set(&self, existence: Existence) {
        let raw = match existence {
            Existence::Unknown => EXIST_UNKNOWN,
            Existence::Absent => EXIST_ABSENT,
            Existence::Present => EXIST_PRESENT,
        };
        self.0.store(raw, Ordering::Release);
    }
}

impl Default for ExistenceCell {
    fn default() -> Self {
        Self::new()
    }
}

/// A top-level log destination namespace.
#[derive(Debug)]
pub struct Group {
    name: String,
    existence: ExistenceCell,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            existence: ExistenceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn existence(&self) -> Existence {
        self.existence.get()
    }

    pub fn set_existence(&self, existence: Existence) {
        self.existence.set(existence);
    }
}

/// A named log destination nested under exactly one [`Group`].
///
/// The stream holds a shared handle to its group; the pipeline session is
/// the long-term owner of both. A stream's existence may only be cached
/// while its group is known to exist, which keeps the invariant
/// `stream Present ⇒ group Present`.
#[derive(Debug)]
pub struct Stream {
    group: Arc<Group>,
    name: String,
    existence: ExistenceCell,
}

impl Stream {
    pub fn new(group: Arc<Group>, name: impl Into<String>) -> Self {
        Self {
            group,
            name: name.into(),
            existence: ExistenceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn existence(&self) -> Existence {
        match self.existence.get() {
            // A stream cannot be considered existing under a group that is
            // not known to exist.
            Existence::Present if self.group.existence() != Existence::Present => {
                Existence::Unknown
            }
            existence => existence,
        }
    }

    /// Caches the stream's existence. Ignored while the parent group is not
    /// known to exist, so a stream can never be marked present against a
    /// nonexistent group.
    pub fn set_existence(&self, existence: Existence) {
        if self.group.existence() == Existence::Present {
            self.existence.set(existence);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape_omits_unset_ingestion_time() {
        let event = Event::new(1_700_000_000_000, "hello");
        let wire = serde_json::to_string(&event).unwrap();
        assert_eq!(wire, r#"{"timestamp":1700000000000,"message":"hello"}"#);

        let back: Event = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, event);
        assert!(back.ingestion_time.is_none());
    }

    #[test]
    fn event_wire_round_trip_with_ingestion_time() {
        let event = Event::new(1_700_000_000_000, "hello").with_ingestion_time(1_700_000_000_500);
        let wire = serde_json::to_string(&event).unwrap();
        assert!(wire.contains(r#""ingestionTime":1700000000500"#));

        let back: Event = serde_json::from_str(&wire).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.ingestion_time, Some(1_700_000_000_500));
    }

    #[test]
    fn event_display_includes_ingestion_time_when_set() {
        let event = Event::new(1_700_000_000_000, "hello");
        let rendered = event.to_string();
        assert!(rendered.starts_with('['));
        assert!(rendered.ends_with(": hello"));
        assert!(!rendered.contains("[D - "));

        let with_ingestion = event.with_ingestion_time(1_700_000_000_500);
        assert!(with_ingestion.to_string().contains("[D - "));
    }

    #[test]
    fn stream_existence_requires_group_present() {
        let group = Arc::new(Group::new("/app/api"));
        let stream = Stream::new(Arc::clone(&group), "worker-1");

        // Group unknown: caching is refused outright.
        stream.set_existence(Existence::Present);
        assert_eq!(stream.existence(), Existence::Unknown);

        group.set_existence(Existence::Absent);
        stream.set_existence(Existence::Present);
        assert_eq!(stream.existence(), Existence::Unknown);

        group.set_existence(Existence::Present);
        stream.set_existence(Existence::Present);
        assert_eq!(stream.existence(), Existence::Present);
    }

    #[test]
    fn existence_cell_transitions() {
        let cell = ExistenceCell::new();
        assert_eq!(cell.get(), Existence::Unknown);
        cell.set(Existence::Absent);
        assert_eq!(cell.get(), Existence::Absent);
        cell.set(Existence::Present);
        assert_eq!(cell.get(), Existence::Present);
    }
}

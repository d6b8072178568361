//! Event storage.
//!
//! Stores hand out immutable snapshots behind an `Arc`. Writers build a
//! complete new snapshot and swap the pointer under a short write lock, so
//! readers on the hot path only clone an `Arc`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::event::{parse_timestamp, Impact, NewEventRequest, NewsEvent, NewsSettings, SettingsPatch};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("event store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event store document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("event store lock poisoned")]
    Poisoned,

    #[error("event store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

/// Immutable view of the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventSnapshot {
    pub events: Vec<NewsEvent>,
    pub settings: NewsSettings,
    /// Records dropped while loading because they could not be parsed.
    pub skipped: usize,
}

impl EventSnapshot {
    pub fn new(events: Vec<NewsEvent>, settings: NewsSettings) -> Self {
        Self {
            events,
            settings,
            skipped: 0,
        }
    }

    fn next_id(&self) -> u64 {
        self.events.iter().map(|e| e.id).max().unwrap_or(0) + 1
    }

    fn with_event(&self, request: NewEventRequest) -> Result<(Self, NewsEvent), StoreError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(StoreError::InvalidEvent("title must not be empty".into()));
        }
        let currency = request.currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(StoreError::InvalidEvent("currency must not be empty".into()));
        }
        let event = NewsEvent {
            id: self.next_id(),
            title: title.to_string(),
            currency,
            event_time: request.event_time,
            impact: request.impact,
            created_at: Some(Utc::now()),
        };
        let mut next = self.clone();
        next.events.push(event.clone());
        Ok((next, event))
    }

    fn without_event(&self, id: u64) -> Option<Self> {
        if !self.events.iter().any(|e| e.id == id) {
            return None;
        }
        let mut next = self.clone();
        next.events.retain(|e| e.id != id);
        Some(next)
    }

    fn with_settings(&self, patch: SettingsPatch) -> Self {
        let mut next = self.clone();
        next.settings = patch.apply(self.settings);
        next
    }
}

/// Backing store for news events and avoidance settings.
pub trait EventStore: Send + Sync {
    /// Current snapshot. Must not block on a writer's I/O.
    fn load_events(&self) -> Result<Arc<EventSnapshot>, StoreError>;

    fn append(&self, request: NewEventRequest) -> Result<NewsEvent, StoreError>;

    /// Remove an event; `Ok(false)` when the id is unknown.
    fn remove(&self, id: u64) -> Result<bool, StoreError>;

    fn update_settings(&self, patch: SettingsPatch) -> Result<NewsSettings, StoreError>;
}

fn read_current(slot: &RwLock<Arc<EventSnapshot>>) -> Result<Arc<EventSnapshot>, StoreError> {
    slot.read()
        .map(|guard| Arc::clone(&guard))
        .map_err(|_| StoreError::Poisoned)
}

fn swap(slot: &RwLock<Arc<EventSnapshot>>, next: EventSnapshot) -> Result<(), StoreError> {
    let mut guard = slot.write().map_err(|_| StoreError::Poisoned)?;
    *guard = Arc::new(next);
    Ok(())
}

// ── In-memory store ──────────────────────────────────────────────────

/// Volatile store, used in tests and for replaying with a fixed calendar.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    snapshot: RwLock<Arc<EventSnapshot>>,
    writer: Mutex<()>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: EventSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn load_events(&self) -> Result<Arc<EventSnapshot>, StoreError> {
        read_current(&self.snapshot)
    }

    fn append(&self, request: NewEventRequest) -> Result<NewsEvent, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let (next, event) = read_current(&self.snapshot)?.with_event(request)?;
        swap(&self.snapshot, next)?;
        Ok(event)
    }

    fn remove(&self, id: u64) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        match read_current(&self.snapshot)?.without_event(id) {
            Some(next) => {
                swap(&self.snapshot, next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn update_settings(&self, patch: SettingsPatch) -> Result<NewsSettings, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let next = read_current(&self.snapshot)?.with_settings(patch);
        let settings = next.settings;
        swap(&self.snapshot, next)?;
        Ok(settings)
    }
}

// ── JSON file store ──────────────────────────────────────────────────

/// Persisted document: `{ "events": [...], "settings": {...} }`.
#[derive(Debug, Serialize, Deserialize)]
struct Document<E> {
    #[serde(default = "Vec::new")]
    events: Vec<E>,
    #[serde(default)]
    settings: NewsSettings,
}

/// Lenient on-disk event record: timestamps are parsed by hand so that
/// naive values can be taken as UTC.
#[derive(Debug, Deserialize)]
struct RawEvent {
    id: u64,
    title: String,
    currency: String,
    event_time: String,
    #[serde(default)]
    impact: Impact,
    #[serde(default)]
    created_at: Option<String>,
}

impl RawEvent {
    fn into_event(self) -> Result<NewsEvent, String> {
        let event_time = parse_timestamp(&self.event_time)
            .ok_or_else(|| format!("unparsable event_time '{}'", self.event_time))?;
        Ok(NewsEvent {
            id: self.id,
            title: self.title,
            currency: self.currency.to_uppercase(),
            event_time,
            impact: self.impact,
            created_at: self.created_at.as_deref().and_then(parse_timestamp),
        })
    }
}

/// Parse a persisted document, skipping (and counting) bad event records.
pub fn parse_document(content: &str) -> Result<EventSnapshot, StoreError> {
    if content.trim().is_empty() {
        return Ok(EventSnapshot::default());
    }
    let doc: Document<serde_json::Value> = serde_json::from_str(content)?;
    let mut events = Vec::with_capacity(doc.events.len());
    let mut skipped = 0;
    for (index, value) in doc.events.into_iter().enumerate() {
        let parsed = serde_json::from_value::<RawEvent>(value)
            .map_err(|e| e.to_string())
            .and_then(RawEvent::into_event);
        match parsed {
            Ok(event) => events.push(event),
            Err(reason) => {
                warn!(index, %reason, "skipping news event record");
                skipped += 1;
            }
        }
    }
    Ok(EventSnapshot {
        events,
        settings: doc.settings,
        skipped,
    })
}

/// Serialize a snapshot into the persisted document format.
pub fn render_document(snapshot: &EventSnapshot) -> Result<String, StoreError> {
    let doc = Document {
        events: snapshot.events.clone(),
        settings: snapshot.settings,
    };
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// File-backed store. The file is read on open and on [`reload`]; writes
/// go to a temp file that is renamed over the original.
///
/// [`reload`]: JsonFileEventStore::reload
#[derive(Debug)]
pub struct JsonFileEventStore {
    path: PathBuf,
    snapshot: RwLock<Arc<EventSnapshot>>,
    writer: Mutex<()>,
}

impl JsonFileEventStore {
    /// Open the store. A missing file is an empty document with default
    /// settings; it is created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = Self::read_file(&path)?;
        info!(
            path = %path.display(),
            events = snapshot.events.len(),
            skipped = snapshot.skipped,
            "news event store opened"
        );
        Ok(Self {
            path,
            snapshot: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file, picking up edits made by other processes.
    pub fn reload(&self) -> Result<Arc<EventSnapshot>, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let snapshot = Self::read_file(&self.path)?;
        swap(&self.snapshot, snapshot)?;
        read_current(&self.snapshot)
    }

    fn read_file(path: &Path) -> Result<EventSnapshot, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => parse_document(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "news event file missing, starting empty");
                Ok(EventSnapshot::default())
            }
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn persist(&self, snapshot: &EventSnapshot) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = render_document(snapshot)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }

    fn commit(&self, next: EventSnapshot) -> Result<(), StoreError> {
        self.persist(&next)?;
        swap(&self.snapshot, next)
    }
}

impl EventStore for JsonFileEventStore {
    fn load_events(&self) -> Result<Arc<EventSnapshot>, StoreError> {
        read_current(&self.snapshot)
    }

    fn append(&self, request: NewEventRequest) -> Result<NewsEvent, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let (next, event) = read_current(&self.snapshot)?.with_event(request)?;
        self.commit(next)?;
        info!(
            id = event.id,
            title = %event.title,
            currency = %event.currency,
            at = %event.event_time,
            "news event added"
        );
        Ok(event)
    }

    fn remove(&self, id: u64) -> Result<bool, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        match read_current(&self.snapshot)?.without_event(id) {
            Some(next) => {
                self.commit(next)?;
                info!(id, "news event removed");
                Ok(true)
            }
            None => {
                warn!(id, "news event not found");
                Ok(false)
            }
        }
    }

    fn update_settings(&self, patch: SettingsPatch) -> Result<NewsSettings, StoreError> {
        let _writer = self.writer.lock().map_err(|_| StoreError::Poisoned)?;
        let next = read_current(&self.snapshot)?.with_settings(patch);
        let settings = next.settings;
        self.commit(next)?;
        info!(?settings, "news avoidance settings updated");
        Ok(settings)
    }
}

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Options represents the options for a flightcache cache
#[derive(Clone, Debug)]
pub struct Options {
    /// Validity is how long a fetched value is served before it is
    /// considered stale. default is 5min
    /// a value exactly `validity` old is still valid.
    pub validity: Duration,
    /// FetchTimeout bounds a single fetch. default is None
    /// if set, a fetch running longer is cancelled and treated as failed.
    /// only honoured by AsyncCache, a blocking fetch cannot be interrupted.
    pub fetch_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            validity: Duration::from_secs(5 * 60),
            fetch_timeout: None,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) {
        if self.validity == Duration::ZERO {
            panic!("cache options error: Validity should not be 0, you should call Options::default() to get default options");
        }
    }
}

/// FetchTimeout is returned when a fetch outlives `Options::fetch_timeout`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("fetch timed out after {0:?}")]
pub struct FetchTimeout(pub Duration);

/// CachedValue is one immutable snapshot produced by a successful fetch.
/// A refresh never touches an existing CachedValue, it builds a new one.
#[derive(Debug)]
pub struct CachedValue<T> {
    value: T,
    created: Instant,
    id: Uuid,
}

impl<T> CachedValue<T> {
    pub(crate) fn new(value: T, id: Uuid) -> Self {
        Self {
            value,
            created: Instant::now(),
            id,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// created is the moment the fetch result was stored.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// id names the refresh that produced this value.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn is_valid(&self, validity: Duration) -> bool {
        self.is_valid_at(Instant::now(), validity)
    }

    /// is_valid_at reports whether the value is still valid at `now`. A value
    /// exactly `validity` old is valid.
    pub fn is_valid_at(&self, now: Instant, validity: Duration) -> bool {
        now.saturating_duration_since(self.created) <= validity
    }
}

/// State of a cache as seen by one observer at one instant.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum State {
    /// nothing fetched yet, or every fetch so far failed
    Empty,
    Valid,
    /// a value exists but is older than the validity
    Stale,
    /// a fetch is running
    Refreshing,
}

/// Slot holds the current value. Readers clone the `Arc` out under a short
/// read lock which is never held across a fetch. Once closed the slot stays
/// empty and refuses every store.
#[derive(Debug)]
pub(crate) struct Slot<T>(RwLock<Cell<T>>);

#[derive(Debug)]
struct Cell<T> {
    value: Option<Arc<CachedValue<T>>>,
    closed: bool,
}

impl<T> Slot<T> {
    pub(crate) fn new() -> Self {
        Slot(RwLock::new(Cell {
            value: None,
            closed: false,
        }))
    }

    pub(crate) fn load(&self) -> Option<Arc<CachedValue<T>>> {
        self.0.read().value.clone()
    }

    /// load_valid returns the current value only if it is still valid.
    pub(crate) fn load_valid(&self, validity: Duration) -> Option<Arc<CachedValue<T>>> {
        self.load().filter(|v| v.is_valid(validity))
    }

    /// store replaces the current value, returning false when the slot is
    /// closed and the value was dropped instead.
    #[must_use]
    pub(crate) fn store(&self, value: Arc<CachedValue<T>>) -> bool {
        let mut cell = self.0.write();
        if cell.closed {
            return false;
        }
        cell.value = Some(value);
        true
    }

    pub(crate) fn close(&self) {
        let mut cell = self.0.write();
        cell.closed = true;
        cell.value.take();
    }

    pub(crate) fn state(&self, validity: Duration, refreshing: bool) -> State {
        if refreshing {
            return State::Refreshing;
        }
        match self.load() {
            None => State::Empty,
            Some(v) if v.is_valid(validity) => State::Valid,
            Some(_) => State::Stale,
        }
    }
}

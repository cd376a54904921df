use anyhow::{bail, Result};
use singleflight::{Flight, FlightError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};
use uuid::Uuid;

use crate::types::{CachedValue, Options, Slot, State};

/// Cache serves a value fetched by a blocking function to any number of
/// threads, refreshing it at most once per validity period.
///
/// Any thread may call it, a tokio worker included; a caller that has to wait
/// for a refresh blocks its thread for the length of the fetch.
#[derive(Debug)]
pub struct Cache<T, F> {
    slot: Slot<T>,
    flight: Flight,
    options: Options,
    fetch: F,
}

impl<T, F, E> Cache<T, F>
where
    F: Fn() -> core::result::Result<T, E>,
    E: Into<anyhow::Error>,
{
    /// new returns an empty cache; nothing is fetched until the first
    /// `get_current`.
    pub fn new(fetch: F, options: Options) -> Self {
        options.validate();
        Cache {
            slot: Slot::new(),
            flight: Flight::new(),
            options,
            fetch,
        }
    }

    pub fn with_validity(fetch: F, validity: Duration) -> Self {
        Self::new(
            fetch,
            Options {
                validity,
                ..Options::default()
            },
        )
    }

    /// get_current returns the cached value if it is still valid. Otherwise
    /// it waits for the flight, checks again, and fetches only if no other
    /// caller refreshed the value in the meantime.
    ///
    /// A failed fetch leaves the cached value untouched and its error is
    /// returned to this caller only.
    #[instrument(skip(self))]
    pub fn get_current(&self) -> Result<Arc<CachedValue<T>>> {
        if self.flight.is_closed() {
            bail!(FlightError::Closed);
        }
        let validity = self.options.validity;
        if let Some(v) = self.slot.load_valid(validity) {
            trace!("Cache hit");
            return Ok(v);
        }

        trace!("Cache stale or empty, waiting for flight");
        self.flight.work(
            || self.slot.load_valid(validity),
            || self.refresh(Uuid::new_v4()),
        )
    }

    #[instrument(skip(self))]
    fn refresh(&self, id: Uuid) -> Result<Arc<CachedValue<T>>> {
        trace!("Fetching...");
        let value = (self.fetch)().map_err(Into::into)?;
        let entry = Arc::new(CachedValue::new(value, id));
        if !self.slot.store(entry.clone()) {
            trace!("Cache closed during fetch, value dropped");
            bail!(FlightError::Closed);
        }
        trace!("Value stored");
        Ok(entry)
    }
}

impl<T, F> Cache<T, F> {
    /// peek returns the held value, stale or not, without fetching.
    pub fn peek(&self) -> Option<Arc<CachedValue<T>>> {
        self.slot.load()
    }

    pub fn state(&self) -> State {
        self.slot.state(self.options.validity, self.flight.is_busy())
    }

    /// fetches returns how many times the fetch function has been called.
    pub fn fetches(&self) -> usize {
        self.flight.runs()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// close drops the held value and fails every later or waiting
    /// `get_current` with `FlightError::Closed`.
    #[instrument(skip(self))]
    pub fn close(&self) {
        self.flight.close();
        self.slot.close();
        trace!("Cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.flight.is_closed()
    }
}

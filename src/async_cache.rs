use anyhow::{bail, Result};
use core::future::Future;
use singleflight::{AsyncFlight, FlightError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, trace};
use uuid::Uuid;

use crate::types::{CachedValue, Options, Slot, State};
use crate::utils::with_timeout;

/// AsyncCache is the async counterpart of `Cache`: callers are tasks, the
/// fetch is a future, and waiting for the flight suspends instead of blocking.
#[derive(Debug)]
pub struct AsyncCache<T, F> {
    slot: Slot<T>,
    flight: AsyncFlight,
    options: Options,
    fetch: F,
}

impl<T, F, Fut, E> AsyncCache<T, F>
where
    F: Fn() -> Fut,
    Fut: Future<Output = core::result::Result<T, E>>,
    E: Into<anyhow::Error>,
{
    pub fn new(fetch: F, options: Options) -> Self {
        options.validate();
        AsyncCache {
            slot: Slot::new(),
            flight: AsyncFlight::new(),
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

    /// get_current returns the cached value if it is still valid, otherwise
    /// refreshes it through the flight so that only one fetch runs at a time.
    ///
    /// Cancelling this future while it fetches, or hitting
    /// `Options::fetch_timeout`, counts as a failed fetch: the flight is
    /// released and the cached value is left as it was.
    #[instrument(skip(self))]
    pub async fn get_current(&self) -> Result<Arc<CachedValue<T>>> {
        if self.flight.is_closed() {
            bail!(FlightError::Closed);
        }
        let validity = self.options.validity;
        if let Some(v) = self.slot.load_valid(validity) {
            trace!("Cache hit");
            return Ok(v);
        }

        trace!("Cache stale or empty, waiting for flight");
        self.flight
            .async_work(
                || self.slot.load_valid(validity),
                || self.refresh(Uuid::new_v4()),
            )
            .await
    }

    #[instrument(skip(self))]
    async fn refresh(&self, id: Uuid) -> Result<Arc<CachedValue<T>>> {
        trace!("Fetching...");
        let value = with_timeout((self.fetch)(), self.options.fetch_timeout).await?;
        let entry = Arc::new(CachedValue::new(value, id));
        if !self.slot.store(entry.clone()) {
            trace!("Cache closed during fetch, value dropped");
            bail!(FlightError::Closed);
        }
        trace!("Value stored");
        Ok(entry)
    }
}

impl<T, F> AsyncCache<T, F> {
    /// peek returns the held value, stale or not, without fetching.
    pub fn peek(&self) -> Option<Arc<CachedValue<T>>> {
        self.slot.load()
    }

    pub fn state(&self) -> State {
        self.slot.state(self.options.validity, self.flight.is_busy())
    }

    /// fetches returns how many times the fetch function has been called,
    /// including fetches that failed, timed out or were cancelled.
    pub fn fetches(&self) -> usize {
        self.flight.runs()
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// close drops the held value; tasks waiting for the flight and every
    /// later `get_current` fail with `FlightError::Closed`.
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

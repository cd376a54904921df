use anyhow::{bail, Result};
use core::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{error, instrument, trace};

/// FlightError is returned to callers of a flight that has been closed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum FlightError {
    #[error("flight closed")]
    Closed,
}

/// Board keeps the bookkeeping shared by both kinds of flight.
#[derive(Debug, Default)]
struct Board {
    closed: AtomicBool,
    in_flight: AtomicBool,
    runs: AtomicUsize,
}

enum Entry<'a, T, G> {
    Checked(T),
    Lead(Leader<'a, G>),
}

/// Held by the caller running the work; the flight is released on drop,
/// including when an async leader is cancelled.
struct Leader<'a, G> {
    _guard: G,
    in_flight: &'a AtomicBool,
}

impl<G> Drop for Leader<'_, G> {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
        trace!("Flight released");
    }
}

impl Board {
    fn enter<T, C, G>(&self, guard: G, check: C) -> Result<Entry<'_, T, G>>
    where
        C: FnOnce() -> Option<T>,
    {
        if self.is_closed() {
            trace!("Flight closed while waiting");
            bail!(FlightError::Closed);
        }
        if let Some(v) = check() {
            trace!("Work done by another caller");
            return Ok(Entry::Checked(v));
        }
        self.in_flight.store(true, Ordering::Release);
        self.runs.fetch_add(1, Ordering::AcqRel);
        Ok(Entry::Lead(Leader {
            _guard: guard,
            in_flight: &self.in_flight,
        }))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        trace!("Flight closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn runs(&self) -> usize {
        self.runs.load(Ordering::Acquire)
    }
}

macro_rules! board_accessors {
    () => {
        /// close makes every later and every waiting caller fail with
        /// `FlightError::Closed`. A leader already running is not interrupted.
        pub fn close(&self) {
            self.board.close()
        }

        pub fn is_closed(&self) -> bool {
            self.board.is_closed()
        }

        /// is_busy reports whether a leader is running its work right now.
        pub fn is_busy(&self) -> bool {
            self.board.is_busy()
        }

        /// runs returns how many times work has been started, failed runs included.
        pub fn runs(&self) -> usize {
            self.board.runs()
        }
    };
}

/// Flight represents a class of blocking work of which at most one unit may
/// be in-flight at a time.
///
/// Callers race for the flight. The one that gets it first runs `check`, and
/// only when `check` yields nothing does it run the work. Every caller that
/// queued behind it runs `check` again once it holds the flight, so work
/// published by an earlier leader is picked up instead of being repeated.
///
/// The gate is a plain `parking_lot` mutex, so `work` may be called from any
/// thread, including the worker threads of an async runtime.
#[derive(Debug, Default)]
pub struct Flight {
    lock: parking_lot::Mutex<()>,
    board: Board,
}

impl Flight {
    pub fn new() -> Flight {
        Flight::default()
    }

    /// work blocks until the flight is free, then returns the result of
    /// `check` if it has one, otherwise the result of `work`.
    ///
    /// The work must publish whatever `check` looks at before it returns,
    /// since the flight is released right after. A failed work publishes
    /// nothing and the next caller in line runs it again.
    #[instrument(skip_all)]
    pub fn work<T, E, C, F>(&self, check: C, work: F) -> Result<T>
    where
        C: FnOnce() -> Option<T>,
        F: FnOnce() -> core::result::Result<T, E>,
        E: Into<anyhow::Error>,
    {
        if self.board.is_closed() {
            bail!(FlightError::Closed);
        }
        let guard = self.lock.lock();
        trace!("Aquire flight");
        let _leader = match self.board.enter(guard, check)? {
            Entry::Checked(v) => return Ok(v),
            Entry::Lead(l) => l,
        };

        trace!("working...");
        work().map_err(|e| {
            error!("Error occur during work");
            e.into()
        })
    }

    board_accessors!();
}

/// AsyncFlight is the async counterpart of `Flight`: waiting for the flight
/// suspends the task instead of blocking its thread.
#[derive(Debug, Default)]
pub struct AsyncFlight {
    lock: tokio::sync::Mutex<()>,
    board: Board,
}

impl AsyncFlight {
    pub fn new() -> AsyncFlight {
        AsyncFlight::default()
    }

    /// async_work is like `Flight::work` but suspends while the flight is
    /// taken. Dropping the returned future releases the flight.
    #[instrument(skip_all)]
    pub async fn async_work<T, E, C, F, Fut>(&self, check: C, work: F) -> Result<T>
    where
        C: FnOnce() -> Option<T>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = core::result::Result<T, E>>,
        E: Into<anyhow::Error>,
    {
        if self.board.is_closed() {
            bail!(FlightError::Closed);
        }
        let guard = self.lock.lock().await;
        trace!("Aquire flight");
        let _leader = match self.board.enter(guard, check)? {
            Entry::Checked(v) => return Ok(v),
            Entry::Lead(l) => l,
        };

        trace!("working...");
        work().await.map_err(|e| {
            error!("Error occur during work");
            e.into()
        })
    }

    board_accessors!();
}

//! Simulated air-quality sensor used by the cache tests.

use parking_lot::Mutex;
use std::io::{Error as IOErr, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct AirQuality {
    pub pm25: f64,
    pub pm10: f64,
    /// sequence number of the read that produced this sample
    pub read: usize,
}

/// Sensor is a slow source that counts its reads, records how many of them
/// overlapped, and can be told to fail.
#[derive(Debug)]
pub(crate) struct Sensor {
    delay: Mutex<Duration>,
    reads: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    failures: AtomicUsize,
}

struct Active<'a>(&'a AtomicUsize);

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Sensor {
    pub fn new(delay: Duration) -> Arc<Sensor> {
        Arc::new(Sensor {
            delay: Mutex::new(delay),
            reads: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        })
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// fail_next makes the next `n` reads fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::Release);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Acquire)
    }

    /// max_active is the highest number of reads ever running at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::Acquire)
    }

    pub fn read(&self) -> Result<AirQuality, IOErr> {
        let (read, _active) = self.begin();
        std::thread::sleep(self.delay());
        self.finish(read)
    }

    pub async fn read_async(&self) -> Result<AirQuality, IOErr> {
        let (read, _active) = self.begin();
        tokio::time::sleep(self.delay()).await;
        self.finish(read)
    }

    fn delay(&self) -> Duration {
        *self.delay.lock()
    }

    fn begin(&self) -> (usize, Active<'_>) {
        let read = self.reads.fetch_add(1, Ordering::AcqRel) + 1;
        let active = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_active.fetch_max(active, Ordering::AcqRel);
        (read, Active(&self.active))
    }

    fn finish(&self, read: usize) -> Result<AirQuality, IOErr> {
        let failing = self
            .failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(IOErr::new(ErrorKind::TimedOut, "sensor not responding"));
        }
        Ok(AirQuality {
            pm25: read as f64 * 1.5,
            pm10: read as f64 * 2.0,
            read,
        })
    }
}

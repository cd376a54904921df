//! A cache for one value that is expensive to fetch.
//!
//! The value is served to any number of concurrent callers until it is older
//! than `Options::validity`. Then the next caller refreshes it while everyone
//! else who finds it stale waits for that refresh, so the fetch never runs
//! twice at once. The check is done twice: once without any lock, and again
//! after the refresh lock is held.
//!
//! `Cache` works with a blocking fetch on plain threads. `AsyncCache` takes a
//! fetch returning a future and is meant for tokio tasks.
//!
//! ```no_run
//! use flightcache::AsyncCache;
//! use std::time::Duration;
//!
//! # async fn read_sensor() -> std::io::Result<f64> { Ok(12.5) }
//! # async fn run() -> anyhow::Result<()> {
//! let cache = AsyncCache::with_validity(read_sensor, Duration::from_secs(300));
//! let pm25 = cache.get_current().await?;
//! println!("pm2.5: {}", pm25.value());
//! # Ok(())
//! # }
//! ```

mod async_cache;
mod cache;
mod types;
mod utils;

#[cfg(test)]
mod testing;

pub use async_cache::AsyncCache;
pub use cache::Cache;
pub use singleflight::FlightError;
pub use types::{CachedValue, FetchTimeout, Options, State};

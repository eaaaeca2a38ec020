mod builder;
mod caller;

pub use builder::LoaderBuilder;
pub use caller::Caller;

use crate::memory;
use crate::trampoline::{HostTrampoline, Trampoline};
use crate::{Error, Result};
use log::debug;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Default ceiling on code length plus trampoline record: 1 GiB.
///
/// The ceiling is exclusive, so code of exactly `DEFAULT_SIZE_LIMIT` minus
/// the record size is already rejected.
pub const DEFAULT_SIZE_LIMIT: usize = 1 << 30;

/// Loads `code` with the default configuration.
pub fn load(code: &[u8]) -> Result<Caller> {
    Loader::new().load(code)
}

/// Snapshot of what a [`Loader`] currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderStats {
    /// Regions allocated and not yet released.
    pub live_regions: usize,
    /// Total length of those regions.
    pub live_bytes: usize,
    /// Successful loads over the loader's lifetime.
    pub loads: usize,
}

#[derive(Debug, Default)]
struct Ledger {
    live_regions: AtomicUsize,
    live_bytes: AtomicUsize,
    loads: AtomicUsize,
}

impl Ledger {
    /// Accounts for a region of `size` bytes unless `quota` regions are
    /// already live.
    fn lease(self: &Arc<Self>, size: usize, quota: Option<usize>) -> Option<Lease> {
        self.live_regions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| match quota {
                Some(quota) if live >= quota => None,
                _ => Some(live + 1),
            })
            .ok()?;
        self.live_bytes.fetch_add(size, Ordering::AcqRel);

        Some(Lease {
            ledger: Arc::clone(self),
            size,
        })
    }
}

/// One region's entry in the ledger, returned when dropped.
#[derive(Debug)]
struct Lease {
    ledger: Arc<Ledger>,
    size: usize,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.ledger.live_regions.fetch_sub(1, Ordering::AcqRel);
        self.ledger.live_bytes.fetch_sub(self.size, Ordering::AcqRel);
    }
}

/// Turns byte sequences into callable code.
///
/// Cloning a loader shares its configuration and its ledger.
#[derive(Debug, Clone)]
pub struct Loader {
    size_limit: usize,
    region_quota: Option<usize>,
    ledger: Arc<Ledger>,
}

impl Loader {
    pub fn new() -> Self {
        LoaderBuilder::new().build()
    }

    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::new()
    }

    /// Loads `code` behind the host's callable representation.
    pub fn load(&self, code: &[u8]) -> Result<Caller> {
        self.load_with::<HostTrampoline>(code)
    }

    /// Loads `code` behind the callable representation `T`.
    ///
    /// Either a fully loaded [`Caller`] comes back or nothing was allocated.
    pub fn load_with<T: Trampoline>(&self, code: &[u8]) -> Result<Caller<T>> {
        let size = self.region_size::<T>(code.len())?;

        let lease = self
            .ledger
            .lease(size, self.region_quota)
            .ok_or_else(|| Error::Allocation {
                size,
                source: io::Error::new(io::ErrorKind::OutOfMemory, "region quota exhausted"),
            })?;
        let region = memory::allocate(size)?;
        self.ledger.loads.fetch_add(1, Ordering::AcqRel);

        Ok(Caller::new(region, lease, code))
    }

    pub fn stats(&self) -> LoaderStats {
        LoaderStats {
            live_regions: self.ledger.live_regions.load(Ordering::Acquire),
            live_bytes: self.ledger.live_bytes.load(Ordering::Acquire),
            loads: self.ledger.loads.load(Ordering::Acquire),
        }
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    fn region_size<T: Trampoline>(&self, len: usize) -> Result<usize> {
        let violation = || Error::SizeViolation {
            len,
            limit: self.size_limit.saturating_sub(T::RECORD_SIZE),
        };

        if len == 0 {
            return Err(violation());
        }
        let size = len.checked_add(T::RECORD_SIZE).ok_or_else(violation)?;
        if size >= self.size_limit {
            debug!("rejecting {len} bytes of code, limit is {}", self.size_limit);
            return Err(violation());
        }
        Ok(size)
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

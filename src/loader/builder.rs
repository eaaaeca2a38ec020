use crate::loader::{Ledger, Loader, DEFAULT_SIZE_LIMIT};
use std::sync::Arc;

pub struct LoaderBuilder {
    size_limit: usize,
    region_quota: Option<usize>,
}

impl LoaderBuilder {
    pub fn new() -> Self {
        LoaderBuilder {
            size_limit: DEFAULT_SIZE_LIMIT,
            region_quota: None,
        }
    }

    /// Exclusive ceiling on code length plus trampoline record.
    pub fn size_limit(mut self, limit: usize) -> Self {
        self.size_limit = limit;
        self
    }

    /// Maximum number of regions this loader keeps alive at once. Loads past
    /// the quota fail as allocation failures without asking the platform.
    pub fn region_quota(mut self, quota: usize) -> Self {
        self.region_quota = Some(quota);
        self
    }

    pub fn build(self) -> Loader {
        Loader {
            size_limit: self.size_limit,
            region_quota: self.region_quota,
            ledger: Arc::new(Ledger::default()),
        }
    }
}

impl Default for LoaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

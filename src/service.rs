//! Service layer over the store. The engines add their operations to
//! [`RegoService`] from their own modules (`issuance`, `trading`,
//! `confirmation`, `registry`, `queries`).
use std::path::Path;

use crate::error::RegoResult;
use crate::store::Store;

/// Default cap on the whole units one generation record or one issuance
/// request may produce. Every unit is a row written in a single transaction.
pub const DEFAULT_MAX_ISSUANCE_UNITS: u64 = 100_000;

#[derive(Clone)]
pub struct RegoService {
    pub(crate) store: Store,
    pub(crate) max_issuance_units: u64,
}

impl RegoService {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            max_issuance_units: DEFAULT_MAX_ISSUANCE_UNITS,
        }
    }

    pub fn with_max_issuance_units(mut self, max: u64) -> Self {
        self.max_issuance_units = max;
        self
    }

    pub fn max_issuance_units(&self) -> u64 {
        self.max_issuance_units
    }

    pub fn open<P: AsRef<Path>>(path: P) -> RegoResult<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

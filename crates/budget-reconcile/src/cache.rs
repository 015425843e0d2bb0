//! In-memory memoization of reconciliation results.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

use crate::config::ReconcileOptions;
use crate::error::{ReconcileError, Result};
use crate::workbook::{ReconcileOutput, WorkbookAssembler};

/// SHA-256 over both inputs, the options and the run clock.
pub type CacheKey = [u8; 32];

/// Digest identifying one run. Each component is length-prefixed so that moving bytes between
/// the base and the update cannot produce the same key.
pub fn cache_key(
    base: &[u8],
    update: &[u8],
    options: &ReconcileOptions,
    now: NaiveDateTime,
) -> Result<CacheKey> {
    let options_json =
        serde_json::to_vec(options).map_err(|e| ReconcileError::InvalidConfig(e.to_string()))?;
    let now = now.and_utc().timestamp_micros().to_le_bytes();

    let mut hasher = Sha256::new();
    for chunk in [base, update, options_json.as_slice(), now.as_slice()] {
        hasher.update((chunk.len() as u64).to_le_bytes());
        hasher.update(chunk);
    }
    Ok(hasher.finalize().into())
}

#[derive(Debug, Default)]
pub struct ReconcileCache {
    entries: HashMap<CacheKey, ReconcileOutput>,
    hits: u64,
    misses: u64,
}

impl ReconcileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `assembler` unless an identical run is already cached.
    pub fn reconcile_at(
        &mut self,
        assembler: &WorkbookAssembler,
        base: &[u8],
        update: &[u8],
        now: NaiveDateTime,
    ) -> Result<&ReconcileOutput> {
        let key = cache_key(base, update, assembler.options(), now)?;
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                self.hits += 1;
                log::debug!("reconcile cache hit");
                Ok(&*entry.into_mut())
            }
            Entry::Vacant(entry) => {
                self.misses += 1;
                let output = assembler.reconcile_at(base, update, now)?;
                Ok(&*entry.insert(output))
            }
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 2)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    #[test]
    fn key_depends_on_every_component() {
        let options = ReconcileOptions::default();
        let base = cache_key(b"ab", b"c", &options, at(0)).unwrap();
        assert_eq!(base, cache_key(b"ab", b"c", &options, at(0)).unwrap());
        assert_ne!(base, cache_key(b"a", b"bc", &options, at(0)).unwrap());
        assert_ne!(base, cache_key(b"ab", b"c", &options, at(1)).unwrap());

        let mut other = options.clone();
        other.log_sheet = "Log".to_string();
        assert_ne!(base, cache_key(b"ab", b"c", &other, at(0)).unwrap());
    }

    #[test]
    fn failed_runs_are_not_cached() {
        let assembler = WorkbookAssembler::new(ReconcileOptions::default()).unwrap();
        let mut cache = ReconcileCache::new();
        assert!(cache.reconcile_at(&assembler, b"nope", b"nope", at(0)).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hits(), 0);
    }
}

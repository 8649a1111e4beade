//! # Fallback Cache
//!
//! Bounded mirror of the voucher rows, keyed by phone with a code index. Only consulted
//! when the sheet cannot be read.
//!
//! ## Consistency
//!
//! - Write-through: successful appends and updates are mirrored here
//! - Read-refresh: every successful read overwrites cached rows, the sheet always wins
//! - Pending: registrations whose append failed stay pending until replayed into the sheet
//! - Eviction: oldest insert first, pending entries last
use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use sheets::{Located, VoucherEntry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub entry: VoucherEntry,
    pub pending: bool,
}

#[derive(Default)]
struct Inner {
    by_phone: HashMap<String, CachedEntry>,
    by_code: HashMap<String, String>,
    order: VecDeque<String>,
}

impl Inner {
    /// `keep_indexed` leaves a code that already points at another phone alone, so duplicate
    /// codes resolve to the first row the way sheet lookups do.
    fn insert(&mut self, entry: VoucherEntry, pending: bool, keep_indexed: bool) {
        let phone = entry.phone.clone();
        let code = entry.code.to_uppercase();

        match self.by_phone.get(&phone) {
            Some(old) => {
                let old_code = old.entry.code.to_uppercase();
                if old_code != code && self.by_code.get(&old_code) == Some(&phone) {
                    self.by_code.remove(&old_code);
                }
            }
            None => self.order.push_back(phone.clone()),
        }

        let indexed_elsewhere = self
            .by_code
            .get(&code)
            .is_some_and(|owner| *owner != phone && self.by_phone.contains_key(owner));

        if !code.is_empty() && !(keep_indexed && indexed_elsewhere) {
            self.by_code.insert(code, phone.clone());
        }
        self.by_phone.insert(phone, CachedEntry { entry, pending });
    }

    /// Spins only move 1 to 0, so a read that started before a spend cannot revive the code.
    fn merge_read(&self, mut entry: VoucherEntry) -> VoucherEntry {
        let spent = self.by_phone.get(&entry.phone).filter(|cached| {
            !cached.entry.has_spins() && cached.entry.code.eq_ignore_ascii_case(&entry.code)
        });

        if let Some(spent) = spent {
            entry.spins_remaining = 0;
            if entry.voucher_value.trim().is_empty() {
                entry.voucher_value = spent.entry.voucher_value.clone();
            }
        }

        entry
    }

    fn evict(&mut self, capacity: usize) {
        while self.by_phone.len() > capacity {
            let position = self
                .order
                .iter()
                .position(|phone| self.by_phone.get(phone).is_some_and(|c| !c.pending))
                .unwrap_or(0);

            let Some(phone) = self.order.remove(position) else {
                return;
            };

            if let Some(evicted) = self.by_phone.remove(&phone) {
                let code = evicted.entry.code.to_uppercase();
                if self.by_code.get(&code) == Some(&phone) {
                    self.by_code.remove(&code);
                }
            }
        }
    }
}

pub struct FallbackCache {
    inner: Mutex<Inner>,
    capacity: usize,
}

impl FallbackCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().by_phone.len()
    }

    pub fn by_phone(&self, phone: &str) -> Option<CachedEntry> {
        self.inner.lock().by_phone.get(phone).cloned()
    }

    pub fn by_code(&self, code: &str) -> Option<CachedEntry> {
        let inner = self.inner.lock();
        let phone = inner.by_code.get(&code.trim().to_uppercase())?;

        inner.by_phone.get(phone).cloned()
    }

    /// Mirrors a row the sheet accepted.
    pub fn store(&self, entry: VoucherEntry) {
        self.put(entry, false);
    }

    /// Holds a row the sheet did not accept yet.
    pub fn store_pending(&self, entry: VoucherEntry) {
        self.put(entry, true);
    }

    fn put(&self, entry: VoucherEntry, pending: bool) {
        let mut inner = self.inner.lock();

        inner.insert(entry, pending, false);
        inner.evict(self.capacity);
    }

    /// Replaces cached rows with a fresh read of the sheet, except that a spent code stays spent.
    pub fn refresh(&self, entries: &[Located]) {
        let mut inner = self.inner.lock();

        for located in entries {
            let entry = inner.merge_read(located.entry.clone());
            inner.insert(entry, false, true);
        }
        inner.evict(self.capacity);
    }

    pub fn mark_spent(&self, code: &str, voucher_value: &str) {
        let mut inner = self.inner.lock();

        let Some(phone) = inner.by_code.get(&code.trim().to_uppercase()).cloned() else {
            return;
        };

        if let Some(cached) = inner.by_phone.get_mut(&phone) {
            cached.entry.spins_remaining = 0;
            cached.entry.voucher_value = voucher_value.to_string();
        }
    }

    pub fn pending(&self) -> Vec<VoucherEntry> {
        let inner = self.inner.lock();

        inner
            .order
            .iter()
            .filter_map(|phone| inner.by_phone.get(phone))
            .filter(|cached| cached.pending)
            .map(|cached| cached.entry.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(phone: &str, code: &str) -> VoucherEntry {
        VoucherEntry::issue("An", phone, code)
    }

    #[test]
    fn test_lookup_both_ways() {
        let cache = FallbackCache::new(10);
        cache.store(entry("0901234567", "AB12CD"));

        assert_eq!(cache.by_code(" ab12cd ").unwrap().entry.phone, "0901234567");
        assert_eq!(cache.by_phone("0901234567").unwrap().entry.code, "AB12CD");
        assert!(cache.by_code("ZZZZZZ").is_none());
    }

    #[test]
    fn test_new_code_drops_old_index() {
        let cache = FallbackCache::new(10);
        cache.store(entry("0901234567", "AAAAAA"));
        cache.store(entry("0901234567", "BBBBBB"));

        assert!(cache.by_code("AAAAAA").is_none());
        assert!(cache.by_code("BBBBBB").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_mark_spent() {
        let cache = FallbackCache::new(10);
        cache.store(entry("0901234567", "AB12CD"));
        cache.mark_spent("ab12cd", "100000");

        let cached = cache.by_code("AB12CD").unwrap();
        assert!(!cached.entry.has_spins());
        assert_eq!(cached.entry.voucher_value, "100000");
    }

    #[test]
    fn test_evicts_oldest() {
        let cache = FallbackCache::new(2);
        cache.store(entry("0900000001", "AAAAAA"));
        cache.store(entry("0900000002", "BBBBBB"));
        cache.store(entry("0900000003", "CCCCCC"));

        assert_eq!(cache.len(), 2);
        assert!(cache.by_phone("0900000001").is_none());
        assert!(cache.by_code("AAAAAA").is_none());
        assert!(cache.by_phone("0900000003").is_some());
    }

    #[test]
    fn test_evicts_pending_last() {
        let cache = FallbackCache::new(2);
        cache.store_pending(entry("0900000001", "AAAAAA"));
        cache.store(entry("0900000002", "BBBBBB"));
        cache.store(entry("0900000003", "CCCCCC"));

        assert!(cache.by_phone("0900000001").is_some());
        assert!(cache.by_phone("0900000002").is_none());
        assert_eq!(cache.pending(), vec![entry("0900000001", "AAAAAA")]);
    }

    #[test]
    fn test_refresh_clears_pending() {
        let cache = FallbackCache::new(10);
        cache.store_pending(entry("0901234567", "AB12CD"));

        let mut spent = entry("0901234567", "AB12CD");
        spent.spins_remaining = 0;
        cache.refresh(&[Located { row: 2, entry: spent }]);

        assert!(cache.pending().is_empty());
        assert!(!cache.by_phone("0901234567").unwrap().entry.has_spins());
    }

    #[test]
    fn test_stale_read_keeps_spent() {
        let cache = FallbackCache::new(10);
        cache.store(entry("0901234567", "AB12CD"));
        cache.mark_spent("AB12CD", "100000");

        let stale = entry("0901234567", "AB12CD");
        cache.refresh(&[Located { row: 2, entry: stale }]);

        let cached = cache.by_code("AB12CD").unwrap();
        assert!(!cached.entry.has_spins());
        assert_eq!(cached.entry.voucher_value, "100000");
    }

    #[test]
    fn test_new_code_for_phone_is_fresh() {
        let cache = FallbackCache::new(10);
        cache.store(entry("0901234567", "AB12CD"));
        cache.mark_spent("AB12CD", "100000");

        cache.refresh(&[Located { row: 2, entry: entry("0901234567", "ZZ99ZZ") }]);

        assert!(cache.by_code("ZZ99ZZ").unwrap().entry.has_spins());
        assert!(cache.by_code("AB12CD").is_none());
    }

    #[test]
    fn test_duplicate_code_resolves_to_first_row() {
        let cache = FallbackCache::new(10);
        cache.refresh(&[
            Located { row: 2, entry: entry("0900000001", "AAAAAA") },
            Located { row: 3, entry: entry("0900000002", "AAAAAA") },
        ]);

        assert_eq!(cache.by_code("AAAAAA").unwrap().entry.phone, "0900000001");
        assert_eq!(cache.len(), 2);

        // a second read keeps pointing at the first row
        cache.refresh(&[
            Located { row: 2, entry: entry("0900000001", "AAAAAA") },
            Located { row: 3, entry: entry("0900000002", "AAAAAA") },
        ]);
        assert_eq!(cache.by_code("AAAAAA").unwrap().entry.phone, "0900000001");
    }
}

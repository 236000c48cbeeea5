//! # Hash Index
//!
//! Open-addressed hash table with Robin Hood probing and back-shift
//! deletion. Every occupied slot records its probe-sequence length (psl):
//! the distance from the slot the key's hash points at to the slot the key
//! actually sits in. Insertion displaces entries with a smaller psl in
//! favor of the carried entry ("rich steals from poor"), which keeps
//! worst-case probe chains short; lookups can stop as soon as the search
//! distance exceeds a slot's psl.
//!
//! The table is not power-of-two sized; probing uses modulo. Resizing
//! doubles capacity and reinserts every entry with its psl reset.

use bytes::Bytes;

/// Slot count of a freshly created index.
pub const INITIAL_CAPACITY: usize = 1024;

/// Occupancy percentage that triggers a resize.
const LOAD_FACTOR_PCT: usize = 90;

/// Fixed hash seed. Hashes only need to be stable within a process
/// lifetime, so there is no per-process randomization.
const HASH_SEED: u64 = 0x6e75_6264;

/// Hash used for key placement (XXH3, 64-bit).
pub fn hash_key(key: &[u8]) -> u64 {
    twox_hash::xxh3::hash64_with_seed(key, HASH_SEED)
}

/// A stored value and its expiry.
#[derive(Debug, Clone)]
pub struct Record {
    pub value: Bytes,
    /// Absolute Unix timestamp in seconds; 0 means the entry never expires.
    pub expires_at: u64,
}

impl Record {
    pub fn new(value: Bytes, expires_at: u64) -> Self {
        Self { value, expires_at }
    }

    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.expires_at > 0 && now_secs >= self.expires_at
    }
}

#[derive(Debug)]
struct Slot {
    key: Bytes,
    record: Record,
    hash: u64,
    psl: u32,
}

/// Robin Hood hash table mapping key bytes to records.
pub struct HashIndex {
    slots: Vec<Option<Slot>>,
    count: usize,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "index capacity must be nonzero");
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Insert or overwrite. An existing key keeps its slot and psl; only the
    /// record is replaced (the old value buffer is dropped here).
    pub fn put(&mut self, key: Bytes, record: Record) {
        if (self.count + 1) * 100 >= self.capacity() * LOAD_FACTOR_PCT {
            self.resize();
        }
        let hash = hash_key(&key);
        self.insert_slot(Slot {
            key,
            record,
            hash,
            psl: 0,
        });
    }

    fn insert_slot(&mut self, mut entry: Slot) {
        let cap = self.slots.len();
        let mut pos = (entry.hash % cap as u64) as usize;

        loop {
            let slot = &mut self.slots[pos];
            match slot {
                None => {
                    *slot = Some(entry);
                    self.count += 1;
                    return;
                }
                Some(existing) => {
                    if existing.hash == entry.hash && existing.key == entry.key {
                        existing.record = entry.record;
                        return;
                    }
                    // Rich steals from poor: the carried entry takes this
                    // slot and the displaced one continues probing.
                    if entry.psl > existing.psl {
                        std::mem::swap(existing, &mut entry);
                    }
                    entry.psl += 1;
                    pos = (pos + 1) % cap;
                }
            }
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&Record> {
        self.find_slot(key).map(|pos| {
            let slot = self.slots[pos].as_ref().unwrap();
            &slot.record
        })
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.find_slot(key).is_some()
    }

    /// Remove a key and back-shift the run behind it so the Robin Hood
    /// ordering survives without tombstones.
    pub fn remove(&mut self, key: &[u8]) -> Option<Record> {
        let pos = self.find_slot(key)?;
        let removed = self.slots[pos].take().expect("located slot is occupied");
        self.count -= 1;

        let cap = self.slots.len();
        let mut hole = pos;
        loop {
            let next = (hole + 1) % cap;
            let shiftable = matches!(&self.slots[next], Some(slot) if slot.psl > 0);
            if !shiftable {
                break;
            }
            let mut moved = self.slots[next].take().expect("checked occupied");
            moved.psl -= 1;
            self.slots[hole] = Some(moved);
            hole = next;
        }

        Some(removed.record)
    }

    fn find_slot(&self, key: &[u8]) -> Option<usize> {
        let hash = hash_key(key);
        let cap = self.slots.len();
        let mut pos = (hash % cap as u64) as usize;
        let mut distance: u32 = 0;

        loop {
            match &self.slots[pos] {
                None => return None,
                Some(slot) => {
                    // Robin Hood early termination: a present key would have
                    // displaced this slot already.
                    if distance > slot.psl {
                        return None;
                    }
                    if slot.hash == hash && slot.key.as_ref() == key {
                        return Some(pos);
                    }
                }
            }
            distance += 1;
            pos = (pos + 1) % cap;
        }
    }

    /// Double the capacity and reinsert every entry. Hashes are reused;
    /// psls are recomputed from scratch.
    fn resize(&mut self) {
        let new_cap = self.slots.len() * 2;
        let old = std::mem::replace(
            &mut self.slots,
            (0..new_cap).map(|_| None).collect(),
        );
        self.count = 0;

        for slot in old.into_iter().flatten() {
            self.insert_slot(Slot { psl: 0, ..slot });
        }
    }

    /// Drop every entry. Capacity is kept.
    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.count = 0;
    }

    /// Iterate occupied slots in array order. Callers must hold the
    /// surrounding lock for the whole iteration; mutating while iterating
    /// is not possible through this borrow.
    pub fn iter(&self) -> impl Iterator<Item = (&Bytes, &Record)> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| (&slot.key, &slot.record))
    }

    /// Longest probe chain currently in the table.
    pub fn max_psl(&self) -> u32 {
        self.slots
            .iter()
            .flatten()
            .map(|slot| slot.psl)
            .max()
            .unwrap_or(0)
    }
}

impl Default for HashIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn record(s: &str) -> Record {
        Record::new(Bytes::copy_from_slice(s.as_bytes()), 0)
    }

    /// Every occupied slot's distance from its ideal position must equal
    /// its stored psl, and `count` must match the number of occupied slots.
    fn assert_invariants(index: &HashIndex) {
        let cap = index.slots.len();
        let mut occupied = 0;
        for (pos, slot) in index.slots.iter().enumerate() {
            if let Some(slot) = slot {
                occupied += 1;
                let ideal = (slot.hash % cap as u64) as usize;
                let distance = (pos + cap - ideal) % cap;
                assert_eq!(
                    distance, slot.psl as usize,
                    "slot at {} has psl {} but distance {}",
                    pos, slot.psl, distance
                );
            }
        }
        assert_eq!(occupied, index.count);
    }

    #[test]
    fn test_put_get_remove() {
        let mut index = HashIndex::new();
        index.put(key("alpha"), record("1"));
        index.put(key("beta"), record("2"));

        assert_eq!(index.len(), 2);
        assert_eq!(index.get(b"alpha").unwrap().value.as_ref(), b"1");
        assert_eq!(index.get(b"beta").unwrap().value.as_ref(), b"2");
        assert!(index.get(b"gamma").is_none());

        let removed = index.remove(b"alpha").unwrap();
        assert_eq!(removed.value.as_ref(), b"1");
        assert!(index.get(b"alpha").is_none());
        assert_eq!(index.len(), 1);
        assert_invariants(&index);
    }

    #[test]
    fn test_overwrite_keeps_count() {
        let mut index = HashIndex::new();
        index.put(key("k"), record("old"));
        index.put(key("k"), record("new"));

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(b"k").unwrap().value.as_ref(), b"new");
        assert_invariants(&index);
    }

    #[test]
    fn test_empty_key_and_value_are_allowed() {
        let mut index = HashIndex::new();
        index.put(key(""), record(""));
        assert_eq!(index.get(b"").unwrap().value.as_ref(), b"");
        assert!(index.remove(b"").is_some());
    }

    #[test]
    fn test_dense_cluster_back_shift() {
        // A tiny table forces long shared probe chains.
        let mut index = HashIndex::with_capacity(16);
        let keys: Vec<String> = (0..10).map(|i| format!("cluster-{}", i)).collect();
        for k in &keys {
            index.put(key(k), record(k));
        }
        assert_invariants(&index);

        // Remove from the middle of the run and verify the rest survive.
        for k in keys.iter().step_by(2) {
            assert!(index.remove(k.as_bytes()).is_some());
            assert_invariants(&index);
        }
        for (i, k) in keys.iter().enumerate() {
            if i % 2 == 0 {
                assert!(index.get(k.as_bytes()).is_none());
            } else {
                assert_eq!(index.get(k.as_bytes()).unwrap().value.as_ref(), k.as_bytes());
            }
        }
    }

    #[test]
    fn test_resize_at_load_factor_preserves_entries() {
        let mut index = HashIndex::with_capacity(100);
        // 89 entries fit under the 90% threshold; the 90th must resize.
        for i in 0..89 {
            index.put(key(&format!("k{}", i)), record("v"));
        }
        assert_eq!(index.capacity(), 100);

        index.put(key("k89"), record("v"));
        assert_eq!(index.capacity(), 200);
        assert_eq!(index.len(), 90);

        for i in 0..90 {
            assert!(index.get(format!("k{}", i).as_bytes()).is_some());
        }
        assert_invariants(&index);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let mut index = HashIndex::new();
        for i in 0..100 {
            index.put(key(&format!("k{}", i)), record("v"));
        }
        let cap = index.capacity();
        index.clear();
        assert_eq!(index.len(), 0);
        assert_eq!(index.capacity(), cap);
        assert!(index.get(b"k0").is_none());
    }

    #[test]
    fn test_iter_visits_every_entry() {
        let mut index = HashIndex::new();
        for i in 0..50 {
            index.put(key(&format!("k{}", i)), record(&format!("v{}", i)));
        }
        let mut seen: Vec<String> = index
            .iter()
            .map(|(k, _)| String::from_utf8_lossy(k).into_owned())
            .collect();
        seen.sort();
        assert_eq!(seen.len(), 50);
        assert_eq!(seen[0], "k0");
    }

    #[test]
    fn test_record_expiry() {
        let rec = Record::new(Bytes::from_static(b"x"), 100);
        assert!(!rec.is_expired(99));
        assert!(rec.is_expired(100));
        assert!(rec.is_expired(101));

        let eternal = Record::new(Bytes::from_static(b"x"), 0);
        assert!(!eternal.is_expired(u64::MAX));
    }
}

//! Fingerprint index: `hash → [(song, offset)]`.
//!
//! [`FingerprintIndex`] is the in-memory store. Inserts take the write lock
//! once per song, so concurrent indexing jobs never lose bucket updates, and a
//! batch lookup takes the read lock once, so a match call sees one consistent
//! snapshot. Integrators with their own storage implement
//! [`FingerprintStore`] instead.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{Fingerprint, FingerprintHash, FingerprintRecord, SongId};

/// One occurrence of a hash inside an indexed song.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Posting {
    /// Song containing the hash
    pub song_id: SongId,
    /// Anchor time frame inside the song
    pub offset: u32,
}

/// Read side of a fingerprint store.
pub trait FingerprintLookup: Send + Sync {
    /// All postings for a hash, empty if unseen.
    fn lookup(&self, hash: FingerprintHash) -> Vec<Posting>;

    /// Postings for several hashes. Hashes without postings are omitted.
    fn lookup_many(&self, hashes: &[FingerprintHash]) -> FxHashMap<FingerprintHash, Vec<Posting>> {
        hashes
            .iter()
            .filter_map(|&hash| {
                let postings = self.lookup(hash);
                (!postings.is_empty()).then_some((hash, postings))
            })
            .collect()
    }

    /// Number of hashes stored for a song.
    fn song_hash_count(&self, song_id: &SongId) -> usize;
}

/// Write side of a fingerprint store.
pub trait FingerprintStore: FingerprintLookup {
    /// Append a song's fingerprints, returning how many were stored.
    fn insert(&self, song_id: &SongId, fingerprints: &[Fingerprint]) -> usize;
}

#[derive(Debug, Default)]
struct IndexInner {
    buckets: FxHashMap<FingerprintHash, Vec<Posting>>,
    song_counts: FxHashMap<SongId, usize>,
    total: usize,
}

/// Thread-safe in-memory fingerprint index.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    inner: RwLock<IndexInner>,
}

impl FingerprintIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().total
    }

    /// Check if the index holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct hashes.
    pub fn distinct_hashes(&self) -> usize {
        self.inner.read().buckets.len()
    }

    /// Number of songs with at least one record.
    pub fn song_count(&self) -> usize {
        self.inner.read().song_counts.len()
    }

    /// Indexed songs, sorted.
    pub fn songs(&self) -> Vec<SongId> {
        let mut songs: Vec<SongId> = self.inner.read().song_counts.keys().cloned().collect();
        songs.sort();
        songs
    }

    /// Drop every record of a song, returning how many were removed.
    pub fn remove_song(&self, song_id: &SongId) -> usize {
        let mut inner = self.inner.write();
        let Some(count) = inner.song_counts.remove(song_id) else {
            return 0;
        };
        inner.buckets.retain(|_, postings| {
            postings.retain(|p| &p.song_id != song_id);
            !postings.is_empty()
        });
        inner.total -= count;
        info!(song_id = %song_id, removed = count, "Removed song from index");
        count
    }

    /// Copy of the records belonging to one song, as a standalone index.
    ///
    /// Used for focused matching against a single candidate.
    pub fn restricted_to(&self, song_id: &SongId) -> FingerprintIndex {
        let inner = self.inner.read();
        let mut restricted = IndexInner::default();
        for (hash, postings) in &inner.buckets {
            let kept: Vec<Posting> = postings.iter().filter(|p| &p.song_id == song_id).cloned().collect();
            if !kept.is_empty() {
                restricted.total += kept.len();
                restricted.buckets.insert(*hash, kept);
            }
        }
        if restricted.total > 0 {
            restricted.song_counts.insert(song_id.clone(), restricted.total);
        }
        FingerprintIndex {
            inner: RwLock::new(restricted),
        }
    }

    /// Every stored record, sorted by song, offset, then hash.
    pub fn records(&self) -> Vec<FingerprintRecord> {
        let inner = self.inner.read();
        let mut records: Vec<FingerprintRecord> = inner
            .buckets
            .iter()
            .flat_map(|(hash, postings)| {
                postings.iter().map(move |p| FingerprintRecord {
                    song_id: p.song_id.clone(),
                    hash: *hash,
                    offset: p.offset,
                })
            })
            .collect();
        records.sort_by(|a, b| {
            a.song_id
                .cmp(&b.song_id)
                .then(a.offset.cmp(&b.offset))
                .then(a.hash.cmp(&b.hash))
        });
        records
    }

    /// Build an index from durable records.
    pub fn from_records(records: impl IntoIterator<Item = FingerprintRecord>) -> Self {
        let mut inner = IndexInner::default();
        for record in records {
            inner.buckets.entry(record.hash).or_default().push(Posting {
                song_id: record.song_id.clone(),
                offset: record.offset,
            });
            *inner.song_counts.entry(record.song_id).or_default() += 1;
            inner.total += 1;
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Serializable snapshot, storing each hash as a `hash_width`-byte string.
    ///
    /// Fails when a stored hash is wider than `hash_width` bytes, since
    /// dropping its high bytes would leave a value no query can produce.
    pub fn snapshot(&self, hash_width: usize) -> Result<IndexSnapshot> {
        let records = self
            .records()
            .into_iter()
            .map(|r| {
                if !r.hash.fits(hash_width) {
                    return Err(Error::Snapshot(format!(
                        "hash {} of song {} does not fit in {} bytes",
                        r.hash, r.song_id, hash_width
                    )));
                }
                Ok(SnapshotRecord {
                    hash: STANDARD.encode(r.hash.to_bytes(hash_width)),
                    song_id: r.song_id,
                    offset: r.offset,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(IndexSnapshot { hash_width, records })
    }

    /// Rebuild an index from a snapshot.
    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self> {
        let width = snapshot.hash_width;
        let records = snapshot
            .records
            .into_iter()
            .map(|r| {
                let bytes = STANDARD
                    .decode(&r.hash)
                    .map_err(|e| Error::Snapshot(format!("hash {:?}: {}", r.hash, e)))?;
                if bytes.len() != width {
                    return Err(Error::Snapshot(format!(
                        "hash {:?} is {} bytes, expected {}",
                        r.hash,
                        bytes.len(),
                        width
                    )));
                }
                let hash = FingerprintHash::from_bytes(&bytes)
                    .ok_or_else(|| Error::Snapshot(format!("hash {:?} has an invalid width", r.hash)))?;
                Ok(FingerprintRecord {
                    song_id: r.song_id,
                    hash,
                    offset: r.offset,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_records(records))
    }

    /// Write a JSON snapshot to disk.
    pub fn save_snapshot(&self, path: impl AsRef<Path>, hash_width: usize) -> Result<()> {
        let snapshot = self.snapshot(hash_width)?;
        let json = serde_json::to_string(&snapshot)?;
        std::fs::write(path.as_ref(), json)?;
        info!(
            path = %path.as_ref().display(),
            records = snapshot.records.len(),
            "Saved index snapshot"
        );
        Ok(())
    }

    /// Read a JSON snapshot from disk.
    pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let snapshot: IndexSnapshot = serde_json::from_str(&json)?;
        let index = Self::from_snapshot(snapshot)?;
        info!(
            path = %path.as_ref().display(),
            records = index.len(),
            songs = index.song_count(),
            "Loaded index snapshot"
        );
        Ok(index)
    }
}

impl FingerprintLookup for FingerprintIndex {
    fn lookup(&self, hash: FingerprintHash) -> Vec<Posting> {
        self.inner.read().buckets.get(&hash).cloned().unwrap_or_default()
    }

    fn lookup_many(&self, hashes: &[FingerprintHash]) -> FxHashMap<FingerprintHash, Vec<Posting>> {
        let inner = self.inner.read();
        hashes
            .iter()
            .filter_map(|hash| inner.buckets.get(hash).map(|postings| (*hash, postings.clone())))
            .collect()
    }

    fn song_hash_count(&self, song_id: &SongId) -> usize {
        self.inner.read().song_counts.get(song_id).copied().unwrap_or(0)
    }
}

impl FingerprintStore for FingerprintIndex {
    fn insert(&self, song_id: &SongId, fingerprints: &[Fingerprint]) -> usize {
        if fingerprints.is_empty() {
            return 0;
        }
        let mut inner = self.inner.write();
        for fp in fingerprints {
            inner.buckets.entry(fp.hash).or_default().push(Posting {
                song_id: song_id.clone(),
                offset: fp.offset,
            });
        }
        *inner.song_counts.entry(song_id.clone()).or_default() += fingerprints.len();
        inner.total += fingerprints.len();
        debug!(song_id = %song_id, records = fingerprints.len(), total = inner.total, "Inserted fingerprints");
        fingerprints.len()
    }
}

/// Lookup view exposing a single song of another store.
pub struct SongFilter<'a, L: FingerprintLookup + ?Sized> {
    inner: &'a L,
    song_id: &'a SongId,
}

impl<'a, L: FingerprintLookup + ?Sized> SongFilter<'a, L> {
    /// Restrict `inner` to `song_id`.
    pub fn new(inner: &'a L, song_id: &'a SongId) -> Self {
        Self { inner, song_id }
    }
}

impl<L: FingerprintLookup + ?Sized> FingerprintLookup for SongFilter<'_, L> {
    fn lookup(&self, hash: FingerprintHash) -> Vec<Posting> {
        let mut postings = self.inner.lookup(hash);
        postings.retain(|p| &p.song_id == self.song_id);
        postings
    }

    fn lookup_many(&self, hashes: &[FingerprintHash]) -> FxHashMap<FingerprintHash, Vec<Posting>> {
        let mut hits = self.inner.lookup_many(hashes);
        hits.retain(|_, postings| {
            postings.retain(|p| &p.song_id == self.song_id);
            !postings.is_empty()
        });
        hits
    }

    fn song_hash_count(&self, song_id: &SongId) -> usize {
        if song_id == self.song_id {
            self.inner.song_hash_count(song_id)
        } else {
            0
        }
    }
}

/// Persisted form of a [`FingerprintIndex`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Width in bytes of every stored hash
    pub hash_width: usize,
    /// Durable records
    pub records: Vec<SnapshotRecord>,
}

/// Durable `(song, hash, offset)` triple with a base64 byte-string hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Song identifier
    pub song_id: SongId,
    /// Fixed-width hash bytes, base64 encoded
    pub hash: String,
    /// Anchor time frame
    pub offset: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fp(hash: u64, offset: u32) -> Fingerprint {
        Fingerprint {
            hash: FingerprintHash::from_raw(hash),
            offset,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let index = FingerprintIndex::new();
        let song = SongId::from("song-a");
        assert_eq!(index.insert(&song, &[fp(1, 10), fp(2, 11), fp(1, 40)]), 3);

        let postings = index.lookup(FingerprintHash::from_raw(1));
        assert_eq!(postings.len(), 2);
        assert!(postings.contains(&Posting { song_id: song.clone(), offset: 10 }));
        assert!(postings.contains(&Posting { song_id: song.clone(), offset: 40 }));
        assert!(index.lookup(FingerprintHash::from_raw(99)).is_empty());
        assert_eq!(index.song_hash_count(&song), 3);
        assert_eq!(index.len(), 3);
        assert_eq!(index.distinct_hashes(), 2);
    }

    #[test]
    fn test_shared_hash_across_songs() {
        let index = FingerprintIndex::new();
        index.insert(&SongId::from("a"), &[fp(7, 1)]);
        index.insert(&SongId::from("b"), &[fp(7, 5)]);
        let postings = index.lookup(FingerprintHash::from_raw(7));
        assert_eq!(postings.len(), 2);
        assert_eq!(index.song_count(), 2);
        assert_eq!(index.songs(), vec![SongId::from("a"), SongId::from("b")]);
    }

    #[test]
    fn test_duplicates_are_retained() {
        let index = FingerprintIndex::new();
        let song = SongId::from("a");
        index.insert(&song, &[fp(3, 9), fp(3, 9)]);
        assert_eq!(index.lookup(FingerprintHash::from_raw(3)).len(), 2);
    }

    #[test]
    fn test_lookup_many_skips_unseen() {
        let index = FingerprintIndex::new();
        index.insert(&SongId::from("a"), &[fp(1, 0), fp(2, 1)]);
        let hits = index.lookup_many(&[
            FingerprintHash::from_raw(1),
            FingerprintHash::from_raw(5),
        ]);
        assert_eq!(hits.len(), 1);
        assert!(hits.contains_key(&FingerprintHash::from_raw(1)));
    }

    #[test]
    fn test_remove_song() {
        let index = FingerprintIndex::new();
        index.insert(&SongId::from("a"), &[fp(1, 0), fp(2, 1)]);
        index.insert(&SongId::from("b"), &[fp(1, 4)]);
        assert_eq!(index.remove_song(&SongId::from("a")), 2);
        assert_eq!(index.len(), 1);
        assert_eq!(index.distinct_hashes(), 1);
        assert_eq!(index.remove_song(&SongId::from("a")), 0);
    }

    #[test]
    fn test_restricted_to_and_filter() {
        let index = FingerprintIndex::new();
        let a = SongId::from("a");
        let b = SongId::from("b");
        index.insert(&a, &[fp(1, 0), fp(2, 1)]);
        index.insert(&b, &[fp(1, 4), fp(3, 2)]);

        let only_b = index.restricted_to(&b);
        assert_eq!(only_b.len(), 2);
        assert_eq!(only_b.lookup(FingerprintHash::from_raw(1)), vec![Posting { song_id: b.clone(), offset: 4 }]);
        assert_eq!(only_b.song_hash_count(&a), 0);

        let filter = SongFilter::new(&index, &b);
        assert_eq!(filter.lookup(FingerprintHash::from_raw(1)).len(), 1);
        assert!(filter.lookup(FingerprintHash::from_raw(2)).is_empty());
        assert_eq!(filter.song_hash_count(&b), 2);
        assert_eq!(filter.song_hash_count(&a), 0);
        let hits = filter.lookup_many(&[FingerprintHash::from_raw(1), FingerprintHash::from_raw(2)]);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_concurrent_inserts_do_not_lose_updates() {
        let index = Arc::new(FingerprintIndex::new());
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    let song = SongId::new(format!("song-{}", n));
                    for offset in 0..100 {
                        // Every song shares hash 42 and owns one private hash
                        index.insert(&song, &[fp(42, offset), fp(1000 + n, offset)]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.len(), 8 * 200);
        assert_eq!(index.lookup(FingerprintHash::from_raw(42)).len(), 800);
        for n in 0..8u64 {
            assert_eq!(index.song_hash_count(&SongId::new(format!("song-{}", n))), 200);
        }
    }

    #[test]
    fn test_snapshot_restores_records() {
        let index = FingerprintIndex::new();
        index.insert(&SongId::from("a"), &[fp(0x0102, 5), fp(0x0304, 6)]);
        index.insert(&SongId::from("b"), &[fp(0x0102, 1)]);

        let snapshot = index.snapshot(2).unwrap();
        assert_eq!(snapshot.records.len(), 3);
        assert_eq!(snapshot.records[0].hash, STANDARD.encode([0x01u8, 0x02]));

        let restored = FingerprintIndex::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.records(), index.records());
    }

    #[test]
    fn test_snapshot_rejects_wrong_width() {
        let snapshot = IndexSnapshot {
            hash_width: 4,
            records: vec![SnapshotRecord {
                song_id: SongId::from("a"),
                hash: STANDARD.encode([1u8, 2]),
                offset: 0,
            }],
        };
        let err = FingerprintIndex::from_snapshot(snapshot).unwrap_err();
        assert_eq!(err.error_code(), "SNAPSHOT");
    }

    #[test]
    fn test_snapshot_refuses_narrower_width() {
        let index = FingerprintIndex::new();
        let wide = FingerprintHash::truncate(0x0123_4567_89ab_cdef, 8);
        index.insert(
            &SongId::from("a"),
            &[Fingerprint {
                hash: wide,
                offset: 3,
            }],
        );

        let err = index.snapshot(4).unwrap_err();
        assert_eq!(err.error_code(), "SNAPSHOT");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        assert!(index.save_snapshot(&path, 4).is_err());
        assert!(!path.exists());

        let restored = FingerprintIndex::from_snapshot(index.snapshot(8).unwrap()).unwrap();
        assert_eq!(restored.lookup(wide).len(), 1);
    }

    #[test]
    fn test_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");

        let index = FingerprintIndex::new();
        index.insert(&SongId::from("a"), &[fp(11, 5), fp(12, 6)]);
        index.save_snapshot(&path, 8).unwrap();

        let loaded = FingerprintIndex::load_snapshot(&path).unwrap();
        assert_eq!(loaded.records(), index.records());
        assert_eq!(loaded.song_hash_count(&SongId::from("a")), 2);
    }
}

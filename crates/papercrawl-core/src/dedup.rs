//! Concurrent bloom filter for record deduplication
//!
//! Bits live in `AtomicU64` words set with `fetch_or`, so `add` and
//! `might_contain` never lock and concurrent inserts never lose a bit.
//! [`BloomFilter::check_and_add`] additionally serializes check-then-insert so
//! two tasks racing on the same key deliver it once.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::DedupError;

const FILE_MAGIC: &[u8; 4] = b"PCBF";
const HEADER_LEN: usize = 4 + 8 + 4 + 8;

const SEED_STEP: u64 = 0x9e37_79b9_7f4a_7c15;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Bit count and hash count for `n` expected elements at false-positive rate `p`.
///
/// `m = ceil(-n ln p / (ln 2)^2)`, `k = max(1, round(m / n * ln 2))`.
pub fn optimal_params(expected_elements: usize, false_positive_rate: f64) -> (usize, u32) {
    let n = expected_elements as f64;
    let ln2 = std::f64::consts::LN_2;
    let m = (-(n * false_positive_rate.ln()) / (ln2 * ln2)).ceil().max(1.0);
    let k = ((m / n) * ln2).round().max(1.0);
    (m as usize, k as u32)
}

/// Seeded polynomial hash over `key` followed by the murmur3 64-bit finalizer.
fn bloom_hash(key: &[u8], index: u32) -> u64 {
    let mut h = (u64::from(index) + 1).wrapping_mul(SEED_STEP) ^ key.len() as u64;
    for &byte in key {
        h = h.wrapping_mul(FNV_PRIME).wrapping_add(u64::from(byte));
    }
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^ (h >> 33)
}

pub struct BloomFilter {
    words: Box<[AtomicU64]>,
    num_bits: usize,
    num_hashes: u32,
    /// Insertions, duplicates included. Reset only by `clear`.
    element_count: AtomicU64,
    insert_gate: Mutex<()>,
}

impl BloomFilter {
    pub fn with_params(num_bits: usize, num_hashes: u32) -> Result<Self, DedupError> {
        if num_bits == 0 {
            return Err(DedupError::InvalidParameters("size must be positive".into()));
        }
        if num_hashes == 0 {
            return Err(DedupError::InvalidParameters(
                "hash count must be positive".into(),
            ));
        }
        let words = (0..num_bits.div_ceil(64))
            .map(|_| AtomicU64::new(0))
            .collect();
        Ok(Self {
            words,
            num_bits,
            num_hashes,
            element_count: AtomicU64::new(0),
            insert_gate: Mutex::new(()),
        })
    }

    /// Size for `expected_elements` at `false_positive_rate`.
    pub fn with_rate(expected_elements: usize, false_positive_rate: f64) -> Result<Self, DedupError> {
        if expected_elements == 0 {
            return Err(DedupError::InvalidParameters(
                "expected elements must be positive".into(),
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(DedupError::InvalidParameters(format!(
                "false positive rate must be in (0, 1), got {false_positive_rate}"
            )));
        }
        let (m, k) = optimal_params(expected_elements, false_positive_rate);
        log::debug!(
            "bloom filter sized for {expected_elements} elements at p={false_positive_rate}: m={m}, k={k}"
        );
        Self::with_params(m, k)
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn element_count(&self) -> u64 {
        self.element_count.load(Ordering::Relaxed)
    }

    fn bit_position(&self, key: &[u8], index: u32) -> (usize, u64) {
        let bit = (bloom_hash(key, index) % self.num_bits as u64) as usize;
        (bit / 64, 1u64 << (bit % 64))
    }

    /// Set the key's bits; returns whether any bit flipped from 0.
    fn set_bits(&self, key: &[u8]) -> bool {
        let mut changed = false;
        for i in 0..self.num_hashes {
            let (word, mask) = self.bit_position(key, i);
            let prev = self.words[word].fetch_or(mask, Ordering::AcqRel);
            changed |= prev & mask == 0;
        }
        changed
    }

    /// Insert `key`. Empty keys are ignored.
    pub fn add(&self, key: &str) {
        if key.is_empty() {
            return;
        }
        self.set_bits(key.as_bytes());
        self.element_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.add(key);
        }
    }

    /// `false` means definitely never added. Empty keys are never contained.
    pub fn might_contain(&self, key: &str) -> bool {
        if key.is_empty() {
            return false;
        }
        (0..self.num_hashes).all(|i| {
            let (word, mask) = self.bit_position(key.as_bytes(), i);
            self.words[word].load(Ordering::Acquire) & mask != 0
        })
    }

    /// Insert `key` unless it may already be present; `true` if it was novel.
    ///
    /// Concurrent callers with the same key see exactly one `true`. Empty keys
    /// are always novel and never stored.
    pub fn check_and_add(&self, key: &str) -> bool {
        if key.is_empty() {
            return true;
        }
        let _gate = self
            .insert_gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.set_bits(key.as_bytes()) {
            return false;
        }
        self.element_count.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// `(1 - e^(-k n / m))^k`, 0 when empty, capped at 1.
    pub fn estimate_false_positive_rate(&self) -> f64 {
        let n = self.element_count();
        if n == 0 {
            return 0.0;
        }
        let k = f64::from(self.num_hashes);
        let exponent = -k * n as f64 / self.num_bits as f64;
        (1.0 - exponent.exp()).powf(k).min(1.0)
    }

    /// OR `other` into `self` and add its insertion count.
    pub fn merge(&self, other: &BloomFilter) -> Result<(), DedupError> {
        if self.num_bits != other.num_bits || self.num_hashes != other.num_hashes {
            return Err(DedupError::ParameterMismatch {
                expected: (self.num_bits, self.num_hashes),
                actual: (other.num_bits, other.num_hashes),
            });
        }
        for (dst, src) in self.words.iter().zip(other.words.iter()) {
            dst.fetch_or(src.load(Ordering::Acquire), Ordering::AcqRel);
        }
        self.element_count
            .fetch_add(other.element_count(), Ordering::Relaxed);
        Ok(())
    }

    pub fn clear(&self) {
        let _gate = self
            .insert_gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for word in self.words.iter() {
            word.store(0, Ordering::Release);
        }
        self.element_count.store(0, Ordering::Relaxed);
    }

    pub fn bits_set(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }

    pub fn fill_ratio(&self) -> f64 {
        self.bits_set() as f64 / self.num_bits as f64
    }

    /// One-line human summary
    pub fn status(&self) -> String {
        format!(
            "bloom filter: {} bits, {} hashes, {} insertions, {:.2}% full, est. FP rate {:.4}%",
            self.num_bits,
            self.num_hashes,
            self.element_count(),
            self.fill_ratio() * 100.0,
            self.estimate_false_positive_rate() * 100.0
        )
    }

    /// Raw bit array, `ceil(m / 8)` bytes, bit `i` at byte `i / 8`, LSB first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.num_bits.div_ceil(8);
        let mut out = Vec::with_capacity(len);
        for word in self.words.iter() {
            out.extend_from_slice(&word.load(Ordering::Acquire).to_le_bytes());
        }
        out.truncate(len);
        out
    }

    /// Rebuild from [`to_bytes`](Self::to_bytes) output. Bits past `m` are dropped.
    pub fn from_bytes(
        num_bits: usize,
        num_hashes: u32,
        bytes: &[u8],
        element_count: u64,
    ) -> Result<Self, DedupError> {
        let filter = Self::with_params(num_bits, num_hashes)?;
        let expected = num_bits.div_ceil(8);
        if bytes.len() != expected {
            return Err(DedupError::BufferSize {
                expected,
                actual: bytes.len(),
            });
        }
        for (word, chunk) in filter.words.iter().zip(bytes.chunks(8)) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            word.store(u64::from_le_bytes(buf), Ordering::Relaxed);
        }
        let tail = num_bits % 64;
        if tail != 0 {
            if let Some(last) = filter.words.last() {
                last.fetch_and((1u64 << tail) - 1, Ordering::Relaxed);
            }
        }
        filter.element_count.store(element_count, Ordering::Relaxed);
        Ok(filter)
    }

    /// Write header `(magic, m, k, count)` and the raw bits.
    pub fn save(&self, path: &Path) -> Result<(), DedupError> {
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(FILE_MAGIC)?;
        writer.write_all(&(self.num_bits as u64).to_le_bytes())?;
        writer.write_all(&self.num_hashes.to_le_bytes())?;
        writer.write_all(&self.element_count().to_le_bytes())?;
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        log::info!(
            "Saved bloom filter ({} insertions) to {}",
            self.element_count(),
            path.display()
        );
        Ok(())
    }

    /// Read a filter written by [`save`](Self::save).
    ///
    /// The header is checked against the file length before any bit buffer is
    /// allocated, so a corrupt or truncated file is rejected without sizing
    /// memory from its header.
    pub fn load(path: &Path) -> Result<Self, DedupError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut header = [0u8; HEADER_LEN];
        reader.read_exact(&mut header)?;
        if &header[..4] != FILE_MAGIC {
            return Err(DedupError::InvalidParameters(format!(
                "{} is not a bloom filter file",
                path.display()
            )));
        }
        let field = |range: std::ops::Range<usize>| -> [u8; 8] {
            let mut buf = [0u8; 8];
            buf[..range.len()].copy_from_slice(&header[range]);
            buf
        };
        let raw_bits = u64::from_le_bytes(field(4..12));
        let num_hashes = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);
        let element_count = u64::from_le_bytes(field(16..24));
        if raw_bits == 0 || num_hashes == 0 {
            return Err(DedupError::InvalidParameters(format!(
                "{}: header declares m={raw_bits}, k={num_hashes}",
                path.display()
            )));
        }

        let expected = raw_bits.div_ceil(8);
        let actual = file_len.saturating_sub(HEADER_LEN as u64);
        if actual != expected {
            let clamp = |n: u64| usize::try_from(n).unwrap_or(usize::MAX);
            return Err(DedupError::BufferSize {
                expected: clamp(expected),
                actual: clamp(actual),
            });
        }
        let num_bits = usize::try_from(raw_bits).map_err(|_| {
            DedupError::InvalidParameters("bit count does not fit in memory".into())
        })?;

        let mut bytes = Vec::with_capacity(num_bits.div_ceil(8));
        reader.take(expected).read_to_end(&mut bytes)?;
        let filter = Self::from_bytes(num_bits, num_hashes, &bytes, element_count)?;
        log::info!(
            "Loaded bloom filter ({element_count} insertions) from {}",
            path.display()
        );
        Ok(filter)
    }
}

impl Clone for BloomFilter {
    fn clone(&self) -> Self {
        let _gate = self
            .insert_gate
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Self {
            words: self
                .words
                .iter()
                .map(|w| AtomicU64::new(w.load(Ordering::Acquire)))
                .collect(),
            num_bits: self.num_bits,
            num_hashes: self.num_hashes,
            element_count: AtomicU64::new(self.element_count()),
            insert_gate: Mutex::new(()),
        }
    }
}

impl fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.num_hashes)
            .field("element_count", &self.element_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn params_for_10k_at_1pct() {
        let (m, k) = optimal_params(10_000, 0.01);
        assert_eq!(m, 95_851);
        assert_eq!(k, 7);
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(BloomFilter::with_params(0, 3).is_err());
        assert!(BloomFilter::with_params(64, 0).is_err());
        assert!(BloomFilter::with_rate(0, 0.01).is_err());
        assert!(BloomFilter::with_rate(100, 0.0).is_err());
        assert!(BloomFilter::with_rate(100, 1.0).is_err());
        assert!(BloomFilter::with_rate(100, f64::NAN).is_err());
    }

    #[test]
    fn no_false_negatives() {
        let filter = BloomFilter::with_rate(10_000, 0.01).unwrap();
        let keys: Vec<String> = (0..10_000).map(|i| format!("arxiv:2401.{i:05}")).collect();
        filter.add_all(keys.iter().map(String::as_str));
        for key in &keys {
            assert!(filter.might_contain(key), "false negative for {key}");
        }
        assert_eq!(filter.element_count(), 10_000);
    }

    #[test]
    fn observed_fp_rate_near_target() {
        let filter = BloomFilter::with_rate(10_000, 0.01).unwrap();
        for i in 0..10_000 {
            filter.add(&format!("in-{i}"));
        }
        let hits = (0..10_000)
            .filter(|i| filter.might_contain(&format!("out-{i}")))
            .count();
        // 1% target, generous bound against hash variance
        assert!(hits < 300, "{hits} false positives out of 10000");
    }

    #[test]
    fn empty_key_ignored() {
        let filter = BloomFilter::with_params(1024, 3).unwrap();
        filter.add("");
        assert_eq!(filter.element_count(), 0);
        assert_eq!(filter.bits_set(), 0);
        assert!(!filter.might_contain(""));
        assert!(filter.check_and_add(""));
        assert!(filter.check_and_add(""));
        assert_eq!(filter.element_count(), 0);
    }

    #[test]
    fn duplicates_counted_by_add() {
        let filter = BloomFilter::with_params(1024, 3).unwrap();
        filter.add("a");
        filter.add("a");
        assert_eq!(filter.element_count(), 2);
    }

    #[test]
    fn check_and_add_once() {
        let filter = BloomFilter::with_params(4096, 4).unwrap();
        assert!(filter.check_and_add("X"));
        assert!(!filter.check_and_add("X"));
        assert!(filter.might_contain("X"));
        assert_eq!(filter.element_count(), 1);
    }

    #[test]
    fn check_and_add_races() {
        let filter = Arc::new(BloomFilter::with_params(1 << 16, 5).unwrap());
        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let filter = Arc::clone(&filter);
                    s.spawn(move || {
                        (0..500)
                            .filter(|i| filter.check_and_add(&format!("key-{i}")))
                            .count()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).sum()
        });
        // Each key novel exactly once, minus rare false positives
        assert!(winners <= 500);
        assert!(winners >= 490, "only {winners} novel keys");
    }

    #[test]
    fn concurrent_adds_lose_nothing() {
        let filter = Arc::new(BloomFilter::with_rate(20_000, 0.01).unwrap());
        std::thread::scope(|s| {
            for t in 0..4 {
                let filter = Arc::clone(&filter);
                s.spawn(move || {
                    for i in 0..5_000 {
                        filter.add(&format!("t{t}-{i}"));
                    }
                });
            }
        });
        assert_eq!(filter.element_count(), 20_000);
        for t in 0..4 {
            for i in 0..5_000 {
                assert!(filter.might_contain(&format!("t{t}-{i}")));
            }
        }
    }

    #[test]
    fn fp_estimate_strictly_increasing() {
        let filter = BloomFilter::with_rate(1_000, 0.01).unwrap();
        assert_eq!(filter.estimate_false_positive_rate(), 0.0);
        let mut prev = 0.0;
        for i in 0..2_000 {
            filter.add(&format!("k{i}"));
            let est = filter.estimate_false_positive_rate();
            assert!(est > prev, "estimate did not grow at insertion {i}");
            assert!(est <= 1.0);
            prev = est;
        }
    }

    #[test]
    fn fp_estimate_capped() {
        let filter = BloomFilter::with_params(8, 2).unwrap();
        for i in 0..1_000 {
            filter.add(&format!("k{i}"));
        }
        let est = filter.estimate_false_positive_rate();
        assert!(est <= 1.0 && est > 0.99);
    }

    #[test]
    fn merge_union() {
        let a = BloomFilter::with_rate(1_000, 0.01).unwrap();
        let b = BloomFilter::with_params(a.num_bits(), a.num_hashes()).unwrap();
        a.add_all(["a1", "a2", "a3"]);
        b.add_all(["b1", "b2"]);
        let before = a.clone();
        a.merge(&b).unwrap();
        for key in ["a1", "a2", "a3", "b1", "b2"] {
            assert!(a.might_contain(key));
        }
        // OR-ing bits may add false positives, so only the implication holds
        // for keys neither side inserted.
        for i in 0..2_000 {
            let key = format!("absent-{i}");
            if before.might_contain(&key) || b.might_contain(&key) {
                assert!(a.might_contain(&key), "{key} lost by merge");
            }
        }
        assert!(a.bits_set() >= before.bits_set().max(b.bits_set()));
        assert_eq!(a.element_count(), 5);
        // Source untouched
        assert_eq!(b.element_count(), 2);
    }

    #[test]
    fn merge_mismatch() {
        let a = BloomFilter::with_params(1024, 3).unwrap();
        let b = BloomFilter::with_params(2048, 3).unwrap();
        let err = a.merge(&b).unwrap_err();
        assert!(matches!(
            err,
            DedupError::ParameterMismatch {
                expected: (1024, 3),
                actual: (2048, 3)
            }
        ));
    }

    #[test]
    fn clear_resets() {
        let filter = BloomFilter::with_params(1024, 3).unwrap();
        filter.add_all(["a", "b"]);
        assert!(filter.bits_set() > 0);
        filter.clear();
        assert_eq!(filter.bits_set(), 0);
        assert_eq!(filter.element_count(), 0);
        assert!(!filter.might_contain("a"));
        assert_eq!(filter.fill_ratio(), 0.0);
    }

    #[test]
    fn bytes_roundtrip_with_tail() {
        let filter = BloomFilter::with_params(100, 3).unwrap();
        filter.add_all(["x", "y", "z"]);
        let bytes = filter.to_bytes();
        assert_eq!(bytes.len(), 13);
        let restored = BloomFilter::from_bytes(100, 3, &bytes, filter.element_count()).unwrap();
        assert_eq!(restored.to_bytes(), bytes);
        assert!(restored.might_contain("x"));
        assert_eq!(restored.element_count(), 3);
    }

    #[test]
    fn from_bytes_masks_trailing_bits() {
        let bytes = vec![0xff; 2];
        let filter = BloomFilter::from_bytes(12, 1, &bytes, 0).unwrap();
        assert_eq!(filter.bits_set(), 12);
        assert_eq!(filter.to_bytes(), vec![0xff, 0x0f]);
    }

    #[test]
    fn from_bytes_wrong_length() {
        let err = BloomFilter::from_bytes(100, 3, &[0u8; 12], 0).unwrap_err();
        assert!(matches!(
            err,
            DedupError::BufferSize {
                expected: 13,
                actual: 12
            }
        ));
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("seen.bloom");

        let filter = BloomFilter::with_rate(500, 0.01).unwrap();
        filter.add_all(["arxiv:1", "biorxiv:2"]);
        filter.save(&path).unwrap();

        let loaded = BloomFilter::load(&path).unwrap();
        assert_eq!(loaded.num_bits(), filter.num_bits());
        assert_eq!(loaded.num_hashes(), filter.num_hashes());
        assert_eq!(loaded.element_count(), 2);
        assert!(loaded.might_contain("arxiv:1"));
        assert!(loaded.might_contain("biorxiv:2"));
        assert_eq!(loaded.to_bytes(), filter.to_bytes());
    }

    #[test]
    fn load_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, [0u8; 64]).unwrap();
        assert!(matches!(
            BloomFilter::load(&path),
            Err(DedupError::InvalidParameters(_))
        ));
    }

    fn write_raw(path: &Path, num_bits: u64, num_hashes: u32, payload: &[u8]) {
        let mut raw = FILE_MAGIC.to_vec();
        raw.extend_from_slice(&num_bits.to_le_bytes());
        raw.extend_from_slice(&num_hashes.to_le_bytes());
        raw.extend_from_slice(&0u64.to_le_bytes());
        raw.extend_from_slice(payload);
        std::fs::write(path, raw).unwrap();
    }

    #[test]
    fn load_rejects_oversized_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("huge.bloom");
        write_raw(&path, u64::MAX, 3, &[0u8; 16]);
        assert!(matches!(
            BloomFilter::load(&path),
            Err(DedupError::BufferSize { actual: 16, .. })
        ));
    }

    #[test]
    fn load_rejects_truncated_bits() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.bloom");
        write_raw(&path, 1024, 3, &[0u8; 100]);
        assert!(matches!(
            BloomFilter::load(&path),
            Err(DedupError::BufferSize {
                expected: 128,
                actual: 100
            })
        ));
    }

    #[test]
    fn load_rejects_trailing_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.bloom");
        write_raw(&path, 64, 3, &[0u8; 9]);
        assert!(matches!(
            BloomFilter::load(&path),
            Err(DedupError::BufferSize {
                expected: 8,
                actual: 9
            })
        ));
    }

    #[test]
    fn load_rejects_zero_params() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("zero.bloom");
        write_raw(&path, 64, 0, &[0u8; 8]);
        assert!(matches!(
            BloomFilter::load(&path),
            Err(DedupError::InvalidParameters(_))
        ));
        write_raw(&path, 0, 3, &[]);
        assert!(matches!(
            BloomFilter::load(&path),
            Err(DedupError::InvalidParameters(_))
        ));
    }

    #[test]
    fn load_rejects_short_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stub.bloom");
        std::fs::write(&path, b"PCBF\x01").unwrap();
        assert!(matches!(BloomFilter::load(&path), Err(DedupError::Io(_))));
    }

    #[test]
    fn load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            BloomFilter::load(&dir.path().join("nope")),
            Err(DedupError::Io(_))
        ));
    }

    #[test]
    fn clone_is_independent() {
        let filter = BloomFilter::with_params(256, 2).unwrap();
        filter.add("a");
        let copy = filter.clone();
        copy.add("b");
        assert!(copy.might_contain("a"));
        assert_eq!(filter.element_count(), 1);
        assert_eq!(copy.element_count(), 2);
    }

    #[test]
    fn status_mentions_shape() {
        let filter = BloomFilter::with_params(1000, 4).unwrap();
        filter.add("a");
        let status = filter.status();
        assert!(status.contains("1000 bits"));
        assert!(status.contains("4 hashes"));
        assert!(status.contains("1 insertions"));
    }
}

//! Defines functionality for an `IntSet`
use crate::error::SketchError;
use log::debug;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::iter::FromIterator;

const DEFAULT_EXPECTED: usize = 16;
const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// A set of `i32`s using open addressing with linear probing.
///
/// `0` marks an empty slot in the table, so membership of `0` itself is
/// tracked separately.
#[derive(Clone)]
pub struct IntSet {
    /// The table, its length is always a power of two
    keys: Vec<i32>,
    mask: usize,
    contains_zero: bool,
    /// The number of elements, including `0`
    len: usize,
    /// The number of non-zero keys the table may hold before it grows
    max_fill: usize,
    load_factor: f32,
}

impl IntSet {
    /// Creates a new `IntSet` with room for `expected` elements
    pub fn new(expected: usize) -> Self {
        IntSet::build(expected, DEFAULT_LOAD_FACTOR)
    }

    /// Creates a new `IntSet` with room for `expected` elements, whose table
    /// grows once it is more than `load_factor` full.
    ///
    /// ## Errors
    /// `SketchError::Config` if `load_factor` is not in `(0, 1]`
    pub fn with_load_factor(
        expected: usize,
        load_factor: f32,
    ) -> Result<Self, SketchError> {
        if !(load_factor > 0.0 && load_factor <= 1.0) {
            return Err(SketchError::Config(format!(
                "load factor must be in (0, 1], got {}",
                load_factor
            )));
        }
        Ok(IntSet::build(expected, load_factor))
    }

    fn build(expected: usize, load_factor: f32) -> Self {
        let n = table_size(expected, load_factor);
        IntSet {
            keys: vec![0; n],
            mask: n - 1,
            contains_zero: false,
            len: 0,
            max_fill: max_fill(n, load_factor),
            load_factor,
        }
    }

    /// Adds `k` to this set. Returns whether `k` was not already present.
    pub fn insert(&mut self, k: i32) -> bool {
        if k == 0 {
            if self.contains_zero {
                return false;
            }
            self.contains_zero = true;
            self.len += 1;
            return true;
        }
        let mut pos = hash(k) & self.mask;
        loop {
            match self.keys[pos] {
                0 => break,
                curr if curr == k => return false,
                _ => pos = (pos + 1) & self.mask,
            }
        }
        self.keys[pos] = k;
        self.len += 1;
        if self.non_zero_len() > self.max_fill {
            self.rehash(table_size(self.non_zero_len() + 1, self.load_factor));
        }
        true
    }

    /// Whether `k` is in this set
    pub fn contains(&self, k: i32) -> bool {
        if k == 0 {
            return self.contains_zero;
        }
        let mut pos = hash(k) & self.mask;
        loop {
            match self.keys[pos] {
                0 => return false,
                curr if curr == k => return true,
                _ => pos = (pos + 1) & self.mask,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over the elements of this set in no particular order
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        let zero = if self.contains_zero { Some(0) } else { None };
        zero.into_iter()
            .chain(self.keys.iter().copied().filter(|&k| k != 0))
    }

    /// Draws `k` distinct elements of this set uniformly at random. The same
    /// `seed` always draws the same sample from the same set. If `k` is at
    /// least the size of this set, the whole set is returned.
    pub fn sample(&self, k: usize, seed: u64) -> IntSet {
        if k >= self.len {
            return self.clone();
        }
        let elements: Vec<i32> = self.iter().collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut sample = IntSet::new(k);
        for i in rand::seq::index::sample(&mut rng, elements.len(), k) {
            sample.insert(elements[i]);
        }
        sample
    }

    fn non_zero_len(&self) -> usize {
        if self.contains_zero {
            self.len - 1
        } else {
            self.len
        }
    }

    fn rehash(&mut self, n: usize) {
        debug!(
            "Rehashing an IntSet of {} elements from {} to {} slots",
            self.len,
            self.keys.len(),
            n
        );
        let mask = n - 1;
        let mut keys = vec![0; n];
        for &k in self.keys.iter().filter(|&&k| k != 0) {
            let mut pos = hash(k) & mask;
            while keys[pos] != 0 {
                pos = (pos + 1) & mask;
            }
            keys[pos] = k;
        }
        self.keys = keys;
        self.mask = mask;
        self.max_fill = max_fill(n, self.load_factor);
    }
}

impl Default for IntSet {
    fn default() -> Self {
        IntSet::new(DEFAULT_EXPECTED)
    }
}

impl PartialEq for IntSet {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().all(|k| other.contains(k))
    }
}

impl Eq for IntSet {}

impl fmt::Debug for IntSet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<i32> for IntSet {
    fn from_iter<I: IntoIterator<Item = i32>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut set = IntSet::new(iter.size_hint().0.max(DEFAULT_EXPECTED));
        set.extend(iter);
        set
    }
}

impl Extend<i32> for IntSet {
    fn extend<I: IntoIterator<Item = i32>>(&mut self, iter: I) {
        for k in iter {
            self.insert(k);
        }
    }
}

/// The murmur3 32-bit finalizer
fn hash(k: i32) -> usize {
    let mut h = k as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h as usize
}

/// The smallest power of two that holds `expected` keys at `load_factor`
fn table_size(expected: usize, load_factor: f32) -> usize {
    let needed = (expected as f64 / load_factor as f64).ceil() as usize;
    needed.max(2).next_power_of_two()
}

/// At least one slot always stays empty so probing terminates
fn max_fill(n: usize, load_factor: f32) -> usize {
    ((n as f64 * load_factor as f64).ceil() as usize).min(n - 1)
}

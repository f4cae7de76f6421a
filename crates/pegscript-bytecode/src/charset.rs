//! Fixed 256-bit bitsets used by the `SET` instruction and by the
//! furthest-failure expected-set machinery.

use pegscript_core::debug_assert_range;

/// A set of bytes, represented as a 256-bit bitmap (32 bytes).
///
/// Charsets are built by the compiler and stored verbatim in the bytecode
/// image's charset table; the VM only ever tests membership and unions two
/// sets together when merging expected-sets at a furthest failure position.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Charset {
    bits: [u64; 4],
}

impl Charset {
    /// The empty set.
    pub const EMPTY: Self = Self { bits: [0; 4] };

    /// Build a charset from its 32-byte wire representation (little-endian
    /// within each of the four `u64` words, word 0 covering bytes 0-63).
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut bits = [0u64; 4];
        for (word, chunk) in bits.iter_mut().zip(bytes.chunks_exact(8)) {
            *word = u64::from_le_bytes(chunk.try_into().unwrap());
        }
        Self { bits }
    }

    /// Encode back to the 32-byte wire representation.
    pub fn to_bytes(self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (chunk, word) in out.chunks_exact_mut(8).zip(self.bits) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Build a charset containing every byte in `range` (inclusive).
    pub fn from_range(range: std::ops::RangeInclusive<u8>) -> Self {
        let mut set = Self::EMPTY;
        for b in range {
            set.insert(b);
        }
        set
    }

    /// Build a charset from an explicit list of member bytes.
    pub fn from_bytes_list(members: &[u8]) -> Self {
        let mut set = Self::EMPTY;
        for &b in members {
            set.insert(b);
        }
        set
    }

    pub fn insert(&mut self, byte: u8) {
        let word = (byte >> 6) as usize;
        let bit = byte & 0x3f;
        self.bits[word] |= 1u64 << bit;
    }

    pub fn contains(&self, byte: u8) -> bool {
        let word = (byte >> 6) as usize;
        let bit = byte & 0x3f;
        (self.bits[word] >> bit) & 1 != 0
    }

    pub fn union(self, other: Self) -> Self {
        let mut bits = [0u64; 4];
        for i in 0..4 {
            bits[i] = self.bits[i] | other.bits[i];
        }
        Self { bits }
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Iterate over member bytes in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0u16..=255).map(|b| b as u8).filter(move |&b| self.contains(b))
    }

    pub fn popcount(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    /// The ranges of set members, for use in diagnostics — `None` if
    /// the set is wide enough (>100 bits) that listing it out wouldn't be
    /// useful in an error message.
    ///
    /// Unlike [`Self::ranges`], a contiguous run of only one or two bytes
    /// is reported as individual points rather than a range: `a-z` reads
    /// better than `a`, but `a`, `b` reads better than `a-b`.
    pub fn precompute_expected(&self) -> Option<Vec<(u8, u8)>> {
        if self.popcount() > 100 {
            return None;
        }
        let mut out = Vec::new();
        for (start, end) in self.ranges() {
            if end > start.saturating_add(1) {
                out.push((start, end));
            } else {
                out.extend((start..=end).map(|b| (b, b)));
            }
        }
        Some(out)
    }

    /// Collapse the member bytes into maximal contiguous ranges, for
    /// rendering a charset compactly in error messages and disassembly
    /// (e.g. `a-z`, `0-9A-F`).
    pub fn ranges(&self) -> Vec<(u8, u8)> {
        let mut out = Vec::new();
        let mut start: Option<u8> = None;
        let mut prev = 0u8;
        for b in self.iter() {
            match start {
                None => start = Some(b),
                Some(s) => {
                    if b != prev + 1 {
                        out.push((s, prev));
                        start = Some(b);
                    }
                }
            }
            prev = b;
        }
        if let Some(s) = start {
            out.push((s, prev));
        }
        out
    }
}

/// Read-only view over the charset table embedded in a loaded image.
#[derive(Clone, Copy)]
pub struct CharsetTable<'a> {
    raw: &'a [u8],
}

impl<'a> CharsetTable<'a> {
    pub(crate) fn new(raw: &'a [u8]) -> Self {
        debug_assert!(raw.len().is_multiple_of(32), "charset table not 32-byte aligned");
        Self { raw }
    }

    pub fn len(&self) -> usize {
        self.raw.len() / 32
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn get(&self, index: u32) -> Charset {
        let index = index as usize;
        debug_assert_range("CharsetTable::get", index, self.len());
        let offset = index * 32;
        let bytes: &[u8; 32] = self.raw[offset..offset + 32].try_into().unwrap();
        Charset::from_bytes(bytes)
    }
}

#[cfg(test)]
#[path = "charset_tests.rs"]
mod charset_tests;

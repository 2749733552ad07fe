//! String interning.
//!
//! A [`Sym`] is a compact 4-byte handle to a string stored in an
//! [`Interner`]. Interning the same string twice returns the same symbol,
//! so equality is an integer compare. Payloads are leaked on first intern
//! to obtain a `'static` handle; entries are never removed, which keeps
//! the table a plain index and is acceptable because the set of distinct
//! strings a compilation touches is bounded.

use std::hash::{Hash, Hasher};

use ahash::AHasher;
use rustc_hash::FxHashMap;

/// An interned string handle.
///
/// `Sym` is exactly 4 bytes, making it cache-friendly compared to `String`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sym(u32);

static_assertions::assert_eq_size!(Sym, u32);

impl Sym {
    /// Get the raw index value, useful for serialization or debugging.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Debug for Sym {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sym({})", self.0)
    }
}

/// Per-compilation string table.
pub struct Interner {
    map: FxHashMap<u64, Vec<u32>>,
    strings: Vec<&'static str>,
}

impl Interner {
    /// Create an empty interner.
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            strings: Vec::new(),
        }
    }

    /// Intern a string, returning its symbol.
    pub fn intern(&mut self, string: &str) -> Sym {
        let hash = Self::hash_str(string);
        let bucket = self.map.entry(hash).or_default();
        for &index in bucket.iter() {
            if self.strings[index as usize] == string {
                return Sym(index);
            }
        }
        // leak to get a 'static handle; interned strings are never freed
        let stored: &'static str = Box::leak(string.to_string().into_boxed_str());
        let index = self.strings.len() as u32;
        self.strings.push(stored);
        bucket.push(index);
        Sym(index)
    }

    /// Get the string for a symbol.
    pub fn get(&self, sym: Sym) -> &str {
        self.strings[sym.0 as usize]
    }

    /// Number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    fn hash_str(string: &str) -> u64 {
        let mut hasher = AHasher::default();
        string.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

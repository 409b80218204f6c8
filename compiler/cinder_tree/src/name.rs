//! Interned identifiers.
//!
//! Identifiers, member names and labels are interned once and compared as
//! `u32`s afterwards. Interned strings are leaked, so lookups hand out
//! `'static` references and the interner never needs lifetime plumbing.

use std::fmt;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Interned string identifier. O(1) equality and hashing.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct Name(u32);

impl Name {
    /// Pre-interned empty string, used for anonymous aggregate fields.
    pub const EMPTY: Name = Name(0);

    /// Get the raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is a real (non-empty) identifier.
    #[inline]
    pub const fn is_present(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.0)
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::EMPTY
    }
}

struct InternState {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

/// String interner for identifier names.
///
/// Thread-safe behind an `RwLock` so a shared tree can be read from
/// multiple compiler stages without cloning names around.
pub struct StringInterner {
    state: RwLock<InternState>,
}

impl StringInterner {
    /// Create a new interner with the empty string pre-interned at 0.
    pub fn new() -> Self {
        let mut state = InternState {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(256),
        };
        state.map.insert("", 0);
        state.strings.push("");
        Self {
            state: RwLock::new(state),
        }
    }

    /// Intern a string, returning its `Name`.
    ///
    /// # Panics
    /// Panics if more than `u32::MAX` distinct strings are interned.
    pub fn intern(&self, s: &str) -> Name {
        {
            let guard = self.state.read();
            if let Some(&idx) = guard.map.get(s) {
                return Name(idx);
            }
        }

        let mut guard = self.state.write();
        // Double-check after acquiring the write lock.
        if let Some(&idx) = guard.map.get(s) {
            return Name(idx);
        }

        let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
        let idx = u32::try_from(guard.strings.len())
            .unwrap_or_else(|_| panic!("interner capacity exceeded ({} strings)", guard.strings.len()));
        guard.strings.push(leaked);
        guard.map.insert(leaked, idx);
        Name(idx)
    }

    /// Look up the string for a `Name`.
    pub fn lookup(&self, name: Name) -> &'static str {
        let guard = self.state.read();
        guard.strings[name.0 as usize]
    }

    /// Number of interned strings (including the empty string).
    pub fn len(&self) -> usize {
        self.state.read().strings.len()
    }

    /// Whether only the empty string has been interned.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

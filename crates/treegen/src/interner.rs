//! String interning for node types, node values and branch-case keys.
//!
//! Every human-readable symbol in a run flows through one [`StringInterner`]
//! so that the hot paths (feature extraction, counter lookups, branch
//! dispatch) compare integers instead of strings.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Id returned by [`StringInterner::lookup`] for strings that were never
/// interned.
pub const NO_STRING_ID: i32 = -1;

/// Bidirectional map from strings to dense, stable integer ids.
///
/// Ids are assigned in insertion order starting at 0 and never change for
/// the lifetime of the interner. Negative ids are reserved for sentinels
/// (`-1` "no value", `-2` "unknown") and are never produced by `intern`.
/// Serializable so a trained run's symbol table can be kept next to its
/// program file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StringInterner {
    strings: Vec<String>,
    index: FxHashMap<String, i32>,
}

impl StringInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `s`, inserting it if it was not interned before.
    pub fn intern(&mut self, s: &str) -> i32 {
        if let Some(&id) = self.index.get(s) {
            return id;
        }
        let id = self.strings.len() as i32;
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), id);
        id
    }

    /// Returns the id of `s`, or [`NO_STRING_ID`] if it was never interned.
    pub fn lookup(&self, s: &str) -> i32 {
        self.index.get(s).copied().unwrap_or(NO_STRING_ID)
    }

    /// Returns the string behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this interner.
    pub fn get(&self, id: i32) -> &str {
        &self.strings[id as usize]
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

//! String interning registry shared by record encoders and decoders.
//!
//! Repeated strings (signatures, host names, session ids) are written once per
//! stream as a registry entry and then referenced by their `i32` id.

use std::collections::HashMap;

/// Bidirectional string ↔ id table.
///
/// [`intern`](StringRegistry::intern) assigns ids densely from zero; ids
/// registered by a decoder may have gaps, so strings are keyed by id.
#[derive(Debug, Clone, Default)]
pub struct StringRegistry {
    ids: HashMap<String, i32>,
    strings: HashMap<i32, String>,
    next_id: i32,
}

impl StringRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `value`, assigning a fresh one if unseen.
    /// The flag is `true` when the string was newly registered.
    pub fn intern(&mut self, value: &str) -> (i32, bool) {
        if let Some(&id) = self.ids.get(value) {
            return (id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.strings.insert(id, value.to_string());
        self.ids.insert(value.to_string(), id);
        (id, true)
    }

    /// Id of an already interned string.
    pub fn id_of(&self, value: &str) -> Option<i32> {
        self.ids.get(value).copied()
    }

    /// String for an id, if registered.
    pub fn get(&self, id: i32) -> Option<&str> {
        self.strings.get(&id).map(String::as_str)
    }

    /// Register a string under an explicit id (decoder side).
    ///
    /// Returns `false` if the id is already bound to a different string.
    pub fn register(&mut self, id: i32, value: String) -> bool {
        if id < 0 {
            return false;
        }
        if let Some(existing) = self.strings.get(&id) {
            return *existing == value;
        }
        self.next_id = self.next_id.max(id.saturating_add(1));
        self.ids.entry(value.clone()).or_insert(id);
        self.strings.insert(id, value);
        true
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

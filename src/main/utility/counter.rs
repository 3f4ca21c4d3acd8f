/*!
Counts how often named things happen. Keys are created on first increment; the string form lists
the heaviest hitters first.
*/

use std::collections::BTreeMap;

use serde::Serialize;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Counter {
    // sorted map so that serialized output is deterministic
    items: BTreeMap<String, u64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the count for `id`, returning the new value.
    pub fn add_one(&mut self, id: &str) -> u64 {
        self.add_value(id, 1)
    }

    /// Add `value` to the count for `id`, returning the new value.
    pub fn add_value(&mut self, id: &str, value: u64) -> u64 {
        match self.items.get_mut(id) {
            Some(count) => {
                *count += value;
                *count
            }
            None => {
                self.items.insert(id.to_string(), value);
                value
            }
        }
    }

    /// The count for `id`, or 0 if it was never incremented.
    pub fn get_value(&self, id: &str) -> u64 {
        self.items.get(id).copied().unwrap_or(0)
    }

    /// Add every count in `other` to this counter.
    pub fn add_counter(&mut self, other: &Counter) {
        for (id, value) in &other.items {
            self.add_value(id, *value);
        }
    }
}

impl std::fmt::Display for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut items: Vec<_> = self.items.iter().collect();
        // stable sort keeps ties in key order
        items.sort_by(|a, b| b.1.cmp(a.1));

        write!(f, "{{")?;
        for (i, (id, value)) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{id}:{value}")?;
        }
        write!(f, "}}")
    }
}

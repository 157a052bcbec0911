use std::collections::HashMap;

/// Maps field names to slot indices in insertion order.
///
/// The manager keeps its hosts in a `Vec` and uses the registry to find a
/// host by name; iteration over slots is the stable insertion order used for
/// validation and issue reporting.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    slots: HashMap<String, usize>,
    names: Vec<String>,
}

impl FieldRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a name, returning its slot. If the name is already
    /// registered, returns the existing slot.
    pub(crate) fn register(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.slots.get(name) {
            return idx;
        }
        let idx = self.names.len();
        self.slots.insert(name.to_owned(), idx);
        self.names.push(name.to_owned());
        idx
    }

    /// Remove a name, returning the slot it occupied. Later slots shift
    /// down by one, mirroring `Vec::remove` on the host list.
    pub(crate) fn remove(&mut self, name: &str) -> Option<usize> {
        let idx = self.slots.remove(name)?;
        self.names.remove(idx);
        for slot in self.slots.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(idx)
    }

    /// Look up the slot for a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Names in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

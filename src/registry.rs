use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Label registry: unique display labels within a session
// ---------------------------------------------------------------------------

/// Hands out unique labels of the form `"{base} {n}"` within one session.
/// Owned by an explicit context (each [`crate::data::Dataset`] carries one
/// for naming its subsets) rather than being process-global, so tests can
/// reset it with [`LabelRegistry::clear`].
#[derive(Debug, Default, Clone)]
pub struct LabelRegistry {
    counters: BTreeMap<String, u64>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        LabelRegistry::default()
    }

    /// Next unique label for `base`: "Subset 1", "Subset 2", ...
    pub fn next_label(&mut self, base: &str) -> String {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        *counter += 1;
        format!("{base} {counter}")
    }

    /// Forget all counters. Subsequent labels start from 1 again.
    pub fn clear(&mut self) {
        self.counters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_unique_per_base() {
        let mut reg = LabelRegistry::new();
        assert_eq!(reg.next_label("Subset"), "Subset 1");
        assert_eq!(reg.next_label("Subset"), "Subset 2");
        assert_eq!(reg.next_label("Layer"), "Layer 1");
    }

    #[test]
    fn clear_resets_counters() {
        let mut reg = LabelRegistry::new();
        reg.next_label("Subset");
        reg.clear();
        assert_eq!(reg.next_label("Subset"), "Subset 1");
    }
}

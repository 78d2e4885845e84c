//! String interning for step identifiers.
//!
//! Steps are interned in insertion order, so an index doubles as the step's
//! declared position in the workflow.

use rustc_hash::FxHashMap;

/// Interned step index (u32 for compact adjacency lists).
pub type StepIndex = u32;

/// Maps step id strings to dense indices and back.
#[derive(Debug, Clone)]
pub struct StepIdInterner {
    to_index: FxHashMap<String, StepIndex>,
    from_index: Vec<String>,
}

impl StepIdInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            from_index: Vec::with_capacity(capacity),
        }
    }

    /// Intern an id, returning `Err(existing)` if it was already present.
    ///
    /// Unlike a general-purpose interner, a repeated id is reported to the
    /// caller since step ids must be unique within a workflow.
    pub fn insert_unique(&mut self, id: &str) -> Result<StepIndex, StepIndex> {
        if let Some(&existing) = self.to_index.get(id) {
            return Err(existing);
        }
        let index = self.from_index.len() as StepIndex;
        self.from_index.push(id.to_string());
        self.to_index.insert(id.to_string(), index);
        Ok(index)
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<StepIndex> {
        self.to_index.get(id).copied()
    }

    #[inline]
    pub fn resolve(&self, index: StepIndex) -> Option<&str> {
        self.from_index.get(index as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.from_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_index.is_empty()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.from_index.iter().map(|s| s.as_str())
    }
}

impl Default for StepIdInterner {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_resolve() {
        let mut interner = StepIdInterner::with_capacity(4);

        let a = interner.insert_unique("fetch").unwrap();
        let b = interner.insert_unique("summarize").unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(interner.resolve(b), Some("summarize"));
        assert_eq!(interner.get("fetch"), Some(a));
        assert_eq!(interner.get("missing"), None);
        assert_eq!(interner.ids().collect::<Vec<_>>(), vec!["fetch", "summarize"]);
    }

    #[test]
    fn test_duplicate_reports_existing_index() {
        let mut interner = StepIdInterner::default();
        interner.insert_unique("a").unwrap();
        interner.insert_unique("b").unwrap();

        assert_eq!(interner.insert_unique("a"), Err(0));
        assert_eq!(interner.len(), 2);
    }
}

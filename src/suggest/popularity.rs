//! Search counts of terms, used to rank frequently searched completions first

use dashmap::DashMap;

use crate::models::Field;

/// Per-project counts of how often each term was searched for
#[derive(Debug, Default)]
pub struct PopularityCounts {
    counts: DashMap<(String, Field, String), u64>,
}

impl PopularityCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self, project: &str, field: Field, term: &str, by: u64) {
        *self
            .counts
            .entry((project.to_string(), field, term.to_string()))
            .or_insert(0) += by;
    }

    pub fn get(&self, project: &str, field: Field, term: &str) -> u64 {
        self.counts
            .get(&(project.to_string(), field, term.to_string()))
            .map(|c| *c)
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_accumulate_per_project() {
        let counts = PopularityCounts::new();
        counts.increment("a", Field::Full, "text", 2);
        counts.increment("a", Field::Full, "text", 1);
        counts.increment("b", Field::Full, "text", 5);
        assert_eq!(counts.get("a", Field::Full, "text"), 3);
        assert_eq!(counts.get("a", Field::Defs, "text"), 0);
        assert_eq!(counts.len(), 2);
    }
}

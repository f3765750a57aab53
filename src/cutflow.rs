use std::fmt;

use indexmap::IndexMap;

/// An ordered audit column of how many events survive each selection stage.
///
/// Stages appear in the order their name is first recorded; a name that was
/// never recorded reads as zero. Counts only ever increase.
#[derive(Debug, Clone, Default)]
pub struct CutFlow {
    counts: IndexMap<String, u64>,
}

impl CutFlow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Fold another cut flow into this one, preserving this one's stage
    /// order for stages both have seen.
    pub fn absorb(&mut self, other: &CutFlow) {
        for (name, count) in &other.counts {
            *self.counts.entry(name.clone()).or_insert(0) += count;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(name, count)| (name.as_str(), *count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl fmt::Display for CutFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, count) in &self.counts {
            writeln!(f, "{name}: {count}")?;
        }
        Ok(())
    }
}

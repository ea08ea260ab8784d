//! Structural change detection over a feed's root-id set.
//!
//! A batch that only touches leaf values (odds ticks) must not trigger
//! a full rebuild; a batch that adds or removes root entities must.
//! Comparing the root-id set before and after application decides it.

use std::collections::BTreeSet;
use std::fmt;

/// Id-set delta across one applied batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralDiff {
    /// Root ids present after but not before.
    pub added: BTreeSet<String>,
    /// Root ids present before but not after.
    pub removed: BTreeSet<String>,
}

impl StructuralDiff {
    /// Compare two root-id snapshots.
    pub fn between(before: &BTreeSet<String>, after: &BTreeSet<String>) -> Self {
        Self {
            added: after.difference(before).cloned().collect(),
            removed: before.difference(after).cloned().collect(),
        }
    }

    /// Whether membership changed at all.
    pub fn is_structural(&self) -> bool {
        !self.added.is_empty() || !self.removed.is_empty()
    }
}

impl fmt::Display for StructuralDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} -{} roots", self.added.len(), self.removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_sets_are_not_structural() {
        let before = ids(&["a", "b", "c"]);
        let after = ids(&["a", "b", "c"]);

        let diff = StructuralDiff::between(&before, &after);
        assert!(!diff.is_structural());
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
    }

    #[test]
    fn membership_change_is_structural() {
        let before = ids(&["a", "b", "c"]);
        let after = ids(&["a", "c", "d"]);

        let diff = StructuralDiff::between(&before, &after);
        assert!(diff.is_structural());
        assert_eq!(diff.added, ids(&["d"]));
        assert_eq!(diff.removed, ids(&["b"]));
    }

    #[test]
    fn growth_only_is_structural() {
        let before = ids(&[]);
        let after = ids(&["a"]);

        assert!(StructuralDiff::between(&before, &after).is_structural());
    }
}

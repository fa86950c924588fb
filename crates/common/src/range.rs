// Absolute text ranges, measured in UTF-16 code units against a specific
// document state. Ranges are transient: they are recomputed from anchors on
// demand and never persisted.

use serde::{Deserialize, Serialize};

/// A half-open `[from, to)` range of absolute document offsets.
///
/// Always normalized so `from <= to`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextRange {
    pub from: u32,
    pub to: u32,
}

impl TextRange {
    /// Build a normalized range from two offsets in either order.
    pub fn new(a: u32, b: u32) -> Self {
        Self { from: a.min(b), to: a.max(b) }
    }

    pub fn len(&self) -> u32 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Whether `offset` falls inside the range (half-open).
    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.from && offset < self.to
    }

    /// Strict overlap: the two ranges share at least one position.
    pub fn intersects(&self, other: TextRange) -> bool {
        self.from < other.to && self.to > other.from
    }

    /// Overlap-or-adjacency test with a tolerance of `gap` positions.
    ///
    /// Used both by proposal merging and by history run coalescing: two
    /// ranges measured at different moments may be off by one, so a gap of 1
    /// lets back-to-back keystrokes coalesce.
    pub fn adjacent_within(&self, other: TextRange, gap: u32) -> bool {
        other.to.saturating_add(gap) >= self.from && other.from <= self.to.saturating_add(gap)
    }

    /// Smallest range covering both inputs.
    pub fn union(&self, other: TextRange) -> TextRange {
        TextRange { from: self.from.min(other.from), to: self.to.max(other.to) }
    }
}

//! Per-generation memory accounting.
//!
//! Every event carries a set of [`MemoryItem`]s, one per heap generation the
//! parser saw. Lookup follows the null-object convention: asking for a
//! generation that was never reported returns an item whose fields are all
//! UNKNOWN, so reconciliation arithmetic never branches on presence.

use serde::Serialize;

use crate::util::{
    UNKNOWN_INT, known_int, minus_int, minus_int_lenient, plus_int, plus_int_lenient,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    Young,
    Eden,
    Survivor,
    Old,
    Humongous,
    Metaspace,
    Total,
}

/// The five generations every collection event is normalized to after
/// aggregation (eden and survivor fold into young).
pub const CANONICAL_GENERATIONS: [Generation; 5] = [
    Generation::Young,
    Generation::Old,
    Generation::Humongous,
    Generation::Metaspace,
    Generation::Total,
];

/// (pre-used, post-used, capacity) for one generation, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MemoryItem {
    pub generation: Generation,
    pub pre_used: i64,
    pub post_used: i64,
    pub total: i64,
}

impl MemoryItem {
    pub fn new(generation: Generation, pre_used: i64, post_used: i64, total: i64) -> Self {
        Self {
            generation,
            pre_used,
            post_used,
            total,
        }
    }

    /// The null object: all fields UNKNOWN.
    pub fn unknown(generation: Generation) -> Self {
        Self::new(generation, UNKNOWN_INT, UNKNOWN_INT, UNKNOWN_INT)
    }

    pub fn is_empty(&self) -> bool {
        !known_int(self.pre_used) && !known_int(self.post_used) && !known_int(self.total)
    }

    /// Strict field-wise sum; any UNKNOWN operand field poisons that field.
    pub fn merge(&self, other: &MemoryItem) -> MemoryItem {
        MemoryItem {
            generation: self.generation,
            pre_used: plus_int(self.pre_used, other.pre_used),
            post_used: plus_int(self.post_used, other.post_used),
            total: plus_int(self.total, other.total),
        }
    }

    /// Lenient field-wise sum; an UNKNOWN operand field contributes nothing.
    pub fn merge_if_present(&self, other: &MemoryItem) -> MemoryItem {
        MemoryItem {
            generation: self.generation,
            pre_used: plus_int_lenient(self.pre_used, other.pre_used),
            post_used: plus_int_lenient(self.post_used, other.post_used),
            total: plus_int_lenient(self.total, other.total),
        }
    }

    /// Strict field-wise difference.
    pub fn subtract(&self, other: &MemoryItem) -> MemoryItem {
        MemoryItem {
            generation: self.generation,
            pre_used: minus_int(self.pre_used, other.pre_used),
            post_used: minus_int(self.post_used, other.post_used),
            total: minus_int(self.total, other.total),
        }
    }

    /// Lenient field-wise difference; an UNKNOWN subtrahend field subtracts
    /// nothing.
    pub fn subtract_if_present(&self, other: &MemoryItem) -> MemoryItem {
        MemoryItem {
            generation: self.generation,
            pre_used: minus_int_lenient(self.pre_used, other.pre_used),
            post_used: minus_int_lenient(self.post_used, other.post_used),
            total: minus_int_lenient(self.total, other.total),
        }
    }

    /// Fill each still-UNKNOWN field from `other`. Known fields are never
    /// overwritten, which makes inference idempotent.
    pub fn update_if_absent(&mut self, other: &MemoryItem) {
        if !known_int(self.pre_used) {
            self.pre_used = other.pre_used;
        }
        if !known_int(self.post_used) {
            self.post_used = other.post_used;
        }
        if !known_int(self.total) {
            self.total = other.total;
        }
    }

    /// Bytes freed in this generation by the collection.
    pub fn memory_reduction(&self) -> i64 {
        minus_int(self.pre_used, self.post_used)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::MB;

    #[test]
    fn null_object_is_empty() {
        let item = MemoryItem::unknown(Generation::Old);
        assert!(item.is_empty());
        assert_eq!(item.memory_reduction(), UNKNOWN_INT);
    }

    #[test]
    fn merge_and_subtract() {
        let eden = MemoryItem::new(Generation::Eden, 19 * MB, 0, 33 * MB);
        let survivor = MemoryItem::new(Generation::Survivor, 0, 3 * MB, 3 * MB);
        let young = MemoryItem::unknown(Generation::Young)
            .merge_if_present(&eden)
            .merge_if_present(&survivor);
        assert_eq!(young.pre_used, 19 * MB);
        assert_eq!(young.post_used, 3 * MB);
        assert_eq!(young.total, 36 * MB);

        let total = MemoryItem::new(Generation::Total, 64 * MB, 20 * MB, 100 * MB);
        let old = total
            .subtract_if_present(&young)
            .subtract_if_present(&MemoryItem::unknown(Generation::Humongous));
        assert_eq!(old.pre_used, 45 * MB);
        assert_eq!(old.post_used, 17 * MB);
        assert_eq!(old.total, 64 * MB);
    }

    #[test]
    fn strict_merge_poisons_on_unknown() {
        let a = MemoryItem::new(Generation::Young, 10, UNKNOWN_INT, 30);
        let b = MemoryItem::new(Generation::Young, 1, 2, 3);
        let m = a.merge(&b);
        assert_eq!(m.pre_used, 11);
        assert_eq!(m.post_used, UNKNOWN_INT);
        assert_eq!(m.total, 33);
    }

    #[test]
    fn update_if_absent_never_overwrites() {
        let mut item = MemoryItem::new(Generation::Young, 10, UNKNOWN_INT, UNKNOWN_INT);
        let inferred = MemoryItem::new(Generation::Young, 99, 20, 30);
        item.update_if_absent(&inferred);
        assert_eq!(item.pre_used, 10);
        assert_eq!(item.post_used, 20);
        assert_eq!(item.total, 30);

        // Running the same inference again changes nothing.
        item.update_if_absent(&inferred);
        assert_eq!(item, MemoryItem::new(Generation::Young, 10, 20, 30));
    }
}

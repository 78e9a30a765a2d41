//! Factorized table: the row store backing a join's build side (spec §5,
//! component G).
//!
//! Grounded on `original_source/src/include/processor/operator/hash_join/
//! join_hash_table.h`'s row layout (a flat key column, payload columns,
//! and a `prevPtrColOffset` reserved at the end of every row for hash
//! chaining). The teacher has no row-store/factorized-table type of its
//! own — its joins go straight from `HashMap<key, Vec<row>>`
//! (`inmemory::join_engine::JoinHashTable`) to output rows with no
//! intermediate arena — so the arena-of-rows-indexed-by-`u32` shape here
//! is this crate's own rendition of `join_hash_table.h`'s layout, not an
//! adaptation of teacher code; the `u32` row index in place of a raw
//! pointer follows spec §9's redesign note preferring an arena index over
//! pointer-chasing cycles.

use crate::common::Offset;

/// Marks the end of a hash chain; rows never legitimately reach
/// `u32::MAX` in a single table (spec's vectors cap at 2048 per morsel,
/// and no single build side realistically reaches 4 billion rows).
pub const INVALID_ROW: u32 = u32::MAX;

/// One row of the build side: the join key, an arbitrary payload
/// (column values carried through to the probe's output), and the
/// previous row index sharing this row's hash slot.
#[derive(Debug, Clone)]
pub struct Row {
    pub key: i64,
    pub payload: Vec<i64>,
    pub prev: u32,
}

/// An append-only row arena. Rows are never removed once appended — a
/// join's build side is materialized once per query, not mutated.
#[derive(Default)]
pub struct FactorizedTable {
    rows: Vec<Row>,
}

impl FactorizedTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Appends a row with no chain link yet (the hash table sets `prev`
    /// when it inserts the row into a bucket).
    pub fn append(&mut self, key: i64, payload: Vec<i64>) -> u32 {
        let idx = self.rows.len() as u32;
        self.rows.push(Row {
            key,
            payload,
            prev: INVALID_ROW,
        });
        idx
    }

    pub fn row(&self, idx: u32) -> &Row {
        &self.rows[idx as usize]
    }

    pub fn row_mut(&mut self, idx: u32) -> &mut Row {
        &mut self.rows[idx as usize]
    }

    /// Appends every row of `other` onto `self`, returning the offset
    /// each of `other`'s row indices must be shifted by to remain valid
    /// in the merged table (used when splicing per-thread build results
    /// together, spec §5's parallel build).
    pub fn append_table(&mut self, other: FactorizedTable) -> u32 {
        let offset = self.rows.len() as u32;
        self.rows.extend(other.rows);
        offset
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

/// The row-oriented payload column values a join probe reconstructs into,
/// keyed by a logical node/rel offset rather than raw ints, for the
/// path-property probe (component H) to read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadOffset(pub Offset);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_sequential_indices() {
        let mut table = FactorizedTable::new();
        let a = table.append(1, vec![10]);
        let b = table.append(2, vec![20]);
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(table.row(b).key, 2);
    }

    #[test]
    fn append_table_shifts_indices_by_prior_length() {
        let mut first = FactorizedTable::new();
        first.append(1, vec![]);
        let mut second = FactorizedTable::new();
        second.append(2, vec![]);
        second.append(3, vec![]);
        let offset = first.append_table(second);
        assert_eq!(offset, 1);
        assert_eq!(first.len(), 3);
        assert_eq!(first.row(1).key, 2);
        assert_eq!(first.row(2).key, 3);
    }
}

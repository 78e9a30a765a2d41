//! Value vectors: the unit of data flow between execution operators
//! (spec §5, component F). Up to `DEFAULT_VECTOR_CAPACITY` values, with a
//! selection vector so operators can filter without copying, and a null
//! bitmask alongside the raw data.
//!
//! Grounded on the teacher's `execution::vectorized::ColumnBatch`/`Column`
//! (flat `Vec<T>` backing store, `SelectionVector` with a flat/unflat
//! discriminant, null bitmap as `Vec<bool>`) — the teacher has no type
//! named `ValueVector` itself. That name, and the nested list/struct
//! children and string payloads generalized in here, follow
//! `original_source`'s `ValueVector`: list/struct children reachable
//! through a list entry's offset/size pair (`join_hash_table.h`/
//! `path_property_probe.h`'s usage), and STRING values as a
//! `gf_string_t`-style inline-prefix fat pointer backed by a vector-local
//! overflow buffer rather than `storage::overflow`'s disk-backed arena
//! (spec §4.6: "a per-vector overflow-buffer arena...so transient vectors
//! need no disk page").

use crate::common::{PhysicalTypeId, DEFAULT_VECTOR_CAPACITY};
use crate::storage::overflow::INLINE_STRING_PREFIX_LEN;

/// A list value stored in a parent vector: an offset and length into the
/// flattened child vector, mirroring `original_source`'s `list_entry_t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListEntry {
    pub offset: u32,
    pub size: u32,
}

/// Whether a vector's selection is the identity (every row 0..len, in
/// order) or an explicit index list produced by a filter/probe operator.
#[derive(Debug, Clone)]
enum Selection {
    Flat(usize),
    Unflat(Vec<u32>),
}

/// Column-oriented nested payload: list columns keep their flattened
/// element values in a child `ValueVector`; struct columns keep one child
/// per field.
pub enum NestedData {
    None,
    List {
        entries: Vec<ListEntry>,
        child: Box<ValueVector>,
    },
    Struct {
        fields: Vec<(String, ValueVector)>,
    },
}

/// A STRING value's fat pointer: the inline prefix plus, for strings past
/// `INLINE_STRING_PREFIX_LEN`, an offset into the vector's own overflow
/// buffer. Shares `INLINE_STRING_PREFIX_LEN` with `storage::overflow`'s
/// disk-backed fat pointer, but this buffer never touches a page — it's
/// freed with the vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringRef {
    pub len: u32,
    pub inline: [u8; INLINE_STRING_PREFIX_LEN],
    pub overflow_offset: u32,
}

impl StringRef {
    pub fn is_inline(&self) -> bool {
        self.len as usize <= INLINE_STRING_PREFIX_LEN
    }
}

/// A vector of up to 2048 values of one physical type, with a selection
/// vector and a null mask. Scalar (non-nested) values are stored as
/// 64-bit lanes regardless of logical width, matching the teacher's
/// "widen everything to i64/f64 in the vector, narrow on flush" approach.
pub struct ValueVector {
    physical_type: PhysicalTypeId,
    data: Vec<i64>,
    null_mask: Vec<bool>,
    selection: Selection,
    pub nested: NestedData,
    strings: Vec<StringRef>,
    string_overflow: Vec<u8>,
}

impl ValueVector {
    pub fn new(physical_type: PhysicalTypeId) -> Self {
        Self {
            physical_type,
            data: Vec::with_capacity(DEFAULT_VECTOR_CAPACITY),
            null_mask: Vec::with_capacity(DEFAULT_VECTOR_CAPACITY),
            selection: Selection::Flat(0),
            nested: NestedData::None,
            strings: Vec::new(),
            string_overflow: Vec::new(),
        }
    }

    pub fn physical_type(&self) -> PhysicalTypeId {
        self.physical_type
    }

    pub fn capacity(&self) -> usize {
        DEFAULT_VECTOR_CAPACITY
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn push(&mut self, value: i64, is_null: bool) {
        assert!(
            self.data.len() < DEFAULT_VECTOR_CAPACITY,
            "value vector exceeded its fixed capacity"
        );
        self.data.push(value);
        self.null_mask.push(is_null);
        if let Selection::Flat(n) = &mut self.selection {
            *n += 1;
        }
    }

    pub fn get_int64(&self, idx: usize) -> i64 {
        self.data[idx]
    }

    pub fn is_null(&self, idx: usize) -> bool {
        self.null_mask[idx]
    }

    pub fn set_null(&mut self, idx: usize, is_null: bool) {
        self.null_mask[idx] = is_null;
    }

    /// Restricts the vector to a caller-supplied subset of row indices,
    /// the "unflatten" operation a filter or probe uses instead of
    /// physically compacting the backing store.
    pub fn set_selection(&mut self, indices: Vec<u32>) {
        self.selection = Selection::Unflat(indices);
    }

    pub fn reset_selection_to_flat(&mut self) {
        self.selection = Selection::Flat(self.data.len());
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.selection, Selection::Flat(_))
    }

    pub fn selected_len(&self) -> usize {
        match &self.selection {
            Selection::Flat(n) => *n,
            Selection::Unflat(indices) => indices.len(),
        }
    }

    /// Maps a position in the current selection to the underlying data
    /// index.
    pub fn selected_index(&self, pos: usize) -> usize {
        match &self.selection {
            Selection::Flat(_) => pos,
            Selection::Unflat(indices) => indices[pos] as usize,
        }
    }

    pub fn selected_indices(&self) -> Vec<usize> {
        (0..self.selected_len()).map(|p| self.selected_index(p)).collect()
    }

    /// Appends a list value: the child elements go into `nested`'s child
    /// vector, the parent row records an offset/size entry.
    pub fn push_list(&mut self, elements: &[i64], element_physical_type: PhysicalTypeId) {
        if matches!(self.nested, NestedData::None) {
            self.nested = NestedData::List {
                entries: Vec::new(),
                child: Box::new(ValueVector::new(element_physical_type)),
            };
        }
        if let NestedData::List { entries, child } = &mut self.nested {
            let offset = child.len() as u32;
            for &v in elements {
                child.push(v, false);
            }
            entries.push(ListEntry {
                offset,
                size: elements.len() as u32,
            });
        }
        self.data.push(0);
        self.null_mask.push(false);
        if let Selection::Flat(n) = &mut self.selection {
            *n += 1;
        }
    }

    pub fn list_entry(&self, idx: usize) -> Option<ListEntry> {
        match &self.nested {
            NestedData::List { entries, .. } => entries.get(idx).copied(),
            _ => None,
        }
    }

    /// Appends a STRING value: short strings store entirely in the fat
    /// pointer, longer ones spill past `INLINE_STRING_PREFIX_LEN` into this
    /// vector's own overflow buffer (spec §4.6).
    pub fn push_string(&mut self, s: &[u8], is_null: bool) {
        assert_eq!(self.physical_type, PhysicalTypeId::String);
        let string_ref = if s.len() <= INLINE_STRING_PREFIX_LEN {
            let mut inline = [0u8; INLINE_STRING_PREFIX_LEN];
            inline[..s.len()].copy_from_slice(s);
            StringRef { len: s.len() as u32, inline, overflow_offset: 0 }
        } else {
            let overflow_offset = self.string_overflow.len() as u32;
            self.string_overflow.extend_from_slice(s);
            StringRef { len: s.len() as u32, inline: [0u8; INLINE_STRING_PREFIX_LEN], overflow_offset }
        };
        self.strings.push(string_ref);
        self.data.push(0);
        self.null_mask.push(is_null);
        if let Selection::Flat(n) = &mut self.selection {
            *n += 1;
        }
    }

    pub fn get_string(&self, idx: usize) -> Vec<u8> {
        let r = self.strings[idx];
        if r.is_inline() {
            r.inline[..r.len as usize].to_vec()
        } else {
            let start = r.overflow_offset as usize;
            self.string_overflow[start..start + r.len as usize].to_vec()
        }
    }

    /// Declares a STRUCT vector's fields: one child `ValueVector` per
    /// field, constructed once up front (spec §4.6: "one vector per
    /// field, all sharing state").
    pub fn init_struct(&mut self, fields: Vec<(String, PhysicalTypeId)>) {
        self.nested = NestedData::Struct {
            fields: fields
                .into_iter()
                .map(|(name, physical_type)| (name, ValueVector::new(physical_type)))
                .collect(),
        };
    }

    /// Appends one struct row: `field_values` supplies one `(value,
    /// is_null)` pair per declared field, in the same order as
    /// `init_struct`. A struct-null row (`is_null`) forces every field
    /// entry at this row to be logically null too, regardless of the
    /// per-field nullability supplied (spec §4.6).
    pub fn push_struct_row(&mut self, field_values: &[(i64, bool)], is_null: bool) {
        if let NestedData::Struct { fields } = &mut self.nested {
            assert_eq!(field_values.len(), fields.len(), "struct row must supply one value per declared field");
            for ((_, child), &(value, field_null)) in fields.iter_mut().zip(field_values) {
                child.push(value, is_null || field_null);
            }
        }
        self.data.push(0);
        self.null_mask.push(is_null);
        if let Selection::Flat(n) = &mut self.selection {
            *n += 1;
        }
    }

    pub fn struct_field(&self, name: &str) -> Option<&ValueVector> {
        match &self.nested {
            NestedData::Struct { fields } => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_selection_covers_every_row_in_order() {
        let mut v = ValueVector::new(PhysicalTypeId::Int64);
        v.push(1, false);
        v.push(2, false);
        v.push(3, false);
        assert_eq!(v.selected_indices(), vec![0, 1, 2]);
    }

    #[test]
    fn unflat_selection_filters_and_reorders() {
        let mut v = ValueVector::new(PhysicalTypeId::Int64);
        v.push(10, false);
        v.push(20, false);
        v.push(30, false);
        v.set_selection(vec![2, 0]);
        assert_eq!(v.selected_len(), 2);
        assert_eq!(v.get_int64(v.selected_index(0)), 30);
        assert_eq!(v.get_int64(v.selected_index(1)), 10);
    }

    #[test]
    fn list_values_store_entries_against_a_child_vector() {
        let mut v = ValueVector::new(PhysicalTypeId::List);
        v.push_list(&[1, 2, 3], PhysicalTypeId::Int64);
        v.push_list(&[4, 5], PhysicalTypeId::Int64);
        let first = v.list_entry(0).unwrap();
        let second = v.list_entry(1).unwrap();
        assert_eq!(first, ListEntry { offset: 0, size: 3 });
        assert_eq!(second, ListEntry { offset: 3, size: 2 });
    }

    #[test]
    fn short_strings_round_trip_entirely_inline() {
        let mut v = ValueVector::new(PhysicalTypeId::String);
        v.push_string(b"short", false);
        assert_eq!(v.get_string(0), b"short");
    }

    #[test]
    fn long_strings_spill_into_the_vectors_own_overflow_buffer() {
        let mut v = ValueVector::new(PhysicalTypeId::String);
        let long = b"this string is definitely longer than twelve bytes".to_vec();
        v.push_string(&long, false);
        assert_eq!(v.get_string(0), long);
    }

    #[test]
    fn struct_row_propagates_a_struct_level_null_to_every_field() {
        let mut v = ValueVector::new(PhysicalTypeId::Struct);
        v.init_struct(vec![
            ("x".to_string(), PhysicalTypeId::Int64),
            ("y".to_string(), PhysicalTypeId::Int64),
        ]);
        v.push_struct_row(&[(1, false), (2, false)], false);
        v.push_struct_row(&[(3, false), (4, false)], true);

        let x = v.struct_field("x").unwrap();
        let y = v.struct_field("y").unwrap();
        assert!(!x.is_null(0));
        assert!(x.is_null(1), "struct-null row must null out every field");
        assert!(y.is_null(1));
        assert_eq!(x.get_int64(0), 1);
        assert_eq!(y.get_int64(0), 2);
    }

    #[test]
    fn vector_never_exceeds_fixed_capacity() {
        let mut v = ValueVector::new(PhysicalTypeId::Int64);
        for i in 0..DEFAULT_VECTOR_CAPACITY {
            v.push(i as i64, false);
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| v.push(0, false)));
        assert!(result.is_err());
    }
}

//! Page-level compression codecs (spec §3, component B).
//!
//! Grounded on `original_source/src/include/storage/compression/compression.h`:
//! `CompressionMetadata` is a fixed `{min, max, kind, padding[7]}` record
//! (`StorageValue` is 8 bytes, so `size_of == sizeof(StorageValue)*2 + 8`,
//! i.e. 24 bytes: two 8-byte bounds plus an 8-byte tag+padding word), and
//! `CompressionType` enumerates `Uncompressed = 0`, `IntegerBitpacking = 1`,
//! `BooleanBitpacking = 2`, `Constant = 3`. Per that header's
//! `CompressionAlg` virtual base, a codec is chosen once per page from the
//! page's min/max and re-dispatched as a single call per page rather than
//! per value — here that's a tagged enum matched once in `flush`
//! (spec §9's redesign note: function-table dispatch over a page, not
//! virtual dispatch per value).

use serde::{Deserialize, Serialize};

use crate::common::{PhysicalTypeId, StorageValue};
use crate::error::{DbError, Result};

/// Matches `CompressionType` in `compression.h`, values included for
/// on-disk stability even though nothing external reads them as an int.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CompressionKind {
    Uncompressed = 0,
    IntegerBitpacking = 1,
    BooleanBitpacking = 2,
    Constant = 3,
}

/// Per-page compression stats: min/max (used both to pick a codec and,
/// for bitpacking, as the frame-of-reference base) plus the codec tag.
/// Fixed 24-byte shape mirrors `compression.h`'s `static_assert`.
#[derive(Clone, Copy)]
pub struct CompressionMetadata {
    pub min: StorageValue,
    pub max: StorageValue,
    pub kind: CompressionKind,
}

impl CompressionMetadata {
    pub fn constant(value: StorageValue) -> Self {
        Self {
            min: value,
            max: value,
            kind: CompressionKind::Constant,
        }
    }
}

/// Number of values a bitpacking chunk operates on; `IntegerBitpacking`
/// only ever bitpacks a whole multiple of this, per `compression.h`'s
/// `numValues` rounding *down* (never up, to avoid reading past the
/// decompressed buffer on the last partial chunk).
pub const BITPACK_CHUNK_SIZE: usize = 32;

/// `BitpackInfo<T>` from `compression.h`: bit width needed once values are
/// shifted to be non-negative relative to `offset`.
#[derive(Debug, Clone, Copy)]
pub struct BitpackInfo {
    pub bit_width: u8,
    pub has_negative: bool,
    pub offset: i64,
}

fn bits_needed_unsigned(max: u64) -> u8 {
    if max == 0 {
        0
    } else {
        64 - max.leading_zeros() as u8
    }
}

/// Computes the frame-of-reference offset and bit width for a slice of
/// signed integers, matching `IntegerBitpacking<T>::getBitpackInfo`.
pub fn bitpack_info(values: &[i64]) -> BitpackInfo {
    if values.is_empty() {
        return BitpackInfo {
            bit_width: 0,
            has_negative: false,
            offset: 0,
        };
    }
    let min = *values.iter().min().unwrap();
    let max = *values.iter().max().unwrap();
    let offset = min;
    let range = (max - offset) as u64;
    BitpackInfo {
        bit_width: bits_needed_unsigned(range),
        has_negative: min < 0,
        offset,
    }
}

/// Packs `values` (after subtracting `info.offset`) into `info.bit_width`-
/// wide lanes, padding the trailing partial chunk up to a full
/// `BITPACK_CHUNK_SIZE` group with `info.offset` (which then packs as all
/// zero bits) rather than leaving it unpacked — the padded slots decode
/// back to `info.offset` and the caller truncates to the real value count
/// (spec §8 scenario S4: 5 values pad to a 32-wide chunk, 4 bits each,
/// 16 bytes).
pub fn bitpack_encode(values: &[i64], info: &BitpackInfo) -> Vec<u8> {
    let width = info.bit_width as usize;
    if width == 0 {
        return Vec::new();
    }
    let n = padded_chunk_count(values.len());
    let mut out = vec![0u8; (n * width + 7) / 8];
    let mut bit_pos = 0usize;
    for i in 0..n {
        let v = values.get(i).copied().unwrap_or(info.offset);
        let unsigned = (v - info.offset) as u64;
        write_bits(&mut out, bit_pos, unsigned, width);
        bit_pos += width;
    }
    out
}

/// Decodes `count` values, reading the padded chunk `bitpack_encode` wrote
/// and discarding the padding slots beyond `count`.
pub fn bitpack_decode(bytes: &[u8], count: usize, info: &BitpackInfo) -> Vec<i64> {
    let width = info.bit_width as usize;
    if width == 0 {
        return vec![info.offset; count];
    }
    let mut out = Vec::with_capacity(count);
    let mut bit_pos = 0usize;
    for _ in 0..count {
        let unsigned = read_bits(bytes, bit_pos, width);
        out.push(unsigned as i64 + info.offset);
        bit_pos += width;
    }
    out
}

fn padded_chunk_count(len: usize) -> usize {
    ((len + BITPACK_CHUNK_SIZE - 1) / BITPACK_CHUNK_SIZE) * BITPACK_CHUNK_SIZE
}

pub(crate) fn write_bits(out: &mut [u8], bit_pos: usize, value: u64, width: usize) {
    for i in 0..width {
        if value & (1 << i) != 0 {
            let bit = bit_pos + i;
            out[bit / 8] |= 1 << (bit % 8);
        }
    }
}

fn read_bits(bytes: &[u8], bit_pos: usize, width: usize) -> u64 {
    let mut value = 0u64;
    for i in 0..width {
        let bit = bit_pos + i;
        if bytes[bit / 8] & (1 << (bit % 8)) != 0 {
            value |= 1 << i;
        }
    }
    value
}

/// Packs booleans 8-to-a-byte, per `BooleanBitpacking`.
pub fn boolean_bitpack_encode(values: &[bool]) -> Vec<u8> {
    let mut out = vec![0u8; (values.len() + 7) / 8];
    for (i, &v) in values.iter().enumerate() {
        if v {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

pub fn boolean_bitpack_decode(bytes: &[u8], count: usize) -> Vec<bool> {
    (0..count).map(|i| bytes[i / 8] & (1 << (i % 8)) != 0).collect()
}

/// Picks a codec for a run of signed integer values the way `flush` does
/// in the teacher's column chunk: constant if min == max, else bitpacking.
pub fn choose_integer_codec(values: &[i64], physical_type: PhysicalTypeId) -> (CompressionKind, CompressionMetadata) {
    let min = *values.iter().min().unwrap_or(&0);
    let max = *values.iter().max().unwrap_or(&0);
    let min_sv = StorageValue::from_signed(min);
    let max_sv = StorageValue::from_signed(max);
    if min == max {
        (
            CompressionKind::Constant,
            CompressionMetadata::constant(min_sv),
        )
    } else {
        (
            CompressionKind::IntegerBitpacking,
            CompressionMetadata {
                min: min_sv,
                max: max_sv,
                kind: CompressionKind::IntegerBitpacking,
            },
        )
    }
    .tap_physical_type(physical_type)
}

trait TapPhysicalType {
    fn tap_physical_type(self, physical_type: PhysicalTypeId) -> Self;
}

impl TapPhysicalType for (CompressionKind, CompressionMetadata) {
    fn tap_physical_type(self, physical_type: PhysicalTypeId) -> Self {
        debug_assert!(
            physical_type.is_signed_integer() || physical_type == PhysicalTypeId::Bool,
            "choose_integer_codec used on a non-integer physical type"
        );
        self
    }
}

/// `canUpdateInPlace` (spec §4.2): true iff overwriting a single value
/// with `new_value` would not violate the page's `[min,max]` bound (and,
/// for bitpacking, the bit width that bound implies — any value inside
/// `[min,max]` packs in no more bits than the range already reserved).
/// Constant pages only accept an in-place write that keeps the page
/// constant; boolean pages accept any legal boolean.
pub fn can_update_in_place(new_value: i64, metadata: &CompressionMetadata) -> bool {
    match metadata.kind {
        CompressionKind::Constant => new_value == metadata.min.as_signed(),
        CompressionKind::Uncompressed => true,
        CompressionKind::BooleanBitpacking => new_value == 0 || new_value == 1,
        CompressionKind::IntegerBitpacking => {
            new_value >= metadata.min.as_signed() && new_value <= metadata.max.as_signed()
        }
    }
}

/// Validates that `kind` is a legal codec for `physical_type`, per the
/// pairing `compression.h` documents (boolean bitpacking only for Bool,
/// integer bitpacking only for integer-width physical types).
pub fn validate_codec_for_type(kind: CompressionKind, physical_type: PhysicalTypeId) -> Result<()> {
    let ok = match kind {
        CompressionKind::BooleanBitpacking => physical_type == PhysicalTypeId::Bool,
        CompressionKind::IntegerBitpacking => physical_type.fixed_width().is_some() && physical_type != PhysicalTypeId::Bool,
        CompressionKind::Constant | CompressionKind::Uncompressed => true,
    };
    if ok {
        Ok(())
    } else {
        Err(DbError::Storage(format!(
            "{kind:?} is not a valid codec for {physical_type:?}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_run_chooses_constant_codec() {
        let values = vec![7i64; 100];
        let (kind, meta) = choose_integer_codec(&values, PhysicalTypeId::Int64);
        assert_eq!(kind, CompressionKind::Constant);
        assert_eq!(meta.min.as_signed(), 7);
        assert_eq!(meta.max.as_signed(), 7);
    }

    #[test]
    fn bitpacking_width_matches_value_range() {
        // [3, 5, 7, 9, 11] spans a range of 8, needing 4 bits.
        let values = vec![3i64, 5, 7, 9, 11];
        let info = bitpack_info(&values);
        assert_eq!(info.bit_width, 4);
        assert_eq!(info.offset, 3);
    }

    #[test]
    fn bitpack_roundtrip_on_full_chunk() {
        let values: Vec<i64> = (0..BITPACK_CHUNK_SIZE as i64).map(|i| i * 3 - 10).collect();
        let info = bitpack_info(&values);
        let packed = bitpack_encode(&values, &info);
        let decoded = bitpack_decode(&packed, values.len(), &info);
        assert_eq!(decoded, values);
    }

    #[test]
    fn bitpack_pads_trailing_partial_chunk_to_chunk_boundary() {
        let values: Vec<i64> = (0..(BITPACK_CHUNK_SIZE + 5) as i64).collect();
        let info = bitpack_info(&values);
        let packed = bitpack_encode(&values, &info);
        let expected_bytes = (2 * BITPACK_CHUNK_SIZE * info.bit_width as usize + 7) / 8;
        assert_eq!(packed.len(), expected_bytes);
        let decoded = bitpack_decode(&packed, values.len(), &info);
        assert_eq!(decoded, values);
    }

    #[test]
    fn scenario_s4_five_values_pad_to_a_32_wide_chunk() {
        // spec §8 scenario S4.
        let values = vec![3i64, 5, 7, 9, 11];
        let info = bitpack_info(&values);
        assert_eq!(info.bit_width, 4);
        assert!(!info.has_negative);
        let packed = bitpack_encode(&values, &info);
        assert_eq!(packed.len(), 32 * 4 / 8);
        let decoded = bitpack_decode(&packed, values.len(), &info);
        assert_eq!(decoded, values);
    }

    #[test]
    fn boolean_bitpacking_roundtrip() {
        let values = vec![true, false, true, true, false, false, false, true, true];
        let packed = boolean_bitpack_encode(&values);
        let decoded = boolean_bitpack_decode(&packed, values.len());
        assert_eq!(decoded, values);
    }

    #[test]
    fn compression_metadata_matches_original_layout_size() {
        assert_eq!(std::mem::size_of::<CompressionMetadata>(), 24);
    }

    #[test]
    fn boolean_bitpacking_rejected_for_int_column() {
        assert!(validate_codec_for_type(CompressionKind::BooleanBitpacking, PhysicalTypeId::Int64).is_err());
    }

    #[test]
    fn can_update_in_place_within_bounds_for_bitpacked_page() {
        let values = vec![3i64, 5, 7, 9, 11];
        let (_, meta) = choose_integer_codec(&values, PhysicalTypeId::Int64);
        assert!(can_update_in_place(7, &meta));
        assert!(can_update_in_place(3, &meta));
        assert!(can_update_in_place(11, &meta));
    }

    #[test]
    fn can_update_in_place_rejects_value_outside_bounds() {
        let values = vec![3i64, 5, 7, 9, 11];
        let (_, meta) = choose_integer_codec(&values, PhysicalTypeId::Int64);
        assert!(!can_update_in_place(12, &meta));
        assert!(!can_update_in_place(-1, &meta));
    }

    #[test]
    fn can_update_in_place_on_constant_page_only_accepts_the_constant() {
        let meta = CompressionMetadata::constant(StorageValue::from_signed(42));
        assert!(can_update_in_place(42, &meta));
        assert!(!can_update_in_place(43, &meta));
    }
}

//! Shared types used across storage and execution: physical/logical types,
//! the union used for page-level compression statistics, and the id types
//! that identify pages, tables, and rows.

use serde::{Deserialize, Serialize};

/// Row offset within a node or rel table.
pub type Offset = u64;

/// Identifies a table (node table or rel table) in the catalog.
pub type TableId = u32;

/// A 4 KiB page index within a file.
pub type PageIdx = u32;

/// Default page size in bytes. Fixed by the on-disk layout (spec §6).
pub const PAGE_SIZE: usize = 4096;

/// Number of values a value vector / chunk operates on at once.
pub const DEFAULT_VECTOR_CAPACITY: usize = 2048;

/// Physical storage kind. Distinct logical types can share a physical kind
/// (e.g. SERIAL and INT64 both have physical kind INT64).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicalTypeId {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Date,
    Timestamp,
    Interval,
    InternalId,
    String,
    List,
    Array,
    Struct,
}

impl PhysicalTypeId {
    /// Fixed width in bytes for non-nested, non-string physical kinds.
    /// Strings, lists, and structs are handled by their own chunk layout.
    pub fn fixed_width(&self) -> Option<usize> {
        use PhysicalTypeId::*;
        match self {
            Bool => Some(1),
            Int8 | UInt8 => Some(1),
            Int16 | UInt16 => Some(2),
            Int32 | UInt32 | Float | Date => Some(4),
            Int64 | UInt64 | Double | Timestamp => Some(8),
            Int128 => Some(16),
            Interval => Some(16),
            InternalId => Some(12), // {offset: u64, table: u32}
            String => Some(16),     // fat pointer width
            List | Array | Struct => None,
        }
    }

    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            PhysicalTypeId::Int8
                | PhysicalTypeId::Int16
                | PhysicalTypeId::Int32
                | PhysicalTypeId::Int64
                | PhysicalTypeId::Int128
        )
    }
}

/// A tagged logical type: physical kind plus nested info. The distilled core
/// only needs enough of this to drive chunk/vector layout; name resolution
/// and catalog-level type checking are collaborator concerns (binder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float,
    Double,
    Date,
    Timestamp,
    Interval,
    InternalId,
    Serial,
    String,
    List(Box<LogicalType>),
    Array(Box<LogicalType>, usize),
    Struct(Vec<(String, LogicalType)>),
}

impl LogicalType {
    pub fn physical_type(&self) -> PhysicalTypeId {
        match self {
            LogicalType::Bool => PhysicalTypeId::Bool,
            LogicalType::Int8 => PhysicalTypeId::Int8,
            LogicalType::Int16 => PhysicalTypeId::Int16,
            LogicalType::Int32 => PhysicalTypeId::Int32,
            LogicalType::Int64 => PhysicalTypeId::Int64,
            LogicalType::Int128 => PhysicalTypeId::Int128,
            LogicalType::UInt8 => PhysicalTypeId::UInt8,
            LogicalType::UInt16 => PhysicalTypeId::UInt16,
            LogicalType::UInt32 => PhysicalTypeId::UInt32,
            LogicalType::UInt64 => PhysicalTypeId::UInt64,
            LogicalType::Float => PhysicalTypeId::Float,
            LogicalType::Double => PhysicalTypeId::Double,
            LogicalType::Date => PhysicalTypeId::Date,
            LogicalType::Timestamp => PhysicalTypeId::Timestamp,
            LogicalType::Interval => PhysicalTypeId::Interval,
            LogicalType::InternalId => PhysicalTypeId::InternalId,
            LogicalType::Serial => PhysicalTypeId::Int64,
            LogicalType::String => PhysicalTypeId::String,
            LogicalType::List(_) => PhysicalTypeId::List,
            LogicalType::Array(_, _) => PhysicalTypeId::Array,
            LogicalType::Struct(_) => PhysicalTypeId::Struct,
        }
    }
}

/// 64-bit union used to carry the min/max bounds in page compression
/// metadata. Only integers (<=64 bit), floats, and bools are supported;
/// everything else has no representable min/max (constant compression is
/// then ineligible, per spec §3).
#[derive(Debug, Clone, Copy)]
pub union StorageValue {
    pub signed: i64,
    pub unsigned: u64,
    pub float: f64,
}

impl StorageValue {
    pub fn from_signed(v: i64) -> Self {
        Self { signed: v }
    }
    pub fn from_unsigned(v: u64) -> Self {
        Self { unsigned: v }
    }
    pub fn from_float(v: f64) -> Self {
        Self { float: v }
    }

    pub fn as_signed(&self) -> i64 {
        unsafe { self.signed }
    }
    pub fn as_unsigned(&self) -> u64 {
        unsafe { self.unsigned }
    }
    pub fn as_float(&self) -> f64 {
        unsafe { self.float }
    }

    /// Bit-identical comparison; all variants are the same width so any
    /// field can be used (per the original's `StorageValue::operator==`).
    pub fn bits_eq(&self, other: &StorageValue) -> bool {
        self.as_unsigned() == other.as_unsigned()
    }

    pub fn gt(&self, other: &StorageValue, physical_type: PhysicalTypeId) -> bool {
        use PhysicalTypeId::*;
        match physical_type {
            Bool | List | Array | InternalId | String | UInt64 | UInt32 | UInt16 | UInt8 => {
                self.as_unsigned() > other.as_unsigned()
            }
            Int64 | Int32 | Int16 | Int8 | Int128 => self.as_signed() > other.as_signed(),
            Float | Double => self.as_float() > other.as_float(),
            _ => unreachable!("physical type has no storage-value ordering"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_value_ordering_by_physical_type() {
        let a = StorageValue::from_signed(-5);
        let b = StorageValue::from_signed(10);
        assert!(b.gt(&a, PhysicalTypeId::Int64));
        assert!(!a.gt(&b, PhysicalTypeId::Int64));
    }

    #[test]
    fn physical_width_matches_spec() {
        assert_eq!(PhysicalTypeId::Int64.fixed_width(), Some(8));
        assert_eq!(PhysicalTypeId::Bool.fixed_width(), Some(1));
        assert_eq!(PhysicalTypeId::List.fixed_width(), None);
    }
}

//! Narrow catalog contract consumed by storage and execution.
//!
//! The real catalog (name resolution, DDL, serialization of schemas to
//! disk) is a collaborator out of scope for this core (spec §1). What the
//! storage layer needs from it is just enough identity to key WAL records
//! and column chunks by "which structure does this page belong to".

use serde::{Deserialize, Serialize};

use crate::common::TableId;

/// Identifies which on-disk structure a page update belongs to, so WAL
/// replay can route a page back to the right file. Mirrors the kind list
/// in spec §4.1's WAL record taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageStructureId {
    Column { table_id: TableId, column_id: u32 },
    Overflow { table_id: TableId, column_id: u32 },
    HashIndex { table_id: TableId },
    NodeTable(TableId),
    RelTable(TableId),
    Catalog,
}

/// Column definition as seen by storage: just enough to pick a chunk
/// layout (logical type) and a name for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub logical_type: crate::common::LogicalType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, logical_type: crate::common::LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

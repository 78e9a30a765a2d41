//! Hash index over primary keys (spec §4.3, component E).

pub mod hash_index;

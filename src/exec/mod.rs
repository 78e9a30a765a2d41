//! Vectorized join-probe execution core (spec §4.7–§4.9, component C2).

pub mod factorized_table;
pub mod join_hash_table;
pub mod join_probe;
pub mod pipeline;

//! Vectorized data flow primitives shared by storage and execution.

pub mod value_vector;

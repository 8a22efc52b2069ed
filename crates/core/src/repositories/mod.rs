//! Storage seams and their implementations.
//!
//! `his` defines the row types and traits the rest of the crate depends on. `mysql` talks to
//! the HIS database, `memory` backs tests and offline tooling.

pub mod his;
pub mod memory;
pub mod mysql;

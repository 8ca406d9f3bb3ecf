//! Row types and status lookups for the `jobs` schema.

pub mod job;
pub mod queue;
pub mod status;

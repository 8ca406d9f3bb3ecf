//! Sieve domain layer.
//!
//! Job lifecycle, analysis payload, retry policy, upload rules, and the
//! storage seams used by both the API and the worker. No database or HTTP
//! dependencies live here.

pub mod analysis;
pub mod error;
pub mod job;
pub mod memory;
pub mod retry;
pub mod stage;
pub mod store;
pub mod types;
pub mod upload;

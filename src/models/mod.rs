//! Data Models Module
//!
//! Response DTOs for the operations API. The diagnostics report is served
//! as-is from `crate::diagnostics`.

mod responses;

pub use responses::*;

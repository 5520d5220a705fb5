//! Pure domain logic for the salonpost platform.
//!
//! Every other workspace crate may depend on `salonpost-core`, never
//! the reverse.

pub mod compose;
pub mod error;
pub mod failure;
pub mod payload;
pub mod truncate;
pub mod types;

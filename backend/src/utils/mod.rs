//! Collection of general utility functions and common traits.
//!
//! Small, reusable helpers that do not belong to a specific domain module:
//! the injectable clock and random token material.

pub mod clock;
pub mod generate_random_string;

pub use clock::{Clock, ManualClock, SystemClock};

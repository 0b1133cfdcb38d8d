//! Foundational low-level utilities shared across nudge crates.
//!
//! Provides the atomic file-write helper used for ledger persistence and the
//! timezone helpers behind the rate-limit window schedule.

pub mod atomic_io;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use time_utils::{current_unix_timestamp_ms, local_datetime_for_unix_ms, parse_timezone};

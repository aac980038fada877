//! Filesystem utilities for lockwatch.
//!
//! Settings are the only state lockwatch persists, and every save goes
//! through the atomic write path so a crash mid-save never leaves a torn
//! settings file behind.

pub mod atomic;

pub use atomic::atomic_write;
pub use atomic::atomic_write_file;

//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is open.
//!
//! # Tasks
//! - Expiry sweep: Removes expired entries and enforces the size bound

mod sweep;

pub use sweep::spawn_sweep_task;

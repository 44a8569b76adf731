// ABOUTME: Lock module - per-path exclusive leases with optional expiry.
// ABOUTME: Expired leases are reclaimed lazily by whichever call sees them.

mod manager;

pub use manager::{FileLock, LockManager};

//! Application-wide constants

/// Default time a writer waits for a section lock before giving up.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Upper bound on traversal depth; trees deeper than this are treated as corrupt.
pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;

/// Namespace key for section advisory locks (first half of the two-key form).
pub const SECTION_LOCK_NAMESPACE: i32 = 0x4d45_4e55; // "MENU"

/// Positions parked during a move are placed below this value.
pub const SENTINEL_POSITION_BASE: i32 = -1_000_000;

pub const DEFAULT_CACHE_KEY: &str = "menu:tree";
pub const DEFAULT_STALE_CHANNEL: &str = "menu:stale";

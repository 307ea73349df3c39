//! Scheduler constants for opportunistic queue flushing.

/// Foreground flush cadence in seconds.
pub const SYNC_FLUSH_INTERVAL_SECS: u64 = 45;

/// Maximum jitter (seconds) added to periodic flush intervals.
pub const SYNC_FLUSH_JITTER_SECS: u64 = 5;

/// Delay (milliseconds) used while due entries are still waiting in the queue.
pub const SYNC_FLUSH_PENDING_DELAY_MS: u64 = 2_000;

/// Failed replay attempts before an entry is dead-lettered.
pub const DEFAULT_MAX_REPLAY_ATTEMPTS: u32 = 8;

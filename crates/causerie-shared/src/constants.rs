/// Sequence id carried by descriptors the backend has not acknowledged yet
pub const DEFAULT_SEQUENCE_ID: i64 = -1;

/// Two items from the same sender closer than this merge into one bubble group (ms)
pub const MAX_DELTA_TIMESTAMP1: i64 = 120_000;

/// A TIME separator is inserted once the gap to the previous one exceeds this (ms)
pub const MAX_DELTA_TIMESTAMP2: i64 = 3_600_000;

/// Peer typing state expires after this much silence (ms)
pub const TYPING_PEER_TIMER_DURATION: u64 = 12_000;

/// Local typing START is re-announced after this delay while still typing (ms)
pub const TYPING_RESEND_DELAY: u64 = 8_000;

/// Local typing auto-stops after this much inactivity (ms)
pub const TYPING_TIMER_DURATION: u64 = 10_000;

/// Descriptors requested per initial fetch or backfill page
pub const DEFAULT_PAGE_SIZE: usize = 64;

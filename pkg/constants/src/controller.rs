//! Controller loop timing constants.

/// How often the topology watcher lists topologies, in seconds.
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 10;

/// Every Nth watcher pass re-delivers every topology, changed or not.
pub const FULL_RESYNC_EVERY: u64 = 6;

/// How often a watchdog polls replset membership, in seconds.
pub const DEFAULT_WATCHDOG_INTERVAL_SECS: u64 = 15;

/// Capacity of the event and resync channels.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

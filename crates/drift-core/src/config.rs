use std::time::Duration;

/// Engine tuning knobs. The server binary populates this from environment
/// variables; tests construct it directly.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded capacity of each client's event delivery queue.
    pub delivery_capacity: usize,

    /// When true (the default), a relay send into a full delivery queue
    /// waits for capacity. When false it fails with `Overflow` instead.
    pub blocking_sends: bool,

    /// How long a queued client waits for an interest-overlapping partner
    /// before it is paired with the next-oldest same-mode client anyway.
    /// Zero means interest overlap is a preference, never a requirement.
    pub fallback_match_after: Duration,

    /// Video sessions stuck in `Connecting` are promoted to `Active` after
    /// this long, so a partner that never signals cannot deadlock the pair.
    pub connect_timeout: Duration,

    /// Interval of the background matching pass that catches entries left
    /// waiting when no new enqueue arrives.
    pub match_tick: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delivery_capacity: 256,
            blocking_sends: true,
            fallback_match_after: Duration::ZERO,
            connect_timeout: Duration::from_secs(5),
            match_tick: Duration::from_secs(1),
        }
    }
}

//! Time-to-live rule for cached pages.

use chrono::{DateTime, Utc};

/// Whether a page cached at `fetched_at` is still fresh at `now`.
///
/// Fresh while the number of whole days elapsed is below `ttl_days`, so a
/// TTL of zero makes every entry stale.
pub fn is_within_ttl(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl_days: i64) -> bool {
    (now - fetched_at).num_days() < ttl_days
}

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Return the current unix timestamp in seconds.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

/// Unix timestamp `duration` from now, saturating instead of overflowing.
pub fn unix_secs_after(duration: Duration) -> u64 {
    now_unix_secs().saturating_add(duration.as_secs())
}

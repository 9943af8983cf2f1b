use std::time::Duration;

/// Returns the current Unix timestamp in milliseconds.
pub fn current_unix_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

/// Returns the wall-clock deadline `timeout` after `now_unix_ms`, saturating on overflow.
pub fn deadline_unix_ms(now_unix_ms: u64, timeout: Duration) -> u64 {
    let timeout_ms: u64 = timeout.as_millis().try_into().unwrap_or(u64::MAX);
    now_unix_ms.saturating_add(timeout_ms)
}

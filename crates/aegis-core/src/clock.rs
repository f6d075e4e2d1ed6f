//! Millisecond-since-epoch timestamps, per `spec.md` §3 ("times are
//! milliseconds since epoch unless stated").

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time, in milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as i64
}

/// `now_millis() + seconds * 1000`, saturating on overflow.
#[must_use]
pub fn expires_in(seconds: i64) -> i64 {
    now_millis().saturating_add(seconds.saturating_mul(1000))
}

/// Whether `expires_at` (milliseconds since epoch) is in the past.
#[must_use]
pub fn is_expired(expires_at: i64) -> bool {
    expires_at <= now_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_in_is_future() {
        assert!(expires_in(60) > now_millis());
    }

    #[test]
    fn is_expired_detects_past() {
        assert!(is_expired(now_millis() - 1));
        assert!(!is_expired(now_millis() + 10_000));
    }
}

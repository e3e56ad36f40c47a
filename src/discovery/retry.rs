use std::time::Duration;

use rand::Rng;

/// Upper bound honoured for a server-provided Retry-After
const MAX_RETRY_AFTER_SECS: u64 = 120;

/// Exponential backoff: `base_ms * 2^attempt`, capped at `max_ms`
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(factor).min(max_ms))
}

/// Add up to 25% random jitter so concurrent sessions do not retry in step
pub fn with_jitter(delay: Duration) -> Duration {
    let spread = delay.as_millis() as u64 / 4;
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}

/// Parse a Retry-After header given in seconds
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let secs = header_value?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(0, 1000, 30_000), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, 1000, 30_000), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2, 1000, 30_000), Duration::from_millis(4000));
        assert_eq!(backoff_delay(10, 1000, 30_000), Duration::from_millis(30_000));
        assert_eq!(backoff_delay(200, 1000, 30_000), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_is_bounded() {
        let base = Duration::from_millis(1000);
        for _ in 0..100 {
            let d = with_jitter(base);
            assert!(d >= base && d <= Duration::from_millis(1250));
        }
        assert_eq!(with_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some(" 7 ")), Some(Duration::from_secs(7)));
        assert_eq!(parse_retry_after(Some("9999")), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(parse_retry_after(None), None);
    }
}

//! Backoff schedule for failed delivery attempts.
//!
//! The delay is set as a per-message expiration on the retry holding
//! queue, so the broker is the timer. The schedule is a fixed table, not a
//! formula; attempt five is the last scheduled try.

use std::time::Duration;

/// Delay before the next attempt, given the attempt number that failed.
///
/// | failed attempt | delay  |
/// |----------------|--------|
/// | 1              | 30 s   |
/// | 2              | 2 min  |
/// | 3              | 10 min |
/// | 4+             | 30 min |
pub fn retry_delay(failed_attempt: u32) -> Duration {
    match failed_attempt {
        0 | 1 => Duration::from_secs(30),
        2 => Duration::from_secs(120),
        3 => Duration::from_secs(600),
        _ => Duration::from_secs(1800),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_matches_table() {
        assert_eq!(retry_delay(1), Duration::from_secs(30));
        assert_eq!(retry_delay(2), Duration::from_secs(120));
        assert_eq!(retry_delay(3), Duration::from_secs(600));
        assert_eq!(retry_delay(4), Duration::from_secs(1800));
        assert_eq!(retry_delay(17), Duration::from_secs(1800));
    }

    #[test]
    fn expirations_for_exhausted_run() {
        // A destination failing every attempt schedules exactly these
        // expirations before the delivery goes dead on attempt five.
        let expirations: Vec<String> =
            (1..=4).map(|attempt| retry_delay(attempt).as_millis().to_string()).collect();

        assert_eq!(expirations, ["30000", "120000", "600000", "1800000"]);
    }
}

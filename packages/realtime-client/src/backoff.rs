//! Reconnection backoff policy

use std::time::Duration;

use codedeck_shared_config::RealtimeConfig;

/// Capped exponential backoff for automatic reconnection
///
/// The n-th automatic attempt is delayed by `base * factor^(n-1)`; once
/// `max_attempts` have been scheduled no further attempts are made until a
/// caller explicitly reconnects.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    factor: f64,
    max_attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, factor: f64, max_attempts: u32) -> Self {
        Self {
            base,
            factor,
            max_attempts,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(
            config.retry_base,
            config.retry_factor,
            config.max_reconnect_attempts,
        )
    }

    /// Delay before the next attempt, given how many have already been
    /// scheduled; `None` once the ceiling is reached
    pub fn delay(&self, prior_attempts: u32) -> Option<Duration> {
        if prior_attempts >= self.max_attempts {
            return None;
        }

        let millis = self.base.as_millis() as f64 * self.factor.powi(prior_attempts as i32);
        Some(Duration::from_millis(millis.round() as u64))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_config(&RealtimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_growth() {
        let policy = ReconnectPolicy::new(Duration::from_millis(3000), 1.5, 5);

        assert_eq!(policy.delay(0), Some(Duration::from_millis(3000)));
        assert_eq!(policy.delay(1), Some(Duration::from_millis(4500)));
        assert_eq!(policy.delay(2), Some(Duration::from_millis(6750)));
        assert_eq!(policy.delay(3), Some(Duration::from_millis(10125)));
        assert_eq!(policy.delay(4), Some(Duration::from_millis(15188)));
    }

    #[test]
    fn test_ceiling() {
        let policy = ReconnectPolicy::new(Duration::from_millis(3000), 1.5, 5);
        assert_eq!(policy.delay(5), None);
        assert_eq!(policy.delay(6), None);
    }

    #[test]
    fn test_from_config_defaults() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts(), 5);
        assert_eq!(policy.delay(0), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_flat_backoff_with_unit_factor() {
        let policy = ReconnectPolicy::new(Duration::from_millis(500), 1.0, 3);
        assert_eq!(policy.delay(0), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay(3), None);
    }
}

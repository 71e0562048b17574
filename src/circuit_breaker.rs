//! Per-country circuit breaker.
//!
//! One independent state per country: two maps (failure count,
//! open-until), no half-open phase — `is_open` just checks whether the
//! cool-off has elapsed and self-clears when it has.

use dashmap::DashMap;
use std::time::{Duration, Instant};

pub struct CircuitBreakerTable {
    failure_threshold: usize,
    cooloff: Duration,
    failures: DashMap<String, usize>,
    open_until: DashMap<String, Instant>,
}

impl CircuitBreakerTable {
    pub fn new(failure_threshold: usize, cooloff: Duration) -> Self {
        Self {
            failure_threshold,
            cooloff,
            failures: DashMap::new(),
            open_until: DashMap::new(),
        }
    }

    pub fn is_open(&self, country: &str) -> bool {
        let now = Instant::now();
        let expired = match self.open_until.get(country) {
            Some(until) if *until > now => return true,
            Some(_) => true,
            None => false,
        };

        if expired {
            self.open_until.remove(country);
            self.failures.remove(country);
        }
        false
    }

    pub fn record_success(&self, country: &str) {
        self.failures.remove(country);
        self.open_until.remove(country);
    }

    pub fn record_failure(&self, country: &str) {
        let count = {
            let mut entry = self.failures.entry(country.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };

        if count >= self.failure_threshold {
            self.open_until.insert(country.to_string(), Instant::now() + self.cooloff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreakerTable::new(3, Duration::from_secs(60));
        assert!(!breaker.is_open("IN"));

        breaker.record_failure("IN");
        breaker.record_failure("IN");
        assert!(!breaker.is_open("IN"));

        breaker.record_failure("IN");
        assert!(breaker.is_open("IN"));
    }

    #[test]
    fn success_clears_counters() {
        let breaker = CircuitBreakerTable::new(2, Duration::from_secs(60));
        breaker.record_failure("US");
        breaker.record_success("US");
        breaker.record_failure("US");
        assert!(!breaker.is_open("US"));
    }

    #[test]
    fn countries_are_independent() {
        let breaker = CircuitBreakerTable::new(1, Duration::from_secs(60));
        breaker.record_failure("US");
        assert!(breaker.is_open("US"));
        assert!(!breaker.is_open("IN"));
    }
}

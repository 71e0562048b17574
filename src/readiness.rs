//! Background readiness prober.
//!
//! A periodic `tokio::time::interval` loop that exercises the full scrape
//! pipeline against one configured canonical product identifier and keeps
//! a running ready/not-ready status for `GET /api/ready` to read.

use std::sync::RwLock;
use std::time::Instant;
use tracing::{info, warn};

/// The state `GET /api/ready` reads.
#[derive(Debug, Clone)]
pub struct ReadyState {
    pub ready: bool,
    pub last_check: Option<Instant>,
    pub error: Option<String>,
}

impl Default for ReadyState {
    fn default() -> Self {
        Self { ready: true, last_check: None, error: None }
    }
}

pub struct ReadinessProbe {
    state: RwLock<ReadyState>,
}

impl ReadinessProbe {
    pub fn new() -> Self {
        Self { state: RwLock::new(ReadyState::default()) }
    }

    pub fn snapshot(&self) -> ReadyState {
        self.state.read().unwrap().clone()
    }

    fn record_success(&self) {
        let mut state = self.state.write().unwrap();
        state.ready = true;
        state.error = None;
        state.last_check = Some(Instant::now());
    }

    fn record_failure(&self, error: String) {
        let mut state = self.state.write().unwrap();
        state.ready = false;
        state.error = Some(error);
        state.last_check = Some(Instant::now());
    }
}

impl Default for ReadinessProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background prober loop against `engine`. A no-op (the system
/// stays always-ready) when no canonical identifier is configured.
pub fn spawn(engine: std::sync::Arc<crate::engine::Engine>) -> Option<tokio::task::JoinHandle<()>> {
    let Some(product_id) = engine.config.ready_check_id.clone() else {
        return None;
    };

    Some(tokio::spawn(async move {
        let country = engine.config.ready_check_country.clone();
        let interval = engine.config.ready_check_interval;

        loop {
            let Some(marketplace) = crate::config::marketplace_by_code(&country) else {
                engine.readiness.record_failure("Invalid READY_CHECK_COUNTRY".to_string());
                tokio::time::sleep(interval).await;
                continue;
            };

            let url = format!("https://www.{}/dp/{}", marketplace.domain, product_id);

            match engine.run_pipeline(&url, None, None).await {
                Ok(_) => {
                    info!("readiness probe succeeded for {country}:{product_id}");
                    engine.readiness.record_success();
                }
                Err(failure) => {
                    let message = failure.error.to_string();
                    warn!("readiness probe failed: {message}");
                    engine.readiness.record_failure(message);
                }
            }

            tokio::time::sleep(interval).await;
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_ready_when_never_checked() {
        let probe = ReadinessProbe::new();
        let snapshot = probe.snapshot();
        assert!(snapshot.ready);
        assert!(snapshot.last_check.is_none());
    }

    #[test]
    fn records_failure_then_success() {
        let probe = ReadinessProbe::new();
        probe.record_failure("boom".to_string());
        assert!(!probe.snapshot().ready);

        probe.record_success();
        let snapshot = probe.snapshot();
        assert!(snapshot.ready);
        assert!(snapshot.error.is_none());
        assert!(snapshot.last_check.is_some());
    }
}

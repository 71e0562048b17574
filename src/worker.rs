//! Bounded dispatcher and the per-task retry/render loop.
//!
//! `W` persistent workers pull from one `mpsc::Receiver` shared behind a
//! `tokio::sync::Mutex`. Each task carries its own `oneshot` reply
//! channel rather than routing every result through one shared results
//! queue, since handlers need to `await` their own specific task rather
//! than pull the next thing the pool produces.

use crate::browser_manager::BrowserManager;
use crate::extractor::MarketplaceExtractor;
use crate::models::{FailureKind, Fingerprint, RetryPolicy, ScrapeFailure, ScrapeOutcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{info, warn};

const CAPTCHA_MARKERS: &[&str] = &[
    "enter the characters you see",
    "type the characters",
    "sorry, we just need to make sure",
    "validatecaptcha",
    "<title>robot check</title>",
];

pub struct ScrapeTask {
    pub fingerprint: Fingerprint,
    pub url: String,
    pub headless: bool,
    pub proxy: Option<String>,
    pub extractor: Arc<dyn MarketplaceExtractor>,
    reply: oneshot::Sender<ScrapeOutcome>,
}

pub struct TaskHandle {
    receiver: oneshot::Receiver<ScrapeOutcome>,
}

impl TaskHandle {
    /// Await the task's outcome, resolving as a timeout failure if it
    /// doesn't land within `timeout` (the caller passes `scrape_timeout + 10s`).
    pub async fn await_result(self, timeout: Duration) -> ScrapeOutcome {
        match tokio::time::timeout(timeout, self.receiver).await {
            Ok(Ok(outcome)) => outcome,
            _ => ScrapeOutcome::Failure(ScrapeFailure::new(FailureKind::Timeout, "Scrape timed out")),
        }
    }
}

pub struct Dispatcher {
    sender: mpsc::UnboundedSender<ScrapeTask>,
    queue_depth: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(worker_count: usize, browser_manager: Arc<BrowserManager>, retry_policy: RetryPolicy, scrape_timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<ScrapeTask>();
        let receiver = Arc::new(Mutex::new(receiver));
        let queue_depth = Arc::new(AtomicUsize::new(0));

        for id in 0..worker_count {
            let receiver = receiver.clone();
            let browser_manager = browser_manager.clone();
            let queue_depth = queue_depth.clone();
            let retry_policy = retry_policy;

            tokio::spawn(async move {
                info!("scrape worker {id} started");
                loop {
                    let task = {
                        let mut guard = receiver.lock().await;
                        guard.recv().await
                    };

                    let Some(task) = task else { break };
                    queue_depth.fetch_sub(1, Ordering::Relaxed);

                    let outcome = run_retry_loop(&browser_manager, &task, &retry_policy, scrape_timeout).await;
                    let _ = task.reply.send(outcome);
                }
                info!("scrape worker {id} stopped");
            });
        }

        Self { sender, queue_depth }
    }

    /// Enqueue a task; FIFO, unbounded — backpressure is the rate
    /// limiter's job, not the dispatcher's.
    pub fn submit(
        &self,
        fingerprint: Fingerprint,
        url: String,
        headless: bool,
        proxy: Option<String>,
        extractor: Arc<dyn MarketplaceExtractor>,
    ) -> TaskHandle {
        let (reply, receiver) = oneshot::channel();
        let task = ScrapeTask { fingerprint, url, headless, proxy, extractor, reply };

        self.queue_depth.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(task).is_err() {
            warn!("dispatcher queue receiver dropped");
        }

        TaskHandle { receiver }
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

fn detect_captcha(markup: &str) -> bool {
    let lower = markup.to_lowercase();
    CAPTCHA_MARKERS.iter().any(|marker| lower.contains(marker))
}

async fn run_retry_loop(
    browser_manager: &BrowserManager,
    task: &ScrapeTask,
    retry_policy: &RetryPolicy,
    scrape_timeout: Duration,
) -> ScrapeOutcome {
    let mut last_failure = ScrapeFailure::new(FailureKind::RenderError, "no attempts made");

    for attempt in 1..=(retry_policy.max_retries + 1) {
        match run_single_attempt(browser_manager, task, scrape_timeout).await {
            Ok(record) => return ScrapeOutcome::Success { record, cached: false },
            Err(failure) => {
                let is_captcha = failure.kind == FailureKind::Captcha;
                last_failure = failure;

                if is_captcha {
                    return ScrapeOutcome::Failure(last_failure);
                }

                if attempt <= retry_policy.max_retries {
                    tokio::time::sleep(retry_policy.delay_for_attempt(attempt)).await;
                }
            }
        }
    }

    ScrapeOutcome::Failure(last_failure)
}

async fn run_single_attempt(
    browser_manager: &BrowserManager,
    task: &ScrapeTask,
    scrape_timeout: Duration,
) -> Result<crate::models::ProductRecord, ScrapeFailure> {
    let context = browser_manager
        .get_context(task.headless, task.proxy.as_deref())
        .await
        .map_err(|e| ScrapeFailure::new(FailureKind::RenderError, e.to_string()))?;

    let outcome = async {
        context
            .page
            .goto(task.url.as_str())
            .await
            .map_err(|e| ScrapeFailure::new(FailureKind::RenderError, e.to_string()))?;

        // The product-title anchor may legitimately be absent; continue on
        // timeout rather than failing the whole attempt.
        let _ = tokio::time::timeout(scrape_timeout, context.page.find_element("#productTitle")).await;

        let markup = context
            .page
            .content()
            .await
            .map_err(|e| ScrapeFailure::new(FailureKind::RenderError, e.to_string()))?;

        if detect_captcha(&markup) {
            return Err(ScrapeFailure::new(FailureKind::Captcha, "CAPTCHA_REQUIRED"));
        }

        task.extractor
            .extract(&task.url, &markup)
            .map_err(|e| ScrapeFailure::new(FailureKind::RenderError, e.to_string()))
    }
    .await;

    browser_manager.release(context).await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_each_captcha_marker_case_insensitively() {
        assert!(detect_captcha("Please ENTER THE CHARACTERS YOU SEE below"));
        assert!(detect_captcha("<title>Robot Check</title>"));
        assert!(detect_captcha("Sorry, we just need to make sure you're not a robot"));
        assert!(!detect_captcha("<html><body>Totally normal product page</body></html>"));
    }
}

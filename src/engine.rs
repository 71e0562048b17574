//! Composition root: a single `Engine` value constructed at startup and
//! passed explicitly to handlers, with no ambient globals. Every
//! subsystem is a field; every relationship is unidirectional, engine →
//! subsystem — nothing here reaches back into the HTTP layer.

use crate::auth;
use crate::browser_manager::BrowserManager;
use crate::cache::TtlCache;
use crate::circuit_breaker::CircuitBreakerTable;
use crate::config::{marketplace_by_code, Config, MarketplaceDescriptor};
use crate::error::EngineError;
use crate::extractor::{extractor_for, extract_product_id, GenericExtractor};
use crate::metrics::Metrics;
use crate::models::{Fingerprint, ProductRecord, RetryPolicy, ScrapeOutcome};
use crate::rate_limiter::RateLimiter;
use crate::readiness::ReadinessProbe;
use crate::validators::{country_from_url, validate_amazon_url};
use crate::worker::Dispatcher;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

pub struct ScrapeSuccess {
    pub country: &'static MarketplaceDescriptor,
    pub cached: bool,
    pub record: ProductRecord,
}

pub struct ScrapeFailureContext {
    pub error: EngineError,
    pub country: Option<&'static MarketplaceDescriptor>,
}

pub struct Engine {
    pub config: Config,
    pub cache: TtlCache,
    pub breakers: CircuitBreakerTable,
    pub rate_limiter_key: RateLimiter,
    pub rate_limiter_ip: RateLimiter,
    pub browser_manager: Arc<BrowserManager>,
    pub dispatcher: Dispatcher,
    pub metrics: Metrics,
    pub readiness: ReadinessProbe,
    pub prometheus_handle: PrometheusHandle,
    retry_policy: RetryPolicy,
}

impl Engine {
    pub fn new(config: Config, prometheus_handle: PrometheusHandle) -> Arc<Self> {
        let browser_manager = Arc::new(BrowserManager::new(config.clone()));
        let retry_policy = RetryPolicy {
            max_retries: config.scrape_max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        };

        let dispatcher = Dispatcher::new(
            config.max_concurrency,
            browser_manager.clone(),
            retry_policy,
            config.scrape_timeout,
        );

        Arc::new(Self {
            cache: TtlCache::new(config.cache_ttl, config.cache_max_items),
            breakers: CircuitBreakerTable::new(config.breaker_failure_threshold, config.breaker_cooloff),
            rate_limiter_key: RateLimiter::new(config.rate_limit_per_minute_key, None),
            rate_limiter_ip: RateLimiter::new(config.rate_limit_per_minute_ip, None),
            browser_manager,
            dispatcher,
            metrics: Metrics::new(),
            readiness: ReadinessProbe::new(),
            prometheus_handle,
            retry_policy,
            config,
        })
    }

    /// Entry point for `POST /api/scrape`: rate limiting, then the
    /// cache/breaker/dispatch pipeline.
    pub async fn handle_scrape(
        &self,
        url: &str,
        headless_override: Option<bool>,
        proxy_override: Option<String>,
        api_key: &str,
        client_ip: &str,
    ) -> Result<ScrapeSuccess, ScrapeFailureContext> {
        // Key limiter first, then IP — the first denial short-circuits.
        if !self.rate_limiter_key.is_allowed(api_key) {
            return Err(ScrapeFailureContext {
                error: EngineError::RateLimited("API key rate limit exceeded".to_string()),
                country: None,
            });
        }
        if !self.rate_limiter_ip.is_allowed(client_ip) {
            return Err(ScrapeFailureContext {
                error: EngineError::RateLimited("IP rate limit exceeded".to_string()),
                country: None,
            });
        }

        self.run_pipeline(url, headless_override, proxy_override).await
    }

    /// The cache/breaker/dispatch pipeline shared by `handle_scrape` and
    /// the readiness prober.
    pub async fn run_pipeline(
        &self,
        url: &str,
        headless_override: Option<bool>,
        proxy_override: Option<String>,
    ) -> Result<ScrapeSuccess, ScrapeFailureContext> {
        validate_amazon_url(url).map_err(|msg| ScrapeFailureContext {
            error: EngineError::InvalidUrl(msg),
            country: None,
        })?;

        let country_code = country_from_url(url).ok_or_else(|| ScrapeFailureContext {
            error: EngineError::UnsupportedDomain,
            country: None,
        })?;

        let country = marketplace_by_code(country_code).expect("country_from_url yields a known code");

        let extractor: Arc<dyn crate::extractor::MarketplaceExtractor> = Arc::new(extractor_for(country_code).unwrap_or(GenericExtractor {
            country_code: country.country_code,
            currency: country.currency,
            currency_code: country.currency_code,
        }));

        // Product identifier extraction happens here so the cache can be
        // probed before dispatch; a URL with no extractable identifier
        // still proceeds to the worker, where the extractor itself raises
        // against the rendered markup rather than failing fast here.
        let product_id = extract_product_id(url).unwrap_or_default();
        let fingerprint = Fingerprint::new(country_code, product_id);

        if let Some(cached) = self.cache.get(&fingerprint).await {
            self.metrics.cache_size.set(self.cache.size().await as f64);
            return Ok(ScrapeSuccess { country, cached: true, record: cached });
        }

        if self.breakers.is_open(country_code) {
            return Err(ScrapeFailureContext { error: EngineError::BreakerOpen, country: Some(country) });
        }

        let headless = headless_override.unwrap_or(self.config.headless);
        let proxy = proxy_override.or_else(|| self.config.proxy_urls.first().cloned());

        let handle = self.dispatcher.submit(fingerprint.clone(), url.to_string(), headless, proxy, extractor);
        self.metrics.scrape_queue_depth.set(self.dispatcher.queue_depth() as f64);

        let started = Instant::now();
        let outcome = handle.await_result(self.config.scrape_timeout + Duration::from_secs(10)).await;
        self.metrics.scrape_duration_seconds(country_code).record(started.elapsed().as_secs_f64());
        self.metrics.scrape_queue_depth.set(self.dispatcher.queue_depth() as f64);

        match outcome {
            ScrapeOutcome::Success { record, .. } => {
                self.breakers.record_success(country_code);
                self.metrics.scrape_total("success", country_code).increment(1);
                self.cache.set(fingerprint, record.clone()).await;
                self.metrics.cache_size.set(self.cache.size().await as f64);
                Ok(ScrapeSuccess { country, cached: false, record })
            }
            ScrapeOutcome::Failure(failure) => {
                self.breakers.record_failure(country_code);

                let error = match failure.kind {
                    crate::models::FailureKind::Captcha => {
                        self.metrics.captcha_total(country_code).increment(1);
                        self.metrics.scrape_total("failure", country_code).increment(1);
                        EngineError::Captcha
                    }
                    crate::models::FailureKind::Timeout => {
                        self.metrics.scrape_total("timeout", country_code).increment(1);
                        EngineError::Timeout
                    }
                    crate::models::FailureKind::RenderError | crate::models::FailureKind::UpstreamError => {
                        self.metrics.scrape_total("failure", country_code).increment(1);
                        EngineError::RenderError(failure.message)
                    }
                    crate::models::FailureKind::InvalidUrl => {
                        self.metrics.scrape_total("failure", country_code).increment(1);
                        EngineError::InvalidUrl(failure.message)
                    }
                };

                Err(ScrapeFailureContext { error, country: Some(country) })
            }
        }
    }

    pub fn authenticate(&self, api_key: Option<&str>, bearer_token: Option<&str>) -> Result<(), EngineError> {
        auth::authenticate(&self.config, api_key, bearer_token)
    }

    pub async fn is_browser_running(&self) -> bool {
        self.browser_manager.is_running().await
    }

    pub fn queue_depth(&self) -> usize {
        self.dispatcher.queue_depth()
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.size().await
    }

    /// Graceful shutdown: the dispatcher's workers drain naturally once the
    /// sender is dropped with them; here we just close the shared browser
    /// after the queue has had a chance to drain.
    pub async fn shutdown(&self) {
        info!("engine shutting down, queue depth {}", self.queue_depth());
        self.browser_manager.shutdown().await;
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

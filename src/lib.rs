//! `marketscrape-engine` — a multi-tenant HTTP service that renders a
//! product URL from one of fifteen regional Amazon marketplaces through a
//! headless-browser farm and returns a normalized [`models::ProductRecord`].
//!
//! The [`engine`] module is the composition root: it owns the cache,
//! circuit breakers, rate limiters, browser manager, and dispatcher, and is
//! the only thing the [`http`] layer depends on.

/// Environment-driven configuration and the marketplace descriptor table.
pub mod config;

/// Error taxonomy shared by the worker, extractor, and HTTP layers.
pub mod error;

/// Data model: `ProductRecord`, `Fingerprint`, and friends.
pub mod models;

/// API-key and optional JWT bearer authentication.
pub mod auth;

/// Request URL validation and country routing.
pub mod validators;

/// TTL cache with lazy purge and bounded eviction.
pub mod cache;

/// Per-country circuit breaker table.
pub mod circuit_breaker;

/// Dual token-bucket rate limiter.
pub mod rate_limiter;

/// Single relaunchable browser manager and device-profile rotation.
pub mod browser_manager;

/// Per-marketplace markup extraction.
pub mod extractor;

/// Bounded dispatcher and per-task retry/CAPTCHA loop.
pub mod worker;

/// Background readiness prober.
pub mod readiness;

/// Prometheus metrics registry.
pub mod metrics;

/// Composition root tying every subsystem together.
pub mod engine;

/// axum router and request handlers.
pub mod http;

/// Process bootstrap CLI.
pub mod cli;

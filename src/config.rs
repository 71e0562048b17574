//! Configuration management for the scrape orchestration engine
//!
//! Every recognized setting is a field on [`Config`], populated from
//! environment variables with sensible production defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable, process-wide marketplace descriptor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MarketplaceDescriptor {
    pub country_code: &'static str,
    pub name: &'static str,
    pub domain: &'static str,
    pub currency: &'static str,
    pub currency_code: &'static str,
}

/// The fifteen supported regional marketplaces.
pub const MARKETPLACES: &[MarketplaceDescriptor] = &[
    MarketplaceDescriptor { country_code: "US", name: "United States", domain: "amazon.com", currency: "$", currency_code: "USD" },
    MarketplaceDescriptor { country_code: "CA", name: "Canada", domain: "amazon.ca", currency: "C$", currency_code: "CAD" },
    MarketplaceDescriptor { country_code: "MX", name: "Mexico", domain: "amazon.com.mx", currency: "MX$", currency_code: "MXN" },
    MarketplaceDescriptor { country_code: "BR", name: "Brazil", domain: "amazon.com.br", currency: "R$", currency_code: "BRL" },
    MarketplaceDescriptor { country_code: "UK", name: "United Kingdom", domain: "amazon.co.uk", currency: "£", currency_code: "GBP" },
    MarketplaceDescriptor { country_code: "DE", name: "Germany", domain: "amazon.de", currency: "€", currency_code: "EUR" },
    MarketplaceDescriptor { country_code: "FR", name: "France", domain: "amazon.fr", currency: "€", currency_code: "EUR" },
    MarketplaceDescriptor { country_code: "IT", name: "Italy", domain: "amazon.it", currency: "€", currency_code: "EUR" },
    MarketplaceDescriptor { country_code: "ES", name: "Spain", domain: "amazon.es", currency: "€", currency_code: "EUR" },
    MarketplaceDescriptor { country_code: "NL", name: "Netherlands", domain: "amazon.nl", currency: "€", currency_code: "EUR" },
    MarketplaceDescriptor { country_code: "AE", name: "UAE", domain: "amazon.ae", currency: "AED", currency_code: "AED" },
    MarketplaceDescriptor { country_code: "IN", name: "India", domain: "amazon.in", currency: "₹", currency_code: "INR" },
    MarketplaceDescriptor { country_code: "JP", name: "Japan", domain: "amazon.co.jp", currency: "¥", currency_code: "JPY" },
    MarketplaceDescriptor { country_code: "AU", name: "Australia", domain: "amazon.com.au", currency: "A$", currency_code: "AUD" },
    MarketplaceDescriptor { country_code: "SG", name: "Singapore", domain: "amazon.sg", currency: "S$", currency_code: "SGD" },
];

/// Find the marketplace whose domain equals, or is a dotted suffix of, `host`.
pub fn marketplace_for_host(host: &str) -> Option<&'static MarketplaceDescriptor> {
    MARKETPLACES
        .iter()
        .find(|m| host == m.domain || host.ends_with(&format!(".{}", m.domain)))
}

pub fn marketplace_by_code(code: &str) -> Option<&'static MarketplaceDescriptor> {
    MARKETPLACES.iter().find(|m| m.country_code.eq_ignore_ascii_case(code))
}

pub fn allowed_domains() -> Vec<&'static str> {
    MARKETPLACES.iter().map(|m| m.domain).collect()
}

/// Main configuration structure for the engine.
///
/// Populated with [`Config::from_env`]; every field corresponds to an
/// environment variable documented alongside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `API_HOST` — listen interface (default: `0.0.0.0`)
    pub host: String,
    /// `API_PORT` — listen port (default: `5000`)
    pub port: u16,
    /// `API_DOMAIN` — public domain, used for CORS auto-derivation
    pub domain: Option<String>,
    /// `DEBUG_MODE`
    pub debug: bool,
    /// `LOG_LEVEL`
    pub log_level: String,

    /// `API_KEY` — primary shared-secret key
    pub api_key: String,
    /// `API_KEYS` — comma-separated additional keys
    pub api_keys: Vec<String>,
    /// `ENABLE_JWT`
    pub enable_jwt: bool,
    /// `JWT_SECRET`
    pub jwt_secret: String,
    /// `ALLOWED_ORIGINS`
    pub allowed_origins: Vec<String>,
    /// `AUTO_ORIGIN_FROM_DOMAIN`
    pub auto_origin_from_domain: bool,

    /// `RATE_LIMIT_PER_MINUTE_KEY`
    pub rate_limit_per_minute_key: u32,
    /// `RATE_LIMIT_PER_MINUTE_IP`
    pub rate_limit_per_minute_ip: u32,

    /// `MAX_CONTENT_LENGTH_MB`
    pub max_content_length_mb: u32,

    /// `HEADLESS_MODE`
    pub headless: bool,
    /// `SCRAPE_TIMEOUT_SECONDS`
    pub scrape_timeout: Duration,
    /// `SCRAPE_MAX_RETRIES`
    pub scrape_max_retries: usize,
    /// `MAX_CONCURRENCY` — worker pool size `W`
    pub max_concurrency: usize,

    /// `PROXY_URLS`
    pub proxy_urls: Vec<String>,

    /// `CACHE_TTL_SECONDS`
    pub cache_ttl: Duration,
    /// `CACHE_MAX_ITEMS`
    pub cache_max_items: usize,

    /// `READY_CHECK_ASIN`
    pub ready_check_id: Option<String>,
    /// `READY_CHECK_COUNTRY`
    pub ready_check_country: String,
    /// `READY_CHECK_INTERVAL_SECONDS`
    pub ready_check_interval: Duration,

    /// `STRICT_ENV_VALIDATE`
    pub strict_env_validate: bool,

    /// Circuit breaker failure threshold `T` (not independently configured
    /// upstream; kept as a named constant here for clarity).
    pub breaker_failure_threshold: usize,
    /// Circuit breaker cool-off `C` in seconds.
    pub breaker_cooloff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            domain: None,
            debug: false,
            log_level: "info".to_string(),

            api_key: "your-secret-api-key-here".to_string(),
            api_keys: Vec::new(),
            enable_jwt: false,
            jwt_secret: String::new(),
            allowed_origins: vec!["*".to_string()],
            auto_origin_from_domain: true,

            rate_limit_per_minute_key: 60,
            rate_limit_per_minute_ip: 120,

            max_content_length_mb: 1,

            headless: true,
            scrape_timeout: Duration::from_secs(30),
            scrape_max_retries: 2,
            max_concurrency: 3,

            proxy_urls: Vec::new(),

            cache_ttl: Duration::from_secs(300),
            cache_max_items: 1000,

            ready_check_id: None,
            ready_check_country: "US".to_string(),
            ready_check_interval: Duration::from_secs(900),

            strict_env_validate: false,

            breaker_failure_threshold: 5,
            breaker_cooloff: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Build a configuration from environment variables, falling back to
    /// the same defaults as [`Config::default`] for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let mut config = Self {
            host: env_string("API_HOST", defaults.host),
            port: env_parse("API_PORT", defaults.port),
            domain: std::env::var("API_DOMAIN").ok().filter(|s| !s.is_empty()),
            debug: env_bool("DEBUG_MODE", defaults.debug),
            log_level: env_string("LOG_LEVEL", defaults.log_level),

            api_key: env_string("API_KEY", defaults.api_key),
            api_keys: env_list("API_KEYS"),
            enable_jwt: env_bool("ENABLE_JWT", defaults.enable_jwt),
            jwt_secret: env_string("JWT_SECRET", defaults.jwt_secret),
            allowed_origins: {
                let list = env_list("ALLOWED_ORIGINS");
                if list.is_empty() { vec!["*".to_string()] } else { list }
            },
            auto_origin_from_domain: env_bool("AUTO_ORIGIN_FROM_DOMAIN", defaults.auto_origin_from_domain),

            rate_limit_per_minute_key: env_parse("RATE_LIMIT_PER_MINUTE_KEY", defaults.rate_limit_per_minute_key),
            rate_limit_per_minute_ip: env_parse("RATE_LIMIT_PER_MINUTE_IP", defaults.rate_limit_per_minute_ip),

            max_content_length_mb: env_parse("MAX_CONTENT_LENGTH_MB", defaults.max_content_length_mb),

            headless: env_bool("HEADLESS_MODE", defaults.headless),
            scrape_timeout: Duration::from_secs(env_parse("SCRAPE_TIMEOUT_SECONDS", defaults.scrape_timeout.as_secs())),
            scrape_max_retries: env_parse("SCRAPE_MAX_RETRIES", defaults.scrape_max_retries),
            max_concurrency: env_parse("MAX_CONCURRENCY", defaults.max_concurrency),

            proxy_urls: env_list("PROXY_URLS"),

            cache_ttl: Duration::from_secs(env_parse("CACHE_TTL_SECONDS", defaults.cache_ttl.as_secs())),
            cache_max_items: env_parse("CACHE_MAX_ITEMS", defaults.cache_max_items),

            ready_check_id: std::env::var("READY_CHECK_ASIN").ok().filter(|s| !s.is_empty()),
            ready_check_country: env_string("READY_CHECK_COUNTRY", defaults.ready_check_country),
            ready_check_interval: Duration::from_secs(env_parse("READY_CHECK_INTERVAL_SECONDS", defaults.ready_check_interval.as_secs())),

            strict_env_validate: env_bool("STRICT_ENV_VALIDATE", defaults.strict_env_validate),

            breaker_failure_threshold: defaults.breaker_failure_threshold,
            breaker_cooloff: defaults.breaker_cooloff,
        };

        if config.domain.is_some()
            && config.auto_origin_from_domain
            && (config.allowed_origins.is_empty() || config.allowed_origins == ["*"])
        {
            let domain = config.domain.clone().unwrap();
            let mut root = domain.replace("https://", "").replace("http://", "");
            if let Some(stripped) = root.strip_prefix("api.") {
                root = stripped.to_string();
            }
            config.allowed_origins = vec![
                domain.clone(),
                format!("https://{root}"),
                format!("http://{root}"),
            ];
        }

        config
    }

    /// Base URL used in self-referential links (readiness probes, index page).
    pub fn base_url(&self) -> String {
        match &self.domain {
            Some(domain) if !domain.is_empty() => domain.trim_end_matches('/').to_string(),
            _ => format!("http://127.0.0.1:{}", self.port),
        }
    }

    /// Validation pass run at startup; returns human-readable findings.
    /// Under strict mode the caller aborts startup if this is non-empty.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.api_key == "your-secret-api-key-here" && self.api_keys.is_empty() {
            errors.push("API_KEY is not set to a secure value".to_string());
        }
        if self.enable_jwt && self.jwt_secret.is_empty() {
            errors.push("JWT_SECRET is required when ENABLE_JWT is true".to_string());
        }
        if self.max_concurrency < 1 {
            errors.push("MAX_CONCURRENCY must be at least 1".to_string());
        }

        errors
    }

    /// All accepted API keys (legacy primary key union the additional-keys
    /// list) — both are honored simultaneously, see DESIGN.md.
    pub fn valid_api_keys(&self) -> std::collections::HashSet<String> {
        let mut keys: std::collections::HashSet<String> = self.api_keys.iter().cloned().collect();
        keys.insert(self.api_key.clone());
        keys
    }

    pub fn max_content_length_bytes(&self) -> usize {
        self.max_content_length_mb as usize * 1024 * 1024
    }
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v.to_lowercase() == "true")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// The built-in device profiles used by the browser manager (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub user_agent: &'static str,
    pub width: u32,
    pub height: u32,
}

pub const DEVICE_PROFILES: &[DeviceProfile] = &[
    DeviceProfile {
        name: "Desktop Chrome",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        width: 1366,
        height: 768,
    },
    DeviceProfile {
        name: "Desktop Edge",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36 Edg/122.0.0.0",
        width: 1536,
        height: 864,
    },
    DeviceProfile {
        name: "Desktop Firefox",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
        width: 1440,
        height: 900,
    },
    DeviceProfile {
        name: "Mobile Android",
        user_agent: "Mozilla/5.0 (Linux; Android 12; Pixel 5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Mobile Safari/537.36",
        width: 393,
        height: 851,
    },
];

/// Generate Chrome command-line arguments for launching the process-wide
/// browser instance.
pub fn get_chrome_args(config: &Config, proxy: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-background-timer-throttling".to_string(),
        "--disable-backgrounding-occluded-windows".to_string(),
        "--disable-renderer-backgrounding".to_string(),
        "--disable-features=TranslateUI,ProcessSingleton".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        format!("--user-data-dir=/tmp/marketscrape-{}", std::process::id()),
    ];

    if config.headless {
        args.push("--headless=new".to_string());
    }

    if let Some(proxy_url) = proxy {
        args.push(format!("--proxy-server={proxy_url}"));
    }

    args
}

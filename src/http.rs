//! HTTP surface: axum router, request handlers, and the per-request id /
//! metrics middleware.

use crate::config::MARKETPLACES;
use crate::engine::Engine;
use crate::error::EngineError;
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub fn build_router(engine: Arc<Engine>) -> Router {
    let cors = build_cors_layer(&engine.config.allowed_origins);
    let body_limit = engine.config.max_content_length_bytes();

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/ready", get(ready))
        .route("/api/countries", get(countries))
        .route("/api/scrape", axum::routing::post(scrape))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(engine.clone(), request_id_and_metrics))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    }
}

/// Stamps `X-Request-Id` on every response and records `api_requests_total`.
async fn request_id_and_metrics(
    State(engine): State<Arc<Engine>>,
    req: axum::extract::Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let path = req.uri().path().to_string();

    let mut response = next.run(req).await;

    engine
        .metrics
        .api_requests_total(&path, response.status().as_str())
        .increment(1);

    response
        .headers_mut()
        .insert("x-request-id", request_id.parse().unwrap());

    response
}

async fn index() -> Html<&'static str> {
    Html(
        r#"<html>
  <head><title>MarketScrape Engine</title></head>
  <body>
    <h1>MarketScrape Engine</h1>
    <p>Status: running</p>
    <ul>
      <li><a href="/api/health">/api/health</a></li>
      <li><a href="/api/ready">/api/ready</a></li>
      <li><a href="/metrics">/metrics</a></li>
    </ul>
  </body>
</html>"#,
    )
}

async fn health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "MarketScrape Engine",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "browser_running": engine.is_browser_running().await,
        "queue_depth": engine.queue_depth(),
        "cache_size": engine.cache_size().await,
    }))
}

async fn ready(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    let snapshot = engine.readiness.snapshot();
    Json(json!({
        "ready": snapshot.ready,
        "service": "MarketScrape Engine",
        "supported_countries": MARKETPLACES.len(),
        "auth": "api-key",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "last_check": snapshot.last_check.map(|_| chrono::Utc::now().to_rfc3339()),
        "error": snapshot.error,
    }))
}

fn extract_api_key(headers: &HeaderMap, query: &HashMap<String, String>) -> Option<String> {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.get("api_key").cloned())
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

fn extract_client_ip(headers: &HeaderMap, connect_info: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
        .unwrap_or_else(|| connect_info.ip().to_string())
}

async fn countries(
    State(engine): State<Arc<Engine>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let api_key = extract_api_key(&headers, &query);
    let bearer = extract_bearer_token(&headers);

    if let Err(err) = engine.authenticate(api_key.as_deref(), bearer.as_deref()) {
        return error_response(err, None, None);
    }

    let countries: Vec<_> = MARKETPLACES
        .iter()
        .map(|m| {
            json!({
                "code": m.country_code,
                "name": m.name,
                "domain": m.domain,
                "currency": m.currency,
                "currency_code": m.currency_code,
            })
        })
        .collect();

    Json(json!({
        "success": true,
        "count": countries.len(),
        "countries": countries,
    }))
    .into_response()
}

#[derive(Deserialize)]
struct ScrapeBody {
    url: Option<String>,
    product_url: Option<String>,
    headless: Option<bool>,
    proxy: Option<String>,
}

async fn scrape(
    State(engine): State<Arc<Engine>>,
    ConnectInfo(connect_info): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: axum::body::Bytes,
) -> Response {
    let api_key = extract_api_key(&headers, &query);
    let bearer = extract_bearer_token(&headers);

    if let Err(err) = engine.authenticate(api_key.as_deref(), bearer.as_deref()) {
        return error_response(err, None, None);
    }

    let payload: ScrapeBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => {
            return error_response(EngineError::MalformedBody("invalid JSON body".to_string()), None, None);
        }
    };

    let Some(url) = payload.url.or(payload.product_url) else {
        return error_response(EngineError::MissingUrl, None, None);
    };

    let client_ip = extract_client_ip(&headers, connect_info);
    let key_for_limit = api_key.unwrap_or_default();

    match engine
        .handle_scrape(&url, payload.headless, payload.proxy, &key_for_limit, &client_ip)
        .await
    {
        Ok(success) => Json(json!({
            "success": true,
            "country": success.country.name,
            "country_code": success.country.country_code,
            "detected_country": success.country.country_code,
            "cached": success.cached,
            "data": success.record,
        }))
        .into_response(),
        Err(ctx) => error_response(
            ctx.error,
            ctx.country.map(|c| c.name.to_string()),
            ctx.country.map(|c| c.country_code.to_string()),
        ),
    }
}

/// Shared error-body shape: `{success:false, error, message}`, plus
/// `country`/`country_code` when known.
fn error_response(error: EngineError, country: Option<String>, country_code: Option<String>) -> Response {
    let status = StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut body = json!({
        "success": false,
        "error": error.error_tag(),
        "message": error.to_string(),
    });

    if let (Some(country), Some(code)) = (country, country_code) {
        body["country"] = json!(country);
        body["country_code"] = json!(code);
    }

    (status, Json(body)).into_response()
}

async fn metrics(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        engine.prometheus_handle.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_api_key_from_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", "abc123".parse().unwrap());
        assert_eq!(extract_api_key(&headers, &HashMap::new()), Some("abc123".to_string()));
    }

    #[test]
    fn extracts_api_key_from_query_when_header_absent() {
        let mut query = HashMap::new();
        query.insert("api_key".to_string(), "xyz".to_string());
        assert_eq!(extract_api_key(&HeaderMap::new(), &query), Some("xyz".to_string()));
    }

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer my.jwt.token".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("my.jwt.token".to_string()));
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let fallback: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(extract_client_ip(&headers, fallback), "203.0.113.9");
    }

    #[test]
    fn client_ip_falls_back_to_connect_info() {
        let fallback: SocketAddr = "127.0.0.1:9999".parse().unwrap();
        assert_eq!(extract_client_ip(&HeaderMap::new(), fallback), "127.0.0.1");
    }
}

//! Request URL validation for `POST /api/scrape`'s input.
//!
//! Scheme must be http/https, host is lowercased and has a leading `www.`
//! stripped, then checked against the allow-list by exact or suffix match.

pub fn validate_amazon_url(url: &str) -> Result<(), String> {
    if url.trim().is_empty() {
        return Err("URL is required".to_string());
    }

    let parsed = url::Url::parse(url).map_err(|_| "URL is invalid".to_string())?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err("URL must start with http or https".to_string());
    }

    let host = parsed.host_str().unwrap_or("").to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    if host.is_empty() {
        return Err("URL host is invalid".to_string());
    }

    let allowed = crate::config::allowed_domains();
    if !allowed.iter().any(|d| host == *d || host.ends_with(&format!(".{d}"))) {
        return Err("URL must be an Amazon domain".to_string());
    }

    Ok(())
}

/// Detect the marketplace country code by substring match against the
/// request URL, per `get_country_from_url`.
pub fn country_from_url(url: &str) -> Option<&'static str> {
    let lower = url.to_lowercase();
    crate::config::MARKETPLACES
        .iter()
        .find(|m| lower.contains(m.domain))
        .map(|m| m.country_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_url() {
        assert!(validate_amazon_url("").is_err());
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(validate_amazon_url("ftp://amazon.com/dp/B0F83HTPM2").is_err());
    }

    #[test]
    fn accepts_www_prefixed_amazon_domain() {
        assert!(validate_amazon_url("https://www.amazon.com/dp/B0F83HTPM2").is_ok());
    }

    #[test]
    fn rejects_non_amazon_domain() {
        assert!(validate_amazon_url("https://example.com/dp/B0F83HTPM2").is_err());
    }

    #[test]
    fn detects_country_from_domain_substring() {
        assert_eq!(country_from_url("https://www.amazon.co.uk/dp/B0F83HTPM2"), Some("UK"));
        assert_eq!(country_from_url("https://www.amazon.in/dp/B0F83HTPM2"), Some("IN"));
        assert_eq!(country_from_url("https://example.com/dp/B0F83HTPM2"), None);
    }
}

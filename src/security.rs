//! Security primitives for the HTTP surface.
//!
//! This module provides the pieces the webhook and admin handlers share:
//!
//! - Security response headers applied to every response
//! - Constant-time byte comparison for secrets
//! - Admin bearer-token authentication
//! - Per-IP rate limiting (fixed window)
//! - Coarse bot heuristics for the webhook endpoint
//!
//! The bot filter is deliberately a nuisance filter, not a security
//! boundary; the webhook's real gate is HMAC signature verification.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use axum::http::{HeaderMap, HeaderValue};
use parking_lot::RwLock;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// =============================================================================
// Security Headers
// =============================================================================

/// Security headers applied to all responses.
#[derive(Debug, Clone)]
pub struct SecurityHeaders;

impl SecurityHeaders {
    /// Standard security headers.
    pub fn headers() -> Vec<(&'static str, &'static str)> {
        vec![
            ("X-Content-Type-Options", "nosniff"),
            ("X-Frame-Options", "DENY"),
            (
                "Content-Security-Policy",
                "default-src 'none'; frame-ancestors 'none'",
            ),
            ("Referrer-Policy", "no-referrer"),
            (
                "Cache-Control",
                "no-store, no-cache, must-revalidate, private",
            ),
        ]
    }

    /// Apply the standard headers to a response header map.
    pub fn apply(headers: &mut HeaderMap) {
        for (name, value) in Self::headers() {
            headers.insert(name, HeaderValue::from_static(value));
        }
    }
}

/// Constant-time byte comparison to prevent timing attacks.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// =============================================================================
// Admin Authentication
// =============================================================================

/// Bearer-token authenticator for the admin endpoints.
///
/// Missing or malformed credentials yield 401; a well-formed bearer token
/// that does not match yields 403 (the caller identified itself, it just
/// isn't an admin).
#[derive(Debug, Clone)]
pub struct AdminAuth {
    token: String,
}

impl AdminAuth {
    /// Create an authenticator around the configured admin token.
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Authenticate the `Authorization` header of an admin request.
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<()> {
        let header = auth_header
            .ok_or_else(|| Error::Unauthorized("missing Authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Unauthorized("expected Authorization: Bearer <token>".to_string())
            })?;

        if constant_time_compare(token.as_bytes(), self.token.as_bytes()) {
            Ok(())
        } else {
            warn!("admin endpoint called with invalid token");
            Err(Error::Forbidden("admin access required".to_string()))
        }
    }
}

// =============================================================================
// Rate Limiter
// =============================================================================

/// Per-IP rate limiter using a fixed window.
///
/// In-memory and process-local by design: correct for a single-process
/// deployment only. A multi-instance deployment would need a shared store.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    buckets: RwLock<HashMap<IpAddr, RateBucket>>,
}

#[derive(Debug, Clone)]
struct RateBucket {
    count: u32,
    window_start: Instant,
}

impl RateLimiter {
    /// Create a rate limiter allowing `requests_per_minute` per IP.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            max_requests: requests_per_minute,
            window: Duration::from_secs(60),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// Check a request from `ip`, counting it against the current window.
    pub fn check(&self, ip: IpAddr) -> Result<()> {
        let mut buckets = self.buckets.write();
        let now = Instant::now();

        let bucket = buckets.entry(ip).or_insert_with(|| RateBucket {
            count: 0,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.window {
            bucket.count = 0;
            bucket.window_start = now;
        }

        bucket.count += 1;

        if bucket.count > self.max_requests {
            let remaining = self
                .window
                .saturating_sub(now.duration_since(bucket.window_start));
            warn!(%ip, "rate limit exceeded");
            Err(Error::RateLimited {
                retry_after_secs: remaining.as_secs().max(1),
            })
        } else {
            Ok(())
        }
    }

    /// Drop buckets whose window expired long ago (call periodically).
    pub fn cleanup(&self) {
        let mut buckets = self.buckets.write();
        let now = Instant::now();
        let window = self.window;
        buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window * 2);
    }
}

// =============================================================================
// Bot Heuristics
// =============================================================================

fn bot_ua_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(bot|crawler|spider|scrapy|curl|wget|python-requests|go-http-client)\b")
            .expect("static regex")
    })
}

/// Heuristic screening of inbound webhook requests.
///
/// Rejects requests with a missing or implausibly short user agent, a known
/// bot user agent, or a loopback client address. Legitimate provider
/// callbacks come from infrastructure with a stable UA and a public IP.
pub fn screen_webhook_request(user_agent: Option<&str>, client_ip: Option<IpAddr>) -> Result<()> {
    let ua = match user_agent {
        Some(ua) if ua.len() >= 10 => ua,
        Some(_) | None => {
            debug!("webhook rejected: missing or short user agent");
            return Err(Error::Forbidden("request rejected".to_string()));
        }
    };

    if bot_ua_pattern().is_match(ua) {
        debug!(user_agent = %ua, "webhook rejected: bot user agent");
        return Err(Error::Forbidden("request rejected".to_string()));
    }

    if let Some(ip) = client_ip {
        let loopback = match ip {
            IpAddr::V4(v4) => v4.is_loopback(),
            IpAddr::V6(v6) => v6.is_loopback(),
        };
        if loopback {
            debug!(%ip, "webhook rejected: loopback source");
            return Err(Error::Forbidden("request rejected".to_string()));
        }
    }

    Ok(())
}

/// Extract the client IP from `X-Forwarded-For`, if present.
///
/// Only the first (client-most) entry is considered. When the header is
/// absent or unparseable, IP-based checks are skipped.
pub fn client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"abcd", b"abcd"));
        assert!(!constant_time_compare(b"abcd", b"abce"));
        assert!(!constant_time_compare(b"abcd", b"abc"));
    }

    #[test]
    fn test_admin_auth() {
        let auth = AdminAuth::new("secret-admin-token");

        assert!(auth.authenticate(Some("Bearer secret-admin-token")).is_ok());

        // Missing header -> 401.
        assert!(matches!(
            auth.authenticate(None),
            Err(Error::Unauthorized(_))
        ));

        // Malformed header -> 401.
        assert!(matches!(
            auth.authenticate(Some("Basic dXNlcjpwYXNz")),
            Err(Error::Unauthorized(_))
        ));
        assert!(matches!(
            auth.authenticate(Some("Bearer ")),
            Err(Error::Unauthorized(_))
        ));

        // Wrong token -> 403.
        assert!(matches!(
            auth.authenticate(Some("Bearer wrong-token")),
            Err(Error::Forbidden(_))
        ));
    }

    #[test]
    fn test_rate_limiter() {
        let limiter = RateLimiter::new(3);
        let ip = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 7));

        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_ok());
        assert!(limiter.check(ip).is_ok());
        assert!(matches!(limiter.check(ip), Err(Error::RateLimited { .. })));
    }

    #[test]
    fn test_rate_limiter_isolated_per_ip() {
        let limiter = RateLimiter::new(1);
        let ip1 = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1));
        let ip2 = IpAddr::V4(Ipv4Addr::new(203, 0, 113, 2));

        assert!(limiter.check(ip1).is_ok());
        assert!(limiter.check(ip1).is_err());
        assert!(limiter.check(ip2).is_ok());
    }

    #[test]
    fn test_bot_screening() {
        let real_ua = Some("Resend-Webhooks/1.0 (+https://resend.com)");
        let public_ip = Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)));

        assert!(screen_webhook_request(real_ua, public_ip).is_ok());
        assert!(screen_webhook_request(real_ua, None).is_ok());

        // Missing or short user agent.
        assert!(screen_webhook_request(None, public_ip).is_err());
        assert!(screen_webhook_request(Some("short"), public_ip).is_err());

        // Known bot patterns.
        assert!(screen_webhook_request(Some("curl/8.4.0 something"), public_ip).is_err());
        assert!(screen_webhook_request(Some("python-requests/2.31"), public_ip).is_err());
        assert!(screen_webhook_request(Some("Mozilla compatible GoogleBot crawler"), public_ip)
            .is_err());

        // Loopback source.
        assert!(
            screen_webhook_request(real_ua, Some(IpAddr::V4(Ipv4Addr::LOCALHOST))).is_err()
        );
    }

    #[test]
    fn test_client_ip_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers), None);

        headers.insert("x-forwarded-for", "198.51.100.4, 10.0.0.1".parse().unwrap());
        assert_eq!(
            client_ip(&headers),
            Some(IpAddr::V4(Ipv4Addr::new(198, 51, 100, 4)))
        );

        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        assert_eq!(client_ip(&headers), None);
    }

    #[test]
    fn test_security_headers_present() {
        let headers = SecurityHeaders::headers();
        let names: Vec<&str> = headers.iter().map(|(name, _)| *name).collect();
        assert!(names.contains(&"X-Content-Type-Options"));
        assert!(names.contains(&"X-Frame-Options"));
        assert!(names.contains(&"Content-Security-Policy"));
        assert!(names.contains(&"Cache-Control"));
    }
}

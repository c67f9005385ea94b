//! Fixed-window request limiter keyed by client address.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;

use crate::error::ServiceError;

#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: Mutex<HashMap<String, (Instant, u32)>>,
    trusted_proxies: Vec<IpAddr>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: Mutex::new(HashMap::new()),
            trusted_proxies: Vec::new(),
        }
    }

    /// Peers whose `X-Forwarded-For` header names the real client.
    pub fn trusting(mut self, proxies: Vec<IpAddr>) -> Self {
        self.trusted_proxies = proxies;
        self
    }

    pub fn client_key(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        client_key(headers, peer, &self.trusted_proxies)
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn check(&self, key: &str) -> Result<(), ServiceError> {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> Result<(), ServiceError> {
        let mut windows = self
            .windows
            .lock()
            .map_err(|_| ServiceError::RateLimited("rate limiter unavailable".to_string()))?;

        windows.retain(|_, (started, _)| now.duration_since(*started) < self.window);

        let (_, count) = windows.entry(key.to_string()).or_insert((now, 0));
        if *count >= self.limit {
            tracing::warn!(client = key, limit = self.limit, "rate limit exceeded");
            return Err(ServiceError::RateLimited(
                "Too many requests. Please try again in a minute.".to_string(),
            ));
        }
        *count += 1;
        Ok(())
    }
}

/// Client address for limiting. Forwarded hops count only when the peer is a
/// trusted proxy, and then the nearest hop outside the trusted set wins.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &[IpAddr]) -> String {
    let Some(peer) = peer.map(|addr| addr.ip()) else {
        return "unknown".to_string();
    };
    if !trusted.contains(&peer) {
        return peer.to_string();
    }

    let hops: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.trim().parse().ok())
        .collect();
    hops.into_iter()
        .rev()
        .find(|hop| !trusted.contains(hop))
        .unwrap_or(peer)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn blocks_after_limit_until_window_rolls_over() {
        let limiter = RateLimiter::per_minute(5);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.check_at("203.0.113.9", start).expect("under limit");
        }
        assert!(limiter.check_at("203.0.113.9", start).is_err());
        limiter
            .check_at("198.51.100.2", start)
            .expect("other clients unaffected");

        limiter
            .check_at("203.0.113.9", start + Duration::from_secs(61))
            .expect("new window");
    }

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn forwarded_header_is_ignored_from_untrusted_peers() {
        let peer: SocketAddr = "198.51.100.20:5000".parse().unwrap();
        let headers = forwarded("203.0.113.9");

        assert_eq!(client_key(&headers, Some(peer), &[]), "198.51.100.20");
        assert_eq!(client_key(&HeaderMap::new(), Some(peer), &[]), "198.51.100.20");
        assert_eq!(client_key(&headers, None, &[]), "unknown");
    }

    #[test]
    fn trusted_proxy_reports_the_nearest_untrusted_hop() {
        let proxy: IpAddr = "10.0.0.1".parse().unwrap();
        let peer = SocketAddr::new(proxy, 5000);

        // A spoofed leading entry cannot displace the hop the proxy appended.
        let headers = forwarded("1.2.3.4, 203.0.113.9, 10.0.0.1");
        assert_eq!(client_key(&headers, Some(peer), &[proxy]), "203.0.113.9");
        assert_eq!(client_key(&HeaderMap::new(), Some(peer), &[proxy]), "10.0.0.1");
    }

    #[test]
    fn rotating_the_header_does_not_reset_the_window() {
        let limiter = RateLimiter::per_minute(2);
        let peer: SocketAddr = "198.51.100.20:5000".parse().unwrap();
        let start = Instant::now();

        for spoofed in ["203.0.113.1", "203.0.113.2"] {
            let key = limiter.client_key(&forwarded(spoofed), Some(peer));
            limiter.check_at(&key, start).expect("under limit");
        }
        let key = limiter.client_key(&forwarded("203.0.113.3"), Some(peer));
        assert!(limiter.check_at(&key, start).is_err());
    }
}

//! SSRF validation for the URL-fetch ingestion path.
//!
//! Rejects private/internal IPs, localhost and internal hostnames, and checks
//! resolved addresses as well so DNS cannot point a public-looking name at an
//! internal host. The checked address is handed back so the request can be
//! pinned to it instead of resolving the name a second time.

use pasta_core::AppError;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tokio::net::lookup_host;

/// A URL that passed validation.
#[derive(Debug, Clone)]
pub struct FetchTarget {
    pub url: reqwest::Url,
    /// Hostname and the address it was validated against. `None` for IP
    /// literals and when private addresses are allowed.
    pub pinned: Option<(String, SocketAddr)>,
}

impl FetchTarget {
    fn unpinned(url: reqwest::Url) -> Self {
        Self { url, pinned: None }
    }
}

pub async fn validate_fetch_url(
    url: &str,
    allow_private_ips: bool,
    allowlist: Option<&[String]>,
) -> Result<FetchTarget, AppError> {
    let reject = |msg: String| {
        tracing::warn!(url = %url, reason = %msg, "Rejected fetch URL");
        AppError::InvalidInput(msg)
    };

    let parsed_url =
        reqwest::Url::parse(url).map_err(|e| reject(format!("Invalid URL format: {}", e)))?;
    if !matches!(parsed_url.scheme(), "http" | "https") {
        return Err(reject("URL must use http or https".to_string()));
    }

    let host = parsed_url
        .host_str()
        .ok_or_else(|| reject("URL must have a host".to_string()))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    if let Some(allowed_domains) = allowlist {
        let is_allowed = allowed_domains.iter().any(|allowed| {
            let allowed = allowed.to_lowercase();
            host == allowed || host.ends_with(&format!(".{}", allowed))
        });
        if !is_allowed {
            return Err(reject(format!(
                "URL hostname '{}' is not in the allowed list",
                host
            )));
        }
    }

    if allow_private_ips {
        return Ok(FetchTarget::unpinned(parsed_url));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(reject(
                "Private/internal IP addresses are not allowed".to_string(),
            ));
        }
        return Ok(FetchTarget::unpinned(parsed_url));
    }

    if host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
    {
        return Err(reject(
            "Localhost and internal hostnames are not allowed".to_string(),
        ));
    }

    let port = parsed_url.port_or_known_default().unwrap_or(80);
    let resolved = lookup_host((host.as_str(), port)).await.map_err(|e| {
        tracing::warn!(host = %host, error = %e, "DNS resolution failed for SSRF validation");
        AppError::FetchFailed(format!("Hostname could not be resolved: {}", e))
    })?;
    let addr = select_address(&host, resolved).map_err(|e| {
        if let AppError::InvalidInput(msg) = &e {
            tracing::warn!(url = %url, reason = %msg, "Rejected fetch URL");
        }
        e
    })?;

    Ok(FetchTarget {
        url: parsed_url,
        pinned: Some((host, addr)),
    })
}

/// Picks the address to connect to. Every resolved address must be public,
/// otherwise a later lookup could land on the private one.
fn select_address(
    host: &str,
    addrs: impl IntoIterator<Item = SocketAddr>,
) -> Result<SocketAddr, AppError> {
    let mut selected = None;
    for socket_addr in addrs {
        if is_private_ip(&socket_addr.ip()) {
            return Err(AppError::InvalidInput(format!(
                "Hostname resolves to private/internal IP address: {}",
                socket_addr.ip()
            )));
        }
        selected.get_or_insert(socket_addr);
    }
    selected.ok_or_else(|| {
        AppError::FetchFailed(format!("Hostname {} resolved to no addresses", host))
    })
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            let octets = ipv4.octets();
            octets[0] == 10
                || (octets[0] == 172 && (16..=31).contains(&octets[1]))
                || (octets[0] == 192 && octets[1] == 168)
                || (octets[0] == 100 && (64..=127).contains(&octets[1]))
                || octets[0] == 127
                || (octets[0] == 169 && octets[1] == 254)
                || (224..=239).contains(&octets[0])
                || octets[0] == 0
                || ipv4.is_broadcast()
        }
        IpAddr::V6(ipv6) => {
            // IPv4-mapped addresses (::ffff:a.b.c.d) get the v4 rules.
            if let Some(ipv4) = ipv6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(ipv4));
            }
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || is_ipv6_link_local(ipv6)
                || is_ipv6_unique_local(ipv6)
        }
    }
}

fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xffc0 == 0xfe80
}

fn is_ipv6_unique_local(ip: &Ipv6Addr) -> bool {
    ip.segments()[0] & 0xfe00 == 0xfc00
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn rejected(url: &str) -> bool {
        validate_fetch_url(url, false, None).await.is_err()
    }

    #[tokio::test]
    async fn test_rejects_non_http_schemes() {
        assert!(rejected("ftp://example.com/file").await);
        assert!(rejected("file:///etc/passwd").await);
        assert!(rejected("javascript:alert(1)").await);
        assert!(rejected("not-a-url").await);
    }

    #[tokio::test]
    async fn test_rejects_loopback_and_private() {
        assert!(rejected("http://localhost/").await);
        assert!(rejected("http://127.0.0.1:3000/x").await);
        assert!(rejected("http://10.0.0.1/").await);
        assert!(rejected("http://192.168.1.1/").await);
        assert!(rejected("http://169.254.169.254/latest/meta-data").await);
        assert!(rejected("http://[::1]/").await);
        assert!(rejected("http://[::ffff:10.0.0.1]/").await);
        assert!(rejected("http://db.internal/").await);
    }

    #[tokio::test]
    async fn test_allow_private_permits_loopback() {
        let target = validate_fetch_url("http://127.0.0.1:8080/raw", true, None)
            .await
            .unwrap();
        assert_eq!(target.url.port(), Some(8080));
        assert!(target.pinned.is_none());
    }

    #[tokio::test]
    async fn test_allowlist() {
        let allowlist = vec!["8.8.8.8".to_string()];
        assert!(validate_fetch_url("http://8.8.8.8/", false, Some(&allowlist))
            .await
            .is_ok());
        let allowlist = vec!["allowed.com".to_string()];
        assert!(validate_fetch_url("http://evil.com/", false, Some(&allowlist))
            .await
            .is_err());
    }

    #[test]
    fn test_select_address_pins_first_public_address() {
        let addrs: Vec<SocketAddr> = vec![
            "93.184.216.34:443".parse().unwrap(),
            "[2606:2800:220:1::1]:443".parse().unwrap(),
        ];
        let picked = select_address("example.com", addrs.clone()).unwrap();
        assert_eq!(picked, addrs[0]);
    }

    #[test]
    fn test_select_address_rejects_any_private_answer() {
        let addrs: Vec<SocketAddr> = vec![
            "93.184.216.34:80".parse().unwrap(),
            "10.0.0.7:80".parse().unwrap(),
        ];
        let err = select_address("rebind.example", addrs).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn test_select_address_requires_an_answer() {
        let err = select_address("empty.example", Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::FetchFailed(_)));
    }
}

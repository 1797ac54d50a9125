//! SSRF filter (spec §4.4.6): for requests whose body carries a `url` or
//! `callback` field, reject targets that could be used to reach internal
//! network resources.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::Url;

use crate::error::SecurityError;

const SSRF_FIELD_NAMES: &[&str] = &["url", "callback"];

fn is_reserved_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_unspecified()
        || ip.octets()[0] == 0
}

fn is_reserved_ipv6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return true;
    }
    if let Some(ipv4) = ip.to_ipv4_mapped() {
        return is_reserved_ipv4(ipv4);
    }
    // Unique local addresses, fc00::/7.
    let segments = ip.segments();
    (segments[0] & 0xfe00) == 0xfc00
        // Link-local, fe80::/10.
        || (segments[0] & 0xffc0) == 0xfe80
}

fn is_reserved_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_reserved_ipv4(v4),
        IpAddr::V6(v6) => is_reserved_ipv6(v6),
    }
}

/// Validate a single candidate URL against the SSRF policy. Returns `Ok(())`
/// when the URL is safe to fetch on the server's behalf.
pub fn validate_url(raw: &str) -> Result<(), SecurityError> {
    let url = Url::parse(raw)
        .map_err(|e| SecurityError::Validation(format!("invalid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(SecurityError::Validation(format!(
                "disallowed URL scheme: {other}"
            )))
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| SecurityError::Validation("URL has no host".into()))?;

    if host.eq_ignore_ascii_case("localhost") {
        return Err(SecurityError::Validation("URL targets localhost".into()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_reserved_ip(ip) {
            return Err(SecurityError::Validation(
                "URL targets a loopback/private/link-local/reserved address".into(),
            ));
        }
    }

    Ok(())
}

/// Scan a sanitized JSON body for `url`/`callback` fields at any depth and
/// validate each one found. Returns the first violation, if any.
pub fn check_body(value: &serde_json::Value) -> Result<(), SecurityError> {
    match value {
        serde_json::Value::Object(map) => {
            for (key, v) in map {
                if SSRF_FIELD_NAMES.contains(&key.as_str()) {
                    if let serde_json::Value::String(raw) = v {
                        validate_url(raw)?;
                    }
                }
                check_body(v)?;
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            for item in items {
                check_body(item)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_loopback_ipv4() {
        assert!(validate_url("http://127.0.0.1/admin").is_err());
    }

    #[test]
    fn rejects_private_ipv4() {
        assert!(validate_url("http://10.0.0.1/internal").is_err());
    }

    #[test]
    fn rejects_ipv6_loopback() {
        assert!(validate_url("http://[::1]/admin").is_err());
    }

    #[test]
    fn rejects_localhost_hostname() {
        assert!(validate_url("http://localhost:8080/").is_err());
    }

    #[test]
    fn rejects_file_scheme() {
        assert!(validate_url("file:///etc/passwd").is_err());
    }

    #[test]
    fn accepts_public_https_url() {
        assert!(validate_url("https://api.example.com/webhook").is_ok());
    }

    #[test]
    fn check_body_scans_nested_url_fields() {
        let body = json!({ "options": { "callback": "http://169.254.169.254/latest/meta-data" } });
        assert!(check_body(&body).is_err());
    }

    #[test]
    fn check_body_ignores_unrelated_fields() {
        let body = json!({ "name": "javascript:alert(1)" });
        assert!(check_body(&body).is_ok());
    }
}

//! Domain allow/deny policy and private-host refusal.
//!
//! Deny takes precedence over allow; an allow-list, when present,
//! restricts fetching to the listed hosts and their subdomains. Private
//! and loopback hosts are refused unless explicitly permitted, so a
//! malicious search result cannot steer the fetcher at internal services.

use std::net::IpAddr;

use crate::error::FetchError;

/// Host-level fetch policy.
#[derive(Debug, Clone, Default)]
pub struct DomainPolicy {
    /// Hosts (and their subdomains) allowed to be fetched. Empty = all.
    pub allow: Vec<String>,
    /// Hosts (and their subdomains) never fetched. Wins over `allow`.
    pub deny: Vec<String>,
    /// Permit loopback/private hosts (local fixture servers, intranets).
    pub allow_private_hosts: bool,
}

impl DomainPolicy {
    /// Checks a host against the policy.
    ///
    /// # Errors
    ///
    /// [`FetchError::DeniedByPolicy`] when denied or outside the
    /// allow-list; [`FetchError::PrivateHost`] for refused private hosts.
    pub fn check(&self, host: &str) -> Result<(), FetchError> {
        let host = host.to_ascii_lowercase();

        if self.deny.iter().any(|d| host_matches(d, &host)) {
            return Err(FetchError::DeniedByPolicy { host });
        }

        if !self.allow.is_empty() && !self.allow.iter().any(|a| host_matches(a, &host)) {
            return Err(FetchError::DeniedByPolicy { host });
        }

        if !self.allow_private_hosts && is_private_host(&host) {
            return Err(FetchError::PrivateHost { host });
        }

        Ok(())
    }
}

/// True when `host` equals `pattern` or is a subdomain of it.
fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim().trim_start_matches('.').to_ascii_lowercase();
    if pattern.is_empty() {
        return false;
    }
    host == pattern || host.ends_with(&format!(".{pattern}"))
}

/// True for loopback, private-range, and link-local hosts.
#[must_use]
pub fn is_private_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") || host.ends_with(".local") || host.ends_with(".internal") {
        return true;
    }
    // Bracketed IPv6 hosts arrive without brackets from url::Url::host_str
    // only for domains; strip defensively anyway.
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    match bare.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        Ok(IpAddr::V6(ip)) => {
            ip.is_loopback()
                || ip.is_unspecified()
                || (ip.segments()[0] & 0xfe00) == 0xfc00
                || (ip.segments()[0] & 0xffc0) == 0xfe80
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deny_wins_over_allow() {
        let policy = DomainPolicy {
            allow: vec!["example.com".to_string()],
            deny: vec!["example.com".to_string()],
            allow_private_hosts: false,
        };
        assert!(matches!(
            policy.check("example.com"),
            Err(FetchError::DeniedByPolicy { .. })
        ));
    }

    #[test]
    fn test_allow_list_restricts() {
        let policy = DomainPolicy {
            allow: vec!["example.com".to_string()],
            ..DomainPolicy::default()
        };
        assert!(policy.check("example.com").is_ok());
        assert!(policy.check("docs.example.com").is_ok());
        assert!(matches!(
            policy.check("other.example"),
            Err(FetchError::DeniedByPolicy { .. })
        ));
    }

    #[test]
    fn test_subdomain_matching_does_not_cross_labels() {
        let policy = DomainPolicy {
            deny: vec!["example.com".to_string()],
            ..DomainPolicy::default()
        };
        // notexample.com must not match example.com
        assert!(policy.check("notexample.com").is_ok());
        assert!(policy.check("sub.example.com").is_err());
    }

    #[test]
    fn test_private_hosts_refused_by_default() {
        let policy = DomainPolicy::default();
        for host in ["localhost", "127.0.0.1", "10.1.2.3", "192.168.1.1", "169.254.0.1", "printer.local"] {
            assert!(
                matches!(policy.check(host), Err(FetchError::PrivateHost { .. })),
                "{host} should be refused"
            );
        }
    }

    #[test]
    fn test_private_hosts_allowed_when_opted_in() {
        let policy = DomainPolicy {
            allow_private_hosts: true,
            ..DomainPolicy::default()
        };
        assert!(policy.check("127.0.0.1").is_ok());
        assert!(policy.check("localhost").is_ok());
    }

    #[test]
    fn test_public_hosts_pass() {
        let policy = DomainPolicy::default();
        assert!(policy.check("example.com").is_ok());
        assert!(policy.check("8.8.8.8").is_ok());
    }

    #[test]
    fn test_ipv6_private_detection() {
        assert!(is_private_host("::1"));
        assert!(is_private_host("fe80::1"));
        assert!(is_private_host("fd12:3456::1"));
        assert!(!is_private_host("2001:db8::1"));
    }
}

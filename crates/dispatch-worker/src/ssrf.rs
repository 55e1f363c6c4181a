//! SSRF guard applied before every outbound dispatch (spec.md §4.4 step 2):
//! "reject private/link-local/loopback unless explicitly allowed by
//! deployment config."

use dispatch_shared::error::DispatchError;
use std::net::IpAddr;
use url::Url;

pub struct SsrfGuard<'a> {
    allowlist: &'a [String],
}

impl<'a> SsrfGuard<'a> {
    pub fn new(allowlist: &'a [String]) -> Self {
        Self { allowlist }
    }

    /// Checks a request URL before dispatch. Resolution happens at the
    /// reqwest layer; this guard only inspects the literal host in the URL
    /// (a literal IP, or a hostname present verbatim in the allowlist).
    /// DNS-rebinding defense is out of scope for this spec.
    pub fn check(&self, url: &Url) -> Result<(), DispatchError> {
        let host = url
            .host_str()
            .ok_or_else(|| DispatchError::InvalidInput("url has no host".to_string()))?;

        if self.allowlist.iter().any(|allowed| allowed == host) {
            return Ok(());
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_blocked_ip(ip) {
                return Err(DispatchError::InvalidInput(format!(
                    "destination {host} is a private/loopback/link-local address"
                )));
            }
        } else if host.eq_ignore_ascii_case("localhost") {
            return Err(DispatchError::InvalidInput(
                "destination localhost is blocked".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified() || (v6.segments()[0] & 0xfe00) == 0xfc00,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_loopback() {
        let guard = SsrfGuard::new(&[]);
        let url = Url::parse("http://127.0.0.1/admin").unwrap();
        assert!(guard.check(&url).is_err());
    }

    #[test]
    fn blocks_private_range() {
        let guard = SsrfGuard::new(&[]);
        let url = Url::parse("http://10.0.0.5/").unwrap();
        assert!(guard.check(&url).is_err());
    }

    #[test]
    fn blocks_localhost_hostname() {
        let guard = SsrfGuard::new(&[]);
        let url = Url::parse("http://localhost:8080/").unwrap();
        assert!(guard.check(&url).is_err());
    }

    #[test]
    fn allows_public_host() {
        let guard = SsrfGuard::new(&[]);
        let url = Url::parse("https://x.test/ok").unwrap();
        assert!(guard.check(&url).is_ok());
    }

    #[test]
    fn allowlist_overrides_block() {
        let allowlist = ["127.0.0.1".to_string()];
        let guard = SsrfGuard::new(&allowlist);
        let url = Url::parse("http://127.0.0.1/ok").unwrap();
        assert!(guard.check(&url).is_ok());
    }
}

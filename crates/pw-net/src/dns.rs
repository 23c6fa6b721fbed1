//! DNS resolution with a public-address guard.

use pw_core::WeaveError;
use pw_core::WeaveResult;
use pw_safety::is_public_address;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;

/// Name resolution abstraction.
pub trait DnsResolver {
    fn resolve(&self, host: &str, port: u16) -> WeaveResult<Vec<SocketAddr>>;
}

/// Uses the operating system resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDnsResolver;

impl DnsResolver for SystemDnsResolver {
    fn resolve(&self, host: &str, port: u16) -> WeaveResult<Vec<SocketAddr>> {
        let query = format!("{host}:{port}");
        let addresses: Vec<SocketAddr> = query
            .to_socket_addrs()
            .map_err(|error| {
                WeaveError::new(
                    "net.dns.resolve_failed",
                    format!("failed to resolve `{query}`: {error}"),
                )
            })?
            .collect();

        if addresses.is_empty() {
            return Err(WeaveError::new(
                "net.dns.no_results",
                format!("resolver returned no addresses for `{query}`"),
            ));
        }

        Ok(addresses)
    }
}

/// Resolves `host` and rejects the whole answer if any resolved address is
/// private, loopback, link-local, or otherwise non-public. Running this
/// before every connect defeats DNS rebinding.
pub fn resolve_public<R: DnsResolver>(
    resolver: &R,
    host: &str,
    port: u16,
) -> WeaveResult<Vec<SocketAddr>> {
    let addresses = resolver.resolve(host, port)?;

    for address in &addresses {
        if !is_public_address(address.ip()) {
            return Err(WeaveError::new(
                "net.dns.private_address",
                format!("`{host}` resolved to non-public address `{}`", address.ip()),
            ));
        }
    }

    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::DnsResolver;
    use super::resolve_public;
    use pw_core::WeaveResult;
    use std::net::SocketAddr;

    struct FixedResolver {
        addresses: Vec<SocketAddr>,
    }

    impl DnsResolver for FixedResolver {
        fn resolve(&self, _host: &str, _port: u16) -> WeaveResult<Vec<SocketAddr>> {
            Ok(self.addresses.clone())
        }
    }

    fn addr(text: &str) -> SocketAddr {
        let parsed = text.parse::<SocketAddr>();
        assert!(parsed.is_ok());
        match parsed {
            Ok(value) => value,
            Err(error) => panic!("{error}"),
        }
    }

    #[test]
    fn public_answers_pass_through() {
        let resolver = FixedResolver {
            addresses: vec![addr("93.184.216.34:443")],
        };
        let resolved = resolve_public(&resolver, "example.com", 443);
        assert!(resolved.is_ok());
    }

    #[test]
    fn any_private_answer_rejects_the_whole_resolution() {
        let resolver = FixedResolver {
            addresses: vec![addr("93.184.216.34:443"), addr("10.0.0.5:443")],
        };
        let resolved = resolve_public(&resolver, "rebind.example.com", 443);
        assert!(resolved.is_err());
        if let Err(error) = resolved {
            assert_eq!(error.code, "net.dns.private_address");
        }
    }

    #[test]
    fn loopback_answers_are_rejected() {
        let resolver = FixedResolver {
            addresses: vec![addr("127.0.0.1:443")],
        };
        assert!(resolve_public(&resolver, "localhost.example.com", 443).is_err());
    }
}

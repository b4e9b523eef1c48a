//! Blocking HTTP transport shared by search and download.
//!
//! Every connection tries the preferred IP family first: a custom resolver orders
//! the resolved addresses so that the preferred family comes first, and the
//! connector falls back to the remaining addresses when those fail.

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = concat!("annadl/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
const KEEPALIVE_SECS: u64 = 30;
const IDLE_TIMEOUT_SECS: u64 = 90;
const MAX_IDLE_CONNECTIONS: usize = 100;
const MAX_REDIRECTS: usize = 10;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// IP family tried first when connecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpFamily {
    #[default]
    V4,
    V6,
}

impl IpFamily {
    fn matches(self, addr: &SocketAddr) -> bool {
        match self {
            IpFamily::V4 => addr.is_ipv4(),
            IpFamily::V6 => addr.is_ipv6(),
        }
    }
}

/// Move addresses of the preferred family to the front, keeping relative order.
/// A list without any preferred address comes back unchanged.
pub(crate) fn order_by_family(addrs: Vec<SocketAddr>, preferred: IpFamily) -> Vec<SocketAddr> {
    let (mut ordered, fallback): (Vec<_>, Vec<_>) =
        addrs.into_iter().partition(|a| preferred.matches(a));
    ordered.extend(fallback);
    ordered
}

/// System resolver wrapper that puts the preferred family first.
#[derive(Debug)]
struct FamilyPreferringResolver {
    preferred: IpFamily,
}

impl Resolve for FamilyPreferringResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let preferred = self.preferred;
        let host = name.as_str().to_string();
        Box::pin(async move {
            // getaddrinfo blocks; keep it off the connector's runtime thread.
            let resolved = tokio::task::spawn_blocking(move || {
                (host.as_str(), 0)
                    .to_socket_addrs()
                    .map(|it| it.collect::<Vec<_>>())
            })
            .await??;
            let addrs: Addrs = Box::new(order_by_family(resolved, preferred).into_iter());
            Ok::<Addrs, BoxError>(addrs)
        })
    }
}

/// Blocking HTTP client with fixed timeouts and IP family preference.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Transport {
    inner: reqwest::blocking::Client,
}

impl Transport {
    /// Build a transport with default User-Agent, timeouts, and IPv4 preference.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::builder().build()
    }

    pub fn builder() -> TransportBuilder {
        TransportBuilder::default()
    }

    /// Perform a GET request.
    pub fn get(&self, url: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        self.inner.get(url).send()
    }
}

/// Builder for [Transport].
#[derive(Debug)]
pub struct TransportBuilder {
    user_agent: Option<String>,
    timeout_secs: u64,
    connect_timeout_secs: u64,
    preferred_family: IpFamily,
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            preferred_family: IpFamily::default(),
        }
    }
}

impl TransportBuilder {
    /// Set a custom User-Agent. Defaults to `annadl/<version>`.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Overall request timeout in seconds. Default 60.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Connect timeout in seconds. Default 30.
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// IP family dialed first. Default IPv4.
    pub fn preferred_family(mut self, family: IpFamily) -> Self {
        self.preferred_family = family;
        self
    }

    pub fn build(self) -> Result<Transport, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let resolver = Arc::new(FamilyPreferringResolver {
            preferred: self.preferred_family,
        });
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .tcp_keepalive(Duration::from_secs(KEEPALIVE_SECS))
            .pool_idle_timeout(Duration::from_secs(IDLE_TIMEOUT_SECS))
            .pool_max_idle_per_host(MAX_IDLE_CONNECTIONS)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .dns_resolver(resolver)
            .build()?;
        Ok(Transport { inner })
    }
}

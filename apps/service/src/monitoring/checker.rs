use std::net::IpAddr;
use std::time::Duration;

use surge_ping::{Client as PingClient, Config as PingConfig, ICMP, PingIdentifier, PingSequence};
use thiserror::Error;
use url::Url;

/// Why a probe produced no usable answer. Always recovered locally.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("could not resolve {host}: {reason}")]
    Resolve { host: String, reason: String },
    #[error("ping failed: {0}")]
    Ping(#[from] surge_ping::SurgeError),
    #[error("ICMP is unavailable for {0} addresses (raw sockets need privileges)")]
    IcmpUnavailable(&'static str),
}

/// Raw answer of the status call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

/// Reachability check for a host
#[async_trait::async_trait]
pub trait ReachabilityChecker: Send + Sync {
    /// Succeeds when the host answered.
    async fn probe(&self, host: &str) -> Result<(), ProbeError>;
}

/// HTTP status call against a server
#[async_trait::async_trait]
pub trait StatusFetcher: Send + Sync {
    /// Any received response is a success, whatever its status code.
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, ProbeError>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("stwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl StatusFetcher for HttpChecker {
    async fn fetch(&self, url: &Url) -> Result<FetchResponse, ProbeError> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(FetchResponse { status, body })
    }
}

/// ICMP echo checker
///
/// Raw ICMP sockets need privileges (root or CAP_NET_RAW). When a socket
/// cannot be opened the checker still works, reporting every host of that
/// address family as unreachable.
pub struct IcmpChecker {
    v4: Option<PingClient>,
    v6: Option<PingClient>,
    timeout: Duration,
}

impl IcmpChecker {
    pub fn new(timeout: Duration) -> Self {
        let v4 = PingClient::new(&PingConfig::default())
            .inspect_err(|e| tracing::warn!("ICMPv4 ping unavailable: {}", e))
            .ok();
        let v6 = PingClient::new(&PingConfig::builder().kind(ICMP::V6).build())
            .inspect_err(|e| tracing::debug!("ICMPv6 ping unavailable: {}", e))
            .ok();

        Self { v4, v6, timeout }
    }

    async fn resolve(&self, host: &str) -> Result<IpAddr, ProbeError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let resolve_error = |reason: String| ProbeError::Resolve { host: host.to_string(), reason };
        let mut addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|e| resolve_error(e.to_string()))?;
        addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| resolve_error("no address found".into()))
    }
}

#[async_trait::async_trait]
impl ReachabilityChecker for IcmpChecker {
    async fn probe(&self, host: &str) -> Result<(), ProbeError> {
        let ip = self.resolve(host).await?;
        let client = match ip {
            IpAddr::V4(_) => self.v4.as_ref().ok_or(ProbeError::IcmpUnavailable("IPv4"))?,
            IpAddr::V6(_) => self.v6.as_ref().ok_or(ProbeError::IcmpUnavailable("IPv6"))?,
        };

        let payload = [0u8; 56];
        let mut pinger = client.pinger(ip, PingIdentifier(rand::random())).await;
        pinger.timeout(self.timeout);
        pinger.ping(PingSequence(0), &payload).await?;

        Ok(())
    }
}

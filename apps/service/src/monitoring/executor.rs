use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::time::timeout;

use super::checker::{HttpChecker, IcmpChecker, ProbeError, ReachabilityChecker, StatusFetcher};
use super::payload::apply_status_body;
use super::types::{HostStatus, ServerStatus, TRANSPORT_FAILURE};
use crate::registry::TargetServer;

/// Probe executor - runs one probe and turns its outcome into a record
///
/// Every probe is bounded by `probe_timeout`; hitting the bound counts as a
/// transport failure. Nothing here returns an error: failures are data.
pub struct ProbeExecutor {
    reachability: Arc<dyn ReachabilityChecker>,
    fetcher: Arc<dyn StatusFetcher>,
    probe_timeout: Duration,
}

impl ProbeExecutor {
    /// Create an executor backed by ICMP and HTTP
    pub fn new(probe_timeout: Duration) -> Result<Self, ProbeError> {
        Ok(Self::with_checkers(
            Arc::new(IcmpChecker::new(probe_timeout)),
            Arc::new(HttpChecker::new(probe_timeout)?),
            probe_timeout,
        ))
    }

    pub fn with_checkers(
        reachability: Arc<dyn ReachabilityChecker>,
        fetcher: Arc<dyn StatusFetcher>,
        probe_timeout: Duration,
    ) -> Self {
        Self { reachability, fetcher, probe_timeout }
    }

    /// Ping a host.
    pub async fn probe_host(&self, host: &str, when: DateTime<Utc>) -> HostStatus {
        let start = Instant::now();
        let outcome = timeout(self.probe_timeout, self.reachability.probe(host))
            .await
            .unwrap_or(Err(ProbeError::Timeout(self.probe_timeout)));
        let ns = elapsed_ns(start);

        if let Err(e) = &outcome {
            tracing::debug!("Ping {} failed: {}", host, e);
        }

        HostStatus::new(host.to_string(), when, outcome.is_ok(), ns)
    }

    /// Call the status endpoint of a server.
    pub async fn fetch_status(&self, server: &TargetServer, when: DateTime<Utc>) -> ServerStatus {
        tracing::debug!("* {}", server.status_url);

        let start = Instant::now();
        let outcome = timeout(self.probe_timeout, self.fetcher.fetch(&server.status_url))
            .await
            .unwrap_or(Err(ProbeError::Timeout(self.probe_timeout)));
        let ns = elapsed_ns(start);

        match outcome {
            Ok(response) => {
                let mut record = ServerStatus::new(server.id.clone(), when, ns, i32::from(response.status));
                apply_status_body(&mut record, &response.body);
                record
            }
            Err(e) => {
                tracing::debug!("Status call to {} failed: {}", server.id, e);
                ServerStatus::new(server.id.clone(), when, ns, TRANSPORT_FAILURE)
            }
        }
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

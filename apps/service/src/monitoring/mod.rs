/// Monitoring engine module - probes hosts and servers
///
/// This module is responsible for:
/// - Running ICMP and HTTP probes under a timeout
/// - Decoding the status payload
/// - Scheduling poll ticks
pub mod checker;
pub mod executor;
pub mod payload;
pub mod scheduler;
pub mod types;

pub use executor::ProbeExecutor;
pub use scheduler::PollScheduler;
pub use types::{HostStatus, ServerStatus, TRANSPORT_FAILURE};

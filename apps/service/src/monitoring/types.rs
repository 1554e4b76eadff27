use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status code recorded when the HTTP call never produced a response.
pub const TRANSPORT_FAILURE: i32 = -1;

/// Result of a reachability probe against a host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostStatus {
    /// Row id once persisted
    pub id: Option<i64>,

    /// Hostname that was probed
    pub host: String,

    /// Start of the poll tick that produced this result
    pub when: DateTime<Utc>,

    /// Whether the host answered
    pub alive: bool,

    /// Elapsed wall time in nanoseconds
    pub ns: u64,
}

impl HostStatus {
    pub fn new(host: String, when: DateTime<Utc>, alive: bool, ns: u64) -> Self {
        Self { id: None, host, when, alive, ns }
    }
}

/// Result of a status call against a server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Row id once persisted
    pub id: Option<i64>,

    /// Server identifier from configuration
    pub server: String,

    /// Start of the poll tick that produced this result
    pub when: DateTime<Utc>,

    /// Elapsed wall time in nanoseconds
    pub ns: u64,

    /// Set when this observation put (or kept) the server on probation
    pub probation: bool,

    /// HTTP status code, or [`TRANSPORT_FAILURE`]
    pub status_code: i32,

    pub is_setup: bool,
    pub is_busted: bool,

    /// Why the application reports itself busted, or why decoding failed
    pub busted: Option<String>,

    pub users: Option<i64>,
    pub guests: Option<i64>,
    pub pages: Option<i64>,
    pub dbused: Option<i64>,

    /// `free/total`
    pub mem: Option<String>,

    /// `sysload cpu=procs`
    pub load: Option<String>,

    /// `phase version environment`
    pub info: Option<String>,

    /// As reported by the application, free form
    pub uptime: Option<String>,

    /// When the application process started
    pub stamp: Option<DateTime<Utc>>,
}

impl ServerStatus {
    pub fn new(server: String, when: DateTime<Utc>, ns: u64, status_code: i32) -> Self {
        Self {
            id: None,
            server,
            when,
            ns,
            probation: false,
            status_code,
            is_setup: false,
            is_busted: false,
            busted: None,
            users: None,
            guests: None,
            pages: None,
            dbused: None,
            mem: None,
            load: None,
            info: None,
            uptime: None,
            stamp: None,
        }
    }

    /// A server is up when it answered 200 and does not report itself busted.
    pub fn is_up(&self) -> bool {
        !self.is_busted && self.status_code == 200
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_requires_200_and_not_busted() {
        let now = Utc::now();
        for code in [TRANSPORT_FAILURE, 0, 200, 204, 301, 404, 500, 503] {
            for busted in [false, true] {
                let mut status = ServerStatus::new("st".into(), now, 0, code);
                status.is_busted = busted;
                assert_eq!(status.is_up(), code == 200 && !busted, "code={code} busted={busted}");
            }
        }
    }

    #[test]
    fn test_serializes_with_camel_case_keys() {
        let status = ServerStatus::new("st".into(), Utc::now(), 12, 200);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert_eq!(json["isBusted"], false);
        assert_eq!(json["server"], "st");
    }
}

use chrono::{DateTime, TimeZone, Utc};
use libsql::Row;

use crate::monitoring::types::{HostStatus, ServerStatus};

/// A record the history store accepts
#[derive(Debug, Clone, PartialEq)]
pub enum StatusRecord {
    Host(HostStatus),
    Server(ServerStatus),
}

impl From<HostStatus> for StatusRecord {
    fn from(status: HostStatus) -> Self {
        StatusRecord::Host(status)
    }
}

impl From<ServerStatus> for StatusRecord {
    fn from(status: ServerStatus) -> Self {
        StatusRecord::Server(status)
    }
}

/// Ordering of a history query by observation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}

impl TimeOrder {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            TimeOrder::NewestFirst => "DESC",
            TimeOrder::OldestFirst => "ASC",
        }
    }
}

/// Columns selected for a server status row, in `server_status_from_row` order
pub(crate) const FETCH_STATUS_COLUMNS: &str = "id, server, at, ns, probation, status_code, is_setup, is_busted, busted, \
     users, guests, pages, dbused, mem, load, info, uptime, stamp";

/// Convert a timestamp to epoch milliseconds
pub fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

/// Convert epoch milliseconds back to a timestamp
pub fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis).single().unwrap_or_default()
}

pub(crate) fn flag(value: bool) -> i64 {
    i64::from(value)
}

pub(crate) fn server_status_from_row(row: &Row) -> libsql::Result<ServerStatus> {
    Ok(ServerStatus {
        id: Some(row.get(0)?),
        server: row.get(1)?,
        when: from_millis(row.get(2)?),
        ns: row.get::<i64>(3)?.max(0) as u64,
        probation: row.get::<i64>(4)? != 0,
        status_code: row.get::<i64>(5)? as i32,
        is_setup: row.get::<i64>(6)? != 0,
        is_busted: row.get::<i64>(7)? != 0,
        busted: row.get(8)?,
        users: row.get(9)?,
        guests: row.get(10)?,
        pages: row.get(11)?,
        dbused: row.get(12)?,
        mem: row.get(13)?,
        load: row.get(14)?,
        info: row.get(15)?,
        uptime: row.get(16)?,
        stamp: row.get::<Option<i64>>(17)?.map(from_millis),
    })
}

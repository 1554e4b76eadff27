//! Decoding of the `SurveyAjax?what=status` body.
//!
//! The application answers with a JSON object that usually carries a nested
//! `status` object. Older builds only send top-level `isSetup`/`isBusted`
//! flags encoded as `"1"`. Field types are loose (numbers sometimes arrive as
//! strings), so decoding goes through [`serde_json::Value`].

use chrono::{TimeZone, Utc};
use serde_json::Value;

use super::types::ServerStatus;

/// Longest slice of an undecodable body kept in the busted reason.
const MAX_BODY_SNIPPET: usize = 1024;

/// Fill `record` from a raw response body.
///
/// A body that is not JSON marks the server busted with the status code and
/// the raw body as reason. That is a normal outcome, not an error.
pub fn apply_status_body(record: &mut ServerStatus, body: &str) {
    match serde_json::from_str::<Value>(body) {
        Ok(json) => apply_status_json(record, &json),
        Err(e) => {
            tracing::warn!("Unable to parse status from {}: {}", record.server, e);
            record.is_setup = false;
            record.is_busted = true;
            record.busted = Some(format!("{}Fail: {}", record.status_code, snippet(body)));
        }
    }
}

fn apply_status_json(record: &mut ServerStatus, json: &Value) {
    record.is_setup = legacy_flag(json.get("isSetup"));
    record.is_busted = legacy_flag(json.get("isBusted"));

    let Some(status) = json.get("status").filter(|s| truthy(s)) else {
        return;
    };

    record.is_setup = status.get("isSetup").is_some_and(truthy);
    if let Some(reason) = status.get("isBusted").filter(|v| truthy(v)) {
        record.is_busted = true;
        record.busted = Some(text(reason));
    }

    record.users = integer(status.get("users"));
    record.guests = integer(status.get("guests"));
    record.pages = integer(status.get("pages"));
    record.dbused = integer(status.get("dbused"));
    record.mem = Some(format!("{}/{}", field(status, "memfree"), field(status, "memtotal")));
    record.info = Some(format!(
        "{} {} {}",
        field(status, "phase"),
        field(status, "newVersion"),
        field(status, "environment")
    ));
    record.load = Some(format!("{} cpu={}", field(status, "sysload"), field(status, "sysprocs")));
    record.uptime = status.get("uptime").filter(|v| !v.is_null()).map(text);
    record.stamp = integer(status.get("surveyRunningStamp"))
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single());
}

/// Legacy flags are `"1"` (or `1`) for true.
fn legacy_flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::String(s)) => s == "1",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        Some(Value::Bool(b)) => *b,
        _ => false,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Field rendered for one of the composite strings; `?` when absent.
fn field(status: &Value, key: &str) -> String {
    match status.get(key) {
        None | Some(Value::Null) => "?".into(),
        Some(value) => text(value),
    }
}

fn snippet(body: &str) -> &str {
    if body.len() <= MAX_BODY_SNIPPET {
        return body;
    }
    let mut end = MAX_BODY_SNIPPET;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: i32) -> ServerStatus {
        ServerStatus::new("st".into(), Utc::now(), 0, code)
    }

    #[test]
    fn test_nested_status_is_decoded() {
        let mut r = record(200);
        apply_status_body(
            &mut r,
            r#"{"status":{"isSetup":true,"isBusted":null,"users":12,"guests":"3","pages":40,
                "memfree":100,"memtotal":512,"phase":"VETTING","newVersion":"44",
                "environment":"PRODUCTION","sysload":1.5,"sysprocs":8,"dbused":77,
                "uptime":"3 days","surveyRunningStamp":1500000000000}}"#,
        );

        assert!(r.is_setup);
        assert!(!r.is_busted);
        assert_eq!(r.busted, None);
        assert_eq!(r.users, Some(12));
        assert_eq!(r.guests, Some(3));
        assert_eq!(r.pages, Some(40));
        assert_eq!(r.dbused, Some(77));
        assert_eq!(r.mem.as_deref(), Some("100/512"));
        assert_eq!(r.info.as_deref(), Some("VETTING 44 PRODUCTION"));
        assert_eq!(r.load.as_deref(), Some("1.5 cpu=8"));
        assert_eq!(r.uptime.as_deref(), Some("3 days"));
        assert_eq!(r.stamp.map(|s| s.timestamp_millis()), Some(1_500_000_000_000));
        assert!(r.is_up());
    }

    #[test]
    fn test_busted_reason_is_kept() {
        let mut r = record(200);
        apply_status_body(&mut r, r#"{"status":{"isSetup":true,"isBusted":"out of memory"}}"#);
        assert!(r.is_busted);
        assert_eq!(r.busted.as_deref(), Some("out of memory"));
        assert!(!r.is_up());
    }

    #[test]
    fn test_legacy_flags_without_status_object() {
        let mut r = record(200);
        apply_status_body(&mut r, r#"{"isSetup":"1","isBusted":"0"}"#);
        assert!(r.is_setup);
        assert!(!r.is_busted);
        assert_eq!(r.mem, None);

        let mut r = record(200);
        apply_status_body(&mut r, r#"{"isSetup":"0","isBusted":"1"}"#);
        assert!(!r.is_setup);
        assert!(r.is_busted);
    }

    #[test]
    fn test_malformed_body_marks_busted() {
        let mut r = record(502);
        apply_status_body(&mut r, "<html>Bad Gateway</html>");
        assert!(r.is_busted);
        assert!(!r.is_setup);
        assert_eq!(r.busted.as_deref(), Some("502Fail: <html>Bad Gateway</html>"));
    }

    #[test]
    fn test_huge_body_is_truncated() {
        let mut r = record(200);
        let body = "é".repeat(2000);
        apply_status_body(&mut r, &body);
        let reason = r.busted.unwrap();
        assert!(reason.starts_with("200Fail: é"));
        assert!(reason.len() <= MAX_BODY_SNIPPET + "200Fail: ".len());
    }

    #[test]
    fn test_non_object_json_is_not_busted() {
        let mut r = record(200);
        apply_status_body(&mut r, "[1,2,3]");
        assert!(!r.is_busted);
        assert!(!r.is_setup);
        assert!(r.is_up());
    }
}

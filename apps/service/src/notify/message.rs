use crate::events::TransitionEvent;

pub const CHAT_GREETING: &str = "Hey! Im just a robot. Send me \"help\" for help.";
pub const CHAT_HELP: &str = "Commands: \"help\", \"status\"";
pub const CHAT_UNKNOWN: &str = "Didn't get that.. send me \"help\" for help.";

/// Text body shared by every channel.
pub fn compose(event: &TransitionEvent) -> String {
    let mut text = format!("Event: {}\r\n", event.kind);
    if let Some(server) = &event.server {
        text.push_str(&format!("Server: {server}\n"));
    }
    text.push_str(&format!("Since: {}\n", event.since.format("%Y-%m-%d %H:%M:%S UTC")));
    text.push_str(&format!("Message: {}\n", event.message));
    text.push_str(&format!("Details: {}\n", event.details.as_deref().unwrap_or_default()));
    text
}

pub fn email_subject(prefix: &str, event: &TransitionEvent) -> String {
    format!("{} {}", prefix, event.message)
}

pub fn email_body(event: &TransitionEvent, footer: &str) -> String {
    format!("{}{}\n", compose(event), footer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_layout_with_server() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let event = TransitionEvent::down("st", Some("db gone".into()), since);

        assert_eq!(
            compose(&event),
            "Event: down\r\nServer: st\nSince: 2024-03-01 12:30:00 UTC\nMessage: SurveyTool st DOWN\nDetails: db gone\n"
        );
        assert_eq!(email_subject("[stwatch]", &event), "[stwatch] SurveyTool st DOWN");
        assert!(email_body(&event, "-- the watcher").ends_with("Details: db gone\n-- the watcher\n"));
    }

    #[test]
    fn test_layout_without_server() {
        let since = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let text = compose(&TransitionEvent::boot("box", since));

        assert!(text.starts_with("Event: boot\r\nSince: "));
        assert!(!text.contains("Server:"));
        assert!(text.contains("Message: Watcher started@box\n"));
    }

    #[test]
    fn test_missing_details_render_empty() {
        let text = compose(&TransitionEvent::up("st", Utc::now()));
        assert!(text.ends_with("Details: \n"));
    }
}

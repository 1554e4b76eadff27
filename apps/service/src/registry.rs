//! Monitored hosts and servers, built once from configuration.
//!
//! Servers are grouped by the hostname of their base URL. A host carrying
//! any stealth server is stealth itself: it is never pinged, but its servers
//! are still status-polled.

use std::collections::BTreeMap;

use serde::Serialize;
use url::Url;

use crate::config::{self, Config, OneOrMany};
use crate::events::EventKind;

/// Relative path of the status call on every server.
pub const STATUS_PATH: &str = "SurveyAjax?what=status";

/// Notify names bound to each event kind of a server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBindings {
    pub boot: Vec<String>,
    pub up: Vec<String>,
    pub down: Vec<String>,
}

impl EventBindings {
    fn from_config(events: &config::EventsConfig) -> Self {
        let names = |list: &Option<OneOrMany>| list.as_ref().map(OneOrMany::to_vec).unwrap_or_default();
        Self { boot: names(&events.boot), up: names(&events.up), down: names(&events.down) }
    }

    pub fn for_event(&self, kind: EventKind) -> &[String] {
        match kind {
            EventKind::Boot => &self.boot,
            EventKind::Up => &self.up,
            EventKind::Down => &self.down,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TargetServer {
    pub id: String,
    pub host: String,
    /// Base URL, always ending with `/`.
    pub url: Url,
    pub status_url: Url,
    pub stealth: bool,
    pub disabled: bool,
    pub events: EventBindings,
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetHost {
    pub name: String,
    pub stealth: bool,
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    hosts: BTreeMap<String, TargetHost>,
    servers: BTreeMap<String, TargetServer>,
}

impl Registry {
    pub fn from_config(config: &Config) -> Result<Self, config::Error> {
        let mut registry = Registry::default();

        for (id, server) in &config.servers {
            if server.skip {
                tracing::debug!("Skipping server {}", id);
                continue;
            }

            let target = build_server(id, server)?;
            tracing::info!("Considering {} URL {}", id, target.url);

            let host = registry.hosts.entry(target.host.clone()).or_insert_with(|| TargetHost {
                name: target.host.clone(),
                stealth: false,
                servers: Vec::new(),
            });
            host.servers.push(id.clone());
            host.stealth |= target.stealth;

            registry.servers.insert(id.clone(), target);
        }

        Ok(registry)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &TargetHost> {
        self.hosts.values()
    }

    pub fn servers(&self) -> impl Iterator<Item = &TargetServer> {
        self.servers.values()
    }

    pub fn host(&self, name: &str) -> Option<&TargetHost> {
        self.hosts.get(name)
    }

    pub fn server(&self, id: &str) -> Option<&TargetServer> {
        self.servers.get(id)
    }

    /// Servers running on a host, sorted by id.
    pub fn servers_on<'a>(&'a self, host: &'a TargetHost) -> impl Iterator<Item = &'a TargetServer> {
        host.servers.iter().filter_map(|id| self.servers.get(id))
    }

    /// Hosts that receive a reachability probe.
    pub fn pingable_hosts(&self) -> impl Iterator<Item = &TargetHost> {
        self.hosts.values().filter(|h| !h.stealth)
    }
}

fn build_server(id: &str, server: &config::ServerConfig) -> Result<TargetServer, config::Error> {
    let mut raw = server.url.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }

    let invalid = |source| config::Error::InvalidUrl { server: id.to_string(), url: raw.clone(), source };
    let url = Url::parse(&raw).map_err(invalid)?;
    let host = url
        .host_str()
        .ok_or_else(|| config::Error::MissingHost { server: id.to_string(), url: raw.clone() })?
        .to_string();
    let status_url = url.join(STATUS_PATH).map_err(invalid)?;

    Ok(TargetServer {
        id: id.to_string(),
        host,
        url,
        status_url,
        stealth: server.stealth,
        disabled: server.disabled,
        events: EventBindings::from_config(&server.events),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(servers: &str) -> Result<Registry, config::Error> {
        let raw = format!("[watcher]\ndbpath = \"x.db\"\n{servers}");
        Registry::from_config(&Config::parse(&raw)?)
    }

    #[test]
    fn test_urls_end_with_separator() {
        let registry = registry(
            r#"
            [servers.a]
            url = "https://st.example.org/cldr-apps"
            [servers.b]
            url = "https://st.example.org/other/"
            "#,
        )
        .unwrap();

        let a = registry.server("a").unwrap();
        assert_eq!(a.url.as_str(), "https://st.example.org/cldr-apps/");
        assert_eq!(a.status_url.as_str(), "https://st.example.org/cldr-apps/SurveyAjax?what=status");
        assert_eq!(registry.server("b").unwrap().url.as_str(), "https://st.example.org/other/");
    }

    #[test]
    fn test_servers_grouped_by_host() {
        let registry = registry(
            r#"
            [servers.a]
            url = "https://one.example.org/a"
            [servers.b]
            url = "https://one.example.org:8443/b"
            [servers.c]
            url = "https://two.example.org/c"
            "#,
        )
        .unwrap();

        assert_eq!(registry.hosts().count(), 2);
        let one = registry.host("one.example.org").unwrap();
        assert_eq!(one.servers, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(registry.server("c").unwrap().host, "two.example.org");
        assert_eq!(registry.servers_on(one).count(), 2);
    }

    #[test]
    fn test_any_stealth_server_makes_host_stealth() {
        let registry = registry(
            r#"
            [servers.a]
            url = "https://one.example.org/a"
            [servers.b]
            url = "https://one.example.org/b"
            stealth = true
            [servers.c]
            url = "https://two.example.org/c"
            "#,
        )
        .unwrap();

        assert!(registry.host("one.example.org").unwrap().stealth);
        let pingable: Vec<_> = registry.pingable_hosts().map(|h| h.name.as_str()).collect();
        assert_eq!(pingable, vec!["two.example.org"]);
        // stealth servers are still polled
        assert_eq!(registry.servers().count(), 3);
    }

    #[test]
    fn test_skipped_servers_are_ignored() {
        let registry = registry(
            r#"
            [servers.a]
            url = "https://one.example.org/a"
            skip = true
            "#,
        )
        .unwrap();

        assert!(registry.server("a").is_none());
        assert_eq!(registry.hosts().count(), 0);
    }

    #[test]
    fn test_malformed_url_fails_fast() {
        let err = registry("[servers.a]\nurl = \"not a url\"\n").unwrap_err();
        assert!(matches!(err, config::Error::InvalidUrl { ref server, .. } if server == "a"));

        let err = registry("[servers.a]\nurl = \"mailto:ops@example.org\"\n").unwrap_err();
        assert!(matches!(err, config::Error::MissingHost { .. }));
    }

    #[test]
    fn test_event_bindings() {
        let registry = registry(
            r#"
            [servers.a]
            url = "https://one.example.org/a"
            events = { up = "chat", down = ["chat", "mail"] }
            "#,
        )
        .unwrap();

        let events = &registry.server("a").unwrap().events;
        assert_eq!(events.for_event(EventKind::Up), ["chat".to_string()]);
        assert_eq!(events.for_event(EventKind::Down).len(), 2);
        assert!(events.for_event(EventKind::Boot).is_empty());
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::TransitionEvent;
use crate::monitoring::ServerStatus;

/// Derived availability of one server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownStatus {
    pub up: bool,
    pub when: DateTime<Utc>,
    pub probation: bool,

    /// Timestamp of the last known-good state before probation started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probation_since: Option<DateTime<Utc>>,

    /// Row id of the record this state was derived from
    pub id: Option<i64>,
}

/// Outcome of evaluating one observation
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// First observation for this server
    Baseline,
    /// Nothing changed
    Steady,
    /// Newly down; a re-check should follow
    Probation,
    /// Back up while on probation, nobody is told
    Recovered,
    /// Worth a notification
    Notify(TransitionEvent),
}

/// Known status and latest observation of every server
///
/// Only the watcher task touches this, so it needs no locking.
#[derive(Debug, Default)]
pub struct StateTracker {
    known: HashMap<String, KnownStatus>,
    latest: HashMap<String, ServerStatus>,
}

impl StateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore state from the newest persisted record of a server.
    pub fn rehydrate(&mut self, record: ServerStatus) {
        let known = KnownStatus {
            up: record.is_up(),
            when: record.when,
            probation: record.probation,
            probation_since: None,
            id: record.id,
        };
        tracing::debug!(
            "Restored {}: up={} probation={} as of {}",
            record.server,
            known.up,
            known.probation,
            known.when
        );
        self.known.insert(record.server.clone(), known);
        self.latest.insert(record.server.clone(), record);
    }

    /// Classify an observation and fold it into the known status.
    ///
    /// Sets `record.probation` so the persisted row carries it.
    pub fn evaluate(&mut self, record: &mut ServerStatus) -> Transition {
        let up = record.is_up();
        let prior = self.known.get(&record.server);

        let transition = match prior {
            None => Transition::Baseline,
            Some(prior) if prior.up != up => {
                if !up {
                    Transition::Probation
                } else if prior.probation {
                    Transition::Recovered
                } else {
                    Transition::Notify(TransitionEvent::up(&record.server, record.when))
                }
            }
            Some(prior) if !up && prior.probation => {
                let since = prior.probation_since.unwrap_or(prior.when);
                Transition::Notify(TransitionEvent::down(&record.server, record.busted.clone(), since))
            }
            Some(_) => Transition::Steady,
        };

        let probation_since = match (&transition, prior) {
            (Transition::Probation, Some(prior)) => Some(prior.when),
            _ => None,
        };

        record.probation = matches!(transition, Transition::Probation);

        match &transition {
            Transition::Baseline | Transition::Steady => {
                tracing::debug!(target: "stwatch::transition", "{}: {:?} up={}", record.server, transition, up)
            }
            Transition::Probation => {
                tracing::info!(target: "stwatch::transition", "{} looks down, on probation", record.server)
            }
            Transition::Recovered => {
                tracing::info!(target: "stwatch::transition", "{} recovered during probation", record.server)
            }
            Transition::Notify(event) => {
                tracing::info!(target: "stwatch::transition", "{}", event.message)
            }
        }

        self.known.insert(
            record.server.clone(),
            KnownStatus {
                up,
                when: record.when,
                probation: record.probation,
                probation_since,
                id: record.id,
            },
        );
        self.latest.insert(record.server.clone(), record.clone());

        transition
    }

    /// Attach the row id once the record has been stored.
    pub fn record_persisted(&mut self, server: &str, id: i64) {
        if let Some(known) = self.known.get_mut(server) {
            known.id = Some(id);
        }
        if let Some(latest) = self.latest.get_mut(server) {
            latest.id = Some(id);
        }
    }

    pub fn known(&self, server: &str) -> Option<&KnownStatus> {
        self.known.get(server)
    }

    pub fn latest(&self, server: &str) -> Option<&ServerStatus> {
        self.latest.get(server)
    }

    pub fn is_on_probation(&self, server: &str) -> bool {
        self.known.get(server).is_some_and(|k| k.probation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::Duration;

    fn observation(server: &str, when: DateTime<Utc>, code: i32, busted: Option<&str>) -> ServerStatus {
        let mut record = ServerStatus::new(server.into(), when, 1, code);
        if let Some(reason) = busted {
            record.is_busted = true;
            record.busted = Some(reason.into());
        }
        record
    }

    fn good(when: DateTime<Utc>) -> ServerStatus {
        observation("st", when, 200, None)
    }

    fn bad(when: DateTime<Utc>) -> ServerStatus {
        observation("st", when, 500, None)
    }

    #[test]
    fn test_first_observation_is_baseline() {
        let mut tracker = StateTracker::new();
        let t0 = Utc::now();

        assert_eq!(tracker.evaluate(&mut bad(t0)), Transition::Baseline);
        let known = tracker.known("st").unwrap();
        assert!(!known.up);
        assert!(!known.probation);
    }

    #[test]
    fn test_down_needs_two_bad_observations() {
        let mut tracker = StateTracker::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::hours(1);
        let t2 = t1 + Duration::seconds(500);

        tracker.evaluate(&mut good(t0));

        let mut first = bad(t1);
        assert_eq!(tracker.evaluate(&mut first), Transition::Probation);
        assert!(first.probation);
        assert!(tracker.is_on_probation("st"));

        let mut second = observation("st", t2, 200, Some("db is gone"));
        match tracker.evaluate(&mut second) {
            Transition::Notify(event) => {
                assert_eq!(event.kind, EventKind::Down);
                assert_eq!(event.server.as_deref(), Some("st"));
                assert_eq!(event.message, "SurveyTool st DOWN");
                assert_eq!(event.details.as_deref(), Some("db is gone"));
                assert_eq!(event.since, t0);
            }
            other => panic!("expected down, got {other:?}"),
        }
        assert!(!second.probation);
        assert!(!tracker.is_on_probation("st"));

        // Already down: no repeat.
        assert_eq!(tracker.evaluate(&mut bad(t2 + Duration::hours(1))), Transition::Steady);
    }

    #[test]
    fn test_recovery_during_probation_is_silent() {
        let mut tracker = StateTracker::new();
        let t0 = Utc::now();

        tracker.evaluate(&mut good(t0));
        tracker.evaluate(&mut bad(t0 + Duration::hours(1)));

        let mut recovered = good(t0 + Duration::hours(2));
        assert_eq!(tracker.evaluate(&mut recovered), Transition::Recovered);
        assert!(!recovered.probation);

        let known = tracker.known("st").unwrap();
        assert!(known.up);
        assert!(!known.probation);
    }

    #[test]
    fn test_up_after_down_notifies_once() {
        let mut tracker = StateTracker::new();
        let t0 = Utc::now();

        tracker.evaluate(&mut bad(t0));

        let t1 = t0 + Duration::hours(1);
        match tracker.evaluate(&mut good(t1)) {
            Transition::Notify(event) => {
                assert_eq!(event.kind, EventKind::Up);
                assert_eq!(event.message, "SurveyTool st UP");
                assert_eq!(event.since, t1);
            }
            other => panic!("expected up, got {other:?}"),
        }

        assert_eq!(tracker.evaluate(&mut good(t1 + Duration::hours(1))), Transition::Steady);
        assert_eq!(tracker.evaluate(&mut good(t1 + Duration::hours(2))), Transition::Steady);
    }

    #[test]
    fn test_rehydrated_probation_escalates() {
        let mut tracker = StateTracker::new();
        let t0 = Utc::now();

        let mut stored = bad(t0);
        stored.probation = true;
        stored.id = Some(41);
        tracker.rehydrate(stored);

        assert_eq!(tracker.known("st").unwrap().id, Some(41));
        match tracker.evaluate(&mut bad(t0 + Duration::minutes(10))) {
            Transition::Notify(event) => {
                assert_eq!(event.kind, EventKind::Down);
                assert_eq!(event.since, t0);
            }
            other => panic!("expected down, got {other:?}"),
        }
    }

    #[test]
    fn test_rehydrated_up_does_not_reannounce() {
        let mut tracker = StateTracker::new();
        let t0 = Utc::now();
        tracker.rehydrate(good(t0));

        assert_eq!(tracker.evaluate(&mut good(t0 + Duration::hours(1))), Transition::Steady);
    }

    #[test]
    fn test_record_persisted_sets_ids() {
        let mut tracker = StateTracker::new();
        tracker.evaluate(&mut good(Utc::now()));
        tracker.record_persisted("st", 7);
        tracker.record_persisted("unknown", 8);

        assert_eq!(tracker.known("st").unwrap().id, Some(7));
        assert_eq!(tracker.latest("st").unwrap().id, Some(7));
        assert!(tracker.known("unknown").is_none());
    }
}

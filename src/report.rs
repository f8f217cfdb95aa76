//! Arrival evidence and the liveness verdict.
//!
//! [`ArrivalEvidence`] is what the observation window accumulates;
//! [`LivenessReport`] is the frozen verdict derived from it once the window
//! has closed. Deriving the report is pure: evaluating the same outcome
//! twice yields identical reports.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::session::Arrival;
use crate::watch::WindowOutcome;

/// Activity observed on a single topic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicActivity {
    pub count: u64,
    /// Most recent payload, kept only in diagnostic runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_payload: Option<String>,
    /// When the most recent message arrived, kept only in diagnostic runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Accumulated proof of life, one entry per topic that spoke.
///
/// A topic absent from the map has simply not been heard from. Counts only
/// ever grow while a window is open, and the window loop is the sole
/// writer.
#[derive(Debug, Default)]
pub struct ArrivalEvidence {
    topics: BTreeMap<String, TopicActivity>,
}

impl ArrivalEvidence {
    /// Record one arrival. Payload and timestamp are retained only when
    /// `keep_payload` is set (diagnostic runs).
    pub fn record(&mut self, arrival: &Arrival, keep_payload: bool) {
        let entry = self.topics.entry(arrival.topic.clone()).or_default();
        entry.count += 1;
        if keep_payload {
            entry.last_payload = Some(arrival.payload.clone());
            entry.last_seen = Some(arrival.received_at);
        }
    }

    /// Total messages recorded across all topics.
    pub fn total(&self) -> u64 {
        self.topics.values().map(|activity| activity.count).sum()
    }

    /// Messages recorded for one topic (zero when never heard from).
    pub fn count_for(&self, topic: &str) -> u64 {
        self.topics.get(topic).map_or(0, |activity| activity.count)
    }

    /// Iterate over every topic that recorded at least one arrival.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TopicActivity)> {
        self.topics.iter()
    }
}

/// The verdict for one run.
///
/// `per_topic` always contains every configured topic (seeded at zero), so
/// silent devices show up explicitly in diagnostic output. Wildcard
/// subscriptions may add concrete topics beyond the configured filters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivenessReport {
    pub per_topic: BTreeMap<String, TopicActivity>,
    pub overall_success: bool,
    /// Connection-phase and mid-window transport failures, in order.
    pub connection_errors: Vec<String>,
}

impl LivenessReport {
    /// Reduce a finished window to a verdict.
    ///
    /// One message from any monitored topic is sufficient for success; how
    /// the arrivals were distributed across topics is irrelevant.
    pub fn from_window(topics: &[String], outcome: &WindowOutcome) -> Self {
        let mut per_topic: BTreeMap<String, TopicActivity> = topics
            .iter()
            .map(|topic| (topic.clone(), TopicActivity::default()))
            .collect();

        for (topic, activity) in outcome.evidence.iter() {
            per_topic.insert(topic.clone(), activity.clone());
        }

        Self {
            per_topic,
            overall_success: outcome.evidence.total() > 0,
            connection_errors: outcome.connection_errors.clone(),
        }
    }

    /// Human-readable summary, sent as the diagnostic-run notification.
    pub fn summary(&self) -> String {
        let mut lines = vec![if self.overall_success {
            "At least one monitored device has sent an MQTT message.".to_string()
        } else {
            "No MQTT message was received from any monitored device. Please check.".to_string()
        }];

        for (topic, activity) in &self.per_topic {
            let mut line = match activity.count {
                0 => format!("  {topic}: silent"),
                n => format!("  {topic}: {n} message(s)"),
            };
            if let Some(seen) = activity.last_seen {
                line.push_str(&format!(", last at {}", seen.format("%H:%M:%S UTC")));
            }
            lines.push(line);
        }

        for error in &self.connection_errors {
            lines.push(format!("  error: {error}"));
        }

        lines.join("\n")
    }

    /// Alert text for a failed check run.
    pub fn alert_message(&self) -> &'static str {
        if self.connection_errors.is_empty() {
            "No MQTT message was received from any device. Please check."
        } else {
            "Could not reach the MQTT broker. Please check your MQTT settings."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::WindowState;

    fn arrival(topic: &str, payload: &str) -> Arrival {
        Arrival {
            topic: topic.to_string(),
            payload: payload.to_string(),
            received_at: Utc::now(),
        }
    }

    fn outcome(evidence: ArrivalEvidence, errors: Vec<String>, state: WindowState) -> WindowOutcome {
        WindowOutcome {
            evidence,
            connection_errors: errors,
            state,
        }
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn empty_evidence_fails_regardless_of_topic_count() {
        let report = LivenessReport::from_window(
            &topics(&["a", "b", "c"]),
            &outcome(ArrivalEvidence::default(), vec![], WindowState::Closed),
        );
        assert!(!report.overall_success);
        assert_eq!(report.per_topic.len(), 3);
        assert!(report.per_topic.values().all(|a| a.count == 0));
    }

    #[test]
    fn one_message_on_any_topic_is_success() {
        let mut evidence = ArrivalEvidence::default();
        evidence.record(&arrival("b", "on"), false);

        let report = LivenessReport::from_window(
            &topics(&["a", "b"]),
            &outcome(evidence, vec![], WindowState::Closed),
        );
        assert!(report.overall_success);
        assert_eq!(report.per_topic["a"].count, 0);
        assert_eq!(report.per_topic["b"].count, 1);
    }

    #[test]
    fn success_does_not_depend_on_distribution() {
        // All arrivals on one topic vs. spread over three: same verdict.
        let mut concentrated = ArrivalEvidence::default();
        for _ in 0..3 {
            concentrated.record(&arrival("a", "x"), false);
        }
        let mut spread = ArrivalEvidence::default();
        for topic in ["a", "b", "c"] {
            spread.record(&arrival(topic, "x"), false);
        }

        let names = topics(&["a", "b", "c"]);
        let first =
            LivenessReport::from_window(&names, &outcome(concentrated, vec![], WindowState::Closed));
        let second =
            LivenessReport::from_window(&names, &outcome(spread, vec![], WindowState::Closed));
        assert!(first.overall_success);
        assert!(second.overall_success);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut evidence = ArrivalEvidence::default();
        evidence.record(&arrival("a", "1"), true);
        evidence.record(&arrival("a", "2"), true);
        let frozen = outcome(evidence, vec!["Connection lost: eof".to_string()], WindowState::Closed);

        let names = topics(&["a", "b"]);
        let first = LivenessReport::from_window(&names, &frozen);
        let second = LivenessReport::from_window(&names, &frozen);
        assert_eq!(first, second);
    }

    #[test]
    fn counts_accumulate_per_topic() {
        let mut evidence = ArrivalEvidence::default();
        evidence.record(&arrival("a", "1"), true);
        evidence.record(&arrival("a", "2"), true);

        assert_eq!(evidence.total(), 2);
        assert_eq!(evidence.count_for("a"), 2);
        assert_eq!(evidence.count_for("b"), 0);
        let activity = evidence.iter().next().unwrap().1;
        assert_eq!(activity.last_payload.as_deref(), Some("2"));
    }

    #[test]
    fn payload_is_dropped_outside_diagnostic_runs() {
        let mut evidence = ArrivalEvidence::default();
        evidence.record(&arrival("a", "secret"), false);

        let activity = evidence.iter().next().unwrap().1;
        assert_eq!(activity.count, 1);
        assert!(activity.last_payload.is_none());
        assert!(activity.last_seen.is_none());
    }

    #[test]
    fn summary_lists_every_configured_topic() {
        let mut evidence = ArrivalEvidence::default();
        evidence.record(&arrival("zigbee/router1", "linkquality 84"), true);

        let report = LivenessReport::from_window(
            &topics(&["zigbee/router1", "zigbee/router2"]),
            &outcome(evidence, vec![], WindowState::Closed),
        );

        let summary = report.summary();
        assert!(summary.contains("zigbee/router1: 1 message(s)"));
        assert!(summary.contains("zigbee/router2: silent"));
        assert!(summary.starts_with("At least one monitored device"));
    }

    #[test]
    fn summary_includes_connection_errors() {
        let report = LivenessReport::from_window(
            &topics(&["a"]),
            &outcome(
                ArrivalEvidence::default(),
                vec!["Broker connection failed: timed out".to_string()],
                WindowState::Failed,
            ),
        );

        let summary = report.summary();
        assert!(summary.contains("error: Broker connection failed: timed out"));
        assert!(summary.starts_with("No MQTT message"));
    }

    #[test]
    fn alert_wording_distinguishes_silence_from_broker_trouble() {
        let silent = LivenessReport::from_window(
            &topics(&["a"]),
            &outcome(ArrivalEvidence::default(), vec![], WindowState::Closed),
        );
        assert!(silent.alert_message().starts_with("No MQTT message"));

        let unreachable = LivenessReport::from_window(
            &topics(&["a"]),
            &outcome(
                ArrivalEvidence::default(),
                vec!["Broker connection failed: refused".to_string()],
                WindowState::Failed,
            ),
        );
        assert!(unreachable.alert_message().starts_with("Could not reach"));
    }
}

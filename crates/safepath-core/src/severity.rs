//! Severity policies.
//!
//! The parser never decides how serious an open service is. A
//! [`SeverityPolicy`] does, so a smarter classifier can replace the fixed
//! placeholder without touching parsing or delivery.

use crate::finding::{FindingCandidate, Severity};
use std::collections::HashMap;

/// Assigns a severity to one candidate.
pub trait SeverityPolicy: Send + Sync {
    fn classify(&self, candidate: &FindingCandidate) -> Severity;
}

/// Every candidate gets the same severity.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeverity(Severity);

impl FixedSeverity {
    pub fn new(severity: Severity) -> Self {
        Self(severity)
    }
}

impl Default for FixedSeverity {
    fn default() -> Self {
        Self(Severity::Medium)
    }
}

impl SeverityPolicy for FixedSeverity {
    fn classify(&self, _candidate: &FindingCandidate) -> Severity {
        self.0
    }
}

/// Static lookup keyed on the detected service name, with a fallback.
#[derive(Debug, Clone)]
pub struct ServiceSeverityTable {
    services: HashMap<String, Severity>,
    fallback: Severity,
}

impl ServiceSeverityTable {
    /// Service names are matched case-insensitively.
    pub fn new(services: HashMap<String, Severity>, fallback: Severity) -> Self {
        let services = services
            .into_iter()
            .map(|(name, severity)| (name.to_ascii_lowercase(), severity))
            .collect();
        Self { services, fallback }
    }
}

impl SeverityPolicy for ServiceSeverityTable {
    fn classify(&self, candidate: &FindingCandidate) -> Severity {
        candidate
            .service
            .as_deref()
            .and_then(|name| self.services.get(&name.to_ascii_lowercase()))
            .copied()
            .unwrap_or(self.fallback)
    }
}

/// Pick the policy for a run: the table when overrides exist, otherwise the
/// fixed placeholder.
pub fn policy_for(
    default: Severity,
    overrides: &HashMap<String, Severity>,
) -> Box<dyn SeverityPolicy> {
    if overrides.is_empty() {
        Box::new(FixedSeverity::new(default))
    } else {
        Box::new(ServiceSeverityTable::new(overrides.clone(), default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(service: Option<&str>) -> FindingCandidate {
        FindingCandidate {
            host: "h".into(),
            ip: "10.0.0.1".into(),
            port: "23".into(),
            protocol: "tcp".into(),
            service: service.map(String::from),
            product: None,
            version: None,
            description: String::new(),
            evidence: String::new(),
        }
    }

    #[test]
    fn test_fixed_ignores_service() {
        let policy = FixedSeverity::default();
        assert_eq!(policy.classify(&candidate(Some("telnet"))), Severity::Medium);
        assert_eq!(policy.classify(&candidate(None)), Severity::Medium);
    }

    #[test]
    fn test_table_lookup_and_fallback() {
        let mut services = HashMap::new();
        services.insert("Telnet".to_string(), Severity::High);
        let policy = ServiceSeverityTable::new(services, Severity::Low);

        assert_eq!(policy.classify(&candidate(Some("telnet"))), Severity::High);
        assert_eq!(policy.classify(&candidate(Some("ssh"))), Severity::Low);
        assert_eq!(policy.classify(&candidate(None)), Severity::Low);
    }

    #[test]
    fn test_policy_for_selects_table_only_with_overrides() {
        let none = HashMap::new();
        let fixed = policy_for(Severity::Medium, &none);
        assert_eq!(fixed.classify(&candidate(Some("telnet"))), Severity::Medium);

        let mut overrides = HashMap::new();
        overrides.insert("telnet".to_string(), Severity::Critical);
        let table = policy_for(Severity::Medium, &overrides);
        assert_eq!(table.classify(&candidate(Some("telnet"))), Severity::Critical);
        assert_eq!(table.classify(&candidate(Some("http"))), Severity::Medium);
    }
}

use crate::severity::SeverityPolicy;
use serde::{Deserialize, Serialize};

/// Severity level attached to a delivered finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Wire value expected by the findings store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One open service observed in scan output, before a severity is assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindingCandidate {
    pub host: String,
    pub ip: String,
    pub port: String,
    pub protocol: String,
    pub service: Option<String>,
    pub product: Option<String>,
    pub version: Option<String>,
    pub description: String,
    pub evidence: String,
}

/// A normalized finding, shaped exactly like the body of `POST /api/findings`.
///
/// Identity and creation time belong to the store, so neither appears here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub host: String,
    pub ip: String,
    pub port: String,
    pub protocol: String,
    pub service: Option<String>,
    pub severity: Severity,
    pub description: String,
    pub evidence: String,
}

/// Join the detected product and version with a single space.
///
/// Returns an empty string when neither is known.
pub fn evidence_text(product: Option<&str>, version: Option<&str>) -> String {
    [product, version]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable one-line description of an open port.
pub fn describe(port: &str, protocol: &str, service: Option<&str>, evidence: &str) -> String {
    let mut description = format!(
        "open port {}/{} - service: {}",
        port,
        protocol,
        service.unwrap_or("unknown")
    );
    if !evidence.is_empty() {
        description.push_str(&format!(" ({})", evidence));
    }
    description
}

/// Turns parser candidates into deliverable findings.
pub struct FindingBuilder<'a> {
    policy: &'a dyn SeverityPolicy,
}

impl<'a> FindingBuilder<'a> {
    pub fn new(policy: &'a dyn SeverityPolicy) -> Self {
        Self { policy }
    }

    pub fn build(&self, candidate: FindingCandidate) -> Finding {
        let severity = self.policy.classify(&candidate);
        Finding {
            host: candidate.host,
            ip: candidate.ip,
            port: candidate.port,
            protocol: candidate.protocol,
            service: candidate.service,
            severity,
            description: candidate.description,
            evidence: candidate.evidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::severity::FixedSeverity;

    fn ssh_candidate() -> FindingCandidate {
        FindingCandidate {
            host: "srv1".into(),
            ip: "10.0.0.5".into(),
            port: "22".into(),
            protocol: "tcp".into(),
            service: Some("ssh".into()),
            product: Some("OpenSSH".into()),
            version: Some("8.9".into()),
            description: "open port 22/tcp - service: ssh (OpenSSH 8.9)".into(),
            evidence: "OpenSSH 8.9".into(),
        }
    }

    #[test]
    fn test_evidence_joins_product_and_version() {
        assert_eq!(evidence_text(Some("nginx"), Some("1.24.0")), "nginx 1.24.0");
        assert_eq!(evidence_text(Some("nginx"), None), "nginx");
        assert_eq!(evidence_text(None, Some("2.4")), "2.4");
        assert_eq!(evidence_text(None, None), "");
    }

    #[test]
    fn test_description_parenthetical_only_with_evidence() {
        assert_eq!(
            describe("443", "tcp", Some("https"), "nginx 1.24.0"),
            "open port 443/tcp - service: https (nginx 1.24.0)"
        );
        assert_eq!(
            describe("161", "udp", None, ""),
            "open port 161/udp - service: unknown"
        );
    }

    #[test]
    fn test_builder_applies_policy() {
        let policy = FixedSeverity::new(Severity::Low);
        let finding = FindingBuilder::new(&policy).build(ssh_candidate());
        assert_eq!(finding.severity, Severity::Low);
        assert_eq!(finding.host, "srv1");
        assert_eq!(finding.evidence, "OpenSSH 8.9");
    }

    #[test]
    fn test_finding_wire_shape() {
        let finding = FindingBuilder::new(&FixedSeverity::default()).build(ssh_candidate());
        let json = serde_json::to_value(&finding).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "host": "srv1",
                "ip": "10.0.0.5",
                "port": "22",
                "protocol": "tcp",
                "service": "ssh",
                "severity": "medium",
                "description": "open port 22/tcp - service: ssh (OpenSSH 8.9)",
                "evidence": "OpenSSH 8.9"
            })
        );
    }

    #[test]
    fn test_missing_service_serializes_as_null() {
        let mut candidate = ssh_candidate();
        candidate.service = None;
        let finding = FindingBuilder::new(&FixedSeverity::default()).build(candidate);
        let json = serde_json::to_value(&finding).unwrap();
        assert!(json["service"].is_null());
    }

}

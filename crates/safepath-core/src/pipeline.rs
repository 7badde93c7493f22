//! Single pass over all targets: scan, parse, build, deliver.

use crate::delivery::FindingSink;
use crate::finding::FindingBuilder;
use crate::nmap_xml::NmapXmlParser;
use crate::report::{RunSummary, TargetSummary};
use crate::scanner::ScanRunner;
use crate::severity::SeverityPolicy;
use crate::targets::TargetSet;
use tracing::{error, info};

/// Drives the scan-ingest flow for a set of targets.
///
/// Targets are processed one after another and findings are delivered one
/// at a time. A failure for one target or one finding is logged and counted;
/// it never stops the pass.
pub struct Pipeline<'a> {
    scanner: &'a dyn ScanRunner,
    policy: &'a dyn SeverityPolicy,
    sink: Option<&'a dyn FindingSink>,
}

impl<'a> Pipeline<'a> {
    /// A pipeline that builds findings but delivers nothing (dry run).
    pub fn new(scanner: &'a dyn ScanRunner, policy: &'a dyn SeverityPolicy) -> Self {
        Self {
            scanner,
            policy,
            sink: None,
        }
    }

    pub fn with_sink(mut self, sink: &'a dyn FindingSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.sink.is_none()
    }

    pub async fn run(&self, targets: &TargetSet) -> RunSummary {
        let mut summary = RunSummary::start(self.is_dry_run());
        let builder = FindingBuilder::new(self.policy);

        for target in targets.iter() {
            let output = self.scanner.scan(target).await;
            let candidates = NmapXmlParser::parse_or_empty(&output.stdout, target);
            info!(scan_target = %target, candidates = candidates.len(), "scan parsed");

            let mut outcome = TargetSummary::new(target, output.exit_ok);
            for candidate in candidates {
                let finding = builder.build(candidate);
                outcome.candidates += 1;

                let Some(sink) = self.sink else {
                    summary.findings.push(finding);
                    continue;
                };
                match sink.deliver(&finding).await {
                    Ok(_) => outcome.delivered += 1,
                    Err(e) => {
                        error!(
                            scan_target = %target,
                            host = %finding.host,
                            port = %finding.port,
                            severity = %finding.severity,
                            error = %e,
                            "dropping finding"
                        );
                        outcome.failed += 1;
                    }
                }
            }
            summary.record(outcome);
        }

        summary.finish();
        info!(
            targets = summary.targets.len(),
            candidates = summary.candidates,
            delivered = summary.delivered,
            failed = summary.failed,
            "finished - total reported candidates: {}",
            summary.candidates
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::finding::{Finding, Severity};
    use crate::scanner::ScanOutput;
    use crate::severity::FixedSeverity;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Returns canned XML per target and remembers the call order.
    #[derive(Default)]
    struct CannedScanner {
        outputs: HashMap<String, ScanOutput>,
        calls: Mutex<Vec<String>>,
    }

    impl CannedScanner {
        fn with(mut self, target: &str, xml: &str) -> Self {
            self.outputs.insert(
                target.to_string(),
                ScanOutput {
                    stdout: xml.to_string(),
                    exit_ok: true,
                },
            );
            self
        }
    }

    #[async_trait]
    impl ScanRunner for CannedScanner {
        async fn scan(&self, target: &str) -> ScanOutput {
            self.calls.lock().unwrap().push(target.to_string());
            self.outputs.get(target).cloned().unwrap_or_default()
        }
    }

    /// Accepts everything except the listed ports.
    #[derive(Default)]
    struct RecordingSink {
        reject_ports: Vec<String>,
        delivered: Mutex<Vec<Finding>>,
    }

    #[async_trait]
    impl FindingSink for RecordingSink {
        async fn deliver(&self, finding: &Finding) -> Result<u32> {
            if self.reject_ports.contains(&finding.port) {
                return Err(Error::DeliveryExhausted {
                    attempts: 3,
                    last_error: "HTTP 500".into(),
                });
            }
            self.delivered.lock().unwrap().push(finding.clone());
            Ok(1)
        }
    }

    fn host_xml(ip: &str, open_ports: &[&str]) -> String {
        let ports: String = open_ports
            .iter()
            .map(|p| {
                format!(
                    r#"<port protocol="tcp" portid="{}"><state state="open"/><service name="http"/></port>"#,
                    p
                )
            })
            .collect();
        format!(
            r#"<nmaprun><host><address addr="{}"/><ports>{}<port protocol="tcp" portid="1"><state state="closed"/></port></ports></host></nmaprun>"#,
            ip, ports
        )
    }

    #[tokio::test]
    async fn test_targets_run_in_order_and_counts_add_up() {
        let scanner = CannedScanner::default()
            .with("a", &host_xml("10.0.0.1", &["80", "443"]))
            .with("b", &host_xml("10.0.0.2", &["22"]));
        let sink = RecordingSink {
            reject_ports: vec!["443".into()],
            ..Default::default()
        };
        let policy = FixedSeverity::default();

        let summary = Pipeline::new(&scanner, &policy)
            .with_sink(&sink)
            .run(&TargetSet::parse("a,b"))
            .await;

        assert_eq!(*scanner.calls.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(summary.candidates, 3);
        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.failed, 1);
        assert!(summary.findings.is_empty());

        let delivered = sink.delivered.lock().unwrap();
        let ports: Vec<&str> = delivered.iter().map(|f| f.port.as_str()).collect();
        assert_eq!(ports, vec!["80", "22"]);
        assert!(delivered.iter().all(|f| f.severity == Severity::Medium));
    }

    #[tokio::test]
    async fn test_failed_scan_does_not_stop_the_run() {
        // "down" has no canned output, like a scan that timed out.
        let scanner = CannedScanner::default()
            .with("garbled", "<nmaprun><host>")
            .with("up", &host_xml("10.0.0.3", &["8080"]));
        let sink = RecordingSink::default();
        let policy = FixedSeverity::default();

        let summary = Pipeline::new(&scanner, &policy)
            .with_sink(&sink)
            .run(&TargetSet::parse("down,garbled,up"))
            .await;

        assert_eq!(summary.targets.len(), 3);
        assert_eq!(summary.failed_scans(), 1);
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.delivered, 1);
    }

    #[tokio::test]
    async fn test_dry_run_collects_findings() {
        let scanner = CannedScanner::default().with("a", &host_xml("10.0.0.1", &["80"]));
        let policy = FixedSeverity::new(Severity::Info);
        let pipeline = Pipeline::new(&scanner, &policy);
        assert!(pipeline.is_dry_run());

        let summary = pipeline.run(&TargetSet::parse("a")).await;
        assert!(summary.dry_run);
        assert_eq!(summary.candidates, 1);
        assert_eq!(summary.delivered, 0);
        assert_eq!(summary.findings[0].ip, "10.0.0.1");
        assert_eq!(summary.findings[0].host, "a");
        assert_eq!(summary.findings[0].severity, Severity::Info);
    }

    #[tokio::test]
    async fn test_pipeline_is_repeatable() {
        let scanner = CannedScanner::default().with("a", &host_xml("10.0.0.1", &["80"]));
        let policy = FixedSeverity::default();
        let pipeline = Pipeline::new(&scanner, &policy);
        let targets = TargetSet::parse("a");

        let first = pipeline.run(&targets).await;
        let second = pipeline.run(&targets).await;
        assert_eq!(first.findings, second.findings);
    }
}

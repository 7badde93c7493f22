use colored::*;
use safepath_core::report::{format_duration, RunSummary};
use safepath_core::{Finding, Severity};
use std::path::Path;

/// Print the summary of one scan pass to the terminal.
pub fn print_run_summary(summary: &RunSummary) {
    println!();
    let mode = if summary.dry_run { " (dry run)" } else { "" };
    println!(
        "{}",
        format!(
            " safepath v{}: scan pass{} finished in {}",
            env!("CARGO_PKG_VERSION"),
            mode,
            format_duration(summary.elapsed_secs())
        )
        .bold()
    );
    println!();

    println!(" {}", "Targets".bold().underline());
    for target in &summary.targets {
        let status = if target.scan_ok {
            "OK".green().bold()
        } else {
            "SCAN FAILED".red().bold()
        };
        println!(
            " {} {:<28} {:>12}  {} candidates, {} delivered, {} failed",
            "|-".dimmed(),
            target.target.cyan(),
            status,
            target.candidates,
            target.delivered,
            target.failed
        );
    }
    println!();

    if !summary.findings.is_empty() {
        for finding in &summary.findings {
            print_finding(finding);
        }
        println!();
    }

    println!(" {}", "=".repeat(60).dimmed());
    println!();
    println!(" {}", "Summary".bold().underline());
    println!(
        " {} Total reported candidates: {}",
        "|-".dimmed(),
        summary.candidates.to_string().bold()
    );
    if !summary.dry_run {
        println!(
            " {} Delivered:                 {} ({:.0}%)",
            "|-".dimmed(),
            summary.delivered.to_string().green(),
            summary.delivery_rate_pct()
        );
        let failed = if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().normal()
        };
        println!(" {} Dropped:                   {}", "|-".dimmed(), failed);
    }
    if summary.failed_scans() > 0 {
        println!(
            " {} Scans with errors:         {}",
            "|-".dimmed(),
            summary.failed_scans().to_string().yellow()
        );
    }
    println!();
}

/// Print findings parsed from a saved scan file.
pub fn print_findings(path: &Path, findings: &[Finding]) {
    println!();
    println!(
        "{}",
        format!(" safepath: {} finding(s) in {}", findings.len(), path.display()).bold()
    );
    println!();

    if findings.is_empty() {
        println!(" {} No open ports in this scan.", "OK".green().bold());
        println!();
        return;
    }

    for finding in findings {
        print_finding(finding);
    }
    println!();
}

fn print_finding(finding: &Finding) {
    let severity_label = colorize_severity(finding.severity);
    println!(
        " {} {} {}",
        severity_label,
        format!("{}:{}/{}", finding.ip, finding.port, finding.protocol).bold(),
        format!("({})", finding.host).dimmed()
    );
    println!("   {} {}", "|".dimmed(), finding.description);
}

pub fn print_health(url: &str, healthy: bool) {
    if healthy {
        println!(" {} {}", "HEALTHY".green().bold(), url);
    } else {
        println!(" {} {}", "UNHEALTHY".red().bold(), url);
    }
}

fn colorize_severity(severity: Severity) -> ColoredString {
    let label = format!("{:<8}", severity.symbol());
    match severity {
        Severity::Critical => label.red().bold(),
        Severity::High => label.yellow().bold(),
        Severity::Medium => label.yellow(),
        Severity::Low => label.blue(),
        Severity::Info => label.white(),
    }
}

//! Running the external scanner as a subprocess.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Default scanner program.
pub const DEFAULT_PROGRAM: &str = "nmap";

/// Service-version detection, XML written to stdout.
pub const DEFAULT_ARGS: [&str; 3] = ["-sV", "-oX", "-"];

/// Captured result of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub stdout: String,
    /// Whether the scanner ran and exited with status zero.
    pub exit_ok: bool,
}

impl ScanOutput {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Something that can scan a single target.
///
/// Implementations never fail: a scan that could not run yields
/// [`ScanOutput::empty`] so the rest of the run is unaffected.
#[async_trait]
pub trait ScanRunner: Send + Sync {
    async fn scan(&self, target: &str) -> ScanOutput;
}

/// Runs nmap (or a compatible program) against one target at a time.
#[derive(Debug, Clone)]
pub struct NmapInvoker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl NmapInvoker {
    /// `args` go before the target, which is always the last argument.
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(
            DEFAULT_PROGRAM,
            DEFAULT_ARGS.iter().map(|a| a.to_string()).collect(),
            timeout,
        )
    }

    pub fn command_line(&self, target: &str) -> String {
        let mut parts = vec![self.program.as_str()];
        parts.extend(self.args.iter().map(String::as_str));
        parts.push(target);
        parts.join(" ")
    }

    /// Run the scanner and wait for it, up to the configured timeout.
    ///
    /// A non-zero exit is not an error: nmap can print usable XML next to
    /// warnings, so whatever reached stdout is returned.
    pub async fn invoke(&self, target: &str) -> Result<ScanOutput> {
        info!(scan_target = %target, command = %self.command_line(target), "running scanner");

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Invocation {
                program: self.program.clone(),
                source,
            })?;

        // Dropping the pending wait on timeout kills the child.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(waited) => waited.map_err(|source| Error::Invocation {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(Error::ScanTimeout {
                    target: target.to_string(),
                    secs: self.timeout.as_secs_f64(),
                })
            }
        };

        let exit_ok = output.status.success();
        if !exit_ok {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(
                scan_target = %target,
                status = %output.status,
                stderr = %stderr.trim(),
                "scanner exited with non-zero status"
            );
        }

        Ok(ScanOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            exit_ok,
        })
    }
}

#[async_trait]
impl ScanRunner for NmapInvoker {
    async fn scan(&self, target: &str) -> ScanOutput {
        match self.invoke(target).await {
            Ok(output) => output,
            Err(e) => {
                error!(scan_target = %target, error = %e, "scan failed, continuing with empty output");
                ScanOutput::empty()
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> NmapInvoker {
        NmapInvoker::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "sh".to_string()],
            timeout,
        )
    }

    #[test]
    fn test_default_command_line() {
        let invoker = NmapInvoker::with_timeout(Duration::from_secs(120));
        assert_eq!(invoker.command_line("10.0.0.5"), "nmap -sV -oX - 10.0.0.5");
    }

    #[tokio::test]
    async fn test_target_is_last_argument() {
        let invoker = sh("echo \"scanning $1\"", Duration::from_secs(5));
        let output = invoker.invoke("10.0.0.5").await.unwrap();
        assert_eq!(output.stdout, "scanning 10.0.0.5\n");
        assert!(output.exit_ok);
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_stdout() {
        let invoker = sh("echo '<nmaprun/>'; echo 'warning' >&2; exit 3", Duration::from_secs(5));
        let output = invoker.invoke("t").await.unwrap();
        assert_eq!(output.stdout, "<nmaprun/>\n");
        assert!(!output.exit_ok);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_and_absorbed() {
        let invoker = sh("sleep 5", Duration::from_millis(200));
        let err = invoker.invoke("slow-host").await.unwrap_err();
        assert!(matches!(err, Error::ScanTimeout { .. }));

        assert_eq!(invoker.scan("slow-host").await, ScanOutput::empty());
    }

    #[tokio::test]
    async fn test_missing_program_is_absorbed() {
        let invoker = NmapInvoker::new(
            "/nonexistent/safepath-nmap",
            Vec::new(),
            Duration::from_secs(1),
        );
        let err = invoker.invoke("t").await.unwrap_err();
        assert!(matches!(err, Error::Invocation { .. }));

        let output = invoker.scan("t").await;
        assert!(output.stdout.is_empty());
        assert!(!output.exit_ok);
    }
}

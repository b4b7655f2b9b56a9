//! npm CLI registry backend
//!
//! Runs `npm view` as a child process. Output is read concurrently from both
//! pipes under one deadline; a child that overruns it gets SIGTERM, a short
//! grace period, then a hard kill.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use graft_config::RegistrySettings;
use graft_core::error::GraftError;
use graft_core::types::Version;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::api::VersionMetadata;
use crate::source::RegistrySource;
use crate::RegistryResult;

/// Lines of stderr kept in error messages
const STDERR_SUMMARY_LINES: usize = 3;

/// Headroom on top of the kill grace for reaping a killed child
const REAP_MARGIN: Duration = Duration::from_millis(500);

/// Registry backend that shells out to the npm CLI
#[derive(Debug, Clone)]
pub struct NpmCommandRegistry {
    program: String,
    registry_url: Option<String>,
    timeout: Duration,
    kill_grace: Duration,
}

/// Captured result of one finished command
#[derive(Debug)]
struct CommandOutput {
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

impl NpmCommandRegistry {
    pub fn new(settings: &RegistrySettings) -> Self {
        Self {
            program: settings.command.clone(),
            registry_url: settings.registry_url.clone(),
            timeout: settings.timeout(),
            kill_grace: settings.kill_grace(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for `npm view <spec> [field] --json [--registry url]`
    fn view_args(&self, spec: &str, field: Option<&str>) -> Vec<String> {
        let mut args = vec!["view".to_string(), spec.to_string()];
        if let Some(field) = field {
            args.push(field.to_string());
        }
        args.push("--json".to_string());
        if let Some(url) = &self.registry_url {
            args.push("--registry".to_string());
            args.push(url.clone());
        }
        args
    }

    async fn run(&self, package: &str, args: &[String]) -> RegistryResult<CommandOutput> {
        debug!(program = %self.program, ?args, "running registry command");

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| GraftError::io(format!("Failed to run '{}'", self.program), e))?;

        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(GraftError::RegistryFetch {
                package: package.to_string(),
                message: "child process pipes unavailable".to_string(),
            });
        };
        let mut child = ChildGuard::new(child, self.kill_grace);

        let outcome = tokio::time::timeout(self.timeout, async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            tokio::try_join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err))?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out, err))
        })
        .await;

        match outcome {
            Ok(Ok((status, out, err))) => Ok(CommandOutput {
                success: status.success(),
                code: status.code(),
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
            }),
            Ok(Err(e)) => Err(GraftError::io(format!("Failed to read output of '{}'", self.program), e)),
            Err(_) => {
                child.terminate(&self.program).await;
                Err(GraftError::timeout(
                    format!("{} {}", self.program, args.join(" ")),
                    self.timeout,
                ))
            },
        }
    }

    fn check_status(&self, package: &str, output: &CommandOutput) -> RegistryResult<()> {
        if output.success {
            return Ok(());
        }
        let combined = format!("{}\n{}", output.stderr, output.stdout);
        if combined.contains("E404") || combined.contains("404 Not Found") {
            return Err(GraftError::PackageNotFound {
                name: package.to_string(),
            });
        }
        let summary = summarize(&output.stderr);
        Err(GraftError::RegistryFetch {
            package: package.to_string(),
            message: match output.code {
                Some(code) if summary.is_empty() => format!("npm exited with status {}", code),
                Some(code) => format!("npm exited with status {}: {}", code, summary),
                None if summary.is_empty() => "npm was terminated by a signal".to_string(),
                None => summary,
            },
        })
    }
}

#[async_trait]
impl RegistrySource for NpmCommandRegistry {
    async fn resolve_version(&self, name: &str, range: &str) -> RegistryResult<String> {
        let args = self.view_args(&format!("{}@{}", name, range), Some("version"));
        let output = self.run(name, &args).await?;
        self.check_status(name, &output)?;
        parse_version_output(name, range, &output.stdout)
    }

    async fn fetch_manifest(&self, name: &str, version: &str) -> RegistryResult<VersionMetadata> {
        let args = self.view_args(&format!("{}@{}", name, version), None);
        let output = self.run(name, &args).await?;
        self.check_status(name, &output)?;
        parse_manifest_output(name, &output.stdout)
    }

    fn backend_name(&self) -> &str {
        "npm-cli"
    }

    fn termination_grace(&self) -> Duration {
        self.kill_grace + REAP_MARGIN
    }
}

/// Owns a running child until it has been reaped.
///
/// Dropping the guard while the child is still alive (the caller's future was
/// cancelled) sends SIGTERM and hands the child to a background task that
/// kills it once the grace period runs out.
struct ChildGuard {
    child: Option<Child>,
    kill_grace: Duration,
}

impl ChildGuard {
    fn new(child: Child, kill_grace: Duration) -> Self {
        Self {
            child: Some(child),
            kill_grace,
        }
    }

    async fn wait(&mut self) -> std::io::Result<std::process::ExitStatus> {
        match self.child.as_mut() {
            Some(child) => child.wait().await,
            None => Err(std::io::Error::new(std::io::ErrorKind::Other, "child already released")),
        }
    }

    /// SIGTERM, wait out the grace period, then kill
    async fn terminate(&mut self, program: &str) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        if let Some(pid) = child.id() {
            signal_terminate(pid);
            if tokio::time::timeout(self.kill_grace, child.wait()).await.is_ok() {
                return;
            }
        }
        if let Err(e) = child.kill().await {
            warn!(program, error = %e, "failed to kill timed-out registry command");
        }
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if matches!(child.try_wait(), Ok(Some(_))) {
            return;
        }
        if let Some(pid) = child.id() {
            signal_terminate(pid);
        }
        // Without a runtime the child is dropped here and kill_on_drop applies
        if let Ok(handle) = Handle::try_current() {
            let grace = self.kill_grace;
            handle.spawn(async move {
                if tokio::time::timeout(grace, child.wait()).await.is_err() {
                    if let Err(e) = child.kill().await {
                        debug!(error = %e, "failed to kill abandoned registry command");
                    }
                }
            });
        }
    }
}

#[cfg(unix)]
fn signal_terminate(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn signal_terminate(_pid: u32) {}

fn summarize(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(STDERR_SUMMARY_LINES)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Parse the output of `npm view <name>@<range> version --json`.
///
/// One match prints a JSON string, several print an array in ascending
/// order, none prints nothing.
pub fn parse_version_output(name: &str, range: &str, stdout: &str) -> RegistryResult<String> {
    let trimmed = stdout.trim();
    let no_match = || GraftError::RegistryFetch {
        package: name.to_string(),
        message: format!("No matching version found for {}@{}", name, range),
    };
    if trimmed.is_empty() {
        return Err(no_match());
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::String(version)) => Ok(version),
        Ok(serde_json::Value::Array(items)) => items
            .iter()
            .rev()
            .find_map(|item| item.as_str().map(str::to_string))
            .ok_or_else(no_match),
        Ok(other) => Err(GraftError::RegistryFetch {
            package: name.to_string(),
            message: format!("unexpected version output: {}", other),
        }),
        Err(_) if Version::parse(trimmed).is_ok() => Ok(trimmed.to_string()),
        Err(_) => Err(GraftError::RegistryFetch {
            package: name.to_string(),
            message: format!("unexpected version output: {}", summarize(trimmed)),
        }),
    }
}

/// Parse the output of `npm view <name>@<version> --json`
pub fn parse_manifest_output(name: &str, stdout: &str) -> RegistryResult<VersionMetadata> {
    let malformed = |message: String| GraftError::ManifestParse {
        package: name.to_string(),
        message,
    };

    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(malformed("npm printed no manifest".to_string()));
    }

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| malformed(e.to_string()))?;
    // A range that still matched several versions prints one manifest each
    let value = match value {
        serde_json::Value::Array(mut items) => items
            .pop()
            .ok_or_else(|| malformed("npm printed an empty manifest list".to_string()))?,
        other => other,
    };
    if !value.is_object() {
        return Err(malformed(format!("expected a JSON object, got {}", value)));
    }
    serde_json::from_value(value).map_err(|e| malformed(e.to_string()))
}

use std::sync::mpsc;
use std::sync::RwLock;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::bridge::encoding::normalize;
use crate::app::bridge::parse::{
    parse_discovery_output, parse_getprop_map, parse_launch_activity, parse_package_list,
    DiscoveryFault,
};
use crate::app::bridge::registry::DeviceRegistry;
use crate::app::bridge::runner::{run_command, run_command_with_timeout};
use crate::app::config::BridgeConfig;
use crate::app::error::{BridgeError, ErrorCode};
use crate::app::models::{Device, DeviceProfile};

const REMOTE_CAPTURE_PATH: &str = "/sdcard/screenshot.png";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Push,
    Pull,
}

/// Device-scoped operations against the external bridge binary: discovery
/// polling into the registry, shell execution with encoding normalization
/// and timeouts, transfers, and privilege escalation.
///
/// Owns the only two pieces of shared mutable state (device registry and
/// privileged-mode flag), each behind its own lock; the two locks are
/// never held at the same time.
pub struct BridgeSession {
    config: BridgeConfig,
    registry: DeviceRegistry,
    privileged: RwLock<bool>,
}

pub(crate) fn resolve_trace_id(input: Option<&str>) -> String {
    input
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn scoped_args(target: &str, tail: &[&str]) -> Vec<String> {
    let mut args = Vec::with_capacity(tail.len() + 2);
    if !target.is_empty() {
        args.push("-s".to_string());
        args.push(target.to_string());
    }
    args.extend(tail.iter().map(|value| value.to_string()));
    args
}

fn shell_args(target: &str, command: &str) -> Vec<String> {
    scoped_args(target, &["shell", command])
}

fn display_target(target: &str) -> &str {
    if target.is_empty() {
        "(default)"
    } else {
        target
    }
}

fn classify_shell_failure(text: &str, trace_id: &str) -> BridgeError {
    if text.contains("doesn't match") {
        return BridgeError::version_mismatch("bridge client/server version skew", trace_id)
            .with_output(text);
    }
    if text.contains("device not found")
        || text.contains("unauthorized")
        || text.contains("offline")
    {
        return BridgeError::new(ErrorCode::DeviceUnreachable, "device unreachable", trace_id)
            .with_output(text);
    }
    BridgeError::new(ErrorCode::CommandFailed, "shell command failed", trace_id)
        .with_output(text)
}

impl BridgeSession {
    pub fn new(config: BridgeConfig) -> Self {
        let registry = DeviceRegistry::from_config(&config);
        Self {
            config,
            registry,
            privileged: RwLock::new(false),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(BridgeConfig::default())
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn set_privileged_mode(&self, enabled: bool) {
        match self.privileged.write() {
            Ok(mut guard) => {
                *guard = enabled;
                info!(enabled, "privileged command mode toggled");
            }
            Err(_) => warn!("privileged flag lock poisoned; toggle dropped"),
        }
    }

    pub fn is_privileged_mode(&self) -> bool {
        self.privileged.read().map(|guard| *guard).unwrap_or(false)
    }

    fn apply_privilege(&self, command: &str) -> String {
        let token = self.config.privileged_token.as_str();
        if self.is_privileged_mode() && !command.starts_with(&format!("{token} ")) {
            format!("{token} {command}")
        } else {
            command.to_string()
        }
    }

    /// One discovery poll reconciled into the registry. A tool fault
    /// (wedged server, version skew) aborts reconciliation and leaves the
    /// registry exactly as it was; the previous snapshot stays available
    /// through [`BridgeSession::devices`].
    pub fn list_devices(&self, trace_id: Option<&str>) -> Result<Vec<Device>, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let args = vec!["devices".to_string(), "-l".to_string()];
        let raw = run_command(&self.config.program, &args, &trace_id)?;
        let (text, recovered) = normalize(&raw.combined());
        if recovered {
            info!(trace_id = %trace_id, "discovery output transcoded");
        }

        let records = match parse_discovery_output(&text) {
            Ok(records) => records,
            Err(DiscoveryFault::ToolUnhealthy { line }) => {
                warn!(trace_id = %trace_id, line = %line, "bridge server unhealthy; registry preserved");
                return Err(BridgeError::tool_unhealthy(
                    "bridge server needs restart",
                    &trace_id,
                )
                .with_output(text));
            }
            Err(DiscoveryFault::VersionMismatch { line }) => {
                warn!(trace_id = %trace_id, line = %line, "bridge version skew; registry preserved");
                return Err(BridgeError::version_mismatch(
                    "bridge client/server version skew",
                    &trace_id,
                )
                .with_output(text));
            }
        };

        if !raw.success() {
            warn!(trace_id = %trace_id, exit_code = ?raw.exit_code, "device discovery failed; registry preserved");
            return Err(
                BridgeError::new(ErrorCode::CommandFailed, "device discovery failed", &trace_id)
                    .with_output(text),
            );
        }

        self.registry.reconcile(&records, Utc::now(), &trace_id)
    }

    /// Current registry snapshot without a new poll.
    pub fn devices(&self, trace_id: Option<&str>) -> Result<Vec<Device>, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        self.registry.snapshot(&trace_id)
    }

    pub fn connect(&self, address: &str, trace_id: Option<&str>) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        if address.trim().is_empty() {
            return Err(BridgeError::invalid_input("address is required", &trace_id));
        }
        info!(trace_id = %trace_id, address = %address, "connecting");
        let raw = run_command(
            &self.config.program,
            &scoped_args("", &["connect", address]),
            &trace_id,
        )?;
        let (text, _) = normalize(&raw.combined());
        if !raw.success() || !text.contains("connected") {
            warn!(trace_id = %trace_id, address = %address, "connect failed");
            return Err(BridgeError::new(
                ErrorCode::DeviceUnreachable,
                format!("failed to connect {address}"),
                &trace_id,
            )
            .with_output(text));
        }
        self.registry.mark_connected(address, Utc::now(), &trace_id)?;
        Ok(())
    }

    pub fn disconnect(&self, identifier: &str, trace_id: Option<&str>) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let raw = run_command(
            &self.config.program,
            &scoped_args("", &["disconnect", identifier]),
            &trace_id,
        )?;
        if !raw.success() {
            let (text, _) = normalize(&raw.combined());
            return Err(BridgeError::new(
                ErrorCode::CommandFailed,
                format!("failed to disconnect {identifier}"),
                &trace_id,
            )
            .with_output(text));
        }
        self.registry.forget(identifier, &trace_id)?;
        info!(trace_id = %trace_id, identifier = %identifier, "disconnected and forgotten");
        Ok(())
    }

    pub fn remove_device(
        &self,
        identifier: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        self.registry.remove(identifier, &trace_id)
    }

    pub fn forget_device(
        &self,
        identifier: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        self.registry.forget(identifier, &trace_id)
    }

    /// Runs a shell command on the target (empty target means the default
    /// device), prefixed with the privileged token when the session flag
    /// is on. Output is always normalized before being returned.
    pub fn execute(
        &self,
        target: &str,
        command: &str,
        trace_id: Option<&str>,
    ) -> Result<String, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        self.run_shell(target, command, self.config.command_timeout(), &trace_id)
    }

    /// Same contract as [`BridgeSession::execute`], with the child process
    /// hard-killed if it outlives `timeout`.
    pub fn execute_with_timeout(
        &self,
        target: &str,
        command: &str,
        timeout: Duration,
        trace_id: Option<&str>,
    ) -> Result<String, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        self.run_shell(target, command, timeout, &trace_id)
    }

    fn run_shell(
        &self,
        target: &str,
        command: &str,
        timeout: Duration,
        trace_id: &str,
    ) -> Result<String, BridgeError> {
        let wrapped = self.apply_privilege(command);
        info!(
            trace_id = %trace_id,
            target = %display_target(target),
            command = %wrapped,
            "executing shell command"
        );
        let raw = run_command_with_timeout(
            &self.config.program,
            &shell_args(target, &wrapped),
            timeout,
            trace_id,
        )?;
        let (text, recovered) = normalize(&raw.combined());
        if recovered {
            info!(trace_id = %trace_id, target = %display_target(target), "command output transcoded");
        }
        if !raw.success() {
            let err = classify_shell_failure(&text, trace_id);
            warn!(
                trace_id = %trace_id,
                target = %display_target(target),
                command = %wrapped,
                code = err.code.as_str(),
                "shell command failed"
            );
            return Err(err);
        }
        debug!(trace_id = %trace_id, target = %display_target(target), "shell command succeeded");
        Ok(text)
    }

    /// Switches the bridge daemon on the target into root mode.
    pub fn enable_root(&self, target: &str, trace_id: Option<&str>) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let raw = run_command(
            &self.config.program,
            &scoped_args(target, &["root"]),
            &trace_id,
        )?;
        if !raw.success() {
            let (text, _) = normalize(&raw.combined());
            return Err(BridgeError::new(
                ErrorCode::CommandFailed,
                "failed to enable root",
                &trace_id,
            )
            .with_output(text));
        }
        Ok(())
    }

    /// Privileged execution: in-shell `su` first, then one fallback to
    /// switching the whole session into root mode and retrying the plain
    /// command. Never more than one retry.
    pub fn escalate(
        &self,
        target: &str,
        command: &str,
        trace_id: Option<&str>,
    ) -> Result<String, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let su_command = format!("su -c \"{command}\"");
        let first = match self.run_shell(target, &su_command, self.config.command_timeout(), &trace_id)
        {
            Ok(output) => return Ok(output),
            Err(err) => err,
        };

        if self.enable_root(target, Some(&trace_id)).is_ok() {
            return self
                .run_shell(target, command, self.config.command_timeout(), &trace_id)
                .map_err(|retry| {
                    let mut err = BridgeError::new(
                        ErrorCode::PermissionDenied,
                        "privilege escalation failed on both paths",
                        &trace_id,
                    );
                    err.output = retry.output;
                    err
                });
        }

        let mut err = BridgeError::new(
            ErrorCode::PermissionDenied,
            "privilege escalation failed on both paths",
            &trace_id,
        );
        err.output = first.output;
        Err(err)
    }

    /// Push or pull without any output parsing; diagnostics on failure are
    /// still normalized.
    pub fn transfer(
        &self,
        target: &str,
        direction: TransferDirection,
        local_path: &str,
        remote_path: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let args = match direction {
            TransferDirection::Push => scoped_args(target, &["push", local_path, remote_path]),
            TransferDirection::Pull => scoped_args(target, &["pull", remote_path, local_path]),
        };
        info!(
            trace_id = %trace_id,
            target = %display_target(target),
            direction = ?direction,
            local = %local_path,
            remote = %remote_path,
            "file transfer"
        );
        let raw = run_command_with_timeout(
            &self.config.program,
            &args,
            self.config.transfer_timeout(),
            &trace_id,
        )?;
        if !raw.success() {
            let (text, _) = normalize(&raw.combined());
            warn!(trace_id = %trace_id, target = %display_target(target), "transfer failed");
            return Err(
                BridgeError::new(ErrorCode::TransferFailed, "file transfer failed", &trace_id)
                    .with_output(text),
            );
        }
        Ok(())
    }

    pub fn push(
        &self,
        target: &str,
        local_path: &str,
        remote_path: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.transfer(target, TransferDirection::Push, local_path, remote_path, trace_id)
    }

    pub fn pull(
        &self,
        target: &str,
        remote_path: &str,
        local_path: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        self.transfer(target, TransferDirection::Pull, local_path, remote_path, trace_id)
    }

    /// Remote screen capture, transfer back, and remote cleanup as one
    /// unit bounded by the capture timeout. On timeout the worker is
    /// abandoned and the remote temporary file may remain (cleanup is
    /// best-effort only).
    pub fn capture_screen(
        &self,
        target: &str,
        local_path: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let program = self.config.program.clone();
        let target_owned = target.to_string();
        let local_owned = local_path.to_string();
        let worker_trace = trace_id.clone();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let result = capture_unit(&program, &target_owned, &local_owned, &worker_trace);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.config.capture_timeout()) {
            Ok(result) => result,
            Err(_) => {
                warn!(trace_id = %trace_id, target = %display_target(target), "screen capture timed out");
                Err(BridgeError::timeout(
                    "screen capture timed out; remote temp file may remain",
                    &trace_id,
                ))
            }
        }
    }

    pub fn install_app(
        &self,
        target: &str,
        apk_path: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        info!(trace_id = %trace_id, target = %display_target(target), apk = %apk_path, "installing app");
        let raw = run_command_with_timeout(
            &self.config.program,
            &scoped_args(target, &["install", "-r", apk_path]),
            self.config.transfer_timeout(),
            &trace_id,
        )?;
        let (text, _) = normalize(&raw.combined());
        // The installer reports its own success marker; a zero exit code
        // alone is not enough.
        if !raw.success() || !text.contains("Success") {
            warn!(trace_id = %trace_id, target = %display_target(target), "install failed");
            return Err(
                BridgeError::new(ErrorCode::InstallFailed, "install failed", &trace_id)
                    .with_output(text),
            );
        }
        Ok(())
    }

    pub fn uninstall_app(
        &self,
        target: &str,
        package: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        info!(trace_id = %trace_id, target = %display_target(target), package = %package, "uninstalling app");
        let raw = run_command(
            &self.config.program,
            &scoped_args(target, &["uninstall", package]),
            &trace_id,
        )?;
        let (text, _) = normalize(&raw.combined());
        if !raw.success() || !text.contains("Success") {
            warn!(trace_id = %trace_id, target = %display_target(target), "uninstall failed");
            return Err(
                BridgeError::new(ErrorCode::UninstallFailed, "uninstall failed", &trace_id)
                    .with_output(text),
            );
        }
        Ok(())
    }

    pub fn start_app(
        &self,
        target: &str,
        package: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let resolve_command = format!("cmd package resolve-activity --brief {package}");
        let output = self.run_shell(
            target,
            &resolve_command,
            self.config.command_timeout(),
            &trace_id,
        )?;
        let Some(activity) = parse_launch_activity(&output) else {
            return Err(BridgeError::new(
                ErrorCode::CommandFailed,
                format!("no launchable activity for {package}"),
                &trace_id,
            )
            .with_output(output));
        };
        self.run_shell(
            target,
            &format!("am start -n {activity}"),
            self.config.command_timeout(),
            &trace_id,
        )?;
        Ok(())
    }

    pub fn stop_app(
        &self,
        target: &str,
        package: &str,
        trace_id: Option<&str>,
    ) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        self.run_shell(
            target,
            &format!("am force-stop {package}"),
            self.config.command_timeout(),
            &trace_id,
        )?;
        Ok(())
    }

    pub fn list_packages(
        &self,
        target: &str,
        trace_id: Option<&str>,
    ) -> Result<Vec<String>, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let output = self.run_shell(
            target,
            "pm list packages",
            self.config.command_timeout(),
            &trace_id,
        )?;
        Ok(parse_package_list(&output))
    }

    /// Static device properties from a single `getprop` pass.
    pub fn device_profile(
        &self,
        target: &str,
        trace_id: Option<&str>,
    ) -> Result<DeviceProfile, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let output =
            self.run_shell(target, "getprop", self.config.command_timeout(), &trace_id)?;
        let map = parse_getprop_map(&output);
        Ok(DeviceProfile {
            identifier: target.to_string(),
            model: map.get("ro.product.model").cloned(),
            manufacturer: map.get("ro.product.manufacturer").cloned(),
            brand: map.get("ro.product.brand").cloned(),
            android_version: map.get("ro.build.version.release").cloned(),
            api_level: map.get("ro.build.version.sdk").cloned(),
            cpu_abi: map.get("ro.product.cpu.abi").cloned(),
        })
    }

    /// Whether either escalation path yields a root shell on the target.
    pub fn has_root_access(&self, target: &str, trace_id: Option<&str>) -> bool {
        let trace_id = resolve_trace_id(trace_id);
        let output = match self.run_shell(
            target,
            "su -c 'id'",
            self.config.command_timeout(),
            &trace_id,
        ) {
            Ok(output) => Some(output),
            Err(_) => {
                if self.enable_root(target, Some(&trace_id)).is_ok() {
                    self.run_shell(target, "id", self.config.command_timeout(), &trace_id)
                        .ok()
                } else {
                    None
                }
            }
        };
        output.is_some_and(|text| text.contains("uid=0"))
    }

    /// The remediation behind `ToolUnhealthy`/`VersionMismatch`, exposed
    /// as an explicit operator action rather than run automatically.
    pub fn restart_server(&self, trace_id: Option<&str>) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        info!(trace_id = %trace_id, "restarting bridge server");
        let _ = run_command(
            &self.config.program,
            &scoped_args("", &["kill-server"]),
            &trace_id,
        );
        thread::sleep(Duration::from_millis(500));
        let raw = run_command(
            &self.config.program,
            &scoped_args("", &["start-server"]),
            &trace_id,
        )?;
        if !raw.success() {
            let (text, _) = normalize(&raw.combined());
            return Err(BridgeError::new(
                ErrorCode::CommandFailed,
                "failed to start bridge server",
                &trace_id,
            )
            .with_output(text));
        }
        Ok(())
    }

    /// Human-readable client/server health report for operator support.
    pub fn diagnose(&self, trace_id: Option<&str>) -> Result<String, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let mut report = String::from("bridge diagnostics\n\n");

        report.push_str("client version:\n");
        match run_command(
            &self.config.program,
            &scoped_args("", &["version"]),
            &trace_id,
        ) {
            Ok(raw) => {
                let (text, _) = normalize(&raw.combined());
                report.push_str(text.trim());
            }
            Err(err) => report.push_str(&format!("unavailable: {err}")),
        }

        report.push_str("\n\nserver: ");
        let probe = run_command_with_timeout(
            &self.config.program,
            &shell_args("", "getprop ro.build.version.release"),
            Duration::from_secs(5),
            &trace_id,
        );
        match probe {
            Ok(raw) if raw.success() && !raw.stdout.is_empty() => report.push_str("running"),
            _ => report.push_str("not responding (try restart_server)"),
        }
        report.push('\n');
        Ok(report)
    }
}

fn capture_unit(
    program: &str,
    target: &str,
    local_path: &str,
    trace_id: &str,
) -> Result<(), BridgeError> {
    let capture = run_command(
        program,
        &shell_args(target, &format!("screencap -p {REMOTE_CAPTURE_PATH}")),
        trace_id,
    )?;
    if !capture.success() {
        let (text, _) = normalize(&capture.combined());
        return Err(
            BridgeError::new(ErrorCode::CommandFailed, "screen capture failed", trace_id)
                .with_output(text),
        );
    }

    let pull = run_command(
        program,
        &scoped_args(target, &["pull", REMOTE_CAPTURE_PATH, local_path]),
        trace_id,
    )?;
    if !pull.success() {
        let (text, _) = normalize(&pull.combined());
        return Err(BridgeError::new(
            ErrorCode::TransferFailed,
            "failed to pull captured screen",
            trace_id,
        )
        .with_output(text));
    }

    // Best-effort cleanup of the remote temp file.
    let _ = run_command(
        program,
        &shell_args(target, &format!("rm {REMOTE_CAPTURE_PATH}")),
        trace_id,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::ErrorCode;

    fn session() -> BridgeSession {
        BridgeSession::with_defaults()
    }

    #[test]
    fn scoped_args_omit_serial_for_default_target() {
        assert_eq!(shell_args("", "ls"), vec!["shell", "ls"]);
        assert_eq!(
            shell_args("ABC123", "ls"),
            vec!["-s", "ABC123", "shell", "ls"]
        );
        assert_eq!(
            scoped_args("ABC123", &["pull", "/sdcard/a", "/tmp/a"]),
            vec!["-s", "ABC123", "pull", "/sdcard/a", "/tmp/a"]
        );
    }

    #[test]
    fn privileged_mode_prefixes_commands_without_doubling() {
        let session = session();
        assert_eq!(session.apply_privilege("ls"), "ls");

        session.set_privileged_mode(true);
        assert!(session.is_privileged_mode());
        assert_eq!(session.apply_privilege("ls"), "busybox ls");
        assert_eq!(session.apply_privilege("busybox ls"), "busybox ls");

        session.set_privileged_mode(false);
        assert!(!session.is_privileged_mode());
        assert_eq!(session.apply_privilege("ls"), "ls");
    }

    #[test]
    fn classifies_shell_failures() {
        assert_eq!(
            classify_shell_failure("error: device 'X' not found\ndevice not found", "t").code,
            ErrorCode::DeviceUnreachable
        );
        assert_eq!(
            classify_shell_failure("error: device unauthorized.", "t").code,
            ErrorCode::DeviceUnreachable
        );
        assert_eq!(
            classify_shell_failure("error: device offline", "t").code,
            ErrorCode::DeviceUnreachable
        );
        assert_eq!(
            classify_shell_failure("adb server version (40) doesn't match this client", "t").code,
            ErrorCode::VersionMismatch
        );
        let generic = classify_shell_failure("sh: nope: not found", "t");
        assert_eq!(generic.code, ErrorCode::CommandFailed);
        assert_eq!(generic.output.as_deref(), Some("sh: nope: not found"));
    }

    #[test]
    fn missing_binary_surfaces_tool_unavailable_and_preserves_registry() {
        let session = BridgeSession::new(BridgeConfig {
            program: "/definitely/not/a/real/bridge".to_string(),
            ..BridgeConfig::default()
        });
        let err = session.list_devices(Some("trace-missing")).expect_err("no binary");
        assert_eq!(err.code, ErrorCode::ToolUnavailable);
        assert!(session.devices(None).expect("snapshot").is_empty());
    }

    #[test]
    fn connect_rejects_empty_address() {
        let err = session().connect("  ", None).expect_err("empty address");
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[cfg(unix)]
    mod stubbed {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;
        use std::path::PathBuf;

        /// Writes an executable shell script standing in for the bridge
        /// binary so session flows can run without a real adb.
        fn write_stub(dir: &std::path::Path, body: &str) -> PathBuf {
            let path = dir.join("fake-adb");
            let mut file = std::fs::File::create(&path).expect("create stub");
            writeln!(file, "#!/bin/sh\n{body}").expect("write stub");
            let mut perms = file.metadata().expect("metadata").permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).expect("chmod stub");
            path
        }

        fn stub_session(dir: &std::path::Path, body: &str) -> BridgeSession {
            let program = write_stub(dir, body);
            BridgeSession::new(BridgeConfig {
                program: program.to_string_lossy().into_owned(),
                ..BridgeConfig::default()
            })
        }

        #[test]
        fn poll_then_version_skew_preserves_snapshot() {
            let dir = tempfile::tempdir().expect("tempdir");
            let marker = dir.path().join("first-poll-done");
            let body = format!(
                "if [ -f {marker} ]; then\n\
                 echo \"adb server version (40) doesn't match this client (41); killing...\"\n\
                 exit 1\n\
                 else\n\
                 touch {marker}\n\
                 echo \"List of devices attached\"\n\
                 echo \"ABC123 device model:Pixel6\"\n\
                 fi",
                marker = marker.display()
            );
            let session = stub_session(dir.path(), &body);

            let first = session.list_devices(Some("trace-poll")).expect("healthy poll");
            assert_eq!(first.len(), 1);
            assert_eq!(first[0].identifier, "ABC123");

            let err = session
                .list_devices(Some("trace-poll"))
                .expect_err("version skew poll");
            assert_eq!(err.code, ErrorCode::VersionMismatch);
            assert_eq!(err.remediation, Some(crate::app::error::Remediation::RestartServer));
            assert!(err.output.unwrap_or_default().contains("doesn't match"));

            let snapshot = session.devices(None).expect("snapshot");
            assert_eq!(snapshot, first);
        }

        #[test]
        fn wedged_server_sentinel_preserves_snapshot() {
            let dir = tempfile::tempdir().expect("tempdir");
            let marker = dir.path().join("first-poll-done");
            let body = format!(
                "if [ -f {marker} ]; then\n\
                 echo \"adb [server]\"\n\
                 else\n\
                 touch {marker}\n\
                 echo \"ABC123 device\"\n\
                 fi",
                marker = marker.display()
            );
            let session = stub_session(dir.path(), &body);

            session.list_devices(None).expect("healthy poll");
            let err = session.list_devices(None).expect_err("wedged server");
            assert_eq!(err.code, ErrorCode::ToolUnhealthy);
            assert_eq!(session.devices(None).expect("snapshot").len(), 1);
        }

        #[test]
        fn privileged_mode_changes_issued_shell_command() {
            let dir = tempfile::tempdir().expect("tempdir");
            // Echo the argv back so the test can observe what was issued.
            let session = stub_session(dir.path(), "echo \"$@\"");

            session.set_privileged_mode(true);
            let output = session.execute("", "ls", None).expect("execute");
            assert!(output.contains("shell busybox ls"), "got: {output}");

            session.set_privileged_mode(false);
            let output = session.execute("", "ls", None).expect("execute");
            assert!(output.contains("shell ls"), "got: {output}");
            assert!(!output.contains("busybox"));
        }

        #[test]
        fn execute_with_timeout_kills_hung_command() {
            let dir = tempfile::tempdir().expect("tempdir");
            let session = stub_session(dir.path(), "sleep 30");
            let err = session
                .execute_with_timeout("", "ls", Duration::from_millis(200), None)
                .expect_err("hung command");
            assert_eq!(err.code, ErrorCode::Timeout);
        }

        #[test]
        fn install_requires_success_marker() {
            let dir = tempfile::tempdir().expect("tempdir");
            let session = stub_session(dir.path(), "echo \"Failure [INSTALL_FAILED_TEST]\"");
            let err = session
                .install_app("ABC123", "/tmp/app.apk", None)
                .expect_err("marker missing");
            assert_eq!(err.code, ErrorCode::InstallFailed);
            assert!(err.output.unwrap_or_default().contains("INSTALL_FAILED_TEST"));

            let ok = stub_session(dir.path(), "echo Success");
            ok.install_app("ABC123", "/tmp/app.apk", None).expect("install");
        }

        #[test]
        fn capture_screen_times_out_as_timeout_error() {
            let dir = tempfile::tempdir().expect("tempdir");
            let program = write_stub(dir.path(), "sleep 30");
            let session = BridgeSession::new(BridgeConfig {
                program: program.to_string_lossy().into_owned(),
                capture_timeout_secs: 1,
                ..BridgeConfig::default()
            });
            let local = dir.path().join("shot.png");
            let err = session
                .capture_screen("ABC123", &local.to_string_lossy(), None)
                .expect_err("capture hangs");
            assert_eq!(err.code, ErrorCode::Timeout);
        }

        #[test]
        fn list_packages_parses_stub_output() {
            let dir = tempfile::tempdir().expect("tempdir");
            let session = stub_session(
                dir.path(),
                "echo package:com.example.one; echo package:com.example.two",
            );
            let packages = session.list_packages("ABC123", None).expect("packages");
            assert_eq!(packages, vec!["com.example.one", "com.example.two"]);
        }
    }
}

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use tracing::{info, warn};

use crate::app::bridge::parse::parse_target_list;
use crate::app::bridge::session::{resolve_trace_id, BridgeSession};
use crate::app::error::BridgeError;

/// One target's result from a batch run, delivered in completion order.
#[derive(Debug)]
pub struct TargetOutcome<T> {
    pub target: String,
    pub result: Result<T, BridgeError>,
}

/// Fans one session operation out across many targets concurrently and
/// fans the results back into a single delivery callback. One unit of
/// work per target, no throttling (fleets here are human-scale), no
/// cross-target ordering, and one target's failure never touches its
/// siblings.
pub struct BatchRunner {
    session: Arc<BridgeSession>,
    targets: Mutex<Vec<String>>,
}

impl BatchRunner {
    pub fn new(session: Arc<BridgeSession>) -> Self {
        Self {
            session,
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Arc<BridgeSession> {
        &self.session
    }

    pub fn add_target(&self, target: &str) {
        let target = target.trim();
        if target.is_empty() {
            return;
        }
        if let Ok(mut targets) = self.targets.lock() {
            if !targets.iter().any(|existing| existing == target) {
                targets.push(target.to_string());
            }
        }
    }

    pub fn remove_target(&self, target: &str) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.retain(|existing| existing != target);
        }
    }

    pub fn clear_targets(&self) {
        if let Ok(mut targets) = self.targets.lock() {
            targets.clear();
        }
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets
            .lock()
            .map(|targets| targets.clone())
            .unwrap_or_default()
    }

    /// Loads `host:port` targets from a newline-delimited file; blank
    /// lines and `#` comments are ignored. Returns how many entries were
    /// added (duplicates are skipped).
    pub fn import_targets(
        &self,
        path: &Path,
        trace_id: Option<&str>,
    ) -> Result<usize, BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let text = fs::read_to_string(path).map_err(|err| {
            BridgeError::io(format!("failed to read {}: {err}", path.display()), &trace_id)
        })?;
        let parsed = parse_target_list(&text);
        let mut added = 0usize;
        for target in parsed {
            let before = self.targets().len();
            self.add_target(&target);
            if self.targets().len() > before {
                added += 1;
            }
        }
        info!(trace_id = %trace_id, path = %path.display(), added, "imported targets");
        Ok(added)
    }

    pub fn export_targets(&self, path: &Path, trace_id: Option<&str>) -> Result<(), BridgeError> {
        let trace_id = resolve_trace_id(trace_id);
        let mut text = self.targets().join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(path, text).map_err(|err| {
            BridgeError::io(format!("failed to write {}: {err}", path.display()), &trace_id)
        })
    }

    /// Dispatches `op` once per target on its own thread, then drains the
    /// fan-in channel and hands every result to `on_result` exactly once,
    /// in whatever order units complete. Does not return until every unit
    /// has finished and every result has been delivered, so callers can
    /// safely assume completion afterwards. Once dispatched, units run to
    /// their own natural completion; there is no global cancellation.
    pub fn fan_out<T, F>(
        &self,
        targets: &[String],
        op: F,
        mut on_result: impl FnMut(TargetOutcome<T>),
    ) where
        T: Send + 'static,
        F: Fn(&BridgeSession, &str) -> Result<T, BridgeError> + Send + Sync + 'static,
    {
        let trace_id = resolve_trace_id(None);
        info!(trace_id = %trace_id, targets = targets.len(), "batch dispatched");

        let op = Arc::new(op);
        let (tx, rx) = mpsc::channel::<TargetOutcome<T>>();
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let session = Arc::clone(&self.session);
            let op = Arc::clone(&op);
            let tx = tx.clone();
            let target = target.clone();
            handles.push(thread::spawn(move || {
                let result = op(&session, &target);
                let _ = tx.send(TargetOutcome { target, result });
            }));
        }
        // Delivery ends when the last worker drops its sender.
        drop(tx);

        let mut delivered = 0usize;
        for outcome in rx {
            delivered += 1;
            on_result(outcome);
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!(trace_id = %trace_id, "batch worker panicked");
            }
        }
        info!(trace_id = %trace_id, delivered, "batch delivered");
    }

    /// Connects every target in the managed list.
    pub fn connect_all(&self, on_result: impl FnMut(TargetOutcome<()>)) {
        let targets = self.targets();
        self.fan_out(
            &targets,
            |session, target| session.connect(target, None),
            on_result,
        );
    }

    pub fn execute_on(
        &self,
        targets: &[String],
        command: &str,
        on_result: impl FnMut(TargetOutcome<String>),
    ) {
        let command = command.to_string();
        self.fan_out(
            targets,
            move |session, target| session.execute(target, &command, None),
            on_result,
        );
    }

    pub fn install_on(
        &self,
        targets: &[String],
        apk_path: &str,
        on_result: impl FnMut(TargetOutcome<()>),
    ) {
        let apk_path = apk_path.to_string();
        self.fan_out(
            targets,
            move |session, target| session.install_app(target, &apk_path, None),
            on_result,
        );
    }

    pub fn uninstall_on(
        &self,
        targets: &[String],
        package: &str,
        on_result: impl FnMut(TargetOutcome<()>),
    ) {
        let package = package.to_string();
        self.fan_out(
            targets,
            move |session, target| session.uninstall_app(target, &package, None),
            on_result,
        );
    }

    pub fn push_to(
        &self,
        targets: &[String],
        local_path: &str,
        remote_path: &str,
        on_result: impl FnMut(TargetOutcome<()>),
    ) {
        let local_path = local_path.to_string();
        let remote_path = remote_path.to_string();
        self.fan_out(
            targets,
            move |session, target| session.push(target, &local_path, &remote_path, None),
            on_result,
        );
    }

    /// Captures every target's screen into `output_dir`, one file per
    /// target named after its identifier.
    pub fn screenshot_all(
        &self,
        targets: &[String],
        output_dir: &Path,
        on_result: impl FnMut(TargetOutcome<PathBuf>),
    ) {
        let output_dir = output_dir.to_path_buf();
        self.fan_out(
            targets,
            move |session, target| {
                let file_name = format!("{}_screenshot.png", target.replace(':', "_"));
                let local = output_dir.join(file_name);
                session
                    .capture_screen(target, &local.to_string_lossy(), None)
                    .map(|_| local)
            },
            on_result,
        );
    }
}

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::app::error::BridgeError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Undecoded subprocess output. Decoding is the normalizer's concern;
/// the invoker only moves bytes.
#[derive(Debug, Clone)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl RawOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, matching what a combined capture
    /// would have produced.
    pub fn combined(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.stdout.len() + self.stderr.len());
        bytes.extend_from_slice(&self.stdout);
        bytes.extend_from_slice(&self.stderr);
        bytes
    }
}

pub fn run_command(
    program: &str,
    args: &[String],
    trace_id: &str,
) -> Result<RawOutput, BridgeError> {
    run_command_with_timeout(program, args, DEFAULT_TIMEOUT, trace_id)
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<RawOutput, BridgeError> {
    let mut child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            BridgeError::tool_unavailable(format!("failed to spawn {program}: {err}"), trace_id)
        })?;

    // Drain stdout/stderr in parallel; otherwise, a chatty child process can
    // block once the pipe buffer fills, and we will incorrectly hit the
    // timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::internal("failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BridgeError::internal("failed to capture stderr", trace_id))?;

    let stdout_handle = spawn_drain(stdout);
    let stderr_handle = spawn_drain(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(BridgeError::timeout(
                        format!("{program} did not finish within {timeout:?}"),
                        trace_id,
                    ));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(BridgeError::internal(
                    format!("failed to poll {program}: {err}"),
                    trace_id,
                ));
            }
        }
    };

    Ok(RawOutput {
        stdout: stdout_handle.join().unwrap_or_default(),
        stderr: stderr_handle.join().unwrap_or_default(),
        exit_code,
    })
}

fn spawn_drain(mut reader: impl Read + Send + 'static) -> std::thread::JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

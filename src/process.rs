//! External process execution for lockwatch.
//!
//! Provides a safe wrapper around LFS commands with stdout/stderr captured
//! line-by-line and a hard timeout. All LFS invocations go through the
//! [`CommandRunner`] trait so the engine can be driven by a scripted runner
//! in tests.
//!
//! Failure is signalled through the returned [`ProcessResult`], never through
//! a panic or an error type: the scheduler's continuation logic inspects the
//! result to decide whether to chain a listing refresh. The exit code is not
//! independently checked; the presence of stderr output (or a spawn failure,
//! or a timeout) marks the whole invocation as failed.

use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Default timeout for a single LFS invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How often the runner polls a child process for exit while the timeout
/// has not elapsed.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured output of one external command invocation.
///
/// Lines are stored in arrival order with empty lines dropped, matching the
/// line-oriented parsing the listing consumer depends on.
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// Non-empty lines written to stdout.
    pub out_lines: Vec<String>,

    /// Non-empty lines written to stderr, plus synthetic lines describing
    /// timeouts or spawn failures.
    pub error_lines: Vec<String>,

    /// True if the process was killed after exceeding its timeout.
    pub timed_out: bool,

    /// Set when the process could not be spawned at all (e.g. the executable
    /// is missing). Spawn failures are never retried automatically.
    pub spawn_error: Option<String>,
}

impl ProcessResult {
    /// Build a result describing a process that never started.
    pub fn from_spawn_error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            error_lines: vec![message.clone()],
            spawn_error: Some(message),
            ..Self::default()
        }
    }

    /// True if the invocation completed with no error signal of any kind.
    pub fn succeeded(&self) -> bool {
        self.spawn_error.is_none() && !self.timed_out && self.error_lines.is_empty()
    }

    /// True if any error signal was recorded.
    pub fn failed(&self) -> bool {
        !self.succeeded()
    }
}

/// Executes one external command synchronously.
///
/// Implementations must be safe to call from worker threads; the engine keeps
/// a single shared runner behind an `Arc`.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` in `cwd`, blocking until it exits or
    /// `timeout` elapses.
    fn run(&self, program: &Path, args: &[String], cwd: &Path, timeout: Duration) -> ProcessResult;
}

/// Render a command line for log output.
pub fn render_command(program: &Path, args: &[String]) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(args.iter().cloned());
    shell_words::join(&parts)
}

/// The real runner: spawns the child with piped stdout/stderr, reads both
/// streams on dedicated threads, and polls for exit until the deadline.
#[derive(Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &Path, args: &[String], cwd: &Path, timeout: Duration) -> ProcessResult {
        let command_line = render_command(program, args);

        let mut child = match Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                eprintln!("[lfs] command={:?} error={:?}", command_line, e.to_string());
                return ProcessResult::from_spawn_error(e.to_string());
            }
        };

        // Stdout/stderr must be drained while the process runs or a chatty
        // child can fill the pipe buffer and deadlock against our exit poll.
        // Lines land in shared buffers as they arrive, not in the readers'
        // return values: when the child is killed its descendants may keep
        // the pipe's write end open, leaving the readers blocked well past
        // the deadline, and the timeout path must not wait for them.
        let out_lines: Arc<Mutex<Vec<String>>> = Arc::default();
        let stdout = child.stdout.take();
        let out_sink = Arc::clone(&out_lines);
        let out_reader = thread::spawn(move || {
            if let Some(stdout) = stdout {
                collect_lines(stdout, &out_sink, None);
            }
        });

        let error_lines: Arc<Mutex<Vec<String>>> = Arc::default();
        let stderr = child.stderr.take();
        let err_sink = Arc::clone(&error_lines);
        let err_command_line = command_line.clone();
        let err_reader = thread::spawn(move || {
            if let Some(stderr) = stderr {
                collect_lines(stderr, &err_sink, Some(&err_command_line));
            }
        });

        let mut result = ProcessResult::default();
        let mut exited = false;
        let deadline = Instant::now() + timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_status)) => {
                    exited = true;
                    break;
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let error = format!("timed out after {}s", timeout.as_secs_f64());
                        eprintln!("[lfs] command={:?} error={:?}", command_line, error);
                        result.error_lines.push(error);
                        result.timed_out = true;
                        let _ = child.kill();
                        let _ = child.wait();
                        break;
                    }
                    thread::sleep(EXIT_POLL_INTERVAL);
                }
                Err(e) => {
                    result
                        .error_lines
                        .push(format!("failed to wait for process: {}", e));
                    let _ = child.kill();
                    let _ = child.wait();
                    break;
                }
            }
        }

        if exited {
            // A clean exit closed the pipes, so the readers finish at EOF
            // with the complete output.
            let _ = out_reader.join();
            let _ = err_reader.join();
        }

        // On the kill path the readers may still be blocked; take whatever
        // arrived before the deadline. The detached readers exit on their
        // own once the last pipe holder goes away.
        result.out_lines = take_lines(&out_lines);
        let mut err_lines = take_lines(&error_lines);
        // Synthetic timeout/wait lines come after whatever the child said.
        err_lines.append(&mut result.error_lines);
        result.error_lines = err_lines;

        result
    }
}

/// Append each non-empty line from a stream to `sink` until EOF, echoing to
/// stderr when a command line is given.
fn collect_lines<R: std::io::Read>(stream: R, sink: &Mutex<Vec<String>>, log_command: Option<&str>) {
    for line in BufReader::new(stream).lines().map_while(|line| line.ok()) {
        if line.is_empty() {
            continue;
        }
        if let Some(command) = log_command {
            eprintln!("[lfs] command={:?} error={:?}", command, line);
        }
        if let Ok(mut lines) = sink.lock() {
            lines.push(line);
        }
    }
}

fn take_lines(lines: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    lines
        .lock()
        .map(|mut lines| std::mem::take(&mut *lines))
        .unwrap_or_default()
}

//! Shared fixtures for unit tests.

use crate::process::{CommandRunner, ProcessResult};
use crossbeam_channel::Receiver;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

struct ScriptedResponse {
    result: ProcessResult,
    /// When set, the "command" blocks until the gate's sender side sends or
    /// is dropped. Lets tests hold an invocation in flight.
    gate: Option<Receiver<()>>,
}

/// A [`CommandRunner`] that replays scripted results instead of spawning
/// processes. Responses are keyed by subcommand (the first argument) and
/// consumed in push order; an unscripted invocation succeeds with no output.
#[derive(Default)]
pub struct FakeRunner {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next invocation of `subcommand`.
    pub fn push_response(&self, subcommand: &str, result: ProcessResult) {
        self.scripts
            .lock()
            .unwrap()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(ScriptedResponse { result, gate: None });
    }

    /// Script the next invocation of `subcommand` to block on `gate` before
    /// returning its result.
    pub fn push_gated_response(&self, subcommand: &str, result: ProcessResult, gate: Receiver<()>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(subcommand.to_string())
            .or_default()
            .push_back(ScriptedResponse {
                result,
                gate: Some(gate),
            });
    }

    /// Every invocation seen so far, as argv vectors.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// How many invocations of `subcommand` have been seen.
    pub fn count_calls(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|args| args.first().map(String::as_str) == Some(subcommand))
            .count()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, _program: &Path, args: &[String], _cwd: &Path, _timeout: Duration) -> ProcessResult {
        self.calls.lock().unwrap().push(args.to_vec());

        let key = args.first().cloned().unwrap_or_default();
        let scripted = self.scripts.lock().unwrap().get_mut(&key).and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => {
                if let Some(gate) = response.gate {
                    let _ = gate.recv();
                }
                response.result
            }
            None => ProcessResult::default(),
        }
    }
}

/// A successful listing result with the given stdout lines.
pub fn listing_result(lines: &[&str]) -> ProcessResult {
    ProcessResult {
        out_lines: lines.iter().map(|line| line.to_string()).collect(),
        ..ProcessResult::default()
    }
}

/// A failed result carrying one stderr line.
pub fn failure_result(message: &str) -> ProcessResult {
    ProcessResult {
        error_lines: vec![message.to_string()],
        ..ProcessResult::default()
    }
}

/// Lay down the minimal `.git` metadata the repository layer reads: a HEAD
/// pointing at `branch` and a config with or without an `[lfs]` section.
pub fn write_bare_repo(root: &Path, branch: &str, with_lfs: bool) {
    let git_dir = root.join(".git");
    fs::create_dir_all(&git_dir).unwrap();
    fs::write(git_dir.join("HEAD"), format!("ref: refs/heads/{}\n", branch)).unwrap();

    let mut config = String::from("[core]\n\trepositoryformatversion = 0\n\tbare = false\n");
    if with_lfs {
        config.push_str("[lfs]\n\trepositoryformatversion = 0\n");
    }
    fs::write(git_dir.join("config"), config).unwrap();
}

//! Validation gate: decides whether a candidate may be committed.
//!
//! [`CommandGate`] materialises the candidate into a temporary directory and
//! runs the configured lint and test commands there. Tool failures of any
//! kind become failing checks with a synthetic diagnostic; the gate itself
//! never errors.

use crate::config::{CommandSpec, GateConfig};
use crate::parser::{ParserRegistry, SyntaxNode};
use crate::staging::Candidate;
use crate::types::{CheckOutcome, Diagnostic, GateReport, Location};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Output lines kept per check.
const MAX_DIAGNOSTICS: usize = 200;

/// Time allowed for pipes to drain after a check exits on the deadline.
const OUTPUT_GRACE: Duration = Duration::from_millis(200);

/// Judges a materialised candidate.
pub trait ValidationGate: Send + Sync {
    /// Runs both checks against `candidate`.
    fn run(&self, candidate: &Candidate) -> GateReport;
}

impl<F> ValidationGate for F
where
    F: Fn(&Candidate) -> GateReport + Send + Sync,
{
    fn run(&self, candidate: &Candidate) -> GateReport {
        self(candidate)
    }
}

/// Gate running external lint and test commands.
#[derive(Debug, Clone)]
pub struct CommandGate {
    config: GateConfig,
    parsers: Arc<ParserRegistry>,
}

impl CommandGate {
    /// Creates a gate from configuration.
    pub fn new(config: GateConfig, parsers: Arc<ParserRegistry>) -> Self {
        Self { config, parsers }
    }

    fn policy_applies(&self, path: &str) -> bool {
        Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.config
                    .policy_extensions
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(ext))
            })
    }

    fn policy(&self, candidate: &Candidate) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (path, text) in candidate.files() {
            if !self.policy_applies(path) {
                continue;
            }
            let parser = self.parsers.for_path(path);

            for pattern in &self.config.forbidden_patterns {
                for (line_no, line) in text.lines().enumerate() {
                    if let Some(column) = line.find(pattern.as_str()) {
                        diagnostics.push(
                            Diagnostic::new("lint", format!("forbidden pattern `{}`", pattern)).at(
                                Location::new(
                                    path.as_str(),
                                    to_u32(line_no + 1),
                                    to_u32(column + 1),
                                ),
                            ),
                        );
                    }
                }
            }

            if self.config.require_tests_per_file {
                let declares_test = parser
                    .parse(path, text)
                    .map(|nodes| nodes.iter().any(is_test))
                    .unwrap_or(false);
                if !declares_test {
                    diagnostics.push(Diagnostic::new(
                        "lint",
                        format!("{} declares no test (a Test* class or test* function)", path),
                    ));
                }
            }
        }

        diagnostics
    }
}

fn is_test(node: &SyntaxNode) -> bool {
    node.name.starts_with("Test") || node.name.starts_with("test") || node.children.iter().any(is_test)
}

impl ValidationGate for CommandGate {
    fn run(&self, candidate: &Candidate) -> GateReport {
        let workdir = match TempDir::new().and_then(|dir| candidate.write_to(dir.path()).map(|_| dir)) {
            Ok(dir) => dir,
            Err(e) => {
                let diagnostic = Diagnostic::new(
                    "gate",
                    format!("failed to materialise candidate: {}", e),
                );
                return GateReport {
                    lint: CheckOutcome::fail(vec![diagnostic.clone()]),
                    tests: CheckOutcome::fail(vec![diagnostic]),
                };
            }
        };

        let deadline = Instant::now() + self.config.timeout();

        let mut lint = run_check("lint", &self.config.lint, workdir.path(), deadline);
        let policy = self.policy(candidate);
        if !policy.is_empty() {
            lint.passed = false;
            lint.diagnostics.extend(policy);
        }

        let tests = run_check("tests", &self.config.tests, workdir.path(), deadline);

        info!(
            files = candidate.files().len(),
            lint = lint.passed,
            tests = tests.passed,
            "Validation gate finished"
        );
        GateReport { lint, tests }
    }
}

/// Runs one command in `dir`, bounded by `deadline`.
pub fn run_check(name: &str, spec: &CommandSpec, dir: &Path, deadline: Instant) -> CheckOutcome {
    let started = Instant::now();
    if started >= deadline {
        return CheckOutcome::fail(vec![Diagnostic::new(
            name,
            format!("{} skipped: gate time budget exhausted", name),
        )]);
    }

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    own_process_group(&mut command);

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            warn!(check = name, program = %spec.program, error = %e, "Check command could not be started");
            return CheckOutcome::fail(vec![Diagnostic::new(
                name,
                format!("{} command `{}` could not be started: {}", name, spec.program, e),
            )]);
        }
    };

    let (sender, receiver) = mpsc::channel();
    let streams = capture(0, child.stdout.take(), &sender) + capture(1, child.stderr.take(), &sender);
    drop(sender);

    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            warn!(check = name, program = %spec.program, "Check timed out, killing process");
            terminate(&mut child);
            let budget = deadline.saturating_duration_since(started).as_secs();
            return CheckOutcome::fail(vec![Diagnostic::new(
                name,
                format!("{} command `{}` timed out after {}s", name, spec.program, budget),
            )]);
        }
        Err(e) => {
            terminate(&mut child);
            return CheckOutcome::fail(vec![Diagnostic::new(
                name,
                format!("failed to wait for {} command: {}", name, e),
            )]);
        }
    };

    // Processes left behind by the check may still hold its pipes open.
    let output_deadline = deadline.max(Instant::now() + OUTPUT_GRACE);
    let Some(output) = collect_output(&receiver, streams, output_deadline) else {
        warn!(check = name, program = %spec.program, "Check output still open at deadline, killing process group");
        terminate(&mut child);
        return CheckOutcome::fail(vec![Diagnostic::new(
            name,
            format!(
                "{} command `{}` exited but left processes holding its output past the deadline",
                name, spec.program
            ),
        )]);
    };

    debug!(
        check = name,
        status = ?status.code(),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Check finished"
    );

    let matched = spec
        .fail_patterns
        .iter()
        .find(|pattern| output.contains(pattern.as_str()));

    if status.success() && matched.is_none() {
        return CheckOutcome::pass();
    }

    let mut diagnostics = output_diagnostics(name, &output);
    if let Some(pattern) = matched {
        diagnostics.push(Diagnostic::new(
            name,
            format!("output matched failure pattern `{}`", pattern),
        ));
    }
    if !status.success() {
        diagnostics.push(Diagnostic::new(
            name,
            match status.code() {
                Some(code) => format!("{} exited with status {}", spec.program, code),
                None => format!("{} was terminated by a signal", spec.program),
            },
        ));
    }
    CheckOutcome::fail(diagnostics)
}

/// Reads `pipe` to the end on a background thread and sends the text tagged
/// with `stream`. Returns the number of readers started.
fn capture<R: Read + Send + 'static>(
    stream: usize,
    pipe: Option<R>,
    sender: &Sender<(usize, String)>,
) -> usize {
    let Some(mut reader) = pipe else {
        return 0;
    };
    let sender = sender.clone();
    thread::spawn(move || {
        let mut bytes = Vec::new();
        drop(reader.read_to_end(&mut bytes));
        drop(sender.send((stream, String::from_utf8_lossy(&bytes).into_owned())));
    });
    1
}

/// Stdout then stderr, or `None` if a pipe is still open at `deadline`.
fn collect_output(
    receiver: &Receiver<(usize, String)>,
    streams: usize,
    deadline: Instant,
) -> Option<String> {
    let mut parts = [String::new(), String::new()];
    for _ in 0..streams {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match receiver.recv_timeout(remaining) {
            Ok((stream, text)) => {
                if let Some(part) = parts.get_mut(stream) {
                    *part = text;
                }
            }
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    Some(parts.concat())
}

/// Runs the check in a process group of its own so a timeout can reach
/// everything it started.
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

/// Kills the check and, on unix, the rest of its process group.
fn terminate(child: &mut Child) {
    #[cfg(unix)]
    drop(
        Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status(),
    );
    drop(child.kill());
    drop(child.wait());
}

fn wait_until(
    child: &mut Child,
    deadline: Instant,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let poll_interval = Duration::from_millis(50);
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(poll_interval);
    }
}

/// One diagnostic per non-empty output line, with `path:line[:col]:`
/// prefixes turned into locations.
fn output_diagnostics(source: &str, output: &str) -> Vec<Diagnostic> {
    let lines: Vec<&str> = output.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut diagnostics: Vec<Diagnostic> = lines
        .iter()
        .take(MAX_DIAGNOSTICS)
        .map(|line| parse_line(source, line))
        .collect();

    if lines.len() > MAX_DIAGNOSTICS {
        diagnostics.push(Diagnostic::new(
            source,
            format!("... {} more lines", lines.len() - MAX_DIAGNOSTICS),
        ));
    }
    diagnostics
}

fn parse_line(source: &str, line: &str) -> Diagnostic {
    let line = line.trim();
    let plain = || Diagnostic::new(source, line);

    let mut parts = line.splitn(3, ':');
    let (Some(path), Some(line_no), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return plain();
    };
    if path.is_empty() || path.contains(char::is_whitespace) {
        return plain();
    }
    let Ok(line_no) = line_no.trim().parse::<u32>() else {
        return plain();
    };

    let (column, message) = rest
        .split_once(':')
        .and_then(|(col, msg)| col.trim().parse::<u32>().ok().map(|col| (col, msg)))
        .unwrap_or((1, rest));

    Diagnostic::new(source, message.trim()).at(Location::new(path, line_no, column))
}

fn to_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

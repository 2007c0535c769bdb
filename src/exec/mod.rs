//! External command execution
//!
//! Every external tool (docking binaries, structure converters, receptor
//! preparation scripts) is invoked through [`CommandExecutor`], so adapters
//! never touch `std::process` directly and tests can script tool behavior.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Poll interval while waiting on a child with a deadline
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for output still buffered in the pipes after a timeout kill
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Errors that can occur when running an external command
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Executable not found: {program}")]
    NotFound { program: String },

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exceeded timeout of {}s", .timeout.as_secs_f64())]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with status {}: {}", exit_label(.code), diagnostic(.stderr, .stdout))]
    Failed {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("IO error while running {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ExecError {
    /// The text a failed tool left behind: stderr, else stdout, else the error itself
    pub fn message(&self) -> String {
        match self {
            ExecError::Failed { stdout, stderr, .. } if !stderr.trim().is_empty() || !stdout.trim().is_empty() => {
                diagnostic(stderr, stdout).to_string()
            }
            other => other.to_string(),
        }
    }
}

fn exit_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn diagnostic<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    if !stderr.trim().is_empty() {
        stderr.trim()
    } else {
        stdout.trim()
    }
}

/// A fully described external invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,

    /// Arguments, passed verbatim
    pub args: Vec<String>,

    /// Working directory
    pub cwd: Option<PathBuf>,

    /// Extra environment variables
    pub env: Vec<(String, String)>,

    /// Conda environment to run inside (`conda run -n <env>`)
    pub conda_env: Option<String>,

    /// Wall-clock limit; the child is killed when it expires
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run inside a conda environment; empty names mean the current environment
    pub fn conda_env(mut self, env: Option<&str>) -> Self {
        self.conda_env = env.filter(|e| !e.trim().is_empty()).map(str::to_string);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The argv actually executed, including any conda prefix
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::new();
        if let Some(env) = &self.conda_env {
            argv.extend(
                ["conda", "run", "-n", env.as_str(), "--no-capture-output"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        }
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Shell-like rendering for log messages
    pub fn display(&self) -> String {
        self.argv().join(" ")
    }
}

/// Captured result of a successful invocation
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
    pub elapsed: Duration,
}

/// Runs external commands synchronously
pub trait CommandExecutor: Send + Sync {
    /// Run to completion. A nonzero exit is reported as [`ExecError::Failed`].
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError>;

    /// Is the program available?
    fn is_available(&self, program: &str) -> bool {
        self.run(&CommandSpec::new(program).arg("--version")).is_ok()
    }
}

/// Executes commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor;

impl SystemExecutor {
    pub fn new() -> Self {
        Self
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        let _ = sender.send(String::from_utf8_lossy(&buffer).into_owned());
    });
    receiver
}

/// Kill the child and everything it started. With a deadline the child leads
/// its own process group, so wrappers such as `conda run` take their tool down
/// with them.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    let group = format!("-{}", child.id());
    let signalled = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false);
    if !signalled {
        log::debug!("Could not signal process group {}, killing the child only", group);
        let _ = child.kill();
    }
    let _ = child.wait();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

fn wait_with_deadline(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
    started: Instant,
) -> Result<Option<std::process::ExitStatus>, ExecError> {
    let io_error = |source| ExecError::Io {
        program: program.to_string(),
        source,
    };

    let Some(timeout) = timeout else {
        return child.wait().map(Some).map_err(io_error);
    };

    loop {
        if let Some(status) = child.try_wait().map_err(io_error)? {
            return Ok(Some(status));
        }
        if started.elapsed() >= timeout {
            kill_process_group(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl CommandExecutor for SystemExecutor {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ExecError> {
        let argv = spec.argv();
        let mut command = Command::new(&argv[0]);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &spec.env {
            command.env(key, value);
        }
        #[cfg(unix)]
        if spec.timeout.is_some() {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        log::debug!("Running: {}", spec.display());
        let started = Instant::now();
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ExecError::NotFound {
                    program: argv[0].clone(),
                }
            } else {
                ExecError::Spawn {
                    program: argv[0].clone(),
                    source,
                }
            }
        })?;

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = wait_with_deadline(&mut child, &spec.program, spec.timeout, started)?;
        // A detached process may keep the pipes open; never wait past the deadline
        let (stdout, stderr) = match spec.timeout {
            None => (stdout.recv().unwrap_or_default(), stderr.recv().unwrap_or_default()),
            Some(timeout) => {
                let wait = timeout.saturating_sub(started.elapsed()) + DRAIN_GRACE;
                (
                    stdout.recv_timeout(wait).unwrap_or_default(),
                    stderr.recv_timeout(wait).unwrap_or_default(),
                )
            }
        };
        let elapsed = started.elapsed();

        match status {
            None => Err(ExecError::Timeout {
                program: spec.program.clone(),
                timeout: spec.timeout.unwrap_or(elapsed),
            }),
            Some(status) if status.success() => Ok(CommandOutput {
                stdout,
                stderr,
                code: status.code(),
                elapsed,
            }),
            Some(status) => Err(ExecError::Failed {
                program: spec.program.clone(),
                code: status.code(),
                stdout,
                stderr,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argv_with_conda_prefix() {
        let spec = CommandSpec::new("qvina02")
            .args(["--receptor", "r.pdbqt"])
            .conda_env(Some("docking"));
        assert_eq!(
            spec.argv(),
            vec!["conda", "run", "-n", "docking", "--no-capture-output", "qvina02", "--receptor", "r.pdbqt"]
        );
        assert_eq!(CommandSpec::new("obabel").conda_env(Some("  ")).argv(), vec!["obabel"]);
    }

    #[test]
    fn test_failed_message_prefers_stderr() {
        let err = ExecError::Failed {
            program: "qvina02".to_string(),
            code: Some(1),
            stdout: "progress".to_string(),
            stderr: "Parse error on line 3".to_string(),
        };
        assert_eq!(err.message(), "Parse error on line 3");

        let err = ExecError::Failed {
            program: "qvina02".to_string(),
            code: Some(1),
            stdout: "No atoms in ligand".to_string(),
            stderr: String::new(),
        };
        assert_eq!(err.message(), "No atoms in ligand");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_captures_output() {
        let output = SystemExecutor::new()
            .run(&CommandSpec::new("sh").args(["-c", "echo out; echo err 1>&2"]))
            .unwrap();
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
        assert_eq!(output.code, Some(0));
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_reports_failure() {
        let result = SystemExecutor::new().run(&CommandSpec::new("sh").args(["-c", "echo boom 1>&2; exit 3"]));
        match result {
            Err(ExecError::Failed { code, stderr, .. }) => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_system_executor_enforces_timeout() {
        let started = Instant::now();
        let result = SystemExecutor::new().run(
            &CommandSpec::new("sleep")
                .arg("5")
                .timeout(Some(Duration::from_millis(200))),
        );
        assert!(matches!(result, Err(ExecError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_forked_tool() {
        let dir = tempfile::tempdir().unwrap();
        let late = dir.path().join("late_out.pdbqt");
        let script = format!("sleep 1 && echo pose > {}; true", late.display());

        let started = Instant::now();
        let result = SystemExecutor::new().run(
            &CommandSpec::new("sh")
                .args(["-c", script.as_str()])
                .timeout(Some(Duration::from_millis(200))),
        );
        assert!(matches!(result, Err(ExecError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_millis(900), "took {:?}", started.elapsed());

        // The forked sleeper died with its wrapper and never writes output
        thread::sleep(Duration::from_millis(1500));
        assert!(!late.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_through_wrapper_shell() {
        let started = Instant::now();
        let result = SystemExecutor::new().run(
            &CommandSpec::new("sh")
                .args(["-c", "sleep 4; true"])
                .timeout(Some(Duration::from_millis(200))),
        );
        assert!(matches!(result, Err(ExecError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let result = SystemExecutor::new().run(&CommandSpec::new("definitely-not-a-real-binary-xyz"));
        assert!(matches!(result, Err(ExecError::NotFound { .. })));
    }
}

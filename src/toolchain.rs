//! The compiler boundary: the ReScript toolchain as a black box that emits
//! text. Everything above this module sees only the `Compiler` trait.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::error::Error;

/// How often a running child is polled for exit.
const POLL_MS: u64 = 25;

/// Result of a full project build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Build succeeded; there is no diagnostic text.
    Clean,
    /// Build failed; raw compiler stdout, ready for classification.
    Failed(String),
}

/// The compiler as the convergence loop sees it.
pub trait Compiler {
    /// Build the whole project.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the toolchain cannot be launched, or
    /// `Error::CompilerTimeout` if it ran past its deadline.
    fn build(&mut self) -> Result<BuildOutcome, Error>;

    /// Dump the parse tree of a single file. Returns `None` when the file
    /// compiles standalone; a clean compile emits no dump.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the toolchain cannot be launched, or
    /// `Error::CompilerTimeout` if it ran past its deadline.
    fn dump_parse_tree(&mut self, file: &Path) -> Result<Option<String>, Error>;
}

/// Captured output of one toolchain invocation.
struct CommandOutput {
    /// Whether the child exited zero.
    status_ok: bool,
    /// Everything the child wrote to stderr.
    stderr: String,
    /// Everything the child wrote to stdout.
    stdout: String,
}

/// The real toolchain: `node_modules/.bin/{rescript,bsc}` run under the
/// project root with a kill-on-expiry deadline per invocation.
pub struct Toolchain {
    /// Project root the commands run in.
    root: PathBuf,
    /// Deadline per invocation.
    timeout: Duration,
}

impl Toolchain {
    /// Create a toolchain runner for the given project root.
    pub fn new(root: &Path, timeout: Duration) -> Self {
        return Self {
            root: root.to_path_buf(),
            timeout,
        };
    }

    /// Run one toolchain binary, capturing stdout and stderr.
    fn npm_run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, Error> {
        let bin = self.root.join("node_modules").join(".bin").join(program);
        let mut child = Command::new(&bin)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout = drain_in_background(child.stdout.take());
        let stderr = drain_in_background(child.stderr.take());
        let status = wait_with_deadline(&mut child, self.timeout, &bin)?;

        return Ok(CommandOutput {
            status_ok: status.success(),
            stderr: join_drained(stderr),
            stdout: join_drained(stdout),
        });
    }
}

impl Compiler for Toolchain {
    fn build(&mut self) -> Result<BuildOutcome, Error> {
        tracing::info!("compiling...");
        let out = self.npm_run("rescript", &[])?;
        if out.status_ok {
            tracing::info!("compilation finished cleanly");
            return Ok(BuildOutcome::Clean);
        }
        tracing::info!("compilation failed with errors");
        return Ok(BuildOutcome::Failed(out.stdout));
    }

    fn dump_parse_tree(&mut self, file: &Path) -> Result<Option<String>, Error> {
        let path = file.display().to_string();
        let out = self.npm_run("bsc", &["-dparsetree", &path])?;
        if out.status_ok {
            return Ok(None);
        }
        return Ok(Some(out.stderr));
    }
}

/// Read a pipe to the end on its own thread, so the child never blocks on a
/// full pipe while we wait for it to exit.
fn drain_in_background<R>(pipe: Option<R>) -> Option<std::thread::JoinHandle<String>>
where
    R: std::io::Read + Send + 'static,
{
    return pipe.map(|mut reader| {
        return std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = std::io::Read::read_to_string(&mut reader, &mut buf);
            return buf;
        });
    });
}

/// Collect what a drain thread read; empty on any failure.
fn join_drained(handle: Option<std::thread::JoinHandle<String>>) -> String {
    return handle.and_then(|h| return h.join().ok()).unwrap_or_default();
}

/// Poll the child until it exits or the deadline passes; kill on expiry.
fn wait_with_deadline(child: &mut Child, timeout: Duration, command: &Path) -> Result<ExitStatus, Error> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::CompilerTimeout {
                command: command.display().to_string(),
                timeout_secs: timeout.as_secs(),
            });
        }
        std::thread::sleep(Duration::from_millis(POLL_MS));
    }
}

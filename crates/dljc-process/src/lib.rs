//! Helpers for spawning the external build and analysis tools.
//!
//! Build tools run in verbose mode are extremely chatty, and the analysis
//! tools driven afterwards can run for a long time. This crate runs a single
//! argv (never a shell string), streams the combined stdout/stderr into a
//! [`LogSink`] as it arrives, keeps the full text for the caller and enforces
//! an optional wall-clock timeout by killing the whole process tree.
//!
//! A failed spawn or a timeout never surfaces as an error: both are folded
//! into the returned [`ProcessResult`] so one broken sub-invocation does not
//! abort the orchestration run.

use std::{
    borrow::Cow,
    fmt, fs,
    io::{self, BufRead, BufReader, Read, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

/// Where the streamed output of a command goes while it runs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogSink {
    /// Only accumulate the output; write it nowhere.
    #[default]
    Discard,
    /// Mirror output to the parent's stderr.
    Stderr,
    /// Append output to the given log file (created on demand).
    File(PathBuf),
}

/// Options controlling command execution.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Kill the process if it hasn't exited after this duration.
    pub timeout: Option<Duration>,
    pub sink: LogSink,
    /// How long to wait after sending a graceful termination signal before
    /// force-killing the process tree.
    pub kill_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            sink: LogSink::Discard,
            kill_grace: Duration::from_millis(250),
        }
    }
}

/// A full command invocation (cwd + program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub cwd: PathBuf,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(cwd: &Path, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            cwd: cwd.to_path_buf(),
            program: program.into(),
            args,
        }
    }

    /// Split an argv (`argv[0]` is the program) into a command spec.
    pub fn from_argv(cwd: &Path, argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(cwd, program, args.to_vec()))
    }

    /// The command as an argv, program first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shell-style quoting for human-readable logs only; the command itself
        // is always executed from the argv array.
        write!(f, "{}", shell_quote(&self.program.to_string_lossy()))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// Quote `arg` so it can be pasted into a POSIX shell.
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'/' | b':' | b'=' | b'+' | b',' | b'@' | b'%')
        });
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', r"'\''")))
    }
}

/// Outcome of one external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Combined stdout/stderr, in arrival order per line. For a process that
    /// could not be started this holds the failure description instead.
    pub output: String,
    /// `None` when the process was killed by a signal, timed out, or never
    /// started.
    pub return_code: Option<i32>,
    pub elapsed: Duration,
    pub timed_out: bool,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        !self.timed_out && self.return_code == Some(0)
    }
}

/// Seam used by capture strategies and tool adapters to execute commands.
pub trait CommandRunner: Send + Sync + fmt::Debug {
    fn run(&self, command: &CommandSpec, sink: LogSink) -> ProcessResult;
}

#[derive(Debug, Clone, Default)]
pub struct DefaultCommandRunner {
    /// Applied to every command this runner starts.
    pub timeout: Option<Duration>,
}

impl DefaultCommandRunner {
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for DefaultCommandRunner {
    fn run(&self, command: &CommandSpec, sink: LogSink) -> ProcessResult {
        run_command(
            command,
            &RunOptions {
                timeout: self.timeout,
                sink,
                ..RunOptions::default()
            },
        )
    }
}

/// Run a command to completion, streaming its output into `opts.sink`.
pub fn run_command(command: &CommandSpec, opts: &RunOptions) -> ProcessResult {
    let collector = Arc::new(Mutex::new(OutputCollector::open(&opts.sink)));
    lock(&collector).write_sink(&format!("Running {command}\n\n"));

    tracing::debug!(target: "dljc.process", command = %command, "spawning process");

    let start = Instant::now();
    match run_command_inner(command, opts, &collector, start) {
        Ok((status, timed_out)) => {
            let elapsed = start.elapsed();
            let mut collector = lock(&collector);
            if timed_out {
                let secs = opts.timeout.unwrap_or_default().as_secs();
                collector.write_sink(&format!("Timed out after {secs} seconds on {command}\n"));
                tracing::warn!(
                    target: "dljc.process",
                    command = %command,
                    timeout_secs = secs,
                    "process timed out"
                );
            }
            ProcessResult {
                output: std::mem::take(&mut collector.text),
                return_code: if timed_out { None } else { status.code() },
                elapsed,
                timed_out,
            }
        }
        Err(err) => {
            let elapsed = start.elapsed();
            let mut collector = lock(&collector);
            collector.push(&format!("calling {command} failed\n{err}\n"));
            tracing::warn!(
                target: "dljc.process",
                command = %command,
                error = %err,
                "failed to run process"
            );
            ProcessResult {
                output: std::mem::take(&mut collector.text),
                return_code: None,
                elapsed,
                timed_out: false,
            }
        }
    }
}

fn run_command_inner(
    command: &CommandSpec,
    opts: &RunOptions,
    collector: &Arc<Mutex<OutputCollector>>,
    start: Instant,
) -> io::Result<(ExitStatus, bool)> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .current_dir(&command.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Put the child into its own process group on Unix so timeouts can kill the
    // whole process tree (build wrappers like `gradlew` fork a JVM that would
    // otherwise keep the pipes open).
    #[cfg(unix)]
    unsafe {
        use std::os::unix::process::CommandExt;

        cmd.pre_exec(|| {
            // SAFETY: `setpgid` is async-signal-safe and does not allocate.
            // This is executed after `fork` in the child process.
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = cmd.spawn()?;

    let Some(stdout) = child.stdout.take() else {
        return Err(io::Error::other("child stdout was not captured"));
    };
    let Some(stderr) = child.stderr.take() else {
        return Err(io::Error::other("child stderr was not captured"));
    };

    let stdout_collector = Arc::clone(collector);
    let stdout_handle = thread::spawn(move || pump_lines(stdout, &stdout_collector));
    let stderr_collector = Arc::clone(collector);
    let stderr_handle = thread::spawn(move || pump_lines(stderr, &stderr_collector));

    let mut timed_out = false;
    let status = match opts.timeout {
        None => child.wait()?,
        Some(timeout) => {
            let poll = Duration::from_millis(50);
            loop {
                if let Some(status) = child.try_wait()? {
                    break status;
                }
                if start.elapsed() >= timeout {
                    timed_out = true;
                    break terminate_process_tree(&mut child, opts.kill_grace)?;
                }
                thread::sleep(poll.min(timeout.saturating_sub(start.elapsed())));
            }
        }
    };

    join_reader(stdout_handle, "stdout")??;
    join_reader(stderr_handle, "stderr")??;

    Ok((status, timed_out))
}

struct OutputCollector {
    text: String,
    sink: Option<Box<dyn Write + Send>>,
}

impl OutputCollector {
    fn open(sink: &LogSink) -> Self {
        let sink: Option<Box<dyn Write + Send>> = match sink {
            LogSink::Discard => None,
            LogSink::Stderr => Some(Box::new(io::stderr())),
            LogSink::File(path) => match open_log_file(path) {
                Ok(file) => Some(Box::new(file)),
                Err(err) => {
                    tracing::warn!(
                        target: "dljc.process",
                        path = %path.display(),
                        error = %err,
                        "failed to open process log; output will not be logged"
                    );
                    None
                }
            },
        };
        Self {
            text: String::new(),
            sink,
        }
    }

    fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.write_sink(chunk);
    }

    fn write_sink(&mut self, chunk: &str) {
        if let Some(sink) = self.sink.as_mut() {
            if sink
                .write_all(chunk.as_bytes())
                .and_then(|()| sink.flush())
                .is_err()
            {
                self.sink = None;
            }
        }
    }
}

fn open_log_file(path: &Path) -> io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)
}

fn lock(collector: &Mutex<OutputCollector>) -> std::sync::MutexGuard<'_, OutputCollector> {
    collector
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn pump_lines(reader: impl Read, collector: &Mutex<OutputCollector>) -> io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            return Ok(());
        }
        lock(collector).push(&String::from_utf8_lossy(&line));
    }
}

fn terminate_process_tree(
    child: &mut std::process::Child,
    grace: Duration,
) -> io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        let pid = child.id() as i32;
        // Negative pid targets the process group, which we set to the child's pid via
        // `setpgid(0, 0)` in `pre_exec`.
        unsafe {
            let _ = libc::kill(-pid, libc::SIGTERM);
        }

        let start = Instant::now();
        while start.elapsed() < grace {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(Duration::from_millis(25));
        }

        unsafe {
            let _ = libc::kill(-pid, libc::SIGKILL);
        }
        child.wait()
    }

    #[cfg(windows)]
    {
        let _ = grace;
        // `Child::kill()` only terminates the immediate process; `taskkill /T`
        // takes the JVM children of wrapper scripts down with it.
        let pid = child.id().to_string();
        let _ = Command::new("taskkill")
            .args(["/PID", &pid, "/T", "/F"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let _ = child.kill();
        child.wait()
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = grace;
        let _ = child.kill();
        child.wait()
    }
}

fn join_reader(
    handle: thread::JoinHandle<io::Result<()>>,
    stream: &'static str,
) -> io::Result<io::Result<()>> {
    handle
        .join()
        .map_err(|_| io::Error::other(format!("{stream} reader thread panicked")))
}

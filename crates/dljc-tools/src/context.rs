use crate::{Result, ToolConfig, ToolEnv, ToolError};
use dljc_process::{CommandRunner, CommandSpec, DefaultCommandRunner, LogSink, ProcessResult};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

/// Everything an adapter needs besides the capture result.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub config: ToolConfig,
    pub env: ToolEnv,
    /// Directory the wrapped build ran in; tools run here too.
    pub cwd: PathBuf,
    runner: Arc<dyn CommandRunner>,
}

impl ToolContext {
    pub fn new(config: ToolConfig, env: ToolEnv, cwd: impl Into<PathBuf>) -> Self {
        Self::with_runner(config, env, cwd, Arc::new(DefaultCommandRunner::default()))
    }

    pub fn with_runner(
        config: ToolConfig,
        env: ToolEnv,
        cwd: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            config,
            env,
            cwd: cwd.into(),
            runner,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    pub fn log_path(&self, log: &str) -> PathBuf {
        self.config.output_dir.join(format!("{log}-stdout.log"))
    }

    /// Stderr when running verbosely with `--log-to-stderr`, otherwise the
    /// tool's own log file.
    pub fn sink(&self, log: &str) -> LogSink {
        if self.config.verbose && self.config.log_to_stderr {
            LogSink::Stderr
        } else {
            LogSink::File(self.log_path(log))
        }
    }

    /// Run one external command, streaming into the `log` sink.
    pub fn run(
        &self,
        log: &str,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> ProcessResult {
        let command = CommandSpec::new(&self.cwd, program, args);
        tracing::debug!(target: "dljc.tools", log, command = %command, "running tool command");

        let result = self.runner.run(&command, self.sink(log));
        if !result.success() {
            tracing::warn!(
                target: "dljc.tools",
                log,
                command = %command,
                return_code = ?result.return_code,
                timed_out = result.timed_out,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "tool command failed"
            );
        }
        result
    }

    /// Append a line of text to a tool log (or stderr, like [`Self::sink`]).
    pub fn append_log(&self, log: &str, message: &str) -> Result<()> {
        match self.sink(log) {
            LogSink::File(path) => {
                fs::create_dir_all(self.output_dir())
                    .map_err(|err| ToolError::io("failed to create", self.output_dir(), err))?;
                let mut file = fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .map_err(|err| ToolError::io("failed to open", &path, err))?;
                writeln!(file, "{message}").map_err(|err| ToolError::io("failed to write", &path, err))
            }
            LogSink::Stderr => {
                eprintln!("{message}");
                Ok(())
            }
            LogSink::Discard => Ok(()),
        }
    }

    /// Resolve a path reported by the build against the build directory.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_follows_verbosity_flags() {
        let mut config = ToolConfig::new("/tmp/out");
        let ctx = ToolContext::new(config.clone(), ToolEnv::default(), "/tmp");
        assert_eq!(
            ctx.sink("wpi"),
            LogSink::File(PathBuf::from("/tmp/out/wpi-stdout.log"))
        );

        config.log_to_stderr = true;
        let ctx = ToolContext::new(config.clone(), ToolEnv::default(), "/tmp");
        assert_eq!(ctx.sink("wpi"), LogSink::Stderr);

        config.verbose = false;
        let ctx = ToolContext::new(config, ToolEnv::default(), "/tmp");
        assert!(matches!(ctx.sink("wpi"), LogSink::File(_)));
    }

    #[test]
    fn append_log_creates_and_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = ToolContext::new(
            ToolConfig::new(tmp.path().join("out")),
            ToolEnv::default(),
            tmp.path(),
        );
        ctx.append_log("jsoninv", "first").unwrap();
        ctx.append_log("jsoninv", "second").unwrap();
        assert_eq!(
            fs::read_to_string(ctx.log_path("jsoninv")).unwrap(),
            "first\nsecond\n"
        );
    }
}

use crate::{
    BuildTool, CaptureError, CaptureResult, CaptureStats, JavacInvocation, ParseOptions, Result,
    TargetJar,
};
use dljc_process::{CommandRunner, CommandSpec, DefaultCommandRunner, LogSink};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Raw build output is kept next to the JSON dumps.
pub const BUILD_OUTPUT_FILE: &str = "build_output.txt";

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Directory the build runs in.
    pub cwd: PathBuf,
    pub output_dir: PathBuf,
    pub guess_sources: bool,
    /// Where the build's own output is streamed while it runs.
    pub sink: LogSink,
}

impl CaptureOptions {
    pub fn new(cwd: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            output_dir: output_dir.into(),
            guess_sources: false,
            sink: LogSink::Discard,
        }
    }
}

/// One capture of one build command.
#[derive(Debug, Clone)]
pub struct BuildCapture {
    tool: BuildTool,
    command: Vec<String>,
    options: CaptureOptions,
    runner: Arc<dyn CommandRunner>,
}

impl BuildCapture {
    pub fn new(tool: BuildTool, command: Vec<String>, options: CaptureOptions) -> Self {
        Self::with_runner(
            tool,
            command,
            options,
            Arc::new(DefaultCommandRunner::default()),
        )
    }

    pub fn with_runner(
        tool: BuildTool,
        command: Vec<String>,
        options: CaptureOptions,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            tool,
            command,
            options,
            runner,
        }
    }

    pub fn tool(&self) -> BuildTool {
        self.tool
    }

    /// The argv that [`BuildCapture::capture`] executes.
    pub fn build_command(&self) -> Vec<String> {
        self.tool.build_command(&self.command, &self.options.cwd)
    }

    /// Run the build and extract its javac invocations.
    ///
    /// Returns `Ok(None)` when the build exits unsuccessfully. The raw output
    /// is written to `build_output.txt` either way.
    pub fn capture(&self) -> Result<Option<CaptureResult>> {
        let argv = self.build_command();
        let spec =
            CommandSpec::from_argv(&self.options.cwd, &argv).ok_or(CaptureError::EmptyCommand)?;

        tracing::info!(
            target: "dljc.capture",
            tool = self.tool.name(),
            command = %spec,
            "running build"
        );
        let result = self.runner.run(&spec, self.options.sink.clone());
        self.write_build_output(&result.output)?;

        if !result.success() {
            tracing::error!(
                target: "dljc.capture",
                command = %spec,
                return_code = ?result.return_code,
                timed_out = result.timed_out,
                "build command failed"
            );
            return Ok(None);
        }

        let lines: Vec<&str> = result.output.lines().collect();
        let parse_options = ParseOptions {
            guess_sources: self.options.guess_sources,
        };
        let javac_invocations: Vec<JavacInvocation> = self
            .tool
            .javac_commands(&self.command, &lines)
            .iter()
            .map(|argv| JavacInvocation::parse_with(argv, parse_options))
            .collect();
        let target_jars: Vec<TargetJar> = self
            .tool
            .target_jars(&lines)
            .into_iter()
            .map(|jar| TargetJar::probe(self.resolve(jar)))
            .collect();

        let stats = CaptureStats::compute(
            result.elapsed.as_secs_f64(),
            &javac_invocations,
            &target_jars,
        );
        tracing::info!(
            target: "dljc.capture",
            invocations = stats.javac_invocation_count,
            source_files = stats.source_files_count,
            jars = stats.built_jar_count,
            build_time = stats.build_time,
            "captured build"
        );

        Ok(Some(CaptureResult {
            javac_invocations,
            target_jars,
            stats,
        }))
    }

    /// [`BuildCapture::capture`] behind the output directory's cache.
    pub fn capture_cached(&self, cache_enabled: bool) -> Result<Option<CaptureResult>> {
        crate::CaptureCache::new(&self.options.output_dir)
            .get_or_capture(cache_enabled, || self.capture())
    }

    fn resolve(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            path
        } else {
            self.options.cwd.join(path)
        }
    }

    fn write_build_output(&self, output: &str) -> Result<()> {
        let path = self.options.output_dir.join(BUILD_OUTPUT_FILE);
        write_file(&path, output).map_err(|source| CaptureError::Write { path, source })
    }
}

fn write_file(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}

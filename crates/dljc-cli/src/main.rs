mod logging;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use dljc_capture::{supported_commands, BuildCapture, BuildTool, CaptureOptions};
use dljc_process::{CommandRunner, DefaultCommandRunner, LogSink};
use dljc_tools::{
    parse_tool_list, run_tools, tool_names, ToolConfig, ToolContext, ToolEnv,
    DEFAULT_AFU_OUTPUT_DIR, DEFAULT_MODE, DEFAULT_SOLVER,
};
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

const DEFAULT_OUTPUT_DIR: &str = "dljc-out";

#[derive(Parser, Debug)]
#[command(
    name = "dljc",
    version,
    about = "Capture the javac invocations of a build and run analysis tools on them",
    override_usage = "dljc [OPTIONS] -- <BUILD_COMMAND>...",
    after_help = after_help()
)]
struct Cli {
    /// Directory for logs and results [default: ./dljc-out]
    #[arg(short = 'o', long = "out", value_name = "DIR")]
    out: Option<PathBuf>,
    /// Write log messages to stderr instead of toplevel.log
    #[arg(long = "log-to-stderr", alias = "log_to_stderr")]
    log_to_stderr: bool,
    /// Comma-separated list of tools to run
    #[arg(short = 't', long = "tool", value_name = "TOOLS")]
    tool: Option<String>,
    /// Maximum time in seconds for any subcommand
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,
    /// Guess source files when the build output lists none
    #[arg(long)]
    guess: bool,
    /// Suppress output from subcommands
    #[arg(long)]
    quiet: bool,
    /// Reuse the capture stored in the output directory
    #[arg(long)]
    cache: bool,
    /// Checker to run (checker, inference and wpi tools)
    #[arg(short = 'c', long, value_name = "CHECKER")]
    checker: Option<String>,
    /// Stub files for the Checker Framework
    #[arg(long, value_name = "STUBS")]
    stubs: Option<String>,
    /// ajava files for the Checker Framework
    #[arg(long, value_name = "AJAVA")]
    ajava: Option<String>,
    /// Directory with the jars of tools that need them
    #[arg(short = 'l', long = "lib", value_name = "DIR")]
    lib_dir: Option<PathBuf>,
    /// JDK version the Checker Framework runs on [default: 8]
    #[arg(long = "jdkVersion", value_name = "VERSION")]
    jdk_version: Option<u32>,
    /// Extra classpath with custom qualifiers for the Checker Framework
    #[arg(long, value_name = "CLASSPATH")]
    quals: Option<String>,
    /// Extra javac arguments for Checker Framework runs
    #[arg(long = "extraJavacArgs", value_name = "ARGS", allow_hyphen_values = true)]
    extra_javac_args: Option<String>,
    /// Solver for checker-framework-inference
    #[arg(long, default_value = DEFAULT_SOLVER)]
    solver: String,
    /// Mode for checker-framework-inference
    #[arg(long, default_value = DEFAULT_MODE)]
    mode: String,
    /// Annotation file output directory for checker-framework-inference
    #[arg(long = "afuOutputDir", default_value = DEFAULT_AFU_OUTPUT_DIR)]
    afu_output_dir: String,
    /// Jar of the graph tool (prog2dfg, apilearner or augmaker)
    #[arg(long = "graph-jar", value_name = "JAR")]
    graph_jar: Option<PathBuf>,
    /// Projects per augmaker batch
    #[arg(long = "batch-size", default_value_t = -1, allow_negative_numbers = true)]
    batch_size: i64,
    /// Project list for augmaker
    #[arg(long = "project-file", value_name = "FILE")]
    project_file: Option<PathBuf>,
    /// Soot jar for the soot tool
    #[arg(long = "soot-jar", value_name = "JAR")]
    soot_jar: Option<PathBuf>,
    /// Also write Daikon invariants as XML and JSON
    #[arg(long = "daikon-xml")]
    daikon_xml: bool,
    /// Trace the error-revealing Randoop tests instead of the regression tests
    #[arg(long = "error-driver")]
    error_driver: bool,
    /// Build command to capture
    #[arg(last = true, value_name = "BUILD_COMMAND")]
    command: Vec<String>,
}

fn after_help() -> String {
    format!(
        "Supported build commands: {}\nTools: {}",
        supported_commands().join(", "),
        tool_names().join(", ")
    )
}

impl Cli {
    fn output_dir(&self, cwd: &Path) -> PathBuf {
        match &self.out {
            Some(out) if out.is_absolute() => out.clone(),
            Some(out) => cwd.join(out),
            None => cwd.join(DEFAULT_OUTPUT_DIR),
        }
    }

    /// The build's own output is mirrored like tool output: to stderr only
    /// when running verbosely with `--log-to-stderr`.
    fn build_sink(&self) -> LogSink {
        if self.log_to_stderr && !self.quiet {
            LogSink::Stderr
        } else {
            LogSink::Discard
        }
    }

    fn tool_config(&self, output_dir: PathBuf) -> ToolConfig {
        let mut config = ToolConfig::new(output_dir);
        config.checker = self.checker.clone();
        config.stubs = self.stubs.clone();
        config.ajava = self.ajava.clone();
        config.lib_dir = self.lib_dir.clone();
        config.jdk_version = self.jdk_version;
        config.quals = self.quals.clone();
        config.extra_javac_args = self.extra_javac_args.clone();
        config.solver = self.solver.clone();
        config.mode = self.mode.clone();
        config.afu_output_dir = self.afu_output_dir.clone();
        config.graph_jar = self.graph_jar.clone();
        config.batch_size = self.batch_size;
        config.project_file = self.project_file.clone();
        config.soot_jar = self.soot_jar.clone();
        config.daikon_xml = self.daikon_xml;
        config.error_driver = self.error_driver;
        config.verbose = !self.quiet;
        config.log_to_stderr = self.log_to_stderr;
        config
    }
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let Some(build_tool) = BuildTool::from_command(&cli.command) else {
        Cli::command().print_help()?;
        return Ok(0);
    };

    let cwd = std::env::current_dir().context("failed to read the current directory")?;
    let output_dir = cli.output_dir(&cwd);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    logging::init(&output_dir, cli.log_to_stderr)?;
    logging::log_header(&std::env::args().collect::<Vec<_>>());

    let runner: Arc<dyn CommandRunner> = Arc::new(DefaultCommandRunner::with_timeout(
        cli.timeout.map(Duration::from_secs),
    ));

    let mut options = CaptureOptions::new(&cwd, &output_dir);
    options.guess_sources = cli.guess;
    options.sink = cli.build_sink();
    let capture =
        BuildCapture::with_runner(build_tool, cli.command.clone(), options, runner.clone());

    let Some(result) = capture.capture_cached(cli.cache)? else {
        println!("DLJC: Build command failed.");
        return Ok(1);
    };
    if result.javac_invocations.is_empty() {
        bail!(
            "no javac commands found in the output of `{}`",
            capture.build_command().join(" ")
        );
    }

    write_json(&output_dir.join("javac.json"), &result.javac_invocations)?;
    write_json(&output_dir.join("jars.json"), &result.target_jars)?;
    write_json(&output_dir.join("stats.json"), &result.stats)?;

    let tools = cli.tool.as_deref().map(parse_tool_list).unwrap_or_default();
    if tools.is_empty() {
        return Ok(0);
    }

    let ctx = ToolContext::with_runner(
        cli.tool_config(output_dir),
        ToolEnv::from_process(),
        cwd,
        runner,
    );
    run_tools(
        &ctx,
        &tools,
        &result.javac_invocations,
        &result.target_jars,
    )?;
    Ok(0)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn everything_after_double_dash_is_the_build_command() {
        let cli = Cli::try_parse_from([
            "dljc", "-t", "checker,print", "-c", "Nullness", "--", "mvn", "-q", "compile",
        ])
        .unwrap();
        assert_eq!(cli.command, vec!["mvn", "-q", "compile"]);
        assert_eq!(cli.tool.as_deref(), Some("checker,print"));
        assert_eq!(BuildTool::from_command(&cli.command), Some(BuildTool::Maven));
    }

    #[test]
    fn tool_config_carries_flags_and_defaults() {
        let cli = Cli::try_parse_from([
            "dljc",
            "--quiet",
            "--jdkVersion",
            "11",
            "--extraJavacArgs",
            "-Alint -AskipUses=Foo",
            "--",
            "javac",
            "A.java",
        ])
        .unwrap();
        let config = cli.tool_config(PathBuf::from("/tmp/out"));
        assert!(!config.verbose);
        assert_eq!(config.jdk_version(), 11);
        assert_eq!(config.extra_javac_args(), vec!["-Alint", "-AskipUses=Foo"]);
        assert_eq!(config.solver, DEFAULT_SOLVER);
        assert_eq!(config.afu_output_dir, DEFAULT_AFU_OUTPUT_DIR);
        assert_eq!(config.batch_size, -1);
    }

    #[test]
    fn build_output_reaches_stderr_only_with_log_to_stderr() {
        let sink = |args: &[&str]| {
            let mut argv = vec!["dljc"];
            argv.extend_from_slice(args);
            argv.extend(["--", "javac", "A.java"]);
            Cli::try_parse_from(argv).unwrap().build_sink()
        };
        assert_eq!(sink(&[]), LogSink::Discard);
        assert_eq!(sink(&["--log-to-stderr"]), LogSink::Stderr);
        assert_eq!(sink(&["--log_to_stderr"]), LogSink::Stderr);
        assert_eq!(sink(&["--log-to-stderr", "--quiet"]), LogSink::Discard);
    }

    #[test]
    fn relative_output_dir_is_resolved_against_cwd() {
        let cli = Cli::try_parse_from(["dljc", "-o", "results", "--", "javac"]).unwrap();
        assert_eq!(
            cli.output_dir(Path::new("/work")),
            PathBuf::from("/work/results")
        );
        let cli = Cli::try_parse_from(["dljc", "--", "javac"]).unwrap();
        assert_eq!(
            cli.output_dir(Path::new("/work")),
            PathBuf::from("/work/dljc-out")
        );
    }
}

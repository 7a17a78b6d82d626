//! Whole-program inference: rerun the checker on its own inferred stubs until
//! the stubs stop changing.
//!
//! Each iteration runs the checker with `-Ainfer=stubs -Awarns`, moves what it
//! wrote to `build/whole-program-inference` into a numbered iteration
//! directory and adds that directory to the stub path of the next iteration.
//! Once two consecutive iterations agree, the last command runs one more time
//! without those two switches and its warnings are the report. There is no
//! iteration cap.

use crate::{fs_util, jdk_flags, Classpath, Result, ToolContext, ToolError, CHECKERFRAMEWORK};
use dljc_capture::{JavacInvocation, SwitchValue};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

const LOG: &str = "wpi";
const SEPARATOR: &str = "-----------------------------------------------------------";
const INFERENCE_OUTPUT: &str = "build/whole-program-inference";
const ITERATION_SWITCHES: [&str; 2] = ["-Ainfer=stubs", "-Awarns"];
const DELOMBOK_SUPPRESSION: &str = "-AsuppressWarnings=type.anno.before.modifier";

/// Build switches never forwarded to the checker.
const IGNORED_OPTIONS: &[&str] = &[
    "classpath",
    "nowarn",
    "Xmaxerrs",
    "Xmaxwarns",
    "Werror",
    "processorpath",
    "processor",
    "proc:none",
    "XepDisableAllChecks",
    "Xplugin:ErrorProne",
];
const IGNORED_OPTION_PREFIXES: &[&str] = &["Xep:", "XepExcludedPaths:"];
const PRE_JAVA_8: &[&str] = &["1.5", "5", "1.6", "6", "1.7", "7", "1.8"];
const LOMBOK_COORDINATES: &[&str] = &["/org/projectlombok/lombok/", "/org.projectlombok/lombok/"];
const STANDARD_SOURCE_DIR: &str = "src/main/java/";

/// States of the fixed-point loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WpiState {
    RunChecker,
    CollectStubs,
    Compare,
    Converged,
}

/// What one invocation's inference run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WpiOutcome {
    /// Iteration directories, oldest first.
    pub stub_dirs: Vec<PathBuf>,
    /// Inference runs, not counting the final report run.
    pub checker_runs: usize,
}

pub(crate) fn run(ctx: &ToolContext, invocations: &[JavacInvocation]) -> Result<Vec<WpiOutcome>> {
    let checker_home = ctx.env.require(CHECKERFRAMEWORK)?;
    let mut outcomes = Vec::with_capacity(invocations.len());

    for (index, invocation) in invocations.iter().enumerate() {
        ctx.append_log(LOG, SEPARATOR)?;

        let command = CheckerCommand::build(ctx, &checker_home, invocation)?;
        let results_dir = ctx.output_dir().join("wpi").join(index.to_string());
        let mut iterator = WpiIterator {
            ctx,
            command,
            inference_dir: ctx.cwd.join(INFERENCE_OUTPUT),
            results_dir,
            stub_dirs: Vec::new(),
        };
        outcomes.push(iterator.run()?);
    }
    Ok(outcomes)
}

/// Everything of the checker command line that stays fixed across iterations.
#[derive(Debug, Clone)]
struct CheckerCommand {
    javac: PathBuf,
    /// Base switches, extra javac args and JDK flags.
    leading: Vec<String>,
    classpath: String,
    processor: Vec<String>,
    forwarded: Vec<String>,
    source_files: Vec<String>,
    delombok: bool,
    user_stubs: Option<String>,
    ajava: Option<String>,
}

impl CheckerCommand {
    fn build(ctx: &ToolContext, checker_home: &Path, invocation: &JavacInvocation) -> Result<Self> {
        let config = &ctx.config;
        let jdk_version = config.jdk_version();

        let processor = match &config.checker {
            Some(checker) => {
                let mut processors = checker.clone();
                if let Some(own) = invocation.value("processor") {
                    processors.push(',');
                    processors.push_str(own);
                }
                vec!["-processor".to_string(), processors]
            }
            // Processor auto-discovery.
            None => Vec::new(),
        };

        let delombok = delombok(ctx, invocation)?;

        let mut classpath = Classpath::parse(invocation.classpath());
        if let Some(quals) = &config.quals {
            classpath.extend_raw(quals);
        }
        if let Some(processorpath) = invocation.value("processorpath") {
            classpath.extend_raw(processorpath);
        }
        if let Some(lib_dir) = &config.lib_dir {
            classpath.push_path(lib_dir);
        }

        let Forwarded {
            args: forwarded,
            releases_java_8,
        } = forward_switches(invocation, jdk_version);

        let mut leading = vec![
            "-AmergeStubsWithSource".to_string(),
            "-Xmaxerrs".to_string(),
            "10000".to_string(),
            "-Xmaxwarns".to_string(),
            "10000".to_string(),
        ];
        leading.extend(config.extra_javac_args());
        leading.extend(jdk_flags(jdk_version, checker_home, releases_java_8)?);

        Ok(Self {
            javac: checker_home.join("checker/bin/javac"),
            leading,
            classpath: classpath.to_trailing_string(),
            processor,
            forwarded,
            source_files: invocation.source_files.clone(),
            delombok,
            user_stubs: config.stubs.clone(),
            ajava: config.ajava.clone(),
        })
    }

    /// Arguments for the run that uses `stub_dirs` as inferred stubs.
    fn args(&self, stub_dirs: &[PathBuf], infer: bool) -> Vec<String> {
        let mut args = self.leading.clone();
        if infer {
            args.extend(ITERATION_SWITCHES.iter().map(|s| s.to_string()));
        }

        let mut stub_path: Vec<String> = self.user_stubs.iter().cloned().collect();
        stub_path.extend(stub_dirs.iter().map(|dir| dir.to_string_lossy().into_owned()));
        if !stub_path.is_empty() {
            args.push(format!("-Astubs={}", stub_path.join(":")));
        }
        if let Some(ajava) = &self.ajava {
            args.push(format!("-Aajava={ajava}"));
        }
        if self.delombok {
            args.push(DELOMBOK_SUPPRESSION.to_string());
        }

        args.push("-classpath".to_string());
        args.push(self.classpath.clone());
        args.extend(self.processor.iter().cloned());
        args.extend(self.forwarded.iter().cloned());
        args.extend(self.source_files.iter().cloned());
        args
    }
}

struct Forwarded {
    args: Vec<String>,
    releases_java_8: bool,
}

/// Re-emit the build's own switches for the checker run.
///
/// Language levels below 8 are raised to 8. On JDK 11 `-source`/`-target`
/// become `--release`; a JDK 8 javac does not know `--release` at all. Only a
/// `--release 8` that is actually emitted suppresses the module-open flags.
fn forward_switches(invocation: &JavacInvocation, jdk_version: u32) -> Forwarded {
    let mut args = Vec::new();
    let mut releases_java_8 = false;
    let mut emitted_release = false;

    for (key, value) in &invocation.switches {
        if IGNORED_OPTIONS.contains(&key.as_str())
            || IGNORED_OPTION_PREFIXES.iter().any(|p| key.starts_with(p))
        {
            continue;
        }

        let mut key = key.as_str();
        let mut value = value.clone();
        if matches!(key, "source" | "target" | "-release") {
            if let SwitchValue::Value(level) = &value {
                if PRE_JAVA_8.contains(&level.as_str()) {
                    value = SwitchValue::Value("8".to_string());
                }
            }
            if jdk_version == 11 {
                key = "-release";
            } else if jdk_version == 8 && key == "-release" {
                continue;
            }
            if key == "-release" {
                if emitted_release {
                    continue;
                }
                emitted_release = true;
                releases_java_8 = value.as_str() == Some("8");
            }
        }

        args.push(format!("-{key}"));
        if let SwitchValue::Value(value) = value {
            args.push(value);
        }
    }

    Forwarded {
        args,
        releases_java_8,
    }
}

/// Replace Lombok-annotated sources by their delomboked form in place.
///
/// Returns whether the sources were delomboked.
fn delombok(ctx: &ToolContext, invocation: &JavacInvocation) -> Result<bool> {
    let Some(classpath) = invocation.classpath() else {
        return Ok(false);
    };
    let Some(lombok_jar) = classpath
        .split(':')
        .find(|entry| LOMBOK_COORDINATES.iter().any(|c| entry.contains(c)))
    else {
        return Ok(false);
    };
    let Some(source) = invocation.source_files.first() else {
        return Ok(false);
    };
    let Some(offset) = source.find(STANDARD_SOURCE_DIR) else {
        return Ok(false);
    };

    let project = ctx.resolve(&source[..offset]);
    let delombok_dir = project.join("delombok");
    let args = vec![
        "-jar".to_string(),
        lombok_jar.to_string(),
        "delombok".to_string(),
        project.join(STANDARD_SOURCE_DIR).to_string_lossy().into_owned(),
        "-d".to_string(),
        delombok_dir.join("main/java").to_string_lossy().into_owned(),
        "-c".to_string(),
        classpath.to_string(),
    ];
    ctx.run(LOG, "java", args);

    fs_util::copy_tree(&delombok_dir, &project.join("src"))?;
    tracing::info!(
        target: "dljc.tools",
        project = %project.display(),
        "replaced sources with delomboked code"
    );
    Ok(true)
}

struct WpiIterator<'a> {
    ctx: &'a ToolContext,
    command: CheckerCommand,
    inference_dir: PathBuf,
    results_dir: PathBuf,
    stub_dirs: Vec<PathBuf>,
}

impl WpiIterator<'_> {
    fn run(&mut self) -> Result<WpiOutcome> {
        fs_util::remove_dir_if_exists(&self.inference_dir)?;
        fs_util::remove_dir_if_exists(&self.results_dir)?;
        fs_util::create_dir(&self.results_dir)?;
        tracing::info!(
            target: "dljc.tools",
            dir = %self.results_dir.display(),
            "writing inferred stubs"
        );

        let mut checker_runs = 0;
        // Stub dirs seen by the most recent inference run.
        let mut last_stubs = 0;
        let mut state = WpiState::RunChecker;
        loop {
            state = match state {
                WpiState::RunChecker => {
                    last_stubs = self.stub_dirs.len();
                    let args = self.command.args(&self.stub_dirs, true);
                    self.ctx.run(LOG, &self.command.javac, args);
                    checker_runs += 1;
                    WpiState::CollectStubs
                }
                WpiState::CollectStubs => {
                    self.collect_stubs()?;
                    WpiState::Compare
                }
                WpiState::Compare => match self.stub_dirs.as_slice() {
                    [.., previous, latest] if !dirs_differ(previous, latest)? => {
                        WpiState::Converged
                    }
                    _ => WpiState::RunChecker,
                },
                WpiState::Converged => {
                    tracing::info!(
                        target: "dljc.tools",
                        iterations = self.stub_dirs.len(),
                        "whole-program inference converged"
                    );
                    let args = self.command.args(&self.stub_dirs[..last_stubs], false);
                    self.ctx.run(LOG, &self.command.javac, args);
                    return Ok(WpiOutcome {
                        stub_dirs: std::mem::take(&mut self.stub_dirs),
                        checker_runs,
                    });
                }
            };
        }
    }

    fn collect_stubs(&mut self) -> Result<()> {
        let no_output = || ToolError::NoInferenceOutput {
            dir: self.inference_dir.clone(),
            log: self.ctx.log_path(LOG),
        };
        let entries: Vec<PathBuf> = match fs::read_dir(&self.inference_dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .collect(),
            Err(_) => return Err(no_output()),
        };
        if entries.is_empty() {
            return Err(no_output());
        }

        let iteration_dir = self
            .results_dir
            .join(format!("iteration{}", self.stub_dirs.len()));
        fs_util::create_dir(&iteration_dir)?;
        for entry in entries {
            let Some(name) = entry.file_name() else {
                continue;
            };
            fs_util::move_entry(&entry, &iteration_dir.join(name))?;
        }
        self.stub_dirs.push(iteration_dir);
        Ok(())
    }
}

/// Whether two stub directories differ in file names or file contents.
fn dirs_differ(a: &Path, b: &Path) -> Result<bool> {
    Ok(read_tree(a)? != read_tree(b)?)
}

fn read_tree(dir: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut files = BTreeMap::new();
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(dir).to_path_buf();
            ToolError::io("failed to read", path, std::io::Error::other(err))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let contents = fs::read(entry.path())
            .map_err(|err| ToolError::io("failed to read", entry.path(), err))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_path_buf();
        files.insert(relative, contents);
    }
    Ok(files)
}

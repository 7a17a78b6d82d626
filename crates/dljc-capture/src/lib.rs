//! Build capture: run a Java build in verbose mode and recover the javac
//! invocations it performed.
//!
//! A [`BuildTool`] knows how to re-invoke one build system with the logging
//! switches that make it print its compiler arguments, and how to scrape those
//! arguments back out of the output. [`BuildCapture`] drives one capture
//! through a [`dljc_process::CommandRunner`], and [`CaptureCache`] memoizes
//! the result in the output directory.

mod ant;
mod cache;
mod capture;
mod fs_cleanup;
mod gradle;
mod invocation;
mod jar;
mod maven;

pub use cache::{CacheError, CaptureCache, CACHE_FILE_NAME};
pub use capture::{BuildCapture, CaptureOptions, BUILD_OUTPUT_FILE};
pub use invocation::{JavacInvocation, ParseOptions, SwitchValue, Switches};
pub use jar::{manifest_main_class, TargetJar};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("build command is empty")]
    EmptyCommand,
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type Result<T, E = CaptureError> = std::result::Result<T, E>;

/// Build systems whose output can be scraped for javac invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTool {
    Javac,
    Ant,
    Gradle,
    Maven,
}

const COMMAND_TABLE: &[(&str, BuildTool)] = &[
    ("ant", BuildTool::Ant),
    ("gradle", BuildTool::Gradle),
    ("gradlew", BuildTool::Gradle),
    ("javac", BuildTool::Javac),
    ("mvn", BuildTool::Maven),
    ("mvnw", BuildTool::Maven),
];

const NO_FLAGS: &[&str] = &[];

/// Every command name [`BuildTool::from_command_name`] accepts.
pub fn supported_commands() -> Vec<&'static str> {
    COMMAND_TABLE.iter().map(|(name, _)| *name).collect()
}

impl BuildTool {
    pub fn from_command_name(name: &str) -> Option<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(command, _)| *command == name)
            .map(|(_, tool)| *tool)
    }

    /// Select a strategy from the basename of `argv[0]` (`./gradlew` and
    /// `/usr/bin/mvn` both resolve).
    pub fn from_command(argv: &[String]) -> Option<Self> {
        let program = Path::new(argv.first()?);
        let name = program.file_stem()?.to_str()?;
        Self::from_command_name(name)
    }

    pub fn name(self) -> &'static str {
        match self {
            BuildTool::Javac => "javac",
            BuildTool::Ant => "ant",
            BuildTool::Gradle => "gradle",
            BuildTool::Maven => "maven",
        }
    }

    /// The argv actually executed for a capture of `command` run in `cwd`.
    ///
    /// Gradle and Maven are promoted to the project's wrapper script when one
    /// exists in `cwd`.
    pub fn build_command(self, command: &[String], cwd: &Path) -> Vec<String> {
        let Some((program, rest)) = command.split_first() else {
            return Vec::new();
        };

        let (program, extra) = match self {
            BuildTool::Javac => (program.clone(), NO_FLAGS),
            BuildTool::Ant => (program.clone(), ant::VERBOSE_FLAGS),
            BuildTool::Gradle => (
                wrapper_or(cwd, gradle_wrapper_name(), program),
                gradle::DEBUG_FLAGS,
            ),
            BuildTool::Maven => (
                wrapper_or(cwd, maven_wrapper_name(), program),
                maven::DEBUG_FLAGS,
            ),
        };

        let mut argv = Vec::with_capacity(1 + extra.len() + rest.len());
        argv.push(program);
        argv.extend(extra.iter().map(|flag| flag.to_string()));
        argv.extend(rest.iter().cloned());
        argv
    }

    /// Raw javac argument vectors recovered from the build.
    pub fn javac_commands(self, command: &[String], lines: &[&str]) -> Vec<Vec<String>> {
        match self {
            BuildTool::Javac => vec![command.get(1..).unwrap_or_default().to_vec()],
            BuildTool::Ant => ant::javac_commands(lines),
            BuildTool::Gradle => gradle::javac_commands(lines),
            BuildTool::Maven => maven::javac_commands(lines),
        }
    }

    /// Jars the build reported creating.
    pub fn target_jars(self, lines: &[&str]) -> Vec<PathBuf> {
        match self {
            BuildTool::Javac | BuildTool::Gradle => Vec::new(),
            BuildTool::Ant => ant::target_jars(lines),
            BuildTool::Maven => maven::target_jars(lines),
        }
    }
}

fn gradle_wrapper_name() -> &'static str {
    if cfg!(windows) {
        "gradlew.bat"
    } else {
        "gradlew"
    }
}

fn maven_wrapper_name() -> &'static str {
    if cfg!(windows) {
        "mvnw.cmd"
    } else {
        "mvnw"
    }
}

fn wrapper_or(cwd: &Path, wrapper: &str, program: &str) -> String {
    let candidate = cwd.join(wrapper);
    if candidate.is_file() {
        candidate.to_string_lossy().into_owned()
    } else {
        program.to_string()
    }
}

/// Aggregate numbers about one capture, dumped as `stats.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureStats {
    /// Wall-clock seconds spent in the build.
    pub build_time: f64,
    #[serde(rename = "source_files")]
    pub source_files_count: usize,
    #[serde(rename = "class_files")]
    pub class_files_count: usize,
    #[serde(rename = "javac_invocations")]
    pub javac_invocation_count: usize,
    #[serde(rename = "built_jars")]
    pub built_jar_count: usize,
    #[serde(rename = "executable_jars")]
    pub executable_jar_count: usize,
}

impl CaptureStats {
    pub fn compute(build_time: f64, invocations: &[JavacInvocation], jars: &[TargetJar]) -> Self {
        Self {
            build_time,
            source_files_count: invocations.iter().map(|i| i.source_files.len()).sum(),
            class_files_count: invocations.iter().map(|i| i.class_files().len()).sum(),
            javac_invocation_count: invocations.len(),
            built_jar_count: jars.len(),
            executable_jar_count: jars.iter().filter(|jar| jar.is_executable()).count(),
        }
    }
}

/// Everything a capture produced. Written once, then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub javac_invocations: Vec<JavacInvocation>,
    pub target_jars: Vec<TargetJar>,
    pub stats: CaptureStats,
}

//! Downstream analysis tools driven from captured javac invocations.
//!
//! Every adapter is a function of the [`ToolContext`] and the capture result:
//! it assembles one command line per invocation (or per batch) and runs it
//! through the context's [`dljc_process::CommandRunner`]. Tool output goes to
//! `<output_dir>/<tool>-stdout.log`.

mod bixie;
mod checker;
mod classpath;
mod config;
mod context;
mod dyntrace;
mod fs_util;
mod graphtool;
mod inference;
mod jdk;
mod jsoninv;
mod print;
mod soot;
mod wpi;

pub use classpath::Classpath;
pub use config::{
    ToolConfig, ToolEnv, CHECKERFRAMEWORK, DAIKONDIR, DEFAULT_AFU_OUTPUT_DIR, DEFAULT_JDK_VERSION,
    DEFAULT_MODE, DEFAULT_SOLVER, JSR308,
};
pub use context::ToolContext;
pub use dyntrace::{select_patterns, DyntraceParts, OmitList};
pub use jdk::jdk_flags;
pub use jsoninv::{invariants_from_xml, Invariant, InvariantReport, MethodInvariants};
pub use print::render as render_print;
pub use wpi::{WpiOutcome, WpiState};

use dljc_capture::{JavacInvocation, TargetJar};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("the {tool} tool requires {flag}")]
    MissingFlag {
        tool: &'static str,
        flag: &'static str,
    },
    #[error("the Checker Framework only supports Java versions 8, 11 and 16 or later, not {0}")]
    UnsupportedJdk(u32),
    #[error("javac invocation {index} has no -{switch} switch, which {tool} needs")]
    MissingSwitch {
        tool: &'static str,
        index: usize,
        switch: &'static str,
    },
    #[error("no whole-program inference output in {dir}; the checker run probably failed, see {log}")]
    NoInferenceOutput { dir: PathBuf, log: PathBuf },
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ToolError {
    /// Configuration problems and a checker that infers nothing stop the
    /// whole run; anything else only stops the tool that hit it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ToolError::MissingEnv(_)
                | ToolError::MissingFlag { .. }
                | ToolError::UnsupportedJdk(_)
                | ToolError::NoInferenceOutput { .. }
        )
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ToolError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = ToolError> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    Checker,
    Wpi,
    Inference,
    Print,
    Soot,
    Bixie,
    GraphTool,
    Randoop,
    Chicory,
    Dyntrace,
    DyntraceCounts,
}

const TOOL_TABLE: &[(&str, Tool)] = &[
    ("checker", Tool::Checker),
    ("wpi", Tool::Wpi),
    ("inference", Tool::Inference),
    ("print", Tool::Print),
    ("soot", Tool::Soot),
    ("bixie", Tool::Bixie),
    ("graphtool", Tool::GraphTool),
    ("randoop", Tool::Randoop),
    ("chicory", Tool::Chicory),
    ("dyntrace", Tool::Dyntrace),
    ("dyntracecounts", Tool::DyntraceCounts),
];

/// Every name accepted by `--tool`.
pub fn tool_names() -> Vec<&'static str> {
    TOOL_TABLE.iter().map(|(name, _)| *name).collect()
}

impl Tool {
    pub fn from_name(name: &str) -> Option<Self> {
        TOOL_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, tool)| *tool)
    }

    pub fn name(self) -> &'static str {
        TOOL_TABLE
            .iter()
            .find(|(_, tool)| *tool == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }

    pub fn run(
        self,
        ctx: &ToolContext,
        invocations: &[JavacInvocation],
        jars: &[TargetJar],
    ) -> Result<()> {
        match self {
            Tool::Checker => checker::run(ctx, invocations),
            Tool::Wpi => wpi::run(ctx, invocations).map(|_| ()),
            Tool::Inference => inference::run(ctx, invocations),
            Tool::Print => print::run(invocations, jars),
            Tool::Soot => soot::run(ctx, invocations),
            Tool::Bixie => bixie::run(ctx, invocations),
            Tool::GraphTool => graphtool::run(ctx, invocations),
            Tool::Randoop => dyntrace::run(ctx, invocations, DyntraceParts::RANDOOP),
            Tool::Chicory => dyntrace::run(ctx, invocations, DyntraceParts::CHICORY),
            Tool::Dyntrace => dyntrace::run(ctx, invocations, DyntraceParts::DYNTRACE),
            Tool::DyntraceCounts => {
                dyntrace::run(ctx, invocations, DyntraceParts::DYNTRACE_COUNTS)
            }
        }
    }
}

/// Parse a comma-separated `--tool` value. Unknown names are reported and
/// skipped.
pub fn parse_tool_list(list: &str) -> Vec<Tool> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let tool = Tool::from_name(name);
            if tool.is_none() {
                println!("ERROR: Could not find tool {name}");
                tracing::error!(target: "dljc.tools", tool = name, "unknown tool");
            }
            tool
        })
        .collect()
}

/// Run `tools` in order.
///
/// A tool that fails with a non-fatal error is logged and the next tool still
/// runs. The first fatal error stops the run and is returned.
pub fn run_tools(
    ctx: &ToolContext,
    tools: &[Tool],
    invocations: &[JavacInvocation],
    jars: &[TargetJar],
) -> Result<()> {
    for tool in tools {
        tracing::info!(target: "dljc.tools", tool = tool.name(), "running tool");
        match tool.run(ctx, invocations, jars) {
            Ok(()) => {
                tracing::info!(target: "dljc.tools", tool = tool.name(), "tool finished");
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                tracing::error!(
                    target: "dljc.tools",
                    tool = tool.name(),
                    error = %err,
                    "tool failed"
                );
                eprintln!("DLJC: {} failed: {err}", tool.name());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_table_round_trips_names() {
        for name in tool_names() {
            let tool = Tool::from_name(name).unwrap();
            assert_eq!(tool.name(), name);
        }
        assert_eq!(Tool::from_name("findbugs"), None);
    }

    #[test]
    fn parses_comma_separated_tools_skipping_unknown() {
        assert_eq!(
            parse_tool_list("checker,nope, print,,dyntracecounts"),
            vec![Tool::Checker, Tool::Print, Tool::DyntraceCounts]
        );
        assert!(parse_tool_list("").is_empty());
    }

    #[test]
    fn configuration_and_inference_errors_are_fatal() {
        assert!(ToolError::MissingEnv(CHECKERFRAMEWORK).is_fatal());
        assert!(ToolError::UnsupportedJdk(9).is_fatal());
        assert!(ToolError::MissingFlag {
            tool: "soot",
            flag: "--soot-jar"
        }
        .is_fatal());
        assert!(!ToolError::MissingSwitch {
            tool: "soot",
            index: 0,
            switch: "d"
        }
        .is_fatal());
        assert!(ToolError::NoInferenceOutput {
            dir: PathBuf::from("build/whole-program-inference"),
            log: PathBuf::from("wpi-stdout.log"),
        }
        .is_fatal());
    }
}

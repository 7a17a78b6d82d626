use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use crate::{Result, ToolError};

/// Checker Framework installation (checker, wpi).
pub const CHECKERFRAMEWORK: &str = "CHECKERFRAMEWORK";
/// Checker Framework Inference checkout (inference).
pub const JSR308: &str = "JSR308";
/// Daikon installation (chicory, dyntrace).
pub const DAIKONDIR: &str = "DAIKONDIR";

const TOOL_ENV_VARS: [&str; 3] = [CHECKERFRAMEWORK, JSR308, DAIKONDIR];

pub const DEFAULT_SOLVER: &str = "checkers.inference.solver.DebugSolver";
pub const DEFAULT_MODE: &str = "INFER";
pub const DEFAULT_AFU_OUTPUT_DIR: &str = "afud/";
pub const DEFAULT_JDK_VERSION: u32 = 8;

/// Options shared by every adapter, built once from the command line.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub output_dir: PathBuf,
    /// Checker (annotation processor) class name.
    pub checker: Option<String>,
    /// User-supplied stub path, searched before inferred stubs.
    pub stubs: Option<String>,
    pub ajava: Option<String>,
    /// Directory holding tool jars (`bixie.jar`, `randoop.jar`, ...).
    pub lib_dir: Option<PathBuf>,
    pub jdk_version: Option<u32>,
    /// Extra classpath entries for qualifier annotations.
    pub quals: Option<String>,
    pub extra_javac_args: Option<String>,
    pub solver: String,
    pub mode: String,
    pub afu_output_dir: String,
    pub graph_jar: Option<PathBuf>,
    pub batch_size: i64,
    pub project_file: Option<PathBuf>,
    pub soot_jar: Option<PathBuf>,
    pub daikon_xml: bool,
    pub error_driver: bool,
    pub verbose: bool,
    pub log_to_stderr: bool,
}

impl ToolConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            checker: None,
            stubs: None,
            ajava: None,
            lib_dir: None,
            jdk_version: None,
            quals: None,
            extra_javac_args: None,
            solver: DEFAULT_SOLVER.to_string(),
            mode: DEFAULT_MODE.to_string(),
            afu_output_dir: DEFAULT_AFU_OUTPUT_DIR.to_string(),
            graph_jar: None,
            batch_size: -1,
            project_file: None,
            soot_jar: None,
            daikon_xml: false,
            error_driver: false,
            verbose: true,
            log_to_stderr: false,
        }
    }

    pub fn jdk_version(&self) -> u32 {
        self.jdk_version.unwrap_or(DEFAULT_JDK_VERSION)
    }

    pub fn require_checker(&self, tool: &'static str) -> Result<&str> {
        self.checker.as_deref().ok_or(ToolError::MissingFlag {
            tool,
            flag: "--checker",
        })
    }

    pub fn require_lib_dir(&self, tool: &'static str) -> Result<&Path> {
        self.lib_dir.as_deref().ok_or(ToolError::MissingFlag {
            tool,
            flag: "--lib",
        })
    }

    /// `-key value` tokens from `--extraJavacArgs`.
    pub fn extra_javac_args(&self) -> Vec<String> {
        self.extra_javac_args
            .as_deref()
            .map(|args| args.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Environment variables consulted by the adapters.
///
/// Values are looked up when a tool needs them, so an unset variable only
/// matters for the tools that use it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolEnv {
    vars: BTreeMap<String, String>,
}

impl ToolEnv {
    /// Snapshot the tool installation variables of this process.
    pub fn from_process() -> Self {
        let vars = TOOL_ENV_VARS
            .iter()
            .filter_map(|name| {
                let value = std::env::var(name).ok()?;
                Some((name.to_string(), value))
            })
            .collect();
        Self { vars }
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn require(&self, name: &'static str) -> Result<PathBuf> {
        self.get(name)
            .map(PathBuf::from)
            .ok_or(ToolError::MissingEnv(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ToolConfig::new("/tmp/out");
        assert_eq!(config.solver, "checkers.inference.solver.DebugSolver");
        assert_eq!(config.mode, "INFER");
        assert_eq!(config.afu_output_dir, "afud/");
        assert_eq!(config.jdk_version(), 8);
        assert_eq!(config.batch_size, -1);
    }

    #[test]
    fn missing_values_are_reported_by_name() {
        let config = ToolConfig::new("/tmp/out");
        let err = config.require_checker("checker").unwrap_err();
        assert_eq!(err.to_string(), "the checker tool requires --checker");

        let env = ToolEnv::default().with(JSR308, "");
        assert!(matches!(
            env.require(JSR308),
            Err(ToolError::MissingEnv("JSR308"))
        ));
        assert!(env.require(CHECKERFRAMEWORK).unwrap_err().is_fatal());
    }

    #[test]
    fn splits_extra_javac_args() {
        let mut config = ToolConfig::new("/tmp/out");
        config.extra_javac_args = Some("-AskipUses=Foo  -Alint".into());
        assert_eq!(config.extra_javac_args(), vec!["-AskipUses=Foo", "-Alint"]);
    }
}

//! JVM flags the Checker Framework's javac needs on each supported JDK.

use crate::{Result, ToolError};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
enum Versions {
    Exactly(u32),
    AtLeast(u32),
}

impl Versions {
    fn contains(self, version: u32) -> bool {
        match self {
            Versions::Exactly(v) => version == v,
            Versions::AtLeast(v) => version >= v,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JdkFlags {
    /// Prepend the Checker Framework's javac to the bootclasspath.
    BootclasspathPrepend,
    /// Open these `com.sun.tools.javac` packages to the checker.
    AddOpens(&'static [&'static str]),
}

const JDK_TABLE: &[(Versions, JdkFlags)] = &[
    (Versions::Exactly(8), JdkFlags::BootclasspathPrepend),
    (Versions::Exactly(11), JdkFlags::AddOpens(&["comp"])),
    (
        Versions::AtLeast(16),
        JdkFlags::AddOpens(&[
            "api",
            "code",
            "comp",
            "file",
            "main",
            "parser",
            "processing",
            "tree",
            "util",
        ]),
    ),
];

/// Flags for running `$CHECKERFRAMEWORK/checker/bin/javac` on JDK `version`.
///
/// javac rejects `--add-opens` when targeting release 8, so no module flags
/// are produced when `releases_java_8` is set.
pub fn jdk_flags(version: u32, checker_home: &Path, releases_java_8: bool) -> Result<Vec<String>> {
    let (_, flags) = JDK_TABLE
        .iter()
        .find(|(versions, _)| versions.contains(version))
        .ok_or(ToolError::UnsupportedJdk(version))?;

    Ok(match flags {
        JdkFlags::BootclasspathPrepend => vec![format!(
            "-J-Xbootclasspath/p:{}",
            checker_home.join("checker/dist/javac.jar").display()
        )],
        JdkFlags::AddOpens(_) if releases_java_8 => Vec::new(),
        JdkFlags::AddOpens(packages) => packages
            .iter()
            .map(|package| {
                format!("-J--add-opens=jdk.compiler/com.sun.tools.javac.{package}=ALL-UNNAMED")
            })
            .collect(),
    })
}

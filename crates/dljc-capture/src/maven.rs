//! `mvn -X -B` log scraping.
//!
//! The compiler plugin logs stale sources one per line and then prints the
//! javac options on the line following `[DEBUG] Command line options:`. The
//! options line has no source files, so the pending stale sources are
//! appended to it.

use regex::Regex;
use std::{path::PathBuf, sync::OnceLock};

const BUILDING_JAR: &str = "[INFO] Building jar: ";
const COMMAND_LINE_OPTIONS: &str = "[DEBUG] Command line options:";

pub(crate) const DEBUG_FLAGS: &[&str] = &["-X", "-B"];

fn stale_source_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[DEBUG\] Stale source detected: ([^ ]*\.java)").expect("valid regex")
    })
}

pub(crate) fn javac_commands(lines: &[&str]) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    let mut pending_sources: Vec<String> = Vec::new();
    let mut options_next = false;

    for line in lines {
        if options_next {
            // The first token is the `[DEBUG]` level prefix.
            let mut argv: Vec<String> = line.split_whitespace().skip(1).map(str::to_string).collect();
            argv.append(&mut pending_sources);
            commands.push(argv);
            options_next = false;
        } else if line.contains(COMMAND_LINE_OPTIONS) {
            options_next = true;
        } else if let Some(captures) = stale_source_re().captures(line) {
            pending_sources.push(captures[1].to_string());
        }
    }

    commands
}

pub(crate) fn target_jars(lines: &[&str]) -> Vec<PathBuf> {
    lines
        .iter()
        .filter_map(|line| {
            let (_, jar) = line.split_once(BUILDING_JAR)?;
            let jar = jar.trim();
            (!jar.is_empty()).then(|| PathBuf::from(jar))
        })
        .collect()
}

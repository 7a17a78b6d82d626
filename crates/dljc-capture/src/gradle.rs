//! `gradle --debug` log scraping.
//!
//! With debug logging enabled the Java compile task prints its full javac
//! argument list on a single line after a fixed marker.

const COMPILER_ARGUMENTS: &str = " Compiler arguments: ";

pub(crate) const DEBUG_FLAGS: &[&str] = &["--debug"];

pub(crate) fn javac_commands(lines: &[&str]) -> Vec<Vec<String>> {
    lines
        .iter()
        .filter_map(|line| {
            let (_, arguments) = line.split_once(COMPILER_ARGUMENTS)?;
            Some(arguments.split_whitespace().map(str::to_string).collect())
        })
        .collect()
}

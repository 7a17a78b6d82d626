//! `ant -verbose` log scraping.
//!
//! The javac task echoes each compiler argument on its own quoted line after
//! `Compilation arguments:` and then lists the sources after
//! `Files to be compiled:`. Every line of interest carries the `[javac]` task
//! prefix.

use std::path::PathBuf;

const JAVAC_TASK: &str = "[javac]";
const COMPILATION_ARGUMENTS: &str = "Compilation arguments:";
const FILES_TO_BE_COMPILED: &str = "Files to be compiled:";
const BUILDING_JAR: &str = "[jar] Building jar: ";

pub(crate) const VERBOSE_FLAGS: &[&str] = &["-verbose"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Idle,
    Arguments,
    Files,
}

pub(crate) fn javac_commands(lines: &[&str]) -> Vec<Vec<String>> {
    let mut commands = Vec::new();
    let mut current: Option<Vec<String>> = None;
    let mut section = Section::Idle;

    for line in lines {
        let Some((_, content)) = line.split_once(JAVAC_TASK) else {
            if section == Section::Files {
                commands.extend(current.take());
                section = Section::Idle;
            }
            continue;
        };
        let content = content.trim();

        if content.starts_with(COMPILATION_ARGUMENTS) {
            commands.extend(current.take());
            current = Some(Vec::new());
            section = Section::Arguments;
            continue;
        }

        let Some(argv) = current.as_mut() else {
            continue;
        };

        if content.starts_with(FILES_TO_BE_COMPILED) {
            section = Section::Files;
            continue;
        }

        match section {
            Section::Arguments => {
                if let Some(arg) = unquote(content) {
                    argv.push(arg.to_string());
                }
            }
            Section::Files => {
                if content.ends_with(".java") {
                    argv.push(content.to_string());
                }
            }
            Section::Idle => {}
        }
    }

    commands.extend(current);
    commands
}

fn unquote(content: &str) -> Option<&str> {
    content
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
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

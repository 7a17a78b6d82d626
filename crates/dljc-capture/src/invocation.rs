//! Structured view of a single javac command line.
//!
//! Every capture strategy eventually produces raw javac argument vectors. This
//! module turns one such vector into a [`JavacInvocation`]: an ordered switch
//! map plus the `.java` files the invocation compiles. Nothing here knows about
//! the Java language; only argument shapes are inspected.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const GENERATED_SOURCES: &str = "generated-sources";

/// Value bound to a switch name.
///
/// Absent from the map, [`SwitchValue::Flag`] and [`SwitchValue::Value`] are
/// the three observable states of a switch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SwitchValue {
    /// Bare flag such as `-g` or `-nowarn`.
    Flag,
    /// `-key value` or `-key=value`.
    Value(String),
}

impl SwitchValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SwitchValue::Flag => None,
            SwitchValue::Value(value) => Some(value),
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, SwitchValue::Flag)
    }
}

// JSON dumps keep the historical `true | "value"` shape consumed by downstream
// scripts. Binary formats (the capture cache) get an explicit tag instead,
// because they cannot deserialize untagged data.
#[derive(Serialize)]
enum TaggedRef<'a> {
    Flag,
    Value(&'a str),
}

#[derive(Deserialize)]
enum Tagged {
    Flag,
    Value(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Untagged {
    Bool(bool),
    Str(String),
}

impl Serialize for SwitchValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            match self {
                SwitchValue::Flag => serializer.serialize_bool(true),
                SwitchValue::Value(value) => serializer.serialize_str(value),
            }
        } else {
            match self {
                SwitchValue::Flag => TaggedRef::Flag.serialize(serializer),
                SwitchValue::Value(value) => TaggedRef::Value(value).serialize(serializer),
            }
        }
    }
}

impl<'de> Deserialize<'de> for SwitchValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            match Untagged::deserialize(deserializer)? {
                Untagged::Bool(true) => Ok(SwitchValue::Flag),
                Untagged::Bool(false) => Err(serde::de::Error::custom(
                    "a switch flag can only be `true`",
                )),
                Untagged::Str(value) => Ok(SwitchValue::Value(value)),
            }
        } else {
            Ok(match Tagged::deserialize(deserializer)? {
                Tagged::Flag => SwitchValue::Flag,
                Tagged::Value(value) => SwitchValue::Value(value),
            })
        }
    }
}

/// Switch name (without the leading dash) to value, in command-line order.
pub type Switches = IndexMap<String, SwitchValue>;

/// Knobs for [`JavacInvocation::parse_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// When the argv names no `.java` files, walk the `-sourcepath`
    /// directories and use every `.java` file found there.
    pub guess_sources: bool,
}

/// One javac invocation performed by the captured build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JavacInvocation {
    #[serde(rename = "java_files")]
    pub source_files: Vec<String>,
    #[serde(rename = "javac_switches")]
    pub switches: Switches,
}

impl JavacInvocation {
    pub fn parse(argv: &[String]) -> Self {
        Self::parse_with(argv, ParseOptions::default())
    }

    /// Parse a raw javac argv (without the `javac` program name).
    ///
    /// A switch-first-part (`-key`, no `=`) takes the next token as its value
    /// unless that token is itself a switch or a `.java` file, in which case
    /// the switch is a bare flag and the token is processed normally.
    pub fn parse_with(argv: &[String], options: ParseOptions) -> Self {
        let mut switches = Switches::new();
        let mut source_files = Vec::new();
        let mut pending: Option<&str> = None;

        for token in argv {
            let token = token.as_str();
            let switch = is_switch(token);
            let java_file = !switch && token.ends_with(".java");

            if let Some(name) = pending.take() {
                if !switch && !java_file {
                    switches.insert(name.to_string(), SwitchValue::Value(token.to_string()));
                    continue;
                }
                switches.insert(name.to_string(), SwitchValue::Flag);
            }

            if java_file {
                source_files.push(token.to_string());
            } else if switch {
                let name = &token[1..];
                match name.split_once('=') {
                    Some((key, value)) => {
                        switches.insert(key.to_string(), SwitchValue::Value(value.to_string()));
                    }
                    None => pending = Some(name),
                }
            }
        }

        if let Some(name) = pending {
            switches.insert(name.to_string(), SwitchValue::Flag);
        }

        if options.guess_sources && source_files.is_empty() {
            source_files = guess_sources(&switches);
        }

        Self {
            source_files,
            switches,
        }
    }

    pub fn switch(&self, name: &str) -> Option<&SwitchValue> {
        self.switches.get(name)
    }

    /// String value of `name`; `None` when absent or a bare flag.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.switch(name).and_then(SwitchValue::as_str)
    }

    pub fn classpath(&self) -> Option<&str> {
        self.value("cp").or_else(|| self.value("classpath"))
    }

    pub fn class_directory(&self) -> Option<&str> {
        self.value("d")
    }

    /// `-sourcepath`, or the source files joined with `:` when the build did
    /// not pass one.
    pub fn source_path(&self) -> Option<String> {
        if let Some(sourcepath) = self.value("sourcepath") {
            return Some(sourcepath.to_string());
        }
        if self.source_files.is_empty() {
            None
        } else {
            Some(self.source_files.join(":"))
        }
    }

    /// `true` when the invocation targets Java 8 through `--release 8`.
    pub fn releases_java_8(&self) -> bool {
        self.value("-release") == Some("8")
    }

    /// Every `.class` file under the class directory, sorted.
    pub fn class_files(&self) -> Vec<PathBuf> {
        let Some(class_dir) = self.class_directory() else {
            return Vec::new();
        };
        WalkDir::new(class_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "class"))
            .collect()
    }

    /// Binary names (`com.example.Foo$Inner`) of the compiled classes.
    pub fn class_names(&self) -> Vec<String> {
        let Some(class_dir) = self.class_directory() else {
            return Vec::new();
        };
        let class_dir = Path::new(class_dir);
        self.class_files()
            .iter()
            .filter_map(|file| class_name(class_dir, file))
            .collect()
    }
}

fn is_switch(token: &str) -> bool {
    token.starts_with('-')
}

fn class_name(class_dir: &Path, class_file: &Path) -> Option<String> {
    let relative = class_file.strip_prefix(class_dir).ok()?;
    let relative = relative.to_string_lossy().replace('\\', "/");
    let stem = relative.strip_suffix(".class")?;
    Some(stem.replace('/', "."))
}

/// Walk the `-sourcepath` roots and collect every `.java` file, skipping
/// generated sources.
fn guess_sources(switches: &Switches) -> Vec<String> {
    let Some(sourcepath) = switches.get("sourcepath").and_then(SwitchValue::as_str) else {
        return Vec::new();
    };

    let mut files = Vec::new();
    for root in sourcepath
        .split(':')
        .filter(|root| !root.is_empty() && !root.contains(GENERATED_SOURCES))
    {
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !entry.file_name().to_string_lossy().contains(GENERATED_SOURCES));
        for entry in walker.filter_map(|entry| entry.ok()) {
            if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(".java")
            {
                files.push(entry.path().to_string_lossy().into_owned());
            }
        }
    }

    tracing::debug!(
        target: "dljc.capture",
        sourcepath,
        guessed = files.len(),
        "guessed source files from sourcepath"
    );
    files
}

use std::{fmt, path::Path};

/// Colon-separated classpath assembled from the build's classpath and
/// tool-specific additions. Empty entries are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classpath {
    entries: Vec<String>,
}

impl Classpath {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a raw `-classpath` value, split on `:`.
    pub fn parse(raw: Option<&str>) -> Self {
        let mut classpath = Self::new();
        if let Some(raw) = raw {
            for entry in raw.split(':') {
                classpath.push(entry);
            }
        }
        classpath
    }

    pub fn push(&mut self, entry: impl Into<String>) -> &mut Self {
        let entry = entry.into();
        if !entry.is_empty() {
            self.entries.push(entry);
        }
        self
    }

    pub fn push_path(&mut self, path: &Path) -> &mut Self {
        self.push(path.to_string_lossy().into_owned())
    }

    /// Append every entry of another `:`-separated path.
    pub fn extend_raw(&mut self, raw: &str) -> &mut Self {
        for entry in raw.split(':') {
            self.push(entry);
        }
        self
    }

    pub fn with(mut self, entry: impl Into<String>) -> Self {
        self.push(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Joined with a trailing separator, the form javac-based tools are
    /// handed (`a.jar:lib:`).
    pub fn to_trailing_string(&self) -> String {
        let mut joined = String::new();
        for entry in &self.entries {
            joined.push_str(entry);
            joined.push(':');
        }
        joined
    }
}

impl fmt::Display for Classpath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entries.join(":"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_empty_entries() {
        let classpath = Classpath::parse(Some("a.jar::b.jar:")).with("");
        assert_eq!(classpath.entries(), ["a.jar", "b.jar"]);
        assert_eq!(classpath.to_string(), "a.jar:b.jar");
    }

    #[test]
    fn trailing_form_ends_with_separator() {
        let mut classpath = Classpath::parse(Some("target/classes"));
        classpath.extend_raw("quals.jar:more.jar").push_path(Path::new("/lib"));
        assert_eq!(
            classpath.to_trailing_string(),
            "target/classes:quals.jar:more.jar:/lib:"
        );
        assert_eq!(Classpath::parse(None).to_trailing_string(), "");
    }
}

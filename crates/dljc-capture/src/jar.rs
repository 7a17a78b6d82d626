use serde::{Deserialize, Serialize};
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};

const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
const MAIN_CLASS: &str = "Main-Class";

/// A jar produced by the captured build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetJar {
    #[serde(rename = "jar")]
    pub path: PathBuf,
    /// Entry point from the manifest, when the jar is executable.
    #[serde(rename = "main")]
    pub main_class: Option<String>,
}

impl TargetJar {
    /// Read the jar's manifest and record its `Main-Class`.
    ///
    /// Unreadable jars are kept without an entry point.
    pub fn probe(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let main_class = match read_main_class(&path) {
            Ok(main_class) => main_class,
            Err(err) => {
                tracing::warn!(
                    target: "dljc.capture",
                    path = %path.display(),
                    error = %err,
                    "unable to read jar manifest"
                );
                None
            }
        };
        Self { path, main_class }
    }

    pub fn is_executable(&self) -> bool {
        self.main_class.is_some()
    }
}

fn read_main_class(path: &Path) -> io::Result<Option<String>> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(io::Error::other)?;
    let mut entry = match archive.by_name(MANIFEST_PATH) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(io::Error::other(err)),
    };
    let mut bytes = Vec::new();
    entry.read_to_end(&mut bytes)?;
    Ok(manifest_main_class(&String::from_utf8_lossy(&bytes)))
}

/// Extract the `Main-Class` attribute from manifest text.
///
/// Manifest lines are wrapped at 72 bytes; a line starting with a single space
/// continues the previous one.
pub fn manifest_main_class(manifest: &str) -> Option<String> {
    let mut logical: Vec<String> = Vec::new();
    for line in manifest.lines() {
        let line = line.trim_end_matches('\r');
        match (line.strip_prefix(' '), logical.last_mut()) {
            (Some(continuation), Some(last)) => last.push_str(continuation),
            _ => logical.push(line.to_string()),
        }
    }

    logical.iter().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case(MAIN_CLASS) {
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_main_class_attribute() {
        let manifest = "Manifest-Version: 1.0\r\nMain-Class: com.example.App\r\n\r\n";
        assert_eq!(
            manifest_main_class(manifest).as_deref(),
            Some("com.example.App")
        );
    }

    #[test]
    fn joins_continuation_lines() {
        let manifest = "Manifest-Version: 1.0\nMain-Class: com.example.very.long.package.na\n me.Application\nCreated-By: test\n";
        assert_eq!(
            manifest_main_class(manifest).as_deref(),
            Some("com.example.very.long.package.name.Application")
        );
    }

    #[test]
    fn library_manifest_has_no_main_class() {
        assert_eq!(manifest_main_class("Manifest-Version: 1.0\n"), None);
        assert_eq!(manifest_main_class("Main-Class:   \n"), None);
    }

    #[test]
    fn missing_jar_is_kept_without_main_class() {
        let jar = TargetJar::probe("/definitely/missing/app.jar");
        assert_eq!(jar.path, PathBuf::from("/definitely/missing/app.jar"));
        assert!(!jar.is_executable());
    }

    #[test]
    fn probes_manifest_inside_jar() {
        use std::io::Write;

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("app.jar");
        let mut writer = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
        writer
            .start_file(MANIFEST_PATH, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(b"Manifest-Version: 1.0\r\nMain-Class: com.example.App\r\n\r\n")
            .unwrap();
        writer.finish().unwrap();

        let jar = TargetJar::probe(&path);
        assert_eq!(jar.main_class.as_deref(), Some("com.example.App"));
    }

    #[test]
    fn json_uses_jar_and_main_keys() {
        let jar = TargetJar {
            path: PathBuf::from("target/app.jar"),
            main_class: Some("com.example.App".into()),
        };
        assert_eq!(
            serde_json::to_value(&jar).unwrap(),
            serde_json::json!({ "jar": "target/app.jar", "main": "com.example.App" })
        );
    }
}

use crate::fs_cleanup::{remove_file_best_effort, sync_dir_best_effort};
use crate::CaptureResult;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// File name of the cache inside the output directory.
pub const CACHE_FILE_NAME: &str = "dljc.cache";

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode cache file {path}: {source}")]
    Decode {
        path: PathBuf,
        source: bincode::Error,
    },
    #[error("failed to encode cache file {path}: {source}")]
    Encode {
        path: PathBuf,
        source: bincode::Error,
    },
}

/// The memoized [`CaptureResult`] of an output directory.
///
/// There is no staleness check: a cache file is trusted whenever the caller
/// enables the cache.
#[derive(Debug, Clone)]
pub struct CaptureCache {
    path: PathBuf,
}

impl CaptureCache {
    pub fn new(output_dir: &Path) -> Self {
        Self {
            path: output_dir.join(CACHE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<CaptureResult>, CacheError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let result = bincode::deserialize(&bytes).map_err(|source| CacheError::Decode {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(result))
    }

    /// Replace the cache file atomically (write to a sibling, then rename).
    pub fn store(&self, result: &CaptureResult) -> Result<(), CacheError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|source| CacheError::Write {
            path: self.path.clone(),
            source,
        })?;

        let bytes = bincode::serialize(result).map_err(|source| CacheError::Encode {
            path: self.path.clone(),
            source,
        })?;

        let (tmp_path, mut file) =
            open_unique_tmp_file(&self.path, parent).map_err(|source| CacheError::Write {
                path: self.path.clone(),
                source,
            })?;
        if let Err(source) = file.write_all(&bytes).and_then(|()| file.sync_all()) {
            drop(file);
            remove_file_best_effort(&tmp_path, "cache.write_failed");
            return Err(CacheError::Write {
                path: tmp_path,
                source,
            });
        }
        drop(file);

        if let Err(source) = rename_over(&tmp_path, &self.path) {
            remove_file_best_effort(&tmp_path, "cache.rename_failed");
            return Err(CacheError::Write {
                path: self.path.clone(),
                source,
            });
        }
        sync_dir_best_effort(parent, "cache.store");

        tracing::debug!(
            target: "dljc.capture",
            path = %self.path.display(),
            bytes = bytes.len(),
            "stored capture cache"
        );
        Ok(())
    }

    /// Return the cached result when `enabled` and present, otherwise run
    /// `capture` and cache a successful result.
    ///
    /// A failed build (`Ok(None)`) is never cached.
    pub fn get_or_capture<F>(&self, enabled: bool, capture: F) -> crate::Result<Option<CaptureResult>>
    where
        F: FnOnce() -> crate::Result<Option<CaptureResult>>,
    {
        if enabled {
            if let Some(cached) = self.load()? {
                tracing::info!(
                    target: "dljc.capture",
                    path = %self.path.display(),
                    invocations = cached.javac_invocations.len(),
                    "using cached capture"
                );
                return Ok(Some(cached));
            }
        }

        let Some(result) = capture()? else {
            return Ok(None);
        };
        self.store(&result)?;
        Ok(Some(result))
    }
}

fn rename_over(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        // `rename` does not replace an existing file on Windows.
        Err(err) if cfg!(windows) && to.exists() => {
            match fs::remove_file(to) {
                Ok(()) => {}
                Err(remove_err) if remove_err.kind() == io::ErrorKind::NotFound => {}
                Err(_) => return Err(err),
            }
            fs::rename(from, to)
        }
        Err(err) => Err(err),
    }
}

fn open_unique_tmp_file(dest: &Path, parent: &Path) -> io::Result<(PathBuf, fs::File)> {
    let file_name = dest
        .file_name()
        .ok_or_else(|| io::Error::other("destination path has no file name"))?;
    let pid = std::process::id();

    loop {
        let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let mut tmp_name = file_name.to_os_string();
        tmp_name.push(format!(".tmp.{pid}.{counter}"));
        let tmp_path = parent.join(tmp_name);

        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
        {
            Ok(file) => return Ok((tmp_path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CaptureStats, JavacInvocation, TargetJar};

    fn sample() -> CaptureResult {
        let argv: Vec<String> = ["-g", "-d", "out", "A.java"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        CaptureResult {
            javac_invocations: vec![JavacInvocation::parse(&argv)],
            target_jars: vec![TargetJar {
                path: PathBuf::from("app.jar"),
                main_class: None,
            }],
            stats: CaptureStats {
                build_time: 0.25,
                source_files_count: 1,
                javac_invocation_count: 1,
                built_jar_count: 1,
                ..CaptureStats::default()
            },
        }
    }

    #[test]
    fn missing_cache_loads_as_none() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CaptureCache::new(tmp.path()).load().unwrap().is_none());
    }

    #[test]
    fn store_then_load_preserves_switch_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CaptureCache::new(&tmp.path().join("nested"));
        cache.store(&sample()).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert!(loaded.javac_invocations[0].switch("g").unwrap().is_flag());

        let leftovers: Vec<_> = fs::read_dir(tmp.path().join("nested"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from(CACHE_FILE_NAME)]);
    }

    #[test]
    fn corrupt_cache_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CaptureCache::new(tmp.path());
        fs::write(cache.path(), b"\xff\xff\xff\xff\xff\xff\xff\xff\xff").unwrap();
        assert!(matches!(cache.load(), Err(CacheError::Decode { .. })));
    }

    #[test]
    fn disabled_cache_always_captures_and_refreshes() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CaptureCache::new(tmp.path());
        let mut stale = sample();
        stale.stats.build_time = 99.0;
        cache.store(&stale).unwrap();

        let result = cache.get_or_capture(false, || Ok(Some(sample()))).unwrap();
        assert_eq!(result, Some(sample()));
        assert_eq!(cache.load().unwrap(), Some(sample()));
    }

    #[test]
    fn failed_capture_is_not_cached() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = CaptureCache::new(tmp.path());
        assert_eq!(cache.get_or_capture(true, || Ok(None)).unwrap(), None);
        assert!(!cache.path().exists());
    }
}

use anyhow::{Context, Result};
use std::{fs::File, path::Path, sync::Mutex};
use tracing_subscriber::{fmt::writer::BoxMakeWriter, EnvFilter};

pub const TOPLEVEL_LOG: &str = "toplevel.log";
const DEFAULT_DIRECTIVES: &str = "info";

/// Install the global subscriber, writing to `<output_dir>/toplevel.log`
/// (truncated) or to stderr.
pub fn init(output_dir: &Path, to_stderr: bool) -> Result<()> {
    let writer = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        let path = output_dir.join(TOPLEVEL_LOG);
        let file =
            File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        BoxMakeWriter::new(Mutex::new(file))
    };

    let rust_log = std::env::var("RUST_LOG").ok();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(rust_log.as_deref()))
        .with_writer(writer)
        .with_ansi(false)
        .finish();
    // Only the first subscriber wins; later calls in the same process keep it.
    let _ = tracing::subscriber::set_global_default(subscriber);
    Ok(())
}

/// `info`, overridden by whatever `RUST_LOG` adds.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    let default = || EnvFilter::new(DEFAULT_DIRECTIVES);
    match rust_log.map(str::trim).filter(|value| !value.is_empty()) {
        Some(env_directives) => EnvFilter::try_new(format!("{DEFAULT_DIRECTIVES},{env_directives}"))
            .or_else(|_| EnvFilter::try_new(env_directives))
            .unwrap_or_else(|_| default()),
        None => default(),
    }
}

/// The command line and the parts of the environment that decide which
/// build tools are found.
pub fn log_header(argv: &[String]) {
    let command = argv
        .iter()
        .map(|arg| dljc_process::shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ");
    let var = |name: &str| std::env::var(name).unwrap_or_default();

    tracing::info!(target: "dljc.cli", command = %command, "running command");
    tracing::info!(
        target: "dljc.cli",
        os = std::env::consts::OS,
        arch = std::env::consts::ARCH,
        "platform"
    );
    tracing::info!(
        target: "dljc.cli",
        path = %var("PATH"),
        shell = %var("SHELL"),
        pwd = %var("PWD"),
        "environment"
    );
}

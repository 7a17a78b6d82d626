use dljc_process::{
    run_command, CommandRunner, CommandSpec, DefaultCommandRunner, LogSink, RunOptions,
};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

fn helper() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_dljc_process_test_helper"))
}

fn helper_command(args: &[&str]) -> CommandSpec {
    CommandSpec::new(
        Path::new("."),
        helper(),
        args.iter().map(|arg| arg.to_string()).collect(),
    )
}

#[test]
fn captures_stdout_and_stderr() {
    let result = run_command(
        &helper_command(&["--stdout-line", "hello", "--stderr-line", "warning"]),
        &RunOptions::default(),
    );

    assert!(result.success());
    assert_eq!(result.return_code, Some(0));
    assert!(!result.timed_out);
    assert!(result.output.contains("hello\n"));
    assert!(result.output.contains("warning\n"));
}

#[test]
fn reports_non_zero_exit_code() {
    let result = run_command(
        &helper_command(&["--stdout-line", "compiling", "--exit-code", "3"]),
        &RunOptions::default(),
    );

    assert!(!result.success());
    assert_eq!(result.return_code, Some(3));
    assert!(result.output.contains("compiling"));
}

#[test]
fn timeout_kills_child() {
    let opts = RunOptions {
        timeout: Some(Duration::from_millis(50)),
        ..RunOptions::default()
    };

    let result = run_command(&helper_command(&["--sleep-ms", "5000"]), &opts);

    assert!(result.timed_out);
    assert!(!result.success());
    assert_eq!(result.return_code, None);
}

#[test]
fn timeout_kills_process_tree() {
    let opts = RunOptions {
        timeout: Some(Duration::from_millis(50)),
        ..RunOptions::default()
    };

    let start = Instant::now();
    let result = run_command(
        &helper_command(&["--spawn-child-sleep-ms", "5000", "--sleep-ms", "5000"]),
        &opts,
    );

    assert!(result.timed_out);
    assert!(
        start.elapsed() < Duration::from_secs(2),
        "expected timeout kill to return promptly, took {:?}",
        start.elapsed()
    );
}

#[test]
fn missing_binary_is_reported_as_output() {
    let command = CommandSpec::new(
        Path::new("."),
        "/definitely/not/a/real/binary",
        vec!["--version".into()],
    );

    let result = run_command(&command, &RunOptions::default());

    assert!(!result.success());
    assert!(!result.timed_out);
    assert_eq!(result.return_code, None);
    assert!(
        result.output.starts_with("calling /definitely/not/a/real/binary --version failed"),
        "unexpected output: {}",
        result.output
    );
}

#[test]
fn file_sink_receives_header_and_output() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("logs").join("check-stdout.log");

    let runner = DefaultCommandRunner::default();
    runner.run(
        &helper_command(&["--stdout-line", "first"]),
        LogSink::File(log.clone()),
    );
    runner.run(
        &helper_command(&["--stdout-line", "second"]),
        LogSink::File(log.clone()),
    );

    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.starts_with("Running "));
    assert!(text.contains("--stdout-line first"));
    let first = text.find("first\n").unwrap();
    let second = text.find("second\n").unwrap();
    assert!(first < second, "log should be appended in order:\n{text}");
}

#[test]
fn timeout_is_noted_in_log_but_not_in_output() {
    let tmp = tempfile::tempdir().unwrap();
    let log = tmp.path().join("slow-stdout.log");
    let runner = DefaultCommandRunner::with_timeout(Some(Duration::from_millis(50)));

    let result = runner.run(
        &helper_command(&["--sleep-ms", "5000"]),
        LogSink::File(log.clone()),
    );

    assert!(result.timed_out);
    assert!(!result.output.contains("Timed out"));
    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("Timed out after 0 seconds on "));
}

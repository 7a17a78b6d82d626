use dljc_capture::JavacInvocation;
use dljc_process::{CommandRunner, CommandSpec, LogSink, ProcessResult};
use dljc_tools::{run_tools, Tool, ToolConfig, ToolContext, ToolEnv, ToolError, CHECKERFRAMEWORK};
use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

/// Pretends to be the checker: every inference run writes a stub file whose
/// content changes until `changing_runs` runs have happened. With zero
/// changing runs it writes nothing.
#[derive(Debug)]
struct StubWritingChecker {
    changing_runs: usize,
    commands: Mutex<Vec<CommandSpec>>,
}

impl StubWritingChecker {
    fn new(changing_runs: usize) -> Arc<Self> {
        Arc::new(Self {
            changing_runs,
            commands: Mutex::new(Vec::new()),
        })
    }

    fn commands(&self) -> Vec<CommandSpec> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandRunner for StubWritingChecker {
    fn run(&self, command: &CommandSpec, _sink: LogSink) -> ProcessResult {
        let mut commands = self.commands.lock().unwrap();
        commands.push(command.clone());

        if self.changing_runs > 0 && command.args.iter().any(|arg| arg == "-Ainfer=stubs") {
            let runs = commands
                .iter()
                .filter(|c| c.args.iter().any(|arg| arg == "-Ainfer=stubs"))
                .count();
            let generation = runs.min(self.changing_runs);
            let dir = command.cwd.join("build/whole-program-inference");
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("com.example.App.astub"),
                format!("package com.example;\nclass App {{ /* generation {generation} */ }}\n"),
            )
            .unwrap();
        }

        ProcessResult {
            output: String::new(),
            return_code: Some(0),
            elapsed: Duration::from_millis(5),
            timed_out: false,
        }
    }
}

fn invocation(tokens: &[&str]) -> JavacInvocation {
    let argv: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    JavacInvocation::parse(&argv)
}

fn context(root: &Path, runner: Arc<StubWritingChecker>) -> ToolContext {
    let mut config = ToolConfig::new(root.join("dljc-out"));
    config.checker = Some("org.checkerframework.checker.nullness.NullnessChecker".into());
    config.jdk_version = Some(17);
    ToolContext::with_runner(
        config,
        ToolEnv::default().with(CHECKERFRAMEWORK, "/opt/checker-framework"),
        root,
        runner,
    )
}

#[test]
fn iterates_until_stubs_stop_changing() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = StubWritingChecker::new(3);
    let ctx = context(tmp.path(), runner.clone());
    let invocations = vec![invocation(&[
        "-classpath",
        "lib/guava.jar",
        "-d",
        "build/classes",
        "-source",
        "1.7",
        "src/main/java/com/example/App.java",
    ])];

    run_tools(&ctx, &[Tool::Wpi], &invocations, &[]).unwrap();

    let commands = runner.commands();
    assert_eq!(commands.len(), 5, "4 inference runs and 1 report run");
    for command in &commands[..4] {
        assert!(command.args.contains(&"-Awarns".to_string()));
        assert!(command.args.contains(&"-Ainfer=stubs".to_string()));
    }
    let report = &commands[4];
    assert!(!report.args.contains(&"-Awarns".to_string()));
    assert!(!report.args.contains(&"-Ainfer=stubs".to_string()));

    assert_eq!(
        commands[0].program,
        Path::new("/opt/checker-framework/checker/bin/javac")
    );
    assert!(!commands[0].args.iter().any(|arg| arg.starts_with("-Astubs=")));

    let results = tmp.path().join("dljc-out/wpi/0");
    let last_stubs = commands[3]
        .args
        .iter()
        .find_map(|arg| arg.strip_prefix("-Astubs="))
        .unwrap();
    let expected: Vec<String> = (0..3)
        .map(|i| results.join(format!("iteration{i}")).display().to_string())
        .collect();
    assert_eq!(last_stubs, expected.join(":"));
    assert!(report.args.contains(&format!("-Astubs={}", expected.join(":"))));

    // Old language levels are raised to 8.
    let source = report.args.iter().position(|arg| arg == "-source").unwrap();
    assert_eq!(report.args[source + 1], "8");
    let processor = report.args.iter().position(|arg| arg == "-processor").unwrap();
    assert_eq!(
        report.args[processor + 1],
        "org.checkerframework.checker.nullness.NullnessChecker"
    );

    assert!(results.join("iteration3/com.example.App.astub").is_file());
    assert!(!tmp
        .path()
        .join("build/whole-program-inference/com.example.App.astub")
        .exists());
}

#[test]
fn each_invocation_gets_its_own_results() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = StubWritingChecker::new(1);
    let ctx = context(tmp.path(), runner.clone());
    let invocations = vec![
        invocation(&["-d", "a/classes", "A.java"]),
        invocation(&["-d", "b/classes", "B.java"]),
    ];

    run_tools(&ctx, &[Tool::Wpi], &invocations, &[]).unwrap();

    // Generation 1 repeats from the second run on: 2 runs + report, twice.
    assert_eq!(runner.commands().len(), 6);
    assert!(tmp.path().join("dljc-out/wpi/0/iteration1").is_dir());
    assert!(tmp.path().join("dljc-out/wpi/1/iteration1").is_dir());

    let log = fs::read_to_string(tmp.path().join("dljc-out/wpi-stdout.log")).unwrap();
    assert_eq!(log.lines().filter(|line| line.starts_with("-----")).count(), 2);
}

#[test]
fn missing_checker_framework_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = StubWritingChecker::new(1);
    let ctx = ToolContext::with_runner(
        ToolConfig::new(tmp.path().join("dljc-out")),
        ToolEnv::default(),
        tmp.path(),
        runner.clone(),
    );

    let err = run_tools(
        &ctx,
        &[Tool::Wpi, Tool::Print],
        &[invocation(&["A.java"])],
        &[],
    )
    .unwrap_err();

    assert!(matches!(err, ToolError::MissingEnv(CHECKERFRAMEWORK)));
    assert!(runner.commands().is_empty());
}

#[test]
fn java_8_source_level_keeps_module_flags_on_jdk_17() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = StubWritingChecker::new(1);
    let ctx = context(tmp.path(), runner.clone());
    let invocations = vec![invocation(&["-source", "1.8", "-target", "1.8", "A.java"])];

    run_tools(&ctx, &[Tool::Wpi], &invocations, &[]).unwrap();

    for command in runner.commands() {
        let opens = command
            .args
            .iter()
            .filter(|arg| arg.starts_with("-J--add-opens="))
            .count();
        assert_eq!(opens, 9, "args: {:?}", command.args);
    }
}

#[test]
fn release_8_suppresses_module_flags_on_jdk_17() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = StubWritingChecker::new(1);
    let ctx = context(tmp.path(), runner.clone());
    let invocations = vec![invocation(&["--release", "8", "A.java"])];

    run_tools(&ctx, &[Tool::Wpi], &invocations, &[]).unwrap();

    let commands = runner.commands();
    assert!(!commands.is_empty());
    for command in commands {
        assert!(!command.args.iter().any(|arg| arg.contains("--add-opens")));
        assert!(command
            .args
            .windows(2)
            .any(|pair| pair[0] == "--release" && pair[1] == "8"));
    }
}

#[test]
fn checker_without_inference_output_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let runner = StubWritingChecker::new(0);
    let ctx = context(tmp.path(), runner.clone());

    let err = run_tools(
        &ctx,
        &[Tool::Wpi, Tool::Checker],
        &[invocation(&["A.java"]), invocation(&["B.java"])],
        &[],
    )
    .unwrap_err();

    match err {
        ToolError::NoInferenceOutput { dir, .. } => {
            assert_eq!(dir, tmp.path().join("build/whole-program-inference"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // No report run, no second invocation and no checker tool afterwards.
    assert_eq!(runner.commands().len(), 1);
}

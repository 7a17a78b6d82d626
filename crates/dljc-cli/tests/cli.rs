use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

fn dljc() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("dljc"))
}

#[test]
fn without_build_command_prints_help() {
    dljc().assert().success().stdout(
        predicate::str::contains("Supported build commands")
            .and(predicate::str::contains("gradle"))
            .and(predicate::str::contains("dyntracecounts")),
    );
}

#[test]
fn unknown_build_command_prints_help() {
    let temp = TempDir::new().unwrap();
    dljc()
        .current_dir(temp.path())
        .args(["--", "make", "all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"));
    temp.child("dljc-out").assert(predicate::path::missing());
}

#[cfg(unix)]
fn fake_javac(temp: &TempDir, exit_code: i32) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = temp.child("bin/javac");
    script
        .write_str(&format!(
            "#!/bin/sh\necho \"compiling $#\" files\nexit {exit_code}\n"
        ))
        .unwrap();
    std::fs::set_permissions(script.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
    script.path().to_path_buf()
}

#[cfg(unix)]
#[test]
fn successful_build_writes_json_dumps() {
    let temp = TempDir::new().unwrap();
    let javac = fake_javac(&temp, 0);

    dljc()
        .current_dir(temp.path())
        .arg("--quiet")
        .arg("--")
        .arg(&javac)
        .args(["-g", "-d", "classes", "-cp", "lib/a.jar", "src/A.java", "src/B.java"])
        .assert()
        .success();

    let out = temp.child("dljc-out");
    let javac_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.child("javac.json").path()).unwrap())
            .unwrap();
    assert_eq!(
        javac_json,
        serde_json::json!([{
            "java_files": ["src/A.java", "src/B.java"],
            "javac_switches": { "g": true, "d": "classes", "cp": "lib/a.jar" }
        }])
    );

    let stats: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out.child("stats.json").path()).unwrap())
            .unwrap();
    assert_eq!(stats["source_files"], 2);
    assert_eq!(stats["javac_invocations"], 1);

    out.child("jars.json").assert("[]\n");
    out.child("toplevel.log")
        .assert(predicate::str::contains("running command"));
    out.child("build_output.txt")
        .assert(predicate::str::contains("compiling 7 files"));
}

#[cfg(unix)]
#[test]
fn failed_build_exits_non_zero_without_dumps() {
    let temp = TempDir::new().unwrap();
    let javac = fake_javac(&temp, 1);

    dljc()
        .current_dir(temp.path())
        .args(["--quiet", "--cache", "--"])
        .arg(&javac)
        .arg("A.java")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("DLJC: Build command failed."));

    let out = temp.child("dljc-out");
    out.child("javac.json").assert(predicate::path::missing());
    out.child("dljc.cache").assert(predicate::path::missing());
}

#[cfg(unix)]
#[test]
fn print_tool_writes_capture_to_stdout() {
    let temp = TempDir::new().unwrap();
    let javac = fake_javac(&temp, 0);

    let output = dljc()
        .current_dir(temp.path())
        .args(["--quiet", "-t", "print,nosuchtool", "--"])
        .arg(&javac)
        .args(["-d", "classes", "A.java"])
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ERROR: Could not find tool nosuchtool"));
    let json_start = stdout.find('{').unwrap();
    let printed: serde_json::Value = serde_json::from_str(&stdout[json_start..]).unwrap();
    assert_eq!(printed["javac_commands"][0]["java_files"][0], "A.java");
    assert_eq!(printed["jars"], serde_json::json!([]));
}

#[cfg(unix)]
#[test]
fn missing_checker_is_fatal() {
    let temp = TempDir::new().unwrap();
    let javac = fake_javac(&temp, 0);

    dljc()
        .current_dir(temp.path())
        .args(["--quiet", "-t", "checker", "--"])
        .arg(&javac)
        .arg("A.java")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("requires --checker"));
}

//! Randoop test generation followed by Daikon dynamic invariant detection.
//!
//! For invocation `i` (1-based) the pipeline works in
//! `<out>/test-src<i>` (generated JUnit sources) and `<out>/test-classes<i>`
//! (compiled tests, traces and invariants).

use crate::{fs_util, invariants_from_xml, Classpath, Result, ToolContext, ToolError, DAIKONDIR};
use dljc_capture::JavacInvocation;
use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

const RANDOOP_TIME_LIMIT: u32 = 900;
const RANDOOP_OUTPUT_LIMIT: u32 = 2000;
const CLASS_LIST: &str = "classlist.txt";
const NO_JDK: &str = "NO-JDK";
const NO_TERNARY: &str = "NO-TERNARY";

/// Which stages of the pipeline a tool runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DyntraceParts {
    pub randoop: bool,
    pub chicory: bool,
    /// Extra Daikon run that counts possible invariants.
    pub invariant_counts: bool,
}

impl DyntraceParts {
    pub const RANDOOP: Self = Self {
        randoop: true,
        chicory: false,
        invariant_counts: false,
    };
    pub const CHICORY: Self = Self {
        randoop: false,
        chicory: true,
        invariant_counts: false,
    };
    pub const DYNTRACE: Self = Self {
        randoop: true,
        chicory: true,
        invariant_counts: false,
    };
    pub const DYNTRACE_COUNTS: Self = Self {
        randoop: true,
        chicory: true,
        invariant_counts: true,
    };

    fn tool_name(self) -> &'static str {
        match (self.randoop, self.chicory, self.invariant_counts) {
            (true, false, _) => "randoop",
            (false, _, _) => "chicory",
            (true, true, false) => "dyntrace",
            (true, true, true) => "dyntracecounts",
        }
    }
}

/// Parsed omit-list file: Daikon program points to skip plus two switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OmitList {
    pub patterns: Vec<String>,
    /// Skip JDK instrumentation in DynComp (`--rt-file=none`).
    pub no_jdk: bool,
    /// Disable Daikon's linear ternary invariants.
    pub no_ternary: bool,
}

impl OmitList {
    pub fn parse(text: &str) -> Self {
        let mut omit = Self::default();
        for line in text.lines().map(str::trim).filter(|line| !line.is_empty()) {
            match line {
                NO_JDK => omit.no_jdk = true,
                NO_TERNARY => omit.no_ternary = true,
                pattern => omit.patterns.push(pattern.to_string()),
            }
        }
        omit
    }

    fn read(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text =
            fs::read_to_string(path).map_err(|err| ToolError::io("failed to read", path, err))?;
        Ok(Self::parse(&text))
    }

    fn args(&self) -> impl Iterator<Item = String> + '_ {
        self.patterns
            .iter()
            .map(|pattern| format!("--ppt-omit-pattern={pattern}"))
    }
}

/// `--ppt-select-pattern` arguments: one per package directory (relative to
/// `class_dir`) holding class files, skipping directories nested inside one
/// already selected and the default package.
pub fn select_patterns(class_dir: &Path) -> Vec<String> {
    let packages: BTreeSet<PathBuf> = fs_util::files_with_extension(class_dir, "class")
        .into_iter()
        .filter_map(|file| file.parent().map(Path::to_path_buf))
        .filter(|dir| dir != class_dir)
        .collect();

    let mut selected: Option<&Path> = None;
    let mut patterns = Vec::new();
    for package in &packages {
        if selected.is_some_and(|prev| package.starts_with(prev)) {
            continue;
        }
        selected = Some(package.as_path());
        let Ok(relative) = package.strip_prefix(class_dir) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join(".");
        patterns.push(format!("--ppt-select-pattern={name}"));
    }
    patterns
}

/// `<out>/<kind>.<index>`, falling back to `<out>/<kind>`.
fn special_file(out_dir: &Path, kind: &str, index: usize) -> Option<PathBuf> {
    [
        out_dir.join(format!("{kind}.{index}")),
        out_dir.join(kind),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

struct Workspace {
    index: usize,
    class_dir: PathBuf,
    test_src_dir: PathBuf,
    test_class_dir: PathBuf,
    randoop_classpath: Classpath,
    compile_classpath: Classpath,
    daikon_classpath: Classpath,
    driver: &'static str,
}

pub(crate) fn run(
    ctx: &ToolContext,
    invocations: &[JavacInvocation],
    parts: DyntraceParts,
) -> Result<()> {
    let tool = parts.tool_name();
    let lib_dir = ctx.config.require_lib_dir(tool)?.to_path_buf();
    let daikon_dir = if parts.chicory {
        Some(ctx.env.require(DAIKONDIR)?)
    } else {
        None
    };

    for (index, invocation) in invocations.iter().enumerate() {
        let workspace = prepare(ctx, tool, index, invocation, &lib_dir, daikon_dir.as_deref())?;
        if parts.randoop {
            run_randoop(ctx, &workspace, invocation)?;
        }
        if parts.chicory {
            run_daikon_pipeline(ctx, &workspace, parts.invariant_counts)?;
        }
    }
    Ok(())
}

fn prepare(
    ctx: &ToolContext,
    tool: &'static str,
    index: usize,
    invocation: &JavacInvocation,
    lib_dir: &Path,
    daikon_dir: Option<&Path>,
) -> Result<Workspace> {
    let number = index + 1;
    let class_dir = ctx.resolve(invocation.class_directory().ok_or(ToolError::MissingSwitch {
        tool,
        index,
        switch: "d",
    })?);
    let out = ctx.output_dir();
    let test_src_dir = out.join(format!("test-src{number}"));
    let test_class_dir = out.join(format!("test-classes{number}"));
    fs_util::create_dir(&test_class_dir)?;

    let mut base_classpath = Classpath::parse(invocation.classpath());
    base_classpath.push_path(&class_dir);
    fs_util::write_file(
        &test_class_dir.join("classpath.txt"),
        &base_classpath.to_string(),
    )?;
    fs_util::write_file(
        &test_class_dir.join("classdir.txt"),
        &class_dir.to_string_lossy(),
    )?;

    let mut randoop_classpath = Classpath::new();
    randoop_classpath.push_path(&lib_dir.join("randoop.jar"));
    randoop_classpath.extend_raw(&base_classpath.to_string());

    // Randoop replaces System.exit, so it stays on the test compile classpath.
    let mut compile_classpath = Classpath::new();
    compile_classpath.push_path(&lib_dir.join("junit-4.12.jar"));
    compile_classpath.extend_raw(&randoop_classpath.to_string());

    let mut daikon_classpath = Classpath::new();
    daikon_classpath.push_path(&test_class_dir);
    if let Some(daikon_dir) = daikon_dir {
        for jar in ["daikon.jar", "ChicoryPremain.jar", "dcomp_premain.jar", "dcomp_rt.jar"] {
            daikon_classpath.push_path(&daikon_dir.join(jar));
        }
        daikon_classpath.push_path(daikon_dir);
    }
    daikon_classpath.push_path(&lib_dir.join("hamcrest-core-1.3.jar"));
    daikon_classpath.extend_raw(&compile_classpath.to_string());

    Ok(Workspace {
        index: number,
        class_dir,
        test_src_dir,
        test_class_dir,
        randoop_classpath,
        compile_classpath,
        daikon_classpath,
        driver: if ctx.config.error_driver {
            "ErrorTestDriver"
        } else {
            "RegressionTestDriver"
        },
    })
}

fn class_list(workspace: &Workspace, invocation: &JavacInvocation) -> Result<PathBuf> {
    let path = workspace.test_class_dir.join(CLASS_LIST);
    if path.is_file() {
        return Ok(path);
    }

    let mut classes = invocation.class_names();
    classes.sort();
    let mut listing = String::new();
    for class in classes.iter().filter(|c| !c.contains("package-info")) {
        listing.push_str(class);
        listing.push('\n');
    }
    fs_util::write_file(&path, &listing)?;
    Ok(path)
}

fn run_randoop(ctx: &ToolContext, ws: &Workspace, invocation: &JavacInvocation) -> Result<()> {
    const LOG: &str = "randoop";

    let class_list = class_list(ws, invocation)?;
    let lib_dir = ctx.config.require_lib_dir("randoop")?;
    let replacecall = lib_dir.join("replacecall.jar");
    let out = ctx.output_dir();

    let mut args = vec![
        "-ea".to_string(),
        "-classpath".to_string(),
        ws.randoop_classpath.to_string(),
        format!("-Xbootclasspath/a:{}", replacecall.display()),
        format!("-javaagent:{}", replacecall.display()),
        "randoop.main.Main".to_string(),
        "gentests".to_string(),
        format!("--classlist={}", class_list.display()),
        format!("--time-limit={RANDOOP_TIME_LIMIT}"),
        "--stop-on-error-test=false".to_string(),
        "--junit-reflection-allowed=false".to_string(),
        "--flaky-test-behavior=output".to_string(),
        "--no-error-revealing-tests".to_string(),
        "--usethreads".to_string(),
        "--silently-ignore-bad-class-names=true".to_string(),
        format!("--junit-output-dir={}", ws.test_src_dir.display()),
        format!("--log={}", out.join("randoop-log.txt").display()),
        format!("--selection-log={}", out.join("selection-log.txt").display()),
        format!(
            "--operation-history-log={}",
            out.join("operation-history-log.txt").display()
        ),
    ];
    if let Some(junit_after) = special_file(out, "junit-after", ws.index) {
        args.push(format!("--junit-after-all={}", junit_after.display()));
    }
    args.push(format!("--output-limit={RANDOOP_OUTPUT_LIMIT}"));
    ctx.run(LOG, "java", args);

    let tests = fs_util::files_with_extension(&ws.test_src_dir, "java");
    if tests.is_empty() {
        tracing::info!(
            target: "dljc.tools",
            dir = %ws.test_src_dir.display(),
            "randoop generated no tests; skipping compilation"
        );
        return Ok(());
    }

    let mut args = vec![
        "-g".to_string(),
        "-classpath".to_string(),
        ws.compile_classpath.to_string(),
        "-d".to_string(),
        ws.test_class_dir.to_string_lossy().into_owned(),
    ];
    args.extend(tests.iter().map(|test| test.to_string_lossy().into_owned()));
    ctx.run(LOG, "javac", args);
    Ok(())
}

fn run_daikon_pipeline(ctx: &ToolContext, ws: &Workspace, invariant_counts: bool) -> Result<()> {
    let selects = select_patterns(&ws.class_dir);
    let omit = OmitList::read(special_file(ctx.output_dir(), "omit-list", ws.index).as_deref())?;
    let test_class_dir = ws.test_class_dir.to_string_lossy().into_owned();

    // DynComp
    let mut args = vec![
        "-Xmx3G".to_string(),
        "-classpath".to_string(),
        ws.daikon_classpath.to_string(),
        "daikon.DynComp".to_string(),
        format!("--output-dir={test_class_dir}"),
    ];
    if omit.no_jdk {
        args.push("--rt-file=none".to_string());
    }
    args.extend(selects.iter().cloned());
    args.extend(omit.args());
    args.push(ws.driver.to_string());
    ctx.run("dyncomp", "java", args);

    // Chicory
    let comparability = ws
        .test_class_dir
        .join(format!("{}.decls-DynComp", ws.driver));
    let mut args = vec![
        "-Xmx3G".to_string(),
        "-classpath".to_string(),
        ws.daikon_classpath.to_string(),
        "daikon.Chicory".to_string(),
        format!("--output_dir={test_class_dir}"),
        format!("--comparability-file={}", comparability.display()),
    ];
    args.extend(selects.iter().cloned());
    args.extend(omit.args());
    args.push(ws.driver.to_string());
    ctx.run("chicory", "java", args);

    run_daikon(ctx, ws, &omit, false);
    if invariant_counts {
        run_daikon(ctx, ws, &omit, true);
    }

    if ctx.config.daikon_xml {
        print_xml_invariants(ctx, ws)?;
    }
    Ok(())
}

fn run_daikon(ctx: &ToolContext, ws: &Workspace, omit: &OmitList, invariant_counts: bool) {
    let mut args = vec![
        "-Xmx4G".to_string(),
        "-classpath".to_string(),
        ws.daikon_classpath.to_string(),
        "daikon.Daikon".to_string(),
        "-o".to_string(),
        ws.test_class_dir
            .join("invariants.gz")
            .to_string_lossy()
            .into_owned(),
    ];
    let mut config_option = |option: &str| {
        args.push("--config_option".to_string());
        args.push(option.to_string());
    };
    if invariant_counts {
        config_option("daikon.Daikon.calc_possible_invs=true");
    }
    if omit.no_ternary {
        config_option("daikon.inv.ternary.threeScalar.LinearTernary.enabled=false");
        config_option("daikon.inv.ternary.threeScalar.LinearTernaryFloat.enabled=false");
    }
    args.push(
        ws.test_class_dir
            .join(format!("{}.dtrace.gz", ws.driver))
            .to_string_lossy()
            .into_owned(),
    );
    ctx.run("daikon", "java", args);
}

fn print_xml_invariants(ctx: &ToolContext, ws: &Workspace) -> Result<()> {
    let xml_path = ws.test_class_dir.join("invariants.xml");
    let args = vec![
        "-Xmx4G".to_string(),
        "-classpath".to_string(),
        ws.daikon_classpath.to_string(),
        "daikon.PrintInvariants".to_string(),
        "--wrap_xml".to_string(),
        "--output".to_string(),
        xml_path.to_string_lossy().into_owned(),
        ws.test_class_dir
            .join("invariants.gz")
            .to_string_lossy()
            .into_owned(),
    ];
    ctx.run("daikon", "java", args);

    let xml = match fs::read_to_string(&xml_path) {
        Ok(xml) => xml,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            tracing::warn!(
                target: "dljc.tools",
                path = %xml_path.display(),
                "daikon produced no invariants.xml"
            );
            return Ok(());
        }
        Err(err) => return Err(ToolError::io("failed to read", &xml_path, err)),
    };

    let report = match invariants_from_xml(&xml) {
        Ok(report) => report,
        Err(err) => {
            ctx.append_log("jsoninv", &format!("Failed to parse {}", xml_path.display()))?;
            tracing::warn!(
                target: "dljc.tools",
                path = %xml_path.display(),
                error = %err,
                "failed to parse daikon invariants"
            );
            return Ok(());
        }
    };

    let json_path = ws.test_class_dir.join("invariants.json");
    fs_util::write_file(&json_path, &serde_json::to_string_pretty(&report)?)
}

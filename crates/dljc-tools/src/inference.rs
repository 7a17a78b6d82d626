use crate::{Classpath, Result, ToolContext, JSR308};
use dljc_capture::JavacInvocation;

const LOG: &str = "inference";
const DIST_JARS: [&str; 3] = ["checker.jar", "plume.jar", "checker-framework-inference.jar"];

/// Checker Framework Inference: one `InferenceLauncher` run per invocation.
pub(crate) fn run(ctx: &ToolContext, invocations: &[JavacInvocation]) -> Result<()> {
    let checker = ctx.config.require_checker("inference")?;
    let dist = ctx
        .env
        .require(JSR308)?
        .join("checker-framework-inference")
        .join("dist");

    for invocation in invocations {
        let target_classpath = Classpath::parse(invocation.classpath());
        let mut classpath = target_classpath.clone();
        for jar in DIST_JARS {
            classpath.push_path(&dist.join(jar));
        }

        let mut args = vec![
            "-classpath".to_string(),
            classpath.to_string(),
            "checkers.inference.InferenceLauncher".to_string(),
            "--checker".to_string(),
            checker.to_string(),
            "--solver".to_string(),
            ctx.config.solver.clone(),
            "--mode".to_string(),
            ctx.config.mode.clone(),
            "--targetclasspath".to_string(),
            target_classpath.to_string(),
            "-afud".to_string(),
            ctx.config.afu_output_dir.clone(),
        ];
        args.extend(invocation.source_files.iter().cloned());

        ctx.run(LOG, "java", args);
    }
    Ok(())
}

use crate::{jdk_flags, Classpath, Result, ToolContext, CHECKERFRAMEWORK};
use dljc_capture::JavacInvocation;

const LOG: &str = "check";

/// One pluggable-type-checker run per invocation.
pub(crate) fn run(ctx: &ToolContext, invocations: &[JavacInvocation]) -> Result<()> {
    let checker = ctx.config.require_checker("checker")?;
    let checker_home = ctx.env.require(CHECKERFRAMEWORK)?;
    let javac = checker_home.join("checker/bin/javac");

    for invocation in invocations {
        let mut args = vec!["-processor".to_string(), checker.to_string()];
        args.extend(jdk_flags(
            ctx.config.jdk_version(),
            &checker_home,
            invocation.releases_java_8(),
        )?);

        let mut classpath = Classpath::parse(invocation.classpath());
        if let Some(lib_dir) = &ctx.config.lib_dir {
            classpath.push_path(lib_dir);
        }
        args.push("-classpath".to_string());
        args.push(classpath.to_trailing_string());
        args.extend(invocation.source_files.iter().cloned());

        ctx.run(LOG, &javac, args);
    }
    Ok(())
}

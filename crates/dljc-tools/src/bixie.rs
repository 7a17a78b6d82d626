use crate::{Result, ToolContext};
use dljc_capture::JavacInvocation;

const LOG: &str = "bixie";

pub(crate) fn run(ctx: &ToolContext, invocations: &[JavacInvocation]) -> Result<()> {
    let bixie_jar = ctx.config.require_lib_dir("bixie")?.join("bixie.jar");
    let out = ctx.output_dir();

    for (index, invocation) in invocations.iter().enumerate() {
        let mut args = vec![
            "-jar".to_string(),
            bixie_jar.to_string_lossy().into_owned(),
            "-html".to_string(),
            out.join("bixie_report").to_string_lossy().into_owned(),
        ];
        if let Some(classpath) = invocation.classpath() {
            args.extend(["-cp".to_string(), classpath.to_string()]);
        }
        if let Some(class_dir) = invocation.class_directory() {
            args.extend(["-j".to_string(), class_dir.to_string()]);
        }
        if let Some(source_path) = invocation.source_path() {
            args.extend(["-src".to_string(), source_path]);
        }
        let report = out.join(format!("bixie-report-{}.log", index + 1));
        args.extend(["-o".to_string(), report.to_string_lossy().into_owned()]);

        ctx.run(LOG, "java", args);
    }
    Ok(())
}

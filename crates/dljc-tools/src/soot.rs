use crate::{Result, ToolContext, ToolError};
use dljc_capture::JavacInvocation;

const LOG: &str = "soot";

pub(crate) fn run(ctx: &ToolContext, invocations: &[JavacInvocation]) -> Result<()> {
    let soot_jar = ctx.config.soot_jar.as_deref().ok_or(ToolError::MissingFlag {
        tool: "soot",
        flag: "--soot-jar",
    })?;

    for (index, invocation) in invocations.iter().enumerate() {
        let classpath = invocation.classpath().ok_or(ToolError::MissingSwitch {
            tool: "soot",
            index,
            switch: "classpath",
        })?;
        let class_dir = invocation.class_directory().ok_or(ToolError::MissingSwitch {
            tool: "soot",
            index,
            switch: "d",
        })?;

        let args = vec![
            "-jar".to_string(),
            soot_jar.to_string_lossy().into_owned(),
            "-pp".to_string(),
            "-src-prec".to_string(),
            "c".to_string(),
            "-cp".to_string(),
            classpath.to_string(),
            "-process-dir".to_string(),
            class_dir.to_string(),
        ];
        ctx.run(LOG, "java", args);
    }
    Ok(())
}

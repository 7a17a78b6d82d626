use crate::{fs_util, Result, ToolContext, ToolError};
use dljc_capture::JavacInvocation;
use std::path::{Path, PathBuf};

const LOG: &str = "graphtools";
const AUGMAKER_JAR: &str = "augmaker.jar";
const JAVA_FILE_LIST: &str = "__java_file_names.txt";

/// Dependency-graph extraction with prog2dfg/apilearner, or one augmaker
/// batch over a project list.
pub(crate) fn run(ctx: &ToolContext, invocations: &[JavacInvocation]) -> Result<()> {
    let graph_jar = ctx.config.graph_jar.as_deref().ok_or(ToolError::MissingFlag {
        tool: "graphtool",
        flag: "--graph-jar",
    })?;

    let dot_dir = ctx.output_dir().join("dot");
    fs_util::create_dir(&dot_dir)?;

    if graph_jar.to_string_lossy().contains(AUGMAKER_JAR) {
        return run_augmaker(ctx, graph_jar, &dot_dir);
    }

    let file_list = ctx.cwd.join(JAVA_FILE_LIST);
    for (index, invocation) in invocations.iter().enumerate() {
        let class_dir = invocation.class_directory().ok_or(ToolError::MissingSwitch {
            tool: "graphtool",
            index,
            switch: "d",
        })?;

        let mut listing = invocation.source_files.join("\n");
        listing.push('\n');
        fs_util::write_file(&file_list, &listing)?;

        let args = vec![
            "-jar".to_string(),
            graph_jar.to_string_lossy().into_owned(),
            "-o".to_string(),
            dot_dir
                .join(flatten_class_dir(class_dir, &ctx.cwd))
                .to_string_lossy()
                .into_owned(),
            "-j".to_string(),
            class_dir.to_string(),
            "-all".to_string(),
            "-source".to_string(),
            file_list.to_string_lossy().into_owned(),
        ];
        ctx.run(LOG, "java", args);
    }
    Ok(())
}

// augmaker.jar has no Main-Class and does not need a built project.
fn run_augmaker(ctx: &ToolContext, graph_jar: &Path, dot_dir: &Path) -> Result<()> {
    let project_file = ctx.config.project_file.as_deref().ok_or(ToolError::MissingFlag {
        tool: "graphtool",
        flag: "--project-file",
    })?;

    let args = vec![
        "-cp".to_string(),
        format!(".:{}:*", graph_jar.display()),
        "com.sri.augmake.AugmakerCli".to_string(),
        "--outputdir".to_string(),
        dot_dir.to_string_lossy().into_owned(),
        "--howmany".to_string(),
        ctx.config.batch_size.to_string(),
        "--projectfile".to_string(),
        project_file.to_string_lossy().into_owned(),
        "--dotpretty".to_string(),
        "dot".to_string(),
    ];
    ctx.run(LOG, "java", args);
    Ok(())
}

/// Output directory name for a class directory: the path relative to the
/// build directory with separators replaced by `_`.
fn flatten_class_dir(class_dir: &str, cwd: &Path) -> PathBuf {
    let cwd = cwd.to_string_lossy();
    let relative = class_dir.strip_prefix(cwd.as_ref()).unwrap_or(class_dir);
    PathBuf::from(relative.replace(std::path::MAIN_SEPARATOR, "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_class_dir_relative_to_cwd() {
        assert_eq!(
            flatten_class_dir("/p/app/build/classes", Path::new("/p/app")),
            PathBuf::from("_build_classes")
        );
        assert_eq!(
            flatten_class_dir("target/classes", Path::new("/p/app")),
            PathBuf::from("target_classes")
        );
    }
}

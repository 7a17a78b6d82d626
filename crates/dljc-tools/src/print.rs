use crate::Result;
use dljc_capture::{JavacInvocation, TargetJar};
use serde::Serialize;

#[derive(Serialize)]
struct PrintReport<'a> {
    javac_commands: &'a [JavacInvocation],
    jars: &'a [TargetJar],
}

/// The capture as pretty JSON, as printed by the `print` tool.
pub fn render(invocations: &[JavacInvocation], jars: &[TargetJar]) -> Result<String> {
    Ok(serde_json::to_string_pretty(&PrintReport {
        javac_commands: invocations,
        jars,
    })?)
}

pub(crate) fn run(invocations: &[JavacInvocation], jars: &[TargetJar]) -> Result<()> {
    println!("{}", render(invocations, jars)?);
    Ok(())
}

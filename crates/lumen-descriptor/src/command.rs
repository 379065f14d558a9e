use crate::{DescriptorError, Result};
use std::{
    path::Path,
    process::{Command, Stdio},
};

/// Captured output of a successful helper invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs the external descriptor helper.
///
/// Injectable so tests can answer invocations with canned payloads instead of
/// spawning processes.
pub trait CommandRunner: Send + Sync + std::fmt::Debug {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> Result<CommandOutput>;
}

/// Spawns the helper as a child process and waits for it to finish.
///
/// No timeout is applied: a hung helper blocks only the background worker
/// that invoked it, never the interactive side.
#[derive(Debug, Default, Clone)]
pub struct DefaultCommandRunner;

impl CommandRunner for DefaultCommandRunner {
    fn run(&self, cwd: &Path, program: &Path, args: &[String]) -> Result<CommandOutput> {
        let command = format_command(program, args);
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| DescriptorError::Helper {
                command: command.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() {
            return Err(DescriptorError::HelperFailed {
                command,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}

pub(crate) fn format_command(program: &Path, args: &[String]) -> String {
    let mut out = program.to_string_lossy().to_string();
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_program_and_args() {
        assert_eq!(
            format_command(Path::new("lein"), &["lumen".into(), "project".into()]),
            "lein lumen project"
        );
        assert_eq!(format_command(Path::new("lein"), &[]), "lein");
    }

    #[cfg(unix)]
    #[test]
    fn nonzero_exit_surfaces_as_helper_failed() {
        let runner = DefaultCommandRunner;
        let err = runner
            .run(Path::new("/"), Path::new("false"), &[])
            .expect_err("`false` exits nonzero");
        match err {
            DescriptorError::HelperFailed { code, .. } => assert_eq!(code, Some(1)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn missing_program_surfaces_as_helper_error() {
        let runner = DefaultCommandRunner;
        let err = runner
            .run(
                Path::new("/"),
                Path::new("/nonexistent/lumen-helper"),
                &["x".into()],
            )
            .expect_err("program does not exist");
        match err {
            DescriptorError::Helper { command, .. } => {
                assert_eq!(command, "/nonexistent/lumen-helper x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

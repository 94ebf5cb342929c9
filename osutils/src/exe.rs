use std::{
    os::unix::process::ExitStatusExt,
    process::{Command, Output},
};

use anyhow::{anyhow, Context, Error};
use log::trace;

use crate::crate_private::Sealed;

/// Status and output of a finished tool invocation.
///
/// Sealed, so it cannot be implemented outside of this crate.
pub trait OutputChecker: Sealed {
    fn is_success(&self) -> bool;

    fn exit_code(&self) -> Option<i32>;

    fn end_signal(&self) -> Option<i32>;

    fn output(&self) -> String;

    fn error_output(&self) -> String;

    /// Both output streams, labeled. Empty if the tool printed nothing.
    fn output_report(&self) -> String {
        let mut report = Vec::new();
        for (label, text) in [("stdout", self.output()), ("stderr", self.error_output())] {
            if !text.is_empty() {
                report.push(format!("{label}:\n{text}"));
            }
        }
        report.join("\n")
    }

    fn explain_exit(&self) -> String {
        match (self.exit_code(), self.end_signal()) {
            (Some(code), _) => format!("tool exited with status {code}"),
            (None, Some(signal)) => format!("tool was terminated by signal {signal}"),
            (None, None) => "tool exited with unknown status".into(),
        }
    }

    /// Fails unless the tool exited successfully. The error carries the
    /// output of the tool.
    fn check(&self) -> Result<(), Error> {
        if self.is_success() {
            return Ok(());
        }

        let report = self.output_report();
        let error = if report.is_empty() {
            anyhow!("(no output was captured)")
        } else {
            anyhow!("Tool output:\n{report}")
        };
        Err(error.context(self.explain_exit()))
    }
}

impl Sealed for Output {}

impl OutputChecker for Output {
    fn is_success(&self) -> bool {
        self.status.success()
    }

    fn exit_code(&self) -> Option<i32> {
        self.status.code()
    }

    fn end_signal(&self) -> Option<i32> {
        self.status.signal()
    }

    fn output(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into()
    }

    fn error_output(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into()
    }
}

/// Runs a command and turns failures into errors.
pub trait RunAndCheck: Sealed {
    /// Runs the command and fails if it does not exit successfully.
    fn run_and_check(&mut self) -> Result<(), Error>;

    /// Like [`RunAndCheck::run_and_check`], returning stdout.
    fn output_and_check(&mut self) -> Result<String, Error>;

    /// The command line as it would be typed into a shell.
    fn render_command(&self) -> String;
}

impl Sealed for Command {}

fn execute(command: &mut Command) -> Result<Output, Error> {
    let rendered = command.render_command();
    trace!("Executing '{rendered}'");
    let output = command
        .output()
        .with_context(|| format!("Failed to execute '{rendered}'"))?;
    trace!(
        "Executed '{rendered}': {}. Report:\n{}",
        output.explain_exit(),
        output.output_report()
    );
    output
        .check()
        .with_context(|| format!("Error when running: {rendered}"))?;
    Ok(output)
}

impl RunAndCheck for Command {
    fn run_and_check(&mut self) -> Result<(), Error> {
        execute(self).map(|_| ())
    }

    fn output_and_check(&mut self) -> Result<String, Error> {
        execute(self).map(|output| output.output())
    }

    fn render_command(&self) -> String {
        std::iter::once(self.get_program())
            .chain(self.get_args())
            .map(|arg| {
                let arg = arg.to_string_lossy();
                if arg.contains(' ') {
                    format!("'{arg}'")
                } else {
                    arg.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

//! Child-process plumbing shared by the engine, answer-box, and image tools.

use crate::error::ToolError;
use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;
use tracing::debug;

/// Run `cmd`, optionally feeding `stdin`, and return its stdout as UTF-8.
///
/// A non-zero exit status is an error carrying the trimmed stderr.
pub(crate) fn run_capture(cmd: &mut Command, stdin: Option<&str>) -> Result<String, ToolError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    debug!("Running {:?}", cmd);

    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let mut child = cmd.spawn().map_err(|e| ToolError::SpawnFailed {
        program: program.clone(),
        source: e,
    })?;

    // stdin is written on its own thread while stdout is drained here
    let feeder = match (stdin, child.stdin.take()) {
        (Some(input), Some(mut pipe)) => {
            let input = input.to_owned();
            Some(thread::spawn(move || pipe.write_all(input.as_bytes())))
        }
        _ => None,
    };

    let output = child
        .wait_with_output()
        .map_err(|e| ToolError::SpawnFailed {
            program: program.clone(),
            source: e,
        })?;

    if let Some(Ok(Err(e))) = feeder.map(|h| h.join()) {
        debug!("{program}: stdin write ended early: {e}");
    }

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| ToolError::BadOutput {
        program,
        detail: format!("stdout is not UTF-8: {e}"),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn missing_program_is_spawn_error() {
        let err = run_capture(&mut Command::new("definitely-not-a-real-tool-xyz"), None)
            .unwrap_err();
        assert!(matches!(err, ToolError::SpawnFailed { .. }));
    }

    #[test]
    fn stdin_round_trips_through_cat() {
        let out = run_capture(&mut Command::new("cat"), Some("<p>hi</p>")).expect("cat runs");
        assert_eq!(out, "<p>hi</p>");
    }

    #[test]
    fn non_zero_exit_is_failure() {
        let err = run_capture(&mut Command::new("false"), None).unwrap_err();
        assert!(matches!(err, ToolError::Failed { .. }));
    }
}

// ABOUTME: Runs the local container CLI and captures its output.
// ABOUTME: Shared by the image builder and the registry client.

use std::io::ErrorKind;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Run `command` to completion, optionally feeding `stdin`.
pub(crate) async fn run(mut command: Command, stdin: Option<&str>) -> std::io::Result<Output> {
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    let pipe = child.stdin.take();
    // Stdin is written while stdout and stderr drain; a child that fills its
    // output pipe before reading all input would otherwise never finish.
    let feed = async move {
        match (pipe, stdin) {
            // Dropping the pipe at the end closes it so the child sees EOF.
            (Some(mut pipe), Some(input)) => pipe.write_all(input.as_bytes()).await,
            _ => Ok(()),
        }
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    match fed {
        // The child exited without reading everything; its status says why.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(output),
        Err(e) => Err(e),
        Ok(()) => Ok(output),
    }
}

/// Last `lines` lines of `text`, for error messages.
pub(crate) fn tail(text: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(text);
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

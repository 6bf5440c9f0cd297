//! Subprocess runner shared by every external tool adapter.
//!
//! Spawns the tool, optionally feeds it a payload on stdin, waits (with an
//! optional timeout) and returns stdout. A non-zero exit becomes a
//! [`ToolError::Failed`] carrying the rendered command line and stderr.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tokio::time::timeout;
use tracing::debug;

/// Flags whose following argument must never appear in logs or errors
const SECRET_FLAGS: [&str; 1] = ["--password"];

/// Errors from running an external tool
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("No command given for {tool}")]
    EmptyCommand { tool: String },

    #[error("Failed to spawn {tool}: {source}\nCMD: {command}")]
    Spawn {
        tool: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed ({code})\nCMD: {command}\nERR:\n{stderr}")]
    Failed {
        tool: String,
        code: i32,
        command: String,
        stderr: String,
    },

    #[error("{tool} timed out after {limit:?}\nCMD: {command}")]
    TimedOut {
        tool: String,
        command: String,
        limit: Duration,
    },

    #[error("I/O error talking to {tool}: {source}")]
    Io {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} output is not valid UTF-8")]
    NonUtf8 { tool: String },
}

/// A fully specified tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    /// Short name used in errors and logs
    tool: String,

    /// Program followed by its arguments
    argv: Vec<String>,

    /// Payload written to stdin, if any
    stdin: Option<String>,

    /// Kill the tool after this long
    limit: Option<Duration>,
}

impl ToolCommand {
    /// Start from a base argv (program plus any fixed leading arguments)
    pub fn new(tool: impl Into<String>, base: &[String]) -> Self {
        Self {
            tool: tool.into(),
            argv: base.to_vec(),
            stdin: None,
            limit: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    pub fn timeout(mut self, limit: Option<Duration>) -> Self {
        self.limit = limit;
        self
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Shell-style rendering with secrets masked
    pub fn display(&self) -> String {
        render_command(&self.argv)
    }

    /// Run to completion and return stdout
    pub async fn run(self) -> Result<String, ToolError> {
        let (program, rest) = self
            .argv
            .split_first()
            .ok_or_else(|| ToolError::EmptyCommand {
                tool: self.tool.clone(),
            })?;

        let command_line = self.display();
        debug!(tool = %self.tool, command = %command_line, "Running external tool");

        let mut child = Command::new(program)
            .args(rest)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ToolError::Spawn {
                tool: self.tool.clone(),
                command: command_line.clone(),
                source,
            })?;

        // Stdin is fed while waiting, both under the same time limit
        let feed = feed_stdin(&self.tool, self.stdin.as_deref(), child.stdin.take());
        let exchange = async {
            let (fed, waited) = tokio::join!(feed, child.wait_with_output());
            fed?;
            waited.map_err(|source| ToolError::Io {
                tool: self.tool.clone(),
                source,
            })
        };

        let output = match self.limit {
            Some(limit) => timeout(limit, exchange)
                .await
                .map_err(|_| ToolError::TimedOut {
                    tool: self.tool.clone(),
                    command: command_line.clone(),
                    limit,
                })??,
            None => exchange.await?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError::Failed {
                tool: self.tool,
                code: output.status.code().unwrap_or(-1),
                command: command_line,
                stderr: stderr.trim().to_string(),
            });
        }

        String::from_utf8(output.stdout).map_err(|_| ToolError::NonUtf8 { tool: self.tool })
    }
}

/// Write the payload and close the pipe.
///
/// A tool that exits without reading stdin is judged by its exit code, so
/// a broken pipe is not an error here.
async fn feed_stdin(
    tool: &str,
    payload: Option<&str>,
    pipe: Option<ChildStdin>,
) -> Result<(), ToolError> {
    let (Some(payload), Some(mut stdin)) = (payload, pipe) else {
        return Ok(());
    };

    match stdin.write_all(payload.as_bytes()).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(source) => Err(ToolError::Io {
            tool: tool.to_string(),
            source,
        }),
    }
}

/// Render argv the way a shell would accept it, masking secret values
pub fn render_command(argv: &[String]) -> String {
    let mut rendered = Vec::with_capacity(argv.len());
    let mut mask_next = false;

    for arg in argv {
        if mask_next {
            rendered.push("'***'".to_string());
            mask_next = false;
            continue;
        }
        if SECRET_FLAGS.contains(&arg.as_str()) {
            mask_next = true;
        }
        rendered.push(shell_quote(arg));
    }

    rendered.join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@%+".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_render_masks_password() {
        let rendered = render_command(&argv(&[
            "calibredb",
            "list",
            "--username",
            "reader",
            "--password",
            "hunter2",
        ]));
        assert_eq!(rendered, "calibredb list --username reader --password '***'");
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_render_quotes_special_args() {
        let rendered = render_command(&argv(&["calibredb", "--search", "title:it's here", ""]));
        assert_eq!(rendered, r"calibredb --search 'title:it'\''s here' ''");
    }

    #[test]
    fn test_builder_appends_args() {
        let cmd = ToolCommand::new("calibredb", &argv(&["calibredb"]))
            .arg("list")
            .args(["--limit", "5"]);
        assert_eq!(cmd.argv(), argv(&["calibredb", "list", "--limit", "5"]).as_slice());
    }

    #[tokio::test]
    async fn test_empty_command_is_an_error() {
        let result = ToolCommand::new("nothing", &[]).run().await;
        assert!(matches!(result, Err(ToolError::EmptyCommand { .. })));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let result = ToolCommand::new("ghost", &argv(&["calibre-lens-no-such-binary"]))
            .run()
            .await;
        assert!(matches!(result, Err(ToolError::Spawn { .. })));
    }
}

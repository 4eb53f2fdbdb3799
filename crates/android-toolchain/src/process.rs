//! Child process plumbing for interactive vendor tools.
//!
//! Stdout and stderr are read line by line on background tasks and queued on
//! channels while the caller answers prompts on stdin.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Everything a finished process printed
#[derive(Debug)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

/// A running tool with queued output
pub struct ToolProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: UnboundedReceiver<String>,
    stderr: UnboundedReceiver<String>,
    readers: Vec<JoinHandle<()>>,
}

impl ToolProcess {
    /// Spawn `command` with all three standard streams piped
    pub fn spawn(mut command: Command) -> std::io::Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take();
        let (out_tx, stdout) = mpsc::unbounded_channel();
        let (err_tx, stderr) = mpsc::unbounded_channel();

        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(out, out_tx)));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(err, err_tx)));
        }

        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            readers,
        })
    }

    /// Write one line to the child's stdin
    pub async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        write_line(&mut self.stdin, line).await
    }

    /// Keep answering `answer` every `every` until the child exits.
    /// A closed stdin stops the answers but not the wait.
    pub async fn answer_until_exit(
        &mut self,
        answer: &str,
        every: Duration,
    ) -> std::io::Result<ExitStatus> {
        let mut ticker = tokio::time::interval(every);
        let stdin = &mut self.stdin;
        let child = &mut self.child;

        loop {
            tokio::select! {
                status = child.wait() => return status,
                _ = ticker.tick() => {
                    if stdin.is_some() {
                        if let Err(e) = write_line(stdin, answer).await {
                            debug!("stdin closed: {}", e);
                            *stdin = None;
                        }
                    }
                }
            }
        }
    }

    /// Close stdin, wait for exit and drain both queues
    pub async fn wait(mut self) -> std::io::Result<ToolOutput> {
        drop(self.stdin.take());
        let status = self.child.wait().await?;

        for reader in self.readers.drain(..) {
            if let Err(e) = reader.await {
                warn!("output reader task failed: {}", e);
            }
        }

        Ok(ToolOutput {
            status,
            stdout: drain(&mut self.stdout),
            stderr: drain(&mut self.stderr),
        })
    }
}

async fn write_line(stdin: &mut Option<ChildStdin>, line: &str) -> std::io::Result<()> {
    if let Some(stdin) = stdin.as_mut() {
        stdin.write_all(line.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
    }
    Ok(())
}

/// Non-UTF-8 bytes are replaced, not fatal
async fn forward_lines<R: AsyncRead + Unpin>(reader: R, tx: UnboundedSender<String>) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\r', '\n']).to_string();
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("output reader stopped: {}", e);
                break;
            }
        }
    }
}

fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Ok(line) = rx.try_recv() {
        lines.push(line);
    }
    lines
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn test_collects_stdout_and_stderr() {
        let process = ToolProcess::spawn(sh("echo one; echo two; echo oops >&2; exit 3")).unwrap();
        let output = process.wait().await.unwrap();

        assert_eq!(output.stdout, ["one", "two"]);
        assert_eq!(output.stderr, ["oops"]);
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_reading() {
        let process =
            ToolProcess::spawn(sh("printf 'one\\n\\377bad\\ntwo\\r\\nthree'")).unwrap();
        let output = process.wait().await.unwrap();

        assert_eq!(output.stdout, ["one", "\u{FFFD}bad", "two", "three"]);
    }

    #[tokio::test]
    async fn test_single_answer() {
        let mut process = ToolProcess::spawn(sh("read answer; echo \"got $answer\"")).unwrap();
        process.write_line("y").await.unwrap();
        let output = process.wait().await.unwrap();

        assert!(output.status.success());
        assert_eq!(output.stdout, ["got y"]);
    }

    #[tokio::test]
    async fn test_answers_until_exit() {
        let mut process =
            ToolProcess::spawn(sh("read a; read b; read c; echo \"$a$b$c\"")).unwrap();
        let status = process
            .answer_until_exit("y", Duration::from_millis(20))
            .await
            .unwrap();
        assert!(status.success());

        let output = process.wait().await.unwrap();
        assert_eq!(output.stdout, ["yyy"]);
    }
}

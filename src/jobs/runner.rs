//! Supervision of one download tool process.

use crate::errors::{GamdlWebError, Result};
use crate::jobs::progress::LineClassifier;
use crate::jobs::store::JobStore;
use crate::jobs::{JobId, JobOutcome, JobResult, ProgressStatus, ToolCommand};
use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

const LINE_CHANNEL_CAPACITY: usize = 256;

/// A started tool process with merged stdout/stderr
#[async_trait]
pub trait ToolProcess: Send {
    /// Next output line; `None` once both streams are closed
    async fn next_line(&mut self) -> Option<String>;

    /// Exit code, or `None` when terminated by a signal
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    async fn kill(&mut self) -> io::Result<()>;
}

/// Starts tool processes
#[async_trait]
pub trait ToolSpawner: Send + Sync {
    async fn spawn(&self, command: &ToolCommand) -> Result<Box<dyn ToolProcess>>;
}

/// Spawns real OS processes through tokio
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

struct TokioProcess {
    child: Child,
    lines: mpsc::Receiver<String>,
}

/// Forward lines from `reader` until EOF; invalid UTF-8 is replaced, not fatal
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n']).to_string();
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Stopped reading tool output: {}", e);
                break;
            }
        }
    }
}

#[async_trait]
impl ToolSpawner for TokioSpawner {
    async fn spawn(&self, command: &ToolCommand) -> Result<Box<dyn ToolProcess>> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .env("PYTHONUNBUFFERED", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| GamdlWebError::Download(format!("Failed to start {}: {}", command.program, e)))?;

        let (tx, rx) = mpsc::channel(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx));
        }

        Ok(Box::new(TokioProcess { child, lines: rx }))
    }
}

#[async_trait]
impl ToolProcess for TokioProcess {
    async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.child.wait().await?.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}

/// Run `command` for job `id`, streaming its output into the store, and
/// record the terminal result exactly once.
pub async fn run_job(
    id: &JobId,
    command: &ToolCommand,
    spawner: &dyn ToolSpawner,
    store: &JobStore,
    classifier: &dyn LineClassifier,
    timeout: Duration,
) -> JobOutcome {
    let command_line = command.command_line();
    let result = match spawner.spawn(command).await {
        Ok(process) => supervise(id, process, store, classifier, timeout, &command_line).await,
        Err(e) => {
            error!(job_id = %id, "Could not start download: {}", e);
            JobResult::errored(e, store.output_tail(id), command_line)
        }
    };

    let outcome = result.status;
    if let Err(e) = store.finish(id, result) {
        warn!(job_id = %id, "Could not record job result: {}", e);
    }
    outcome
}

async fn supervise(
    id: &JobId,
    mut process: Box<dyn ToolProcess>,
    store: &JobStore,
    classifier: &dyn LineClassifier,
    timeout: Duration,
    command_line: &str,
) -> JobResult {
    let deadline = Instant::now() + timeout;
    store.update_progress(id, |progress| progress.status = ProgressStatus::Running);

    loop {
        match timeout_at(deadline, process.next_line()).await {
            Ok(Some(line)) => {
                debug!(job_id = %id, "{}", line);
                store.update_progress(id, |progress| progress.apply(&line, classifier));
            }
            Ok(None) => break,
            Err(_) => return terminate(id, process, store, timeout, command_line).await,
        }
    }

    match timeout_at(deadline, process.wait()).await {
        Ok(Ok(code)) => {
            info!(job_id = %id, "Download tool exited with {:?}", code);
            JobResult::exited(code, store.output_tail(id), command_line.to_string())
        }
        Ok(Err(e)) => JobResult::errored(
            format!("Failed to wait for download tool: {}", e),
            store.output_tail(id),
            command_line.to_string(),
        ),
        Err(_) => terminate(id, process, store, timeout, command_line).await,
    }
}

async fn terminate(
    id: &JobId,
    mut process: Box<dyn ToolProcess>,
    store: &JobStore,
    timeout: Duration,
    command_line: &str,
) -> JobResult {
    warn!(job_id = %id, "Download exceeded {} seconds, killing tool", timeout.as_secs());
    if let Err(e) = process.kill().await {
        warn!(job_id = %id, "Failed to kill download tool: {}", e);
    }
    JobResult::timed_out(timeout.as_secs(), store.output_tail(id), command_line.to_string())
}

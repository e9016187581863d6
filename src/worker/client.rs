//! Async client for the executor worker process.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use super::error::{WorkerError, WorkerResult};
use super::protocol::{ErrorInfo, RequestEnvelope, ResponseEnvelope};
use crate::config::Settings;

/// Requests awaiting a reply, keyed by request id.
#[derive(Clone, Default)]
struct Inflight(Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>);

impl Inflight {
    async fn register(&self, id: &str) -> oneshot::Receiver<ResponseEnvelope> {
        let (tx, rx) = oneshot::channel();
        self.0.lock().await.insert(id.to_string(), tx);
        rx
    }

    async fn forget(&self, id: &str) {
        self.0.lock().await.remove(id);
    }

    async fn deliver(&self, reply: ResponseEnvelope) {
        match self.0.lock().await.remove(&reply.id) {
            Some(tx) => {
                let _ = tx.send(reply);
            }
            None => tracing::debug!(id = %reply.id, "reply for a request nobody awaits"),
        }
    }

    /// Answer every outstanding request with an exit failure.
    async fn abandon(&self) {
        for (id, tx) in self.0.lock().await.drain() {
            let _ = tx.send(ResponseEnvelope::failure(id, "WORKER_EXITED", "executor worker exited"));
        }
    }
}

/// Handle on a running executor worker.
///
/// Requests are written to the worker's stdin one JSON object per line and
/// replies are matched back by id, so several requests may be in flight.
pub struct WorkerClient {
    stdin: Mutex<BufWriter<ChildStdin>>,
    inflight: Inflight,
    reader: JoinHandle<()>,
    timeout: Duration,
    _child: Child,
}

impl WorkerClient {
    /// Start the worker configured in `settings`.
    pub async fn spawn_with_settings(settings: &Settings) -> WorkerResult<Self> {
        let path = settings.worker_path().ok_or_else(|| {
            WorkerError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "no executor worker configured; set worker.path in tessera.toml",
            ))
        })?;
        Self::spawn(path, settings.worker_timeout()).await
    }

    pub async fn spawn(program: impl AsRef<Path>, timeout: Duration) -> WorkerResult<Self> {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::Spawn)?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(WorkerError::Spawn(io::Error::other("worker pipes were not captured")));
        };

        let inflight = Inflight::default();
        let reader = tokio::spawn(read_replies(stdout, inflight.clone()));
        tracing::debug!(program = %program.display(), timeout_secs = timeout.as_secs(), "executor worker started");

        Ok(Self {
            stdin: Mutex::new(BufWriter::new(stdin)),
            inflight,
            reader,
            timeout,
            _child: child,
        })
    }

    /// Send `method` with `params` and decode the reply.
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = RequestEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let reply = self.inflight.register(&request.id).await;
        if let Err(e) = self.write_line(&line).await {
            self.inflight.forget(&request.id).await;
            return Err(WorkerError::Send(e));
        }
        tracing::debug!(id = %request.id, method, "worker request sent");

        match tokio::time::timeout(self.timeout, reply).await {
            Ok(reply) => decode(reply?),
            Err(_) => {
                self.inflight.forget(&request.id).await;
                tracing::warn!(id = %request.id, method, "worker request timed out");
                Err(WorkerError::Timeout(self.timeout))
            }
        }
    }

    async fn write_line(&self, line: &str) -> io::Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await
    }

    /// False once the worker's stdout has closed.
    pub fn is_alive(&self) -> bool {
        !self.reader.is_finished()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

async fn read_replies(stdout: ChildStdout, inflight: Inflight) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                Ok(reply) => inflight.deliver(reply).await,
                Err(e) => tracing::warn!(error = %e, "unreadable worker reply"),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "worker stdout failed");
                break;
            }
        }
    }
    inflight.abandon().await;
}

fn decode<R: DeserializeOwned>(reply: ResponseEnvelope) -> WorkerResult<R> {
    if reply.success {
        let value = reply.result.unwrap_or(serde_json::Value::Null);
        return Ok(serde_json::from_value(value)?);
    }
    let ErrorInfo { code, message } = reply.error.unwrap_or(ErrorInfo {
        code: "UNKNOWN".to_string(),
        message: "worker reported a failure without details".to_string(),
    });
    Err(WorkerError::from_reply(&code, &message))
}

//! Per-server connection task.
//!
//! Every running server process is driven by one task that owns the child,
//! its stdout frame stream and the [`PendingCalls`] registry. Callers talk to
//! it through a cloneable [`ServerHandle`]; stdin writes go through a
//! dedicated writer task so a server that stops reading cannot stall the
//! read loop.
//!
//! ```text
//! ServerHandle ──Command──▶ connection task ──Outbound──▶ writer ──▶ stdin
//!                               ▲      │
//!                  stdout frames┘      └─▶ events / refresh requests
//! ```

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use mcp_bridge_core::{BridgeError, BridgeEvent, BridgeEventEmitter};

use crate::framer::{Frame, JsonRpcCodec};
use crate::logs::ServerLogs;
use crate::protocol::{Message, Notification, Request, RequestId, RpcError};
use crate::router::{CallOutcome, IdAllocator, PendingCalls, Resolution};
use crate::shutdown::shutdown_child;

/// Method of the notification that invalidates a server's tool list.
pub const TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";

/// How long to keep reading stdout after the process exited.
const EXIT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

enum Command {
    Call {
        internal_id: u64,
        external_id: RequestId,
        method: String,
        params: Option<Value>,
        reply: oneshot::Sender<CallOutcome>,
    },
    Notify {
        method: String,
        params: Option<Value>,
        ack: oneshot::Sender<Result<(), BridgeError>>,
    },
    Cancel {
        internal_id: u64,
    },
    Stop {
        grace: Duration,
        done: oneshot::Sender<()>,
    },
}

struct Outbound {
    message: Message,
    /// Pending call to fail if the write does not go through.
    internal_id: Option<u64>,
    ack: Option<oneshot::Sender<Result<(), BridgeError>>>,
}

struct WriteFailure {
    internal_id: u64,
    reason: String,
}

/// Cloneable handle to a server's connection task.
#[derive(Clone)]
pub struct ServerHandle {
    server_id: Arc<str>,
    commands: mpsc::UnboundedSender<Command>,
    ids: IdAllocator,
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("server_id", &self.server_id)
            .finish_non_exhaustive()
    }
}

impl ServerHandle {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Whether the connection task is still running.
    pub fn is_connected(&self) -> bool {
        !self.commands.is_closed()
    }

    /// Send a request and wait for its response, at most `timeout`.
    pub async fn request(
        &self,
        external_id: RequestId,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> CallOutcome {
        self.request_cancellable(external_id, method, params, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`request`](Self::request), also ending early with `Cancelled`
    /// when `cancel` fires.
    pub async fn request_cancellable(
        &self,
        external_id: RequestId,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> CallOutcome {
        let internal_id = self.ids.next_id();
        let (reply, response) = oneshot::channel();

        self.commands
            .send(Command::Call {
                internal_id,
                external_id,
                method: method.to_string(),
                params,
                reply,
            })
            .map_err(|_| self.unavailable())?;

        // Removes the pending entry if this future is dropped before the
        // response arrives.
        let mut guard = CancelGuard {
            commands: &self.commands,
            internal_id,
            armed: true,
        };

        tokio::select! {
            outcome = tokio::time::timeout(timeout, response) => match outcome {
                Ok(Ok(outcome)) => {
                    guard.armed = false;
                    outcome
                }
                Ok(Err(_)) => {
                    guard.armed = false;
                    Err(self.unavailable())
                }
                Err(_) => {
                    tracing::debug!(server_id = %self.server_id, internal_id, method, "Call timed out");
                    Err(BridgeError::Timeout(timeout))
                }
            },
            () = cancel.cancelled() => Err(BridgeError::Cancelled),
        }
    }

    /// Send a notification; resolves once it was written to stdin.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BridgeError> {
        let (ack, written) = oneshot::channel();
        self.commands
            .send(Command::Notify {
                method: method.to_string(),
                params,
                ack,
            })
            .map_err(|_| self.unavailable())?;
        written.await.map_err(|_| self.unavailable())?
    }

    /// Stop the process: pending calls fail with `ServerStopped`, the child
    /// gets SIGTERM and, after `grace`, SIGKILL. Returns once it was reaped.
    pub async fn shutdown(&self, grace: Duration) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Stop { grace, done }).is_ok() {
            // An error means the task ended on its own (process exit).
            let _ = finished.await;
        }
    }

    fn unavailable(&self) -> BridgeError {
        BridgeError::ServerUnavailable(format!("connection to {} is closed", self.server_id))
    }
}

struct CancelGuard<'a> {
    commands: &'a mpsc::UnboundedSender<Command>,
    internal_id: u64,
    armed: bool,
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.commands.send(Command::Cancel {
                internal_id: self.internal_id,
            });
        }
    }
}

/// Why a connection task ended.
#[derive(Debug)]
pub struct ConnectionExit {
    /// Ended by an explicit stop rather than the process exiting on its own.
    pub stopped: bool,
    pub status: Option<ExitStatus>,
}

impl ConnectionExit {
    /// Human-readable exit description.
    pub fn describe(&self) -> String {
        match self.status {
            Some(status) => format!("process exited with {status}"),
            None => "process exited".to_string(),
        }
    }
}

/// Collaborators handed to each connection task.
#[derive(Clone)]
pub struct ConnectionContext {
    pub events: Arc<dyn BridgeEventEmitter>,
    pub logs: Arc<ServerLogs>,
    /// Receives the server id when the server reports a changed tool list.
    pub tools_changed: mpsc::UnboundedSender<String>,
    pub max_frame_len: usize,
}

/// Attach a connection task to a freshly spawned child.
///
/// Returns the handle and the task's future; the caller decides where it runs
/// and what happens when it resolves.
pub fn attach(
    server_id: &str,
    mut child: Child,
    ctx: ConnectionContext,
) -> Result<(ServerHandle, impl Future<Output = ConnectionExit> + Send + use<>), BridgeError> {
    let missing = |stream: &str| BridgeError::SpawnFailed(format!("child {stream} was not piped"));
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    let (commands_tx, commands) = mpsc::unbounded_channel();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (failures_tx, write_failures) = mpsc::unbounded_channel();

    tokio::spawn(write_loop(
        server_id.to_string(),
        FramedWrite::new(stdin, JsonRpcCodec::new(ctx.max_frame_len)),
        outbound_rx,
        failures_tx,
    ));
    tokio::spawn(stderr_loop(server_id.to_string(), stderr, Arc::clone(&ctx.logs)));

    let connection = Connection {
        server_id: server_id.to_string(),
        frames: FramedRead::new(stdout, JsonRpcCodec::new(ctx.max_frame_len)),
        stdout_open: true,
        outbound: Some(outbound),
        write_failures,
        commands,
        pending: PendingCalls::new(server_id),
        child,
        ctx,
    };

    let handle = ServerHandle {
        server_id: Arc::from(server_id),
        commands: commands_tx,
        ids: IdAllocator::new(),
    };

    Ok((handle, connection.run()))
}

struct Connection {
    server_id: String,
    frames: FramedRead<ChildStdout, JsonRpcCodec>,
    stdout_open: bool,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    write_failures: mpsc::UnboundedReceiver<WriteFailure>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending: PendingCalls,
    child: Child,
    ctx: ConnectionContext,
}

impl Connection {
    async fn run(mut self) -> ConnectionExit {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Stop { grace, done }) => {
                        let exit = self.stop(grace).await;
                        let _ = done.send(());
                        return exit;
                    }
                    Some(command) => self.handle_command(command),
                    // Every handle is gone; nobody can reach this process.
                    None => return self.stop(Duration::ZERO).await,
                },
                frame = self.frames.next(), if self.stdout_open => self.handle_frame(frame),
                Some(failure) = self.write_failures.recv() => {
                    self.pending.fail(
                        failure.internal_id,
                        BridgeError::ServerUnavailable(failure.reason),
                    );
                }
                status = self.child.wait() => return self.exited(status.ok()).await,
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Call {
                internal_id,
                external_id,
                method,
                params,
                reply,
            } => {
                let message = Message::request(internal_id, method.clone(), params);
                if self.pending.register(internal_id, external_id, method, reply) {
                    self.send(message, Some(internal_id), None);
                }
            }
            Command::Notify { method, params, ack } => {
                self.send(Message::notification(method, params), None, Some(ack));
            }
            Command::Cancel { internal_id } => {
                self.pending.cancel(internal_id);
            }
            Command::Stop { .. } => {}
        }
    }

    fn send(
        &mut self,
        message: Message,
        internal_id: Option<u64>,
        ack: Option<oneshot::Sender<Result<(), BridgeError>>>,
    ) {
        let outbound = Outbound {
            message,
            internal_id,
            ack,
        };
        let rejected = match self.outbound {
            Some(ref tx) => tx.send(outbound).err().map(|e| e.0),
            None => Some(outbound),
        };

        // The writer is gone, so no write failure will be reported for this.
        if let Some(outbound) = rejected {
            let err = BridgeError::ServerUnavailable("stdin is closed".to_string());
            if let Some(internal_id) = outbound.internal_id {
                self.pending.fail(internal_id, err.clone());
            }
            if let Some(ack) = outbound.ack {
                let _ = ack.send(Err(err));
            }
        }
    }

    fn handle_frame(&mut self, frame: Option<Result<Frame, crate::framer::FrameError>>) {
        match frame {
            Some(Ok(Frame::Message(message))) => self.dispatch(message),
            Some(Ok(Frame::Malformed { preview, reason })) => {
                tracing::warn!(
                    server_id = %self.server_id,
                    reason = %reason,
                    line = %preview,
                    "Discarding malformed message from server"
                );
            }
            Some(Err(e)) => {
                tracing::warn!(server_id = %self.server_id, error = %e, "Server stdout failed");
                self.stdout_open = false;
            }
            None => {
                tracing::debug!(server_id = %self.server_id, "Server closed stdout");
                self.stdout_open = false;
            }
        }
    }

    fn dispatch(&mut self, message: Message) {
        match message {
            Message::Response(response) => {
                if self.pending.resolve(response) == Resolution::Stale {
                    tracing::debug!(server_id = %self.server_id, "Stale response dropped");
                }
            }
            Message::Notification(Notification { method, params }) => {
                if method == TOOLS_LIST_CHANGED {
                    let _ = self.ctx.tools_changed.send(self.server_id.clone());
                }
                self.ctx
                    .events
                    .emit(BridgeEvent::notification(&self.server_id, method, params));
            }
            Message::Request(request) => self.answer_server_request(request),
        }
    }

    /// Requests from the server are answered here and never reach callers.
    fn answer_server_request(&mut self, request: Request) {
        let outcome = match request.method.as_str() {
            "ping" => Ok(json!({})),
            other => {
                tracing::debug!(server_id = %self.server_id, method = %other, "Rejecting server request");
                Err(RpcError::method_not_found(other))
            }
        };
        self.send(Message::response(request.id, outcome), None, None);
    }

    /// Close the command channel and fail everything still queued in it.
    ///
    /// Returns how many calls were failed.
    fn reject_queued(&mut self, error: impl Fn(&str) -> BridgeError) -> usize {
        self.commands.close();
        let mut failed = 0;
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::Call { reply, .. } => {
                    let _ = reply.send(Err(error(&self.server_id)));
                    failed += 1;
                }
                Command::Notify { ack, .. } => {
                    let _ = ack.send(Err(error(&self.server_id)));
                }
                Command::Stop { done, .. } => {
                    let _ = done.send(());
                }
                Command::Cancel { .. } => {}
            }
        }
        failed
    }

    async fn stop(&mut self, grace: Duration) -> ConnectionExit {
        let failed = self
            .pending
            .fail_all(|| BridgeError::ServerStopped(self.server_id.clone()));
        if failed > 0 {
            tracing::debug!(server_id = %self.server_id, failed, "Failed pending calls on stop");
        }

        // Closing stdin lets well-behaved servers exit on EOF.
        self.outbound = None;

        let status = match shutdown_child(&mut self.child, grace).await {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!(server_id = %self.server_id, error = %e, "Failed to shut down server process");
                None
            }
        };
        self.reject_queued(|id| BridgeError::ServerStopped(id.to_string()));
        ConnectionExit {
            stopped: true,
            status,
        }
    }

    async fn exited(&mut self, status: Option<ExitStatus>) -> ConnectionExit {
        // A response written just before exiting may still be buffered.
        let drain = async {
            while self.stdout_open {
                let frame = self.frames.next().await;
                self.handle_frame(frame);
            }
        };
        let _ = tokio::time::timeout(EXIT_DRAIN_TIMEOUT, drain).await;

        let exit = ConnectionExit {
            stopped: false,
            status,
        };
        let failed = self
            .pending
            .fail_all(|| BridgeError::ServerCrashed(self.server_id.clone()));
        // Calls issued while stdout was draining never reached the process.
        let failed =
            failed + self.reject_queued(|id| BridgeError::ServerCrashed(id.to_string()));
        tracing::warn!(
            server_id = %self.server_id,
            failed_calls = failed,
            "{}",
            exit.describe()
        );
        exit
    }
}

async fn write_loop(
    server_id: String,
    mut sink: FramedWrite<ChildStdin, JsonRpcCodec>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    failures: mpsc::UnboundedSender<WriteFailure>,
) {
    while let Some(Outbound {
        message,
        internal_id,
        ack,
    }) = outbound.recv().await
    {
        let result = sink.send(&message).await.map_err(|e| e.to_string());
        if let Err(ref reason) = result {
            tracing::warn!(server_id = %server_id, error = %reason, "Write to server stdin failed");
            if let Some(internal_id) = internal_id {
                let _ = failures.send(WriteFailure {
                    internal_id,
                    reason: reason.clone(),
                });
            }
        }
        if let Some(ack) = ack {
            let _ = ack.send(result.map_err(BridgeError::ServerUnavailable));
        }
    }
}

async fn stderr_loop(server_id: String, stderr: ChildStderr, logs: Arc<ServerLogs>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                tracing::warn!(server_id = %server_id, "stderr: {}", line);
                logs.push(&server_id, line);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(server_id = %server_id, error = %e, "Stopped reading server stderr");
                break;
            }
        }
    }
}

//! Request correlation between many callers and one server process.
//!
//! Each outbound call gets a fresh internal id from the server's
//! [`IdAllocator`]. The caller's own id is kept in the [`PendingCalls`]
//! registry and restored on the response, so ids chosen by different callers
//! never collide on the wire.
//!
//! The registry is owned by the server's connection task; nothing else
//! mutates it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde_json::Value;
use tokio::sync::oneshot;

use mcp_bridge_core::BridgeError;

use crate::protocol::{RequestId, Response};

/// A successful response, carrying the caller's original id.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub id: RequestId,
    pub result: Value,
}

pub type CallOutcome = Result<Reply, BridgeError>;

/// Monotonic internal id source, one per server process.
#[derive(Debug, Clone)]
pub struct IdAllocator(Arc<AtomicU64>);

impl IdAllocator {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingCall {
    external_id: RequestId,
    method: String,
    created_at: Instant,
    reply: oneshot::Sender<CallOutcome>,
}

/// What became of an inbound response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Handed to the waiting caller.
    Delivered,
    /// No call is waiting for this id (timed out, cancelled, or never sent).
    Stale,
}

/// In-flight calls of one server process, keyed by internal id.
pub struct PendingCalls {
    server_id: String,
    calls: HashMap<u64, PendingCall>,
}

impl PendingCalls {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            calls: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    pub fn contains(&self, internal_id: u64) -> bool {
        self.calls.contains_key(&internal_id)
    }

    /// Record a call. A reused internal id is refused and reported to `reply`.
    pub fn register(
        &mut self,
        internal_id: u64,
        external_id: RequestId,
        method: impl Into<String>,
        reply: oneshot::Sender<CallOutcome>,
    ) -> bool {
        if self.calls.contains_key(&internal_id) {
            let _ = reply.send(Err(BridgeError::InvalidRequest(format!(
                "internal id {internal_id} is already in flight"
            ))));
            return false;
        }
        self.calls.insert(
            internal_id,
            PendingCall {
                external_id,
                method: method.into(),
                created_at: Instant::now(),
                reply,
            },
        );
        true
    }

    /// Deliver a response to its caller, restoring the caller's id.
    pub fn resolve(&mut self, response: Response) -> Resolution {
        let Some(call) = response
            .id
            .as_ref()
            .and_then(RequestId::as_u64)
            .and_then(|id| self.calls.remove(&id))
        else {
            tracing::debug!(
                server_id = %self.server_id,
                id = ?response.id,
                "Dropping response with no pending call"
            );
            return Resolution::Stale;
        };

        tracing::trace!(
            server_id = %self.server_id,
            method = %call.method,
            elapsed_ms = call.created_at.elapsed().as_millis(),
            "Call resolved"
        );

        let outcome = match response.outcome {
            Ok(result) => Ok(Reply {
                id: call.external_id,
                result,
            }),
            Err(error) => Err(BridgeError::ServerError {
                code: error.code,
                message: error.message,
                data: error.data,
            }),
        };
        // The caller may have given up in the meantime; that is fine.
        let _ = call.reply.send(outcome);
        Resolution::Delivered
    }

    /// Remove a call and fail it with `error`.
    pub fn fail(&mut self, internal_id: u64, error: BridgeError) -> bool {
        match self.calls.remove(&internal_id) {
            Some(call) => {
                let _ = call.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Remove a call whose caller stopped waiting.
    pub fn cancel(&mut self, internal_id: u64) -> bool {
        let cancelled = self.fail(internal_id, BridgeError::Cancelled);
        if cancelled {
            tracing::debug!(server_id = %self.server_id, internal_id, "Pending call cancelled");
        }
        cancelled
    }

    /// Fail every pending call, returning how many there were.
    pub fn fail_all(&mut self, error: impl Fn() -> BridgeError) -> usize {
        let count = self.calls.len();
        for (_, call) in self.calls.drain() {
            let _ = call.reply.send(Err(error()));
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RpcError;
    use serde_json::json;

    fn response(id: u64, result: Value) -> Response {
        Response {
            id: Some(RequestId::from(id)),
            outcome: Ok(result),
        }
    }

    #[test]
    fn test_ids_are_monotonic_and_shared_between_clones() {
        let ids = IdAllocator::new();
        let clone = ids.clone();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(clone.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn test_response_restores_external_id() {
        let mut pending = PendingCalls::new("echo");
        let (tx, mut rx) = oneshot::channel();
        assert!(pending.register(1, RequestId::from("client-a:7"), "tools/call", tx));

        assert_eq!(pending.resolve(response(1, json!({"ok": true}))), Resolution::Delivered);
        let reply = rx.try_recv().unwrap().unwrap();
        assert_eq!(reply.id, RequestId::from("client-a:7"));
        assert_eq!(reply.result, json!({"ok": true}));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_colliding_external_ids_are_kept_apart() {
        let mut pending = PendingCalls::new("echo");
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        // Two callers both chose id 1.
        pending.register(10, RequestId::from(1_u64), "tools/call", tx1);
        pending.register(11, RequestId::from(1_u64), "tools/call", tx2);

        pending.resolve(response(11, json!("second")));
        pending.resolve(response(10, json!("first")));

        assert_eq!(rx1.try_recv().unwrap().unwrap().result, json!("first"));
        assert_eq!(rx2.try_recv().unwrap().unwrap().result, json!("second"));
    }

    #[test]
    fn test_late_response_after_cancel_is_dropped() {
        let mut pending = PendingCalls::new("echo");
        let (tx, mut rx) = oneshot::channel();
        pending.register(4, RequestId::from(4_u64), "tools/call", tx);

        assert!(pending.cancel(4));
        assert!(matches!(rx.try_recv(), Ok(Err(BridgeError::Cancelled))));

        assert_eq!(pending.resolve(response(4, json!("late"))), Resolution::Stale);
        assert!(!pending.cancel(4));
    }

    #[test]
    fn test_error_response_becomes_server_error() {
        let mut pending = PendingCalls::new("echo");
        let (tx, mut rx) = oneshot::channel();
        pending.register(2, RequestId::from(2_u64), "tools/call", tx);
        pending.resolve(Response {
            id: Some(RequestId::from(2_u64)),
            outcome: Err(RpcError {
                code: -32602,
                message: "Unknown tool".to_string(),
                data: None,
            }),
        });
        assert!(matches!(
            rx.try_recv().unwrap(),
            Err(BridgeError::ServerError { code: -32602, .. })
        ));
    }

    #[test]
    fn test_fail_all_resolves_every_call() {
        let mut pending = PendingCalls::new("echo");
        let receivers: Vec<_> = (1..=5)
            .map(|id| {
                let (tx, rx) = oneshot::channel();
                pending.register(id, RequestId::from(id), "tools/call", tx);
                rx
            })
            .collect();

        assert_eq!(
            pending.fail_all(|| BridgeError::ServerCrashed("echo".to_string())),
            5
        );
        for mut rx in receivers {
            assert!(matches!(rx.try_recv(), Ok(Err(BridgeError::ServerCrashed(_)))));
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn test_duplicate_internal_id_refused() {
        let mut pending = PendingCalls::new("echo");
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        assert!(pending.register(1, RequestId::from(1_u64), "a", tx1));
        assert!(!pending.register(1, RequestId::from(2_u64), "b", tx2));
        assert!(matches!(rx2.try_recv(), Ok(Err(BridgeError::InvalidRequest(_)))));
        assert_eq!(pending.len(), 1);
    }
}

//! One open stream to one peer, shared by any number of concurrent calls.
//!
//! A single reader task owns the read half: it frames lines, parses each one
//! once, and hands the response to the waiter registered under its id.
//! Callers only ever touch the write half (behind a mutex) and their own
//! oneshot receiver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::ElectrumError;
use crate::peers::Peer;

use super::codec::LineCodec;
use super::protocol::{parse_response_id, Request, Response};
use super::tls::Transport;

type Reply = Result<serde_json::Value, ElectrumError>;
type Writer = FramedWrite<WriteHalf<Box<dyn Transport>>, LineCodec>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-session settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Deadline for each individual request, measured from the moment it is
    /// queued for writing.
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

// ==============================================================================
// Waiter Registry
// ==============================================================================

#[derive(Default)]
struct WaiterState {
    waiters: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
}

/// Waiters keyed by request id. Only the reader task resolves entries;
/// callers remove their own entry when they stop waiting.
#[derive(Default)]
struct Waiters {
    state: Mutex<WaiterState>,
}

impl Waiters {
    fn lock(&self) -> MutexGuard<'_, WaiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, id: u64) -> Result<oneshot::Receiver<Reply>, ElectrumError> {
        let mut state = self.lock();
        if state.closed {
            return Err(ElectrumError::StreamClosed);
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id, tx);
        Ok(rx)
    }

    fn take(&self, id: u64) -> Option<oneshot::Sender<Reply>> {
        self.lock().waiters.remove(&id)
    }

    fn detach(&self, id: u64) {
        self.lock().waiters.remove(&id);
    }

    /// Fail every outstanding waiter and refuse new ones.
    fn close(&self) {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.waiters.drain().collect()
        };
        for (_, waiter) in drained {
            let _ = waiter.send(Err(ElectrumError::StreamClosed));
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.lock().waiters.len()
    }
}

/// Removes the caller's waiter on every exit path (reply, timeout,
/// cancellation, or the calling future being dropped).
struct WaiterGuard<'a> {
    waiters: &'a Waiters,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters.detach(self.id);
    }
}

// ==============================================================================
// Session
// ==============================================================================

pub struct Session {
    peer: Peer,
    config: SessionConfig,
    writer: tokio::sync::Mutex<Writer>,
    waiters: Arc<Waiters>,
    next_id: AtomicU64,
    closed: AtomicBool,
    reader: JoinHandle<()>,
}

impl Session {
    /// Start a session over an already-established transport.
    pub fn open(transport: Box<dyn Transport>, peer: Peer, config: SessionConfig) -> Self {
        let (read, write) = tokio::io::split(transport);
        let waiters = Arc::new(Waiters::default());
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read, LineCodec::new()),
            Arc::clone(&waiters),
            peer.to_string(),
        ));

        Self {
            peer,
            config,
            writer: tokio::sync::Mutex::new(FramedWrite::new(write, LineCodec::new())),
            waiters,
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            reader,
        }
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.waiters.is_closed()
    }

    /// Send one request and wait for the response carrying its id.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, ElectrumError> {
        self.call_with_cancel(method, params, None).await
    }

    /// Like [`Session::call`], but gives up with `Cancelled` as soon as
    /// `cancel` fires. Other calls on the session are unaffected either way.
    pub async fn call_with_cancel(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
        cancel: Option<&CancellationToken>,
    ) -> Result<serde_json::Value, ElectrumError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ElectrumError::StreamClosed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply = self.waiters.register(id)?;
        let _guard = WaiterGuard {
            waiters: &self.waiters,
            id,
        };
        debug!(
            peer = %self.peer,
            rpc.id = id,
            rpc.method = method,
            rpc.params = params.len(),
            "electrum call"
        );

        let exchange = async {
            self.writer
                .lock()
                .await
                .send(Request::new(id, method, params))
                .await?;
            reply.await.unwrap_or(Err(ElectrumError::StreamClosed))
        };
        let timed = tokio::time::timeout(self.config.request_timeout, exchange);

        let outcome = match cancel {
            Some(token) => tokio::select! {
                outcome = timed => outcome,
                _ = token.cancelled() => {
                    debug!(peer = %self.peer, rpc.id = id, rpc.method = method, "electrum call cancelled");
                    return Err(ElectrumError::Cancelled { method: method.to_owned() });
                }
            },
            None => timed.await,
        };

        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                warn!(
                    peer = %self.peer,
                    rpc.id = id,
                    rpc.method = method,
                    timeout = ?self.config.request_timeout,
                    "electrum call timed out"
                );
                Err(ElectrumError::Timeout {
                    method: method.to_owned(),
                    timeout: self.config.request_timeout,
                })
            }
        }
    }

    /// Shut the stream down. Outstanding calls fail with `StreamClosed`.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(err) = self.writer.lock().await.close().await {
            debug!(peer = %self.peer, error = %err, "error while shutting down session");
        }
        self.reader.abort();
        self.waiters.close();
        debug!(peer = %self.peer, "session closed");
    }

    #[cfg(test)]
    pub(crate) fn pending_calls(&self) -> usize {
        self.waiters.len()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        self.waiters.close();
    }
}

// ==============================================================================
// Reader
// ==============================================================================

async fn read_loop(
    mut frames: FramedRead<ReadHalf<Box<dyn Transport>>, LineCodec>,
    waiters: Arc<Waiters>,
    peer: String,
) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(line) => dispatch_line(&waiters, &peer, &line),
            Err(err) => {
                warn!(%peer, error = %err, "session read failed");
                break;
            }
        }
    }
    debug!(%peer, "session stream ended");
    waiters.close();
}

fn dispatch_line(waiters: &Waiters, peer: &str, line: &[u8]) {
    if line.iter().all(u8::is_ascii_whitespace) {
        return;
    }
    trace!(%peer, line = %String::from_utf8_lossy(line), "electrum line");

    let value: serde_json::Value = match serde_json::from_slice(line) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                %peer,
                error = %err,
                line = %String::from_utf8_lossy(line),
                "skipping undecodable line"
            );
            return;
        }
    };

    // Servers answer batched requests with an array of responses.
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                dispatch_message(waiters, peer, item);
            }
        }
        other => dispatch_message(waiters, peer, other),
    }
}

fn dispatch_message(waiters: &Waiters, peer: &str, value: serde_json::Value) {
    let response: Response = match serde_json::from_value(value) {
        Ok(response) => response,
        Err(err) => {
            warn!(%peer, error = %err, "skipping message that is not a JSON-RPC object");
            return;
        }
    };

    let Some(raw_id) = response.id.as_ref().filter(|id| !id.is_null()) else {
        trace!(%peer, method = ?response.method, "ignoring server notification");
        return;
    };
    let Some(id) = parse_response_id(raw_id) else {
        debug!(%peer, id = %raw_id, "ignoring response with foreign id");
        return;
    };
    let Some(waiter) = waiters.take(id) else {
        debug!(%peer, rpc.id = id, "no waiter for response");
        return;
    };

    let _ = waiter.send(response.into_result());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    fn session_pair(timeout: Duration) -> (Session, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let session = Session::open(
            Box::new(client),
            Peer::new("test-peer", 50002, Default::default()),
            SessionConfig {
                request_timeout: timeout,
            },
        );
        (session, server)
    }

    async fn read_request(reader: &mut BufReader<DuplexStream>) -> serde_json::Value {
        let mut line = String::new();
        reader.read_line(&mut line).await.expect("read request");
        serde_json::from_str(&line).expect("request must be JSON")
    }

    #[tokio::test]
    async fn resolves_split_frame_response() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);

        let call = session.call("server.ping", Vec::new());
        let respond = async {
            let request = read_request(&mut server).await;
            let id = request["id"].as_u64().expect("numeric id");
            let stream = server.get_mut();
            stream
                .write_all(format!("{{\"id\":\"{id}\",\"resul").as_bytes())
                .await
                .expect("write fragment");
            stream.flush().await.expect("flush");
            tokio::task::yield_now().await;
            stream.write_all(b"t\":5}\n").await.expect("write fragment");
        };

        let (result, ()) = tokio::join!(call, respond);
        assert_eq!(result.expect("call must resolve"), serde_json::json!(5));
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_response_resolves_waiter_once() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);

        let first = session.call("server.ping", Vec::new());
        let respond = async {
            let request = read_request(&mut server).await;
            let id = request["id"].as_u64().expect("numeric id");
            let lines = format!("{{\"id\":\"{id}\",\"result\":1}}\n{{\"id\":\"{id}\",\"result\":2}}\n");
            server.get_mut().write_all(lines.as_bytes()).await.expect("write");
        };
        let (result, ()) = tokio::join!(first, respond);
        assert_eq!(result.expect("first call"), serde_json::json!(1));

        // The session keeps working after the duplicate is dropped.
        let second = session.call("server.ping", Vec::new());
        let respond = async {
            let request = read_request(&mut server).await;
            let id = request["id"].as_u64().expect("numeric id");
            server
                .get_mut()
                .write_all(format!("{{\"id\":{id},\"result\":\"pong\"}}\n").as_bytes())
                .await
                .expect("write");
        };
        let (result, ()) = tokio::join!(second, respond);
        assert_eq!(result.expect("second call"), serde_json::json!("pong"));
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn interleaved_responses_reach_their_own_waiters() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);

        let a = session.call("a", Vec::new());
        let b = session.call("b", Vec::new());
        let respond = async {
            let first = read_request(&mut server).await;
            let second = read_request(&mut server).await;
            // Answer in reverse order, with a notification in between.
            let lines = format!(
                "{{\"id\":{},\"result\":\"{}\"}}\n{{\"method\":\"blockchain.headers.subscribe\",\"params\":[]}}\n{{\"id\":{},\"result\":\"{}\"}}\n",
                second["id"], second["method"].as_str().unwrap_or_default(),
                first["id"], first["method"].as_str().unwrap_or_default(),
            );
            server.get_mut().write_all(lines.as_bytes()).await.expect("write");
        };

        let (a, b, ()) = tokio::join!(a, b, respond);
        assert_eq!(a.expect("a"), serde_json::json!("a"));
        assert_eq!(b.expect("b"), serde_json::json!("b"));
    }

    #[tokio::test]
    async fn malformed_line_is_skipped() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);

        let call = session.call("server.ping", Vec::new());
        let respond = async {
            let request = read_request(&mut server).await;
            let lines = format!("not json at all\n{{\"id\":{},\"result\":null}}\n", request["id"]);
            server.get_mut().write_all(lines.as_bytes()).await.expect("write");
        };
        let (result, ()) = tokio::join!(call, respond);
        assert_eq!(result.expect("call must resolve"), serde_json::Value::Null);
    }

    #[tokio::test]
    async fn server_error_reaches_matching_waiter() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);

        let call = session.call("blockchain.transaction.get", Vec::new());
        let respond = async {
            let request = read_request(&mut server).await;
            let line = format!(
                "{{\"id\":{},\"error\":{{\"code\":2,\"message\":\"daemon error\"}}}}\n",
                request["id"]
            );
            server.get_mut().write_all(line.as_bytes()).await.expect("write");
        };
        let (result, ()) = tokio::join!(call, respond);
        assert!(matches!(
            result,
            Err(ElectrumError::ServerError { code: 2, ref message }) if message == "daemon error"
        ));
    }

    #[tokio::test]
    async fn stream_end_fails_pending_waiter() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);

        let call = session.call("server.ping", Vec::new());
        let hang_up = async {
            let _ = read_request(&mut server).await;
            drop(server);
        };
        let (result, ()) = tokio::join!(call, hang_up);
        assert!(matches!(result, Err(ElectrumError::StreamClosed)));
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn timeout_detaches_only_the_expired_waiter() {
        let (session, server) = session_pair(Duration::from_millis(200));
        let mut server = BufReader::new(server);

        let slow = session.call("slow", Vec::new());
        let fast = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            session.call("fast", Vec::new()).await
        };
        let respond = async {
            let _slow = read_request(&mut server).await;
            let fast = read_request(&mut server).await;
            let line = format!("{{\"id\":{},\"result\":true}}\n", fast["id"]);
            server.get_mut().write_all(line.as_bytes()).await.expect("write");
            server
        };

        let (slow, fast, _server) = tokio::join!(slow, fast, respond);
        assert!(matches!(slow, Err(ElectrumError::Timeout { ref method, .. }) if method == "slow"));
        assert_eq!(fast.expect("fast call"), serde_json::json!(true));
        assert_eq!(session.pending_calls(), 0);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn cancellation_frees_waiter_and_keeps_session_open() {
        let (session, server) = session_pair(Duration::from_secs(5));
        let mut server = BufReader::new(server);
        let token = CancellationToken::new();

        let call = session.call_with_cancel("server.ping", Vec::new(), Some(&token));
        let cancel = async {
            let _ = read_request(&mut server).await;
            token.cancel();
            server
        };
        let (result, _server) = tokio::join!(call, cancel);
        assert!(matches!(result, Err(ElectrumError::Cancelled { .. })));
        assert_eq!(session.pending_calls(), 0);
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn calls_after_close_fail_fast() {
        let (session, _server) = session_pair(Duration::from_secs(5));
        session.close().await;
        assert!(session.is_closed());
        let result = session.call("server.ping", Vec::new()).await;
        assert!(matches!(result, Err(ElectrumError::StreamClosed)));
    }
}

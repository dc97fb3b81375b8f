use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, WriteHalf};

use crate::peers::{Peer, PeerRegistry, TlsPolicy};

use super::client::{ClientConfig, ElectrumClient};
use super::connector::Connector;
use super::tls::{Dialer, Transport};

/// How the mock answers a `blockchain.transaction.get` for one txid.
#[derive(Debug, Clone)]
pub enum TxReply {
    Found(serde_json::Value),
    /// Answer with the transaction after `delay`, without holding up other
    /// requests on the connection.
    Delayed(Duration, serde_json::Value),
    Error { code: i64, message: String },
    /// Never answer; the caller's deadline has to fire.
    Silent,
    /// Drop the connection instead of answering.
    Hangup,
}

/// What the serve loop does with one request.
enum Action {
    Reply(serde_json::Value),
    ReplyAfter(Duration, serde_json::Value),
    Ignore,
    Hangup,
}

type SharedWriter = Arc<tokio::sync::Mutex<WriteHalf<DuplexStream>>>;

/// A scripted Electrum peer served over in-memory streams. Canned data is
/// populated via the builder pattern; every request's method is logged.
#[derive(Clone)]
pub struct MockElectrum {
    state: Arc<MockState>,
}

struct MockState {
    histories: HashMap<String, serde_json::Value>,
    balances: HashMap<String, serde_json::Value>,
    transactions: HashMap<String, TxReply>,
    headers: HashMap<u64, serde_json::Value>,
    version: serde_json::Value,
    failing_methods: HashSet<String>,
    calls: Mutex<Vec<String>>,
    /// `get:<txid>` when a transaction request arrives, `done:<txid>` just
    /// before its reply is written.
    tx_events: Mutex<Vec<String>>,
    tx_in_flight: AtomicUsize,
    tx_peak_in_flight: AtomicUsize,
    open_connections: AtomicUsize,
    total_connections: AtomicUsize,
}

impl MockElectrum {
    pub fn builder() -> MockElectrumBuilder {
        MockElectrumBuilder {
            histories: HashMap::new(),
            balances: HashMap::new(),
            transactions: HashMap::new(),
            headers: HashMap::new(),
            version: serde_json::json!(["MockElectrum 1.0", "1.4"]),
            failing_methods: HashSet::new(),
        }
    }

    /// Methods received so far, in arrival order, across all connections.
    pub fn calls(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .expect("mock call log lock")
            .clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls().iter().filter(|m| *m == method).count()
    }

    pub fn tx_events(&self) -> Vec<String> {
        self.state
            .tx_events
            .lock()
            .expect("mock tx event lock")
            .clone()
    }

    /// Most `blockchain.transaction.get` requests ever awaiting a reply at
    /// once.
    pub fn tx_peak_in_flight(&self) -> usize {
        self.state.tx_peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn open_connections(&self) -> usize {
        self.state.open_connections.load(Ordering::SeqCst)
    }

    pub fn total_connections(&self) -> usize {
        self.state.total_connections.load(Ordering::SeqCst)
    }

    /// Wait until every served connection has been closed by the client.
    pub async fn wait_until_all_closed(&self) -> bool {
        for _ in 0..200 {
            if self.open_connections() == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    /// A client whose only peer is this mock.
    pub fn client(&self, config: ClientConfig) -> ElectrumClient {
        let registry = PeerRegistry::new(vec![Peer::new("mock", 50002, TlsPolicy::Verify)]);
        let dialer = Arc::new(FakeDialer::new(self.clone()));
        ElectrumClient::new(Connector::new(registry, dialer), config)
    }

    /// Serve one connection and return the client end.
    pub fn connect(&self) -> DuplexStream {
        let (client, server) = tokio::io::duplex(1024 * 1024);
        self.state.open_connections.fetch_add(1, Ordering::SeqCst);
        self.state.total_connections.fetch_add(1, Ordering::SeqCst);
        let mock = self.clone();
        tokio::spawn(async move {
            mock.serve(server).await;
            mock.state.open_connections.fetch_sub(1, Ordering::SeqCst);
        });
        client
    }

    async fn serve(&self, stream: DuplexStream) {
        let (read, write) = tokio::io::split(stream);
        let write: SharedWriter = Arc::new(tokio::sync::Mutex::new(write));
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Ok(request) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            if let Some(txid) = tx_get_txid(&request) {
                self.state
                    .tx_events
                    .lock()
                    .expect("mock tx event lock")
                    .push(format!("get:{txid}"));
                let in_flight = self.state.tx_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.state
                    .tx_peak_in_flight
                    .fetch_max(in_flight, Ordering::SeqCst);
            }
            match self.respond(&request) {
                Action::Reply(reply) => {
                    if !self.write_reply(&write, &request, reply).await {
                        break;
                    }
                }
                Action::ReplyAfter(delay, reply) => {
                    let mock = self.clone();
                    let write = write.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        mock.write_reply(&write, &request, reply).await;
                    });
                }
                Action::Ignore => {}
                Action::Hangup => break,
            }
        }
    }

    async fn write_reply(
        &self,
        write: &SharedWriter,
        request: &serde_json::Value,
        reply: serde_json::Value,
    ) -> bool {
        if let Some(txid) = tx_get_txid(request) {
            self.state
                .tx_events
                .lock()
                .expect("mock tx event lock")
                .push(format!("done:{txid}"));
            self.state.tx_in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        let mut encoded = reply.to_string();
        encoded.push('\n');
        write
            .lock()
            .await
            .write_all(encoded.as_bytes())
            .await
            .is_ok()
    }

    fn respond(&self, request: &serde_json::Value) -> Action {
        let id = request["id"].clone();
        let method = request["method"].as_str().unwrap_or_default().to_owned();
        let params = request["params"].as_array().cloned().unwrap_or_default();
        self.state
            .calls
            .lock()
            .expect("mock call log lock")
            .push(method.clone());

        let key = params
            .first()
            .map(|p| match p {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default();

        let result = match method.as_str() {
            m if self.state.failing_methods.contains(m) => {
                Err((-32603, "internal error".to_owned()))
            }
            "server.version" => Ok(self.state.version.clone()),
            "blockchain.scripthash.get_history" | "blockchain.address.get_history" => Ok(self
                .state
                .histories
                .get(&key)
                .cloned()
                .unwrap_or_else(|| serde_json::json!([]))),
            "blockchain.scripthash.get_balance" | "blockchain.address.get_balance" => Ok(self
                .state
                .balances
                .get(&key)
                .cloned()
                .unwrap_or(serde_json::Value::Null)),
            "blockchain.transaction.get" => {
                let verbose = params.get(1).and_then(serde_json::Value::as_bool).unwrap_or(false);
                let pick = |tx: &serde_json::Value| {
                    if verbose {
                        tx.clone()
                    } else {
                        tx["hex"].clone()
                    }
                };
                match self.state.transactions.get(&key) {
                    Some(TxReply::Found(tx)) => Ok(pick(tx)),
                    Some(TxReply::Delayed(delay, tx)) => {
                        return Action::ReplyAfter(*delay, envelope(id, Ok(pick(tx))));
                    }
                    Some(TxReply::Error { code, message }) => Err((*code, message.clone())),
                    Some(TxReply::Silent) => return Action::Ignore,
                    Some(TxReply::Hangup) => return Action::Hangup,
                    None => Err((
                        2,
                        "daemon error: No such mempool or blockchain transaction".to_owned(),
                    )),
                }
            }
            "blockchain.block.header" | "blockchain.block.get_header" => {
                let height = params.first().and_then(serde_json::Value::as_u64).unwrap_or(0);
                self.state
                    .headers
                    .get(&height)
                    .cloned()
                    .ok_or((1, format!("height {height} out of range")))
            }
            _ => Err((-32601, format!("unknown method {method}"))),
        };

        Action::Reply(envelope(id, result))
    }
}

fn tx_get_txid(request: &serde_json::Value) -> Option<&str> {
    if request["method"] == "blockchain.transaction.get" {
        Some(request["params"][0].as_str().unwrap_or_default())
    } else {
        None
    }
}

fn envelope(
    id: serde_json::Value,
    result: Result<serde_json::Value, (i64, String)>,
) -> serde_json::Value {
    match result {
        Ok(result) => serde_json::json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }),
    }
}

pub struct MockElectrumBuilder {
    histories: HashMap<String, serde_json::Value>,
    balances: HashMap<String, serde_json::Value>,
    transactions: HashMap<String, TxReply>,
    headers: HashMap<u64, serde_json::Value>,
    version: serde_json::Value,
    failing_methods: HashSet<String>,
}

impl MockElectrumBuilder {
    /// `key` is the scripthash (or the address, for legacy methods).
    pub fn with_history(mut self, key: &str, history: serde_json::Value) -> Self {
        self.histories.insert(key.to_owned(), history);
        self
    }

    pub fn with_balance(mut self, key: &str, balance: serde_json::Value) -> Self {
        self.balances.insert(key.to_owned(), balance);
        self
    }

    pub fn with_tx(mut self, txid: &str, reply: TxReply) -> Self {
        self.transactions.insert(txid.to_owned(), reply);
        self
    }

    pub fn with_header(mut self, height: u64, header: serde_json::Value) -> Self {
        self.headers.insert(height, header);
        self
    }

    /// Answer every call of `method` with an internal error.
    pub fn failing_method(mut self, method: &str) -> Self {
        self.failing_methods.insert(method.to_owned());
        self
    }

    pub fn build(self) -> MockElectrum {
        MockElectrum {
            state: Arc::new(MockState {
                histories: self.histories,
                balances: self.balances,
                transactions: self.transactions,
                headers: self.headers,
                version: self.version,
                failing_methods: self.failing_methods,
                calls: Mutex::new(Vec::new()),
                tx_events: Mutex::new(Vec::new()),
                tx_in_flight: AtomicUsize::new(0),
                tx_peak_in_flight: AtomicUsize::new(0),
                open_connections: AtomicUsize::new(0),
                total_connections: AtomicUsize::new(0),
            }),
        }
    }
}

/// A dialer that connects every non-failing host to the same mock peer and
/// records the order of attempts.
pub struct FakeDialer {
    mock: MockElectrum,
    failing: HashSet<String>,
    attempts: Mutex<Vec<String>>,
}

impl FakeDialer {
    pub fn new(mock: MockElectrum) -> Self {
        Self {
            mock,
            failing: HashSet::new(),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.to_owned());
        self
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().expect("attempt log lock").clone()
    }
}

#[async_trait]
impl Dialer for FakeDialer {
    async fn dial(&self, peer: &Peer) -> io::Result<Box<dyn Transport>> {
        self.attempts
            .lock()
            .expect("attempt log lock")
            .push(peer.host.clone());
        // Yield so that concurrent dials would interleave if they existed.
        tokio::task::yield_now().await;
        if self.failing.contains(&peer.host) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{peer} refused the connection"),
            ));
        }
        Ok(Box::new(self.mock.connect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::electrum::session::{Session, SessionConfig};

    #[tokio::test]
    async fn answers_version_and_logs_calls() {
        let mock = MockElectrum::builder().build();
        let session = Session::open(
            Box::new(mock.connect()),
            Peer::new("mock", 1, TlsPolicy::Verify),
            SessionConfig::default(),
        );

        let version = session
            .call("server.version", vec![serde_json::json!("tally")])
            .await
            .expect("version must answer");
        assert_eq!(version, serde_json::json!(["MockElectrum 1.0", "1.4"]));
        assert_eq!(mock.calls(), vec!["server.version"]);

        session.close().await;
        assert!(mock.wait_until_all_closed().await);
    }

    #[tokio::test]
    async fn unknown_txid_is_a_server_error() {
        let mock = MockElectrum::builder().build();
        let session = Session::open(
            Box::new(mock.connect()),
            Peer::new("mock", 1, TlsPolicy::Verify),
            SessionConfig::default(),
        );
        let err = session
            .call(
                "blockchain.transaction.get",
                vec![serde_json::json!("ab"), serde_json::json!(true)],
            )
            .await
            .expect_err("unknown tx must fail");
        assert!(err.to_string().contains("No such mempool"));
    }
}

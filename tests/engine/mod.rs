//! Integration tests for the connection engine
//!
//! Shared helpers: a recording hooks implementation that captures every
//! engine event and lets tests script the parser's consumption, plus
//! loopback plumbing to stand up a host, a connection, and its peer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

use tcplink::{
    Connection, ConnectionError, EngineConfig, EngineHooks, Host, Packet, SendStatus,
};

mod backpressure;
mod send;

/// Generous bound for waiting on engine events; tests fail, not hang
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the engine reported through the hooks, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected {
        id: i64,
    },
    StartSending {
        id: i64,
        len: usize,
    },
    SendComplete {
        id: i64,
        len: usize,
        status: SendStatus,
    },
    Received {
        id: i64,
        data: Vec<u8>,
        consumed: usize,
    },
    Disconnected {
        id: i64,
        error: Option<String>,
    },
    ConnectionError {
        id: i64,
        error: String,
    },
}

/// Hooks implementation that records events and scripts the parser
///
/// The parser consumption for `on_message_received` is decided in order of
/// precedence: the next entry of the scripted plan, then the fixed message
/// size (consume one message if enough bytes arrived, else ask for more),
/// then consume-everything.
#[derive(Default)]
pub struct RecordingHooks {
    events: Mutex<Vec<Event>>,
    consume_plan: Mutex<VecDeque<usize>>,
    fixed_message_size: Mutex<Option<usize>>,
    changed: Notify,
}

impl RecordingHooks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Script the next parser invocations' consumed byte counts
    pub fn plan_consumes(&self, plan: impl IntoIterator<Item = usize>) {
        self.consume_plan.lock().extend(plan);
    }

    /// Act as a parser for fixed-size messages of `size` bytes
    pub fn parse_fixed_messages(&self, size: usize) {
        *self.fixed_message_size.lock() = Some(size);
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: Event) {
        self.events.lock().push(event);
        self.changed.notify_waiters();
    }

    /// Wait until the recorded events satisfy `pred`
    ///
    /// # Panics
    ///
    /// Panics if `pred` is still false after [`EVENT_TIMEOUT`].
    pub async fn wait_until(&self, pred: impl Fn(&[Event]) -> bool) {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                if pred(&self.events.lock()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(EVENT_TIMEOUT, wait)
            .await
            .unwrap_or_else(|_| {
                panic!("timed out waiting for events; recorded: {:#?}", self.events())
            });
    }
}

impl EngineHooks for RecordingHooks {
    fn on_connected(&self, connection: &Arc<Connection>) {
        self.record(Event::Connected {
            id: connection.id(),
        });
    }

    fn on_start_sending(&self, connection: &Arc<Connection>, packet: &Arc<Packet>) {
        self.record(Event::StartSending {
            id: connection.id(),
            len: packet.len(),
        });
    }

    fn on_send_complete(
        &self,
        connection: &Arc<Connection>,
        packet: &Arc<Packet>,
        status: SendStatus,
    ) {
        self.record(Event::SendComplete {
            id: connection.id(),
            len: packet.len(),
            status,
        });
    }

    fn on_message_received(&self, connection: &Arc<Connection>, data: &[u8]) -> usize {
        let consumed = if let Some(planned) = self.consume_plan.lock().pop_front() {
            planned
        } else if let Some(size) = *self.fixed_message_size.lock() {
            if data.len() >= size {
                size
            } else {
                0
            }
        } else {
            data.len()
        };
        self.record(Event::Received {
            id: connection.id(),
            data: data.to_vec(),
            consumed,
        });
        consumed
    }

    fn on_disconnected(&self, connection: &Arc<Connection>, error: Option<&ConnectionError>) {
        self.record(Event::Disconnected {
            id: connection.id(),
            error: error.map(ToString::to_string),
        });
    }

    fn on_connection_error(&self, connection: &Arc<Connection>, error: &ConnectionError) {
        self.record(Event::ConnectionError {
            id: connection.id(),
            error: error.to_string(),
        });
    }
}

/// A registered connection wired to a raw loopback peer stream
pub struct Harness {
    pub host: Arc<Host>,
    pub hooks: Arc<RecordingHooks>,
    pub connection: Arc<Connection>,
    pub peer: TcpStream,
}

impl Harness {
    pub async fn new(config: EngineConfig) -> Self {
        let hooks = RecordingHooks::new();
        let host = Arc::new(
            Host::new(config, Arc::clone(&hooks) as Arc<dyn EngineHooks>)
                .expect("valid test config"),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let peer = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();

        let connection = host.new_connection(accepted);
        host.register_connection(&connection);

        Self {
            host,
            hooks,
            connection,
            peer,
        }
    }

    pub async fn with_buffer_size(message_buffer_size: usize) -> Self {
        Self::new(EngineConfig::new(64 * 1024, message_buffer_size)).await
    }
}

/// Poll `cond` until it holds or [`EVENT_TIMEOUT`] elapses
pub async fn eventually(cond: impl Fn() -> bool) {
    let wait = async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(EVENT_TIMEOUT, wait)
        .await
        .expect("condition not reached in time");
}

//! In-memory SSH backend for tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Cursor;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use raccoon::{Auth, Dialer, Host, RaccoonError, RemoteProcess, Transport};

/// Record of a remote process the fake backend was asked to run.
#[derive(Debug, Clone)]
pub struct ExecutedCommand {
    pub host: String,
    pub command: String,
    pub input: Option<Vec<u8>>,
    /// Which dial of this host the process ran over (1 = first connection).
    pub generation: usize,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct State {
    dials: Mutex<Vec<String>>,
    closes: Mutex<Vec<String>>,
    executed: Mutex<Vec<ExecutedCommand>>,
    unreachable: Mutex<HashSet<String>>,
    broken: Mutex<HashSet<String>>,
    failing_commands: Mutex<Vec<String>>,
    failing_closes: Mutex<HashSet<String>>,
    stdout: Mutex<Option<Vec<u8>>>,
    delay_ms: AtomicUsize,
}

#[derive(Clone, Default)]
pub struct MockDialer {
    state: Arc<State>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every remote process sleeps this long before exiting.
    pub fn with_delay_ms(self, delay_ms: usize) -> Self {
        self.state.delay_ms.store(delay_ms, Ordering::SeqCst);
        self
    }

    /// Dials to `address` fail as if the credentials were rejected.
    pub fn unreachable(self, address: &str) -> Self {
        self.state
            .unreachable
            .lock()
            .unwrap()
            .insert(address.to_string());
        self
    }

    /// Commands containing `needle` exit with status 1.
    pub fn failing_command(self, needle: &str) -> Self {
        self.state
            .failing_commands
            .lock()
            .unwrap()
            .push(needle.to_string());
        self
    }

    /// Closing a connection to `address` reports an error.
    pub fn failing_close(self, address: &str) -> Self {
        self.state
            .failing_closes
            .lock()
            .unwrap()
            .insert(address.to_string());
        self
    }

    /// Every remote process writes `bytes` to stdout instead of echoing its command.
    pub fn with_stdout(self, bytes: &[u8]) -> Self {
        *self.state.stdout.lock().unwrap() = Some(bytes.to_vec());
        self
    }

    /// Make the live connection to `address` fail its next health check.
    pub fn break_connection(&self, address: &str) {
        self.state
            .broken
            .lock()
            .unwrap()
            .insert(address.to_string());
    }

    pub fn dials(&self, address: &str) -> usize {
        self.state
            .dials
            .lock()
            .unwrap()
            .iter()
            .filter(|a| *a == address)
            .count()
    }

    pub fn closes(&self, address: &str) -> usize {
        self.state
            .closes
            .lock()
            .unwrap()
            .iter()
            .filter(|a| *a == address)
            .count()
    }

    pub fn executed(&self) -> Vec<ExecutedCommand> {
        self.state.executed.lock().unwrap().clone()
    }

    pub fn executed_on(&self, address: &str) -> Vec<ExecutedCommand> {
        self.executed()
            .into_iter()
            .filter(|cmd| cmd.host == address)
            .collect()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, host: &Host) -> Result<Box<dyn Transport>, RaccoonError> {
        if self.state.unreachable.lock().unwrap().contains(&host.address) {
            return Err(RaccoonError::Dial {
                address: host.address.clone(),
                source: "authentication rejected".into(),
            });
        }
        let generation = {
            let mut dials = self.state.dials.lock().unwrap();
            dials.push(host.address.clone());
            dials.iter().filter(|a| **a == host.address).count()
        };
        self.state.broken.lock().unwrap().remove(&host.address);
        Ok(Box::new(MockTransport {
            address: host.address.clone(),
            generation,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTransport {
    address: String,
    generation: usize,
    state: Arc<State>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn check(&self) -> Result<(), RaccoonError> {
        if self.state.broken.lock().unwrap().contains(&self.address) {
            return Err(RaccoonError::Channel {
                address: self.address.clone(),
                source: "connection reset".into(),
            });
        }
        Ok(())
    }

    async fn spawn(
        &self,
        command: &str,
        input: Option<Vec<u8>>,
    ) -> Result<RemoteProcess, RaccoonError> {
        let started = Instant::now();
        let code = if self
            .state
            .failing_commands
            .lock()
            .unwrap()
            .iter()
            .any(|needle| command.contains(needle.as_str()))
        {
            1
        } else {
            0
        };
        let delay = Duration::from_millis(self.state.delay_ms.load(Ordering::SeqCst) as u64);
        let state = Arc::clone(&self.state);
        let record = ExecutedCommand {
            host: self.address.clone(),
            command: command.to_string(),
            input,
            generation: self.generation,
            started,
            finished: started,
        };
        let stdout = Cursor::new(
            self.state
                .stdout
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| format!("{}\n", command).into_bytes()),
        );
        let stderr = Cursor::new(if code == 0 {
            Vec::new()
        } else {
            b"command failed\n".to_vec()
        });
        Ok(RemoteProcess {
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            exit: Box::pin(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let mut record = record;
                record.finished = Instant::now();
                state.executed.lock().unwrap().push(record);
                Ok(ExitStatus::from_raw(code << 8))
            }),
        })
    }

    async fn close(self: Box<Self>) -> Result<(), RaccoonError> {
        self.state.closes.lock().unwrap().push(self.address.clone());
        if self.state.failing_closes.lock().unwrap().contains(&self.address) {
            return Err(RaccoonError::Channel {
                address: self.address.clone(),
                source: "master connection already gone".into(),
            });
        }
        Ok(())
    }
}

pub fn host(address: &str) -> Host {
    Host::new(address, "root", Auth::Password("root".into()))
}

/// A tracing event as a flat map of its fields, `message` included.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub fields: HashMap<String, String>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.as_str())
    }

    pub fn message(&self) -> &str {
        self.field("message").unwrap_or_default()
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{:?}", value));
    }
}

/// Layer that keeps every event it sees.
#[derive(Clone, Default)]
pub struct CapturedLogs {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl CapturedLogs {
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn with_component(&self, component: &str) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.field("component") == Some(component))
            .collect()
    }

    pub fn at_level(&self, level: Level) -> Vec<CapturedEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.level == level)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for CapturedLogs {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = HashMap::new();
        event.record(&mut FieldVisitor(&mut fields));
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            fields,
        });
    }
}

/// Capture the events of this thread until the guard drops. Pair it with the
/// current-thread runtime of `#[tokio::test]` so spawned tasks are covered too.
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(logs.clone()));
    (logs, guard)
}

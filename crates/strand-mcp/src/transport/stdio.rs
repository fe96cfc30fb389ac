//! Stdio Transport (NDJSON)
//!
//! Newline-delimited JSON over a byte stream pair: one JSON value per line,
//! UTF-8, terminated by `\n`. Empty lines are skipped. A parse failure on a
//! line is reported through the `error` event and reading continues, since
//! the framing is still intact; EOF is fatal and reported as
//! `ConnectionClosed`.
//!
//! Three I/O sources are supported:
//!
//! - the process-wide stdin/stdout pair (the default),
//! - caller-supplied boxed async streams (used by tests and embedders),
//! - a spawned subprocess with piped stdin/stdout and silenced stderr.
//!
//! Writes go through a FIFO queue drained by a dedicated task, so
//! overlapping `send` calls never interleave bytes. Disposal fails every
//! queued-but-unwritten entry with `ConnectionClosed` before the streams
//! drop.

// Layer 1: Standard library imports
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

// Layer 3: Internal module imports
use super::{
    check_connectable, check_sendable, StateCell, StateSnapshot, Transport, TransportBuilder,
    TransportError, TransportEvents, TransportState,
};
use crate::protocol::JsonRpcMessage;

/// Boxed reader used by all stdio I/O sources
pub type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send + Sync>;

/// Boxed writer used by all stdio I/O sources
pub type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send + Sync>;

/// Environment variables scrubbed from spawned subprocesses
///
/// Anything that could make the child's runtime write diagnostics to the
/// stdout protocol stream corrupts the NDJSON framing.
const SCRUBBED_ENV_VARS: &[&str] = &["G_MESSAGES_DEBUG", "G_DEBUG", "RUST_LOG", "RUST_BACKTRACE"];

/// Where the transport gets its byte streams from
enum IoSource {
    /// Process-wide stdin/stdout
    ProcessStdio,
    /// Caller-supplied streams, consumed on first connect
    Streams {
        reader: Option<BoxedReader>,
        writer: Option<BoxedWriter>,
    },
    /// Spawn a child process and talk over its pipes
    Subprocess { argv: Vec<String> },
}

/// One queued outbound frame
struct WriteEntry {
    line: String,
    done: oneshot::Sender<Result<(), TransportError>>,
}

/// Builder for [`StdioTransport`]
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use strand_mcp::transport::{StdioTransportBuilder, TransportBuilder, TransportEvents};
/// # fn handler() -> Arc<dyn TransportEvents> { unimplemented!() }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = StdioTransportBuilder::subprocess(["my-mcp-server", "--flag"])
///     .with_event_handler(handler())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct StdioTransportBuilder {
    source: IoSource,
    handler: Option<Arc<dyn TransportEvents>>,
}

impl StdioTransportBuilder {
    /// Transport over the process-wide stdin/stdout
    pub fn new() -> Self {
        Self {
            source: IoSource::ProcessStdio,
            handler: None,
        }
    }

    /// Transport over caller-supplied streams
    ///
    /// The streams are consumed by the first `connect`; a transport built
    /// this way cannot reconnect after `disconnect`.
    pub fn with_streams(
        reader: impl AsyncBufRead + Unpin + Send + Sync + 'static,
        writer: impl AsyncWrite + Unpin + Send + Sync + 'static,
    ) -> Self {
        Self {
            source: IoSource::Streams {
                reader: Some(Box::new(reader)),
                writer: Some(Box::new(writer)),
            },
            handler: None,
        }
    }

    /// Transport over a spawned subprocess (argv form)
    pub fn subprocess<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source: IoSource::Subprocess {
                argv: argv.into_iter().map(Into::into).collect(),
            },
            handler: None,
        }
    }

    /// Transport over a spawned subprocess (whitespace-split command string)
    pub fn subprocess_command(command: impl AsRef<str>) -> Self {
        Self::subprocess(command.as_ref().split_whitespace().map(str::to_string))
    }
}

impl Default for StdioTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportBuilder for StdioTransportBuilder {
    type Transport = StdioTransport;

    fn with_event_handler(mut self, handler: Arc<dyn TransportEvents>) -> Self {
        self.handler = Some(handler);
        self
    }

    fn build(self) -> Result<StdioTransport, TransportError> {
        let handler = self.handler.ok_or_else(|| {
            TransportError::connection("no event handler configured for stdio transport")
        })?;
        let snapshot = StateSnapshot::new();
        Ok(StdioTransport {
            state: Arc::new(StateCell::new(handler, "stdio")),
            snapshot,
            source: self.source,
            write_tx: None,
            shutdown_tx: None,
            reader_task: None,
            writer_task: None,
            child: None,
        })
    }
}

/// NDJSON transport over stdin/stdout, arbitrary streams, or a subprocess
pub struct StdioTransport {
    state: Arc<StateCell>,
    snapshot: StateSnapshot,
    source: IoSource,
    write_tx: Option<mpsc::UnboundedSender<WriteEntry>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    reader_task: Option<JoinHandle<()>>,
    writer_task: Option<JoinHandle<()>>,
    child: Option<Child>,
}

impl StdioTransport {
    async fn transition(&self, state: TransportState) {
        self.snapshot.store(state);
        self.state.set(state).await;
    }

    /// Acquire the byte streams for this connect attempt
    fn acquire_io(&mut self) -> Result<(BoxedReader, BoxedWriter), TransportError> {
        match &mut self.source {
            IoSource::ProcessStdio => Ok((
                Box::new(BufReader::new(tokio::io::stdin())),
                Box::new(tokio::io::stdout()),
            )),
            IoSource::Streams { reader, writer } => {
                let reader = reader.take().ok_or_else(|| {
                    TransportError::connection("stream-backed stdio transport cannot reconnect")
                })?;
                let writer = writer.take().ok_or_else(|| {
                    TransportError::connection("stream-backed stdio transport cannot reconnect")
                })?;
                Ok((reader, writer))
            }
            IoSource::Subprocess { argv } => {
                let argv = argv.clone();
                let (child, reader, writer) = spawn_child(&argv)?;
                self.child = Some(child);
                Ok((reader, writer))
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        check_connectable(self.snapshot.load())?;
        self.transition(TransportState::Connecting).await;

        let (reader, writer) = match self.acquire_io() {
            Ok(io) => io,
            Err(e) => {
                self.transition(TransportState::Failed).await;
                return Err(e);
            }
        };

        let (write_tx, write_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.writer_task = Some(tokio::spawn(writer_loop(
            writer,
            write_rx,
            shutdown_rx.clone(),
        )));
        self.reader_task = Some(tokio::spawn(reader_loop(
            reader,
            Arc::clone(&self.state),
            self.snapshot.clone(),
            shutdown_rx,
        )));

        self.write_tx = Some(write_tx);
        self.shutdown_tx = Some(shutdown_tx);
        self.transition(TransportState::Connected).await;
        debug!("stdio transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        // Idempotent, but an EOF-driven disconnection still has tasks and
        // possibly a child to reap.
        if self.snapshot.load() == TransportState::Disconnected
            && self.writer_task.is_none()
            && self.reader_task.is_none()
            && self.child.is_none()
        {
            return Ok(());
        }
        self.transition(TransportState::Disconnecting).await;

        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        self.write_tx = None;

        if let Some(task) = self.writer_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.reader_task.take() {
            let _ = task.await;
        }
        if let Some(mut child) = self.child.take() {
            terminate_child(&mut child).await;
        }

        self.transition(TransportState::Disconnected).await;
        debug!("stdio transport disconnected");
        Ok(())
    }

    async fn send(&mut self, message: JsonRpcMessage) -> Result<(), TransportError> {
        check_sendable(self.snapshot.load())?;
        let line = serde_json::to_string(&message)?;

        let (done_tx, done_rx) = oneshot::channel();
        let queue = self
            .write_tx
            .as_ref()
            .ok_or_else(|| TransportError::closed("write queue is gone"))?;
        queue
            .send(WriteEntry {
                line,
                done: done_tx,
            })
            .map_err(|_| TransportError::closed("write queue is gone"))?;

        done_rx
            .await
            .map_err(|_| TransportError::closed("transport disposed while write was queued"))?
    }

    fn state(&self) -> TransportState {
        self.snapshot.load()
    }

    fn transport_type(&self) -> &'static str {
        "stdio"
    }
}

/// Background task draining the write queue one entry at a time
async fn writer_loop(
    mut writer: BoxedWriter,
    mut queue: mpsc::UnboundedReceiver<WriteEntry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                queue.close();
                while let Ok(entry) = queue.try_recv() {
                    let _ = entry
                        .done
                        .send(Err(TransportError::closed("transport disposed with queued writes")));
                }
                break;
            }
            entry = queue.recv() => {
                match entry {
                    Some(entry) => {
                        let result = write_frame(&mut writer, &entry.line).await;
                        if let Err(ref e) = result {
                            warn!(error = %e, "stdio write failed");
                        }
                        let _ = entry.done.send(result);
                    }
                    None => break,
                }
            }
        }
    }
}

async fn write_frame(writer: &mut BoxedWriter, line: &str) -> Result<(), TransportError> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Background task reading newline-delimited JSON until EOF or shutdown
async fn reader_loop(
    mut reader: BoxedReader,
    state: Arc<StateCell>,
    snapshot: StateSnapshot,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut line = String::new();
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        state
                            .handler()
                            .error(TransportError::closed("end of input stream"))
                            .await;
                        snapshot.store(TransportState::Disconnected);
                        state.set(TransportState::Disconnected).await;
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            match serde_json::from_str::<Value>(trimmed) {
                                Ok(value) => {
                                    trace!("stdio frame received");
                                    state.handler().message_received(value).await;
                                }
                                Err(e) => {
                                    state
                                        .handler()
                                        .error(TransportError::Serialization { source: e })
                                        .await;
                                }
                            }
                        }
                        line.clear();
                    }
                    Err(e) => {
                        state.handler().error(TransportError::Io { source: e }).await;
                        snapshot.store(TransportState::Disconnected);
                        state.set(TransportState::Disconnected).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Spawn the subprocess with piped stdio and a scrubbed environment
fn spawn_child(argv: &[String]) -> Result<(Child, BoxedReader, BoxedWriter), TransportError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| TransportError::connection("empty subprocess command"))?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);
    for var in SCRUBBED_ENV_VARS {
        command.env_remove(var);
    }

    let mut child = command
        .spawn()
        .map_err(|e| TransportError::connection(format!("failed to spawn {program}: {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| TransportError::connection("child stdin was not piped"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TransportError::connection("child stdout was not piped"))?;

    Ok((
        child,
        Box::new(BufReader::new(stdout)),
        Box::new(stdin),
    ))
}

/// Terminate the child: SIGTERM on Unix, force-exit elsewhere
#[cfg(unix)]
async fn terminate_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        let _ = nix::sys::signal::kill(
            nix::unistd::Pid::from_raw(pid as i32),
            nix::sys::signal::Signal::SIGTERM,
        );
    }
    if tokio::time::timeout(Duration::from_secs(2), child.wait())
        .await
        .is_err()
    {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(not(unix))]
async fn terminate_child(child: &mut Child) {
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{JsonRpcMessage, RequestId};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio::io::AsyncReadExt;

    struct Collector {
        messages: StdMutex<Vec<Value>>,
        errors: StdMutex<Vec<String>>,
        notify: mpsc::UnboundedSender<()>,
    }

    impl Collector {
        fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<()>) {
            let (notify, rx) = mpsc::unbounded_channel();
            (
                Arc::new(Self {
                    messages: StdMutex::new(Vec::new()),
                    errors: StdMutex::new(Vec::new()),
                    notify,
                }),
                rx,
            )
        }
    }

    #[async_trait]
    impl TransportEvents for Collector {
        async fn state_changed(&self, _old: TransportState, _new: TransportState) {}

        async fn message_received(&self, value: Value) {
            self.messages.lock().unwrap().push(value);
            let _ = self.notify.send(());
        }

        async fn error(&self, error: TransportError) {
            self.errors.lock().unwrap().push(error.to_string());
            let _ = self.notify.send(());
        }
    }

    fn split_duplex(
        stream: tokio::io::DuplexStream,
    ) -> (
        BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
        tokio::io::WriteHalf<tokio::io::DuplexStream>,
    ) {
        let (read, write) = tokio::io::split(stream);
        (BufReader::new(read), write)
    }

    #[tokio::test]
    async fn ndjson_frames_arrive_in_order() {
        let (local, remote) = tokio::io::duplex(16 * 1024);
        let (reader, writer) = split_duplex(local);
        let (mut remote_read, mut remote_write) = tokio::io::split(remote);

        let (collector, mut notified) = Collector::new();
        let mut transport = StdioTransportBuilder::with_streams(reader, writer)
            .with_event_handler(collector.clone())
            .build()
            .unwrap();
        transport.connect().await.unwrap();

        remote_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"a\"}\n\n{\"jsonrpc\":\"2.0\",\"method\":\"b\"}\n")
            .await
            .unwrap();

        notified.recv().await.unwrap();
        notified.recv().await.unwrap();
        let messages = collector.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["method"], "a");
        assert_eq!(messages[1]["method"], "b");

        // A send produces exactly `<json>\n` on the wire
        transport
            .send(JsonRpcMessage::request("ping", None, RequestId::new_number(1)))
            .await
            .unwrap();
        let mut buffer = [0u8; 256];
        let n = remote_read.read(&mut buffer).await.unwrap();
        let written = std::str::from_utf8(&buffer[..n]).unwrap();
        assert!(written.ends_with('\n'));
        let parsed: Value = serde_json::from_str(written.trim_end()).unwrap();
        assert_eq!(parsed["method"], "ping");

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn parse_failure_is_nonfatal() {
        let (local, remote) = tokio::io::duplex(4096);
        let (reader, writer) = split_duplex(local);
        let (_remote_read, mut remote_write) = tokio::io::split(remote);

        let (collector, mut notified) = Collector::new();
        let mut transport = StdioTransportBuilder::with_streams(reader, writer)
            .with_event_handler(collector.clone())
            .build()
            .unwrap();
        transport.connect().await.unwrap();

        remote_write
            .write_all(b"this is not json\n{\"jsonrpc\":\"2.0\",\"method\":\"after\"}\n")
            .await
            .unwrap();

        notified.recv().await.unwrap(); // error
        notified.recv().await.unwrap(); // message
        assert_eq!(collector.errors.lock().unwrap().len(), 1);
        let messages = collector.messages.lock().unwrap().clone();
        assert_eq!(messages[0]["method"], "after");
        assert_eq!(transport.state(), TransportState::Connected);

        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn eof_reports_connection_closed() {
        let (local, remote) = tokio::io::duplex(4096);
        let (reader, writer) = split_duplex(local);

        let (collector, mut notified) = Collector::new();
        let mut transport = StdioTransportBuilder::with_streams(reader, writer)
            .with_event_handler(collector.clone())
            .build()
            .unwrap();
        transport.connect().await.unwrap();

        drop(remote); // peer goes away

        notified.recv().await.unwrap();
        let errors = collector.errors.lock().unwrap().clone();
        assert!(errors[0].contains("Connection closed"));
        assert_eq!(transport.state(), TransportState::Disconnected);
    }

    #[tokio::test]
    async fn send_rejected_when_not_connected() {
        let (local, _remote) = tokio::io::duplex(4096);
        let (reader, writer) = split_duplex(local);
        let (collector, _notified) = Collector::new();
        let mut transport = StdioTransportBuilder::with_streams(reader, writer)
            .with_event_handler(collector)
            .build()
            .unwrap();

        let err = transport
            .send(JsonRpcMessage::notification("x", None))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn double_connect_rejected() {
        let (local, _remote) = tokio::io::duplex(4096);
        let (reader, writer) = split_duplex(local);
        let (collector, _notified) = Collector::new();
        let mut transport = StdioTransportBuilder::with_streams(reader, writer)
            .with_event_handler(collector)
            .build()
            .unwrap();

        transport.connect().await.unwrap();
        let err = transport.connect().await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidState { .. }));
        transport.disconnect().await.unwrap();

        // Disconnect is idempotent
        transport.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn empty_lines_are_skipped() {
        let (local, remote) = tokio::io::duplex(4096);
        let (reader, writer) = split_duplex(local);
        let (_remote_read, mut remote_write) = tokio::io::split(remote);

        let (collector, mut notified) = Collector::new();
        let mut transport = StdioTransportBuilder::with_streams(reader, writer)
            .with_event_handler(collector.clone())
            .build()
            .unwrap();
        transport.connect().await.unwrap();

        remote_write
            .write_all(b"\n\n  \n{\"jsonrpc\":\"2.0\",\"method\":\"only\"}\n")
            .await
            .unwrap();

        notified.recv().await.unwrap();
        assert_eq!(collector.messages.lock().unwrap().len(), 1);
        assert!(collector.errors.lock().unwrap().is_empty());

        transport.disconnect().await.unwrap();
    }

    #[test]
    fn subprocess_env_is_scrubbed() {
        let argv = vec!["echo".to_string(), "hi".to_string()];
        let (program, args) = argv.split_first().unwrap();
        let mut command = Command::new(program);
        command.args(args);
        for var in SCRUBBED_ENV_VARS {
            command.env_remove(var);
        }
        let removed: Vec<_> = command
            .as_std()
            .get_envs()
            .filter(|(_, value)| value.is_none())
            .map(|(key, _)| key.to_string_lossy().to_string())
            .collect();
        for var in SCRUBBED_ENV_VARS {
            assert!(removed.iter().any(|k| k == var), "missing scrub for {var}");
        }
    }

    #[test]
    fn subprocess_command_splits_whitespace() {
        let builder = StdioTransportBuilder::subprocess_command("server --port 0");
        match builder.source {
            IoSource::Subprocess { ref argv } => {
                assert_eq!(argv, &["server", "--port", "0"]);
            }
            _ => panic!("expected subprocess source"),
        }
    }
}

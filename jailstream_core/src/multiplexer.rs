//! # Streaming Multiplexer
//!
//! Drains a sandboxed process's stdout and stderr concurrently, turns each line
//! into an [`OutputEvent`] and funnels every event through one [`EventSink`].
//!
//! ## Ordering
//!
//! Lines from one stream keep the order the process wrote them. Lines from the
//! two streams interleave in whatever order they arrive; there is no ordering
//! across origins. `DONE` is always last.
//!
//! ## Line policy
//!
//! A line ends at `\n`; the terminator and a preceding `\r` are stripped.
//! Invalid UTF-8 is replaced lossily. A trailing fragment without a terminator
//! is flushed as a final line when the stream closes, so output is never lost
//! just because the command did not end it with a newline.
//!
//! A line is never buffered past [`MAX_LINE_BYTES`]. Once that many bytes
//! arrive without a `\n`, they are emitted as one line and reading continues
//! with the rest. A multi-byte character straddling the cut is replaced
//! lossily on both sides.
//!
//! ## Termination
//!
//! [`finalize`] joins both drain tasks before it waits on the process, then
//! emits exactly one `DONE`. Cancelling the request token (client gone, or a
//! send failed) stops both drains and kills the child before it is reaped.

use crate::error::{Result, SandboxError};
use crate::event::{Origin, OutputEvent};
use crate::supervisor::{SandboxedProcess, Supervisor};
use std::io;
use std::process::ExitStatus;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One event in flight at a time; producers wait for the client to take it.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Longest line held in memory before it is emitted unterminated.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Single-writer funnel in front of the client transport.
///
/// Every clone feeds the same bounded channel, and its one receiver writes each
/// event to the transport as a whole frame. Concurrent drains therefore never
/// interleave partial events.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<OutputEvent>,
}

impl EventSink {
    /// Creates a sink and the receiver the transport consumes.
    pub fn channel() -> (Self, mpsc::Receiver<OutputEvent>) {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<OutputEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Sends one event, waiting for room. Fails once the receiver is gone.
    pub async fn send(&self, event: OutputEvent) -> Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| SandboxError::TransportClosed)
    }
}

/// How a drain loop ended.
#[derive(Debug)]
pub enum DrainOutcome {
    /// End-of-stream reached; every line was forwarded.
    Exhausted { lines: usize },
    /// The request was cancelled.
    Cancelled { lines: usize },
    /// The sink's receiver was dropped.
    TransportClosed { lines: usize },
    /// Reading the pipe failed.
    ReadFailed { lines: usize, error: io::Error },
}

impl DrainOutcome {
    pub fn lines(&self) -> usize {
        match self {
            DrainOutcome::Exhausted { lines }
            | DrainOutcome::Cancelled { lines }
            | DrainOutcome::TransportClosed { lines }
            | DrainOutcome::ReadFailed { lines, .. } => *lines,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, DrainOutcome::Exhausted { .. })
    }
}

/// Reads `reader` to end-of-stream and forwards one event per line.
///
/// A closed sink cancels `cancel`, which stops the sibling drain as well.
pub async fn drain<R>(
    reader: R,
    origin: Origin,
    sink: EventSink,
    cancel: CancellationToken,
) -> DrainOutcome
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut lines = 0;

    loop {
        buf.clear();
        let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64);
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return DrainOutcome::Cancelled { lines },
            read = limited.read_until(b'\n', &mut buf) => read,
        };

        match read {
            Ok(0) => return DrainOutcome::Exhausted { lines },
            Ok(_) => {
                let event = OutputEvent::line(origin, decode_line(&buf));
                let sent = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return DrainOutcome::Cancelled { lines },
                    sent = sink.send(event) => sent,
                };
                if sent.is_err() {
                    debug!(origin = %origin, "Transport closed while draining");
                    cancel.cancel();
                    return DrainOutcome::TransportClosed { lines };
                }
                lines += 1;
            }
            Err(error) => return DrainOutcome::ReadFailed { lines, error },
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Drains both output streams of `process` concurrently, then finalizes it.
pub async fn run(
    mut process: SandboxedProcess,
    sink: EventSink,
    cancel: CancellationToken,
) -> Result<ExitStatus> {
    let (stdout, stderr) = process.take_output()?;

    let drains = [
        tokio::spawn(drain(stdout, Origin::Stdout, sink.clone(), cancel.clone())),
        tokio::spawn(drain(stderr, Origin::Stderr, sink.clone(), cancel.clone())),
    ];

    finalize(process, drains, sink, cancel).await
}

/// Waits for both drains, then the process, then emits the single `DONE`.
///
/// The process is only waited on after both drains report completion. If the
/// request was cancelled the child is killed first so the wait cannot hang.
pub async fn finalize(
    mut process: SandboxedProcess,
    drains: [JoinHandle<DrainOutcome>; 2],
    sink: EventSink,
    cancel: CancellationToken,
) -> Result<ExitStatus> {
    let [stdout_task, stderr_task] = drains;
    let (stdout_result, stderr_result) = tokio::join!(stdout_task, stderr_task);

    for (origin, result) in [(Origin::Stdout, stdout_result), (Origin::Stderr, stderr_result)] {
        match result {
            Ok(DrainOutcome::ReadFailed { lines, error }) => {
                warn!(origin = %origin, lines, "Read failed while draining: {}", error);
            }
            Ok(outcome) => {
                debug!(origin = %origin, lines = outcome.lines(), outcome = ?outcome, "Drain finished");
            }
            Err(e) => {
                // A panicked drain must not suppress DONE; treat it like a cancellation.
                error!(origin = %origin, "Drain task failed: {}", e);
                cancel.cancel();
            }
        }
    }

    if cancel.is_cancelled() {
        info!(pid = ?process.id(), "Request cancelled; killing sandboxed process");
        process.kill();
    }

    let status = process.wait().await;

    if sink.send(OutputEvent::done()).await.is_err() {
        debug!("Transport closed before DONE could be sent");
    }

    status
}

/// Runs one command end to end: start, stream, finalize.
///
/// A launch failure is reported in-band as `Error starting command: ...` and
/// is still followed by `DONE`, so every accepted request ends the same way.
pub async fn stream_command(
    supervisor: &Supervisor,
    command: &str,
    sink: EventSink,
    cancel: CancellationToken,
) -> Result<ExitStatus> {
    match supervisor.start(command) {
        Ok(process) => run(process, sink, cancel).await,
        Err(err) => {
            warn!("Failed to start sandboxed command: {}", err);
            for event in [OutputEvent::spawn_failed(&err), OutputEvent::done()] {
                if sink.send(event).await.is_err() {
                    break;
                }
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn collect(mut rx: mpsc::Receiver<OutputEvent>) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn decode_strips_terminators_only() {
        assert_eq!(decode_line(b"hello\n"), "hello");
        assert_eq!(decode_line(b"hello\r\n"), "hello");
        assert_eq!(decode_line(b"tail"), "tail");
        assert_eq!(decode_line(b"  padded  \n"), "  padded  ");
        assert_eq!(decode_line(b"\n"), "");
    }

    #[test]
    fn decode_replaces_invalid_utf8() {
        assert_eq!(decode_line(b"ok \xff\n"), "ok \u{fffd}");
    }

    #[tokio::test]
    async fn drain_emits_lines_in_order_and_flushes_tail() {
        let (sink, rx) = EventSink::with_capacity(16);
        let input: &[u8] = b"one\ntwo\r\n\nthree";

        let outcome = drain(input, Origin::Stdout, sink, CancellationToken::new()).await;
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.lines(), 4);

        let events = collect(rx).await;
        let payloads: Vec<_> = events.iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(payloads, vec!["one", "two", "", "three"]);
        assert!(events.iter().all(|e| e.origin == Origin::Stdout));
    }

    #[tokio::test]
    async fn overlong_line_is_split_at_the_limit() {
        let (sink, rx) = EventSink::with_capacity(16);
        let total = 3 * MAX_LINE_BYTES + 10;
        let mut input = vec![b'x'; total];
        input.extend_from_slice(b"\nafter\n");

        let outcome = drain(&input[..], Origin::Stdout, sink, CancellationToken::new()).await;
        assert!(outcome.is_exhausted());

        let events = collect(rx).await;
        let lengths: Vec<_> = events.iter().map(|e| e.payload.len()).collect();
        assert_eq!(
            lengths,
            vec![MAX_LINE_BYTES, MAX_LINE_BYTES, MAX_LINE_BYTES, 10, 5]
        );
        assert_eq!(events[4].payload, "after");
    }

    #[tokio::test]
    async fn unterminated_flood_is_bounded_per_event() {
        let (sink, mut rx) = EventSink::channel();
        let flood = tokio::io::repeat(b'x').take(64 * MAX_LINE_BYTES as u64);
        let task = tokio::spawn(drain(flood, Origin::Stdout, sink, CancellationToken::new()));

        let mut events = 0;
        while let Some(event) = rx.recv().await {
            assert!(event.payload.len() <= MAX_LINE_BYTES);
            events += 1;
        }
        assert_eq!(events, 64);
        assert!(task.await.unwrap().is_exhausted());
    }

    #[tokio::test]
    async fn drain_of_empty_stream_emits_nothing() {
        let (sink, rx) = EventSink::with_capacity(4);
        let outcome = drain(&b""[..], Origin::Stderr, sink, CancellationToken::new()).await;
        assert!(outcome.is_exhausted());
        assert_eq!(outcome.lines(), 0);
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn closed_transport_stops_drain_and_cancels_request() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        let cancel = CancellationToken::new();

        let outcome = drain(&b"a\nb\n"[..], Origin::Stdout, sink, cancel.clone()).await;
        assert!(matches!(outcome, DrainOutcome::TransportClosed { lines: 0 }));
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_blocked_read() {
        let (sink, _rx) = EventSink::channel();
        // The writer half stays open, so the read never completes on its own.
        let (reader, _writer) = tokio::io::duplex(64);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(drain(reader, Origin::Stdout, sink, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("drain should stop after cancellation")
            .unwrap();
        assert!(matches!(outcome, DrainOutcome::Cancelled { lines: 0 }));
    }

    #[tokio::test]
    async fn sink_reports_closed_receiver() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(matches!(
            sink.send(OutputEvent::done()).await,
            Err(SandboxError::TransportClosed)
        ));
    }
}

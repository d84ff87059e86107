//! Test utilities for aoa-proxy
//!
//! Provides scripted mock transports and a recording output sink so the
//! negotiator, the HID channel and the bridge can be tested without a
//! device attached.
//!
//! # Example
//!
//! ```
//! use common::ControlTransport;
//! use common::test_utils::MockControl;
//! use std::time::Duration;
//!
//! let control = MockControl::with_version(2);
//! let mut buf = [0u8; 2];
//! let len = control
//!     .read_control(0xc0, 51, 0, 0, &mut buf, Duration::from_secs(1))
//!     .unwrap();
//! assert_eq!(&buf[..len], &[2, 0]);
//! assert_eq!(control.requests(), vec![51]);
//! ```

use crate::transport::{BulkPipe, ControlTransport};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One control transfer as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCall {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    /// Payload for OUT transfers, empty for IN transfers
    pub data: Vec<u8>,
}

/// Scripted control endpoint
///
/// IN transfers pop queued responses (an empty queue answers with a
/// stall). OUT transfers succeed unless a failure was registered for
/// their request code.
#[derive(Default)]
pub struct MockControl {
    read_responses: Mutex<VecDeque<rusb::Result<Vec<u8>>>>,
    write_failures: Mutex<HashMap<u8, rusb::Error>>,
    calls: Mutex<Vec<ControlCall>>,
}

impl MockControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers the get-protocol request with `version`
    pub fn with_version(version: u16) -> Self {
        let mock = Self::new();
        mock.push_read(Ok(version.to_le_bytes().to_vec()));
        mock
    }

    pub fn push_read(&self, response: rusb::Result<Vec<u8>>) {
        self.read_responses.lock().unwrap().push_back(response);
    }

    pub fn fail_request(&self, request: u8, error: rusb::Error) {
        self.write_failures.lock().unwrap().insert(request, error);
    }

    pub fn calls(&self) -> Vec<ControlCall> {
        self.calls.lock().unwrap().clone()
    }

    /// bRequest of every transfer, in issue order
    pub fn requests(&self) -> Vec<u8> {
        self.calls().iter().map(|c| c.request).collect()
    }

    pub fn calls_for(&self, request: u8) -> Vec<ControlCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.request == request)
            .collect()
    }
}

impl ControlTransport for MockControl {
    fn read_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.calls.lock().unwrap().push(ControlCall {
            request_type,
            request,
            value,
            index,
            data: Vec::new(),
        });

        let response = self
            .read_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(rusb::Error::Pipe))?;

        let len = response.len().min(buf.len());
        buf[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn write_control(
        &self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        buf: &[u8],
        _timeout: Duration,
    ) -> rusb::Result<usize> {
        self.calls.lock().unwrap().push(ControlCall {
            request_type,
            request,
            value,
            index,
            data: buf.to_vec(),
        });

        match self.write_failures.lock().unwrap().get(&request) {
            Some(error) => Err(*error),
            None => Ok(buf.len()),
        }
    }
}

/// Something observable that happened on the bridge's two sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A bulk IN transfer started
    InArmed,
    /// A bulk IN transfer completed with this payload
    InCompleted(Vec<u8>),
    /// A bulk OUT transfer carried this payload
    OutSubmitted(Vec<u8>),
    /// The external output accepted this write
    Write(Vec<u8>),
}

/// Event log shared between a mock pipe and a recording writer
pub type Trace = Arc<Mutex<Vec<TraceEvent>>>;

pub fn new_trace() -> Trace {
    Arc::new(Mutex::new(Vec::new()))
}

/// Scripted bulk endpoint pair
///
/// IN transfers pop scripted results; once the script is exhausted they
/// block for `idle_delay` (bounded by the transfer timeout) and time out,
/// like a quiet device. OUT transfers take `out_delay` and succeed unless
/// an OUT failure was set.
pub struct MockBulkPipe {
    packet_size: usize,
    in_script: Mutex<VecDeque<rusb::Result<Vec<u8>>>>,
    out_failure: Mutex<Option<rusb::Error>>,
    idle_delay: Duration,
    out_delay: Duration,
    trace: Trace,
    in_flight_in: AtomicUsize,
    in_flight_out: AtomicUsize,
    max_in_flight_in: AtomicUsize,
    max_in_flight_out: AtomicUsize,
}

impl MockBulkPipe {
    pub fn new(packet_size: usize, trace: Trace) -> Self {
        Self {
            packet_size,
            in_script: Mutex::new(VecDeque::new()),
            out_failure: Mutex::new(None),
            idle_delay: Duration::from_millis(20),
            out_delay: Duration::ZERO,
            trace,
            in_flight_in: AtomicUsize::new(0),
            in_flight_out: AtomicUsize::new(0),
            max_in_flight_in: AtomicUsize::new(0),
            max_in_flight_out: AtomicUsize::new(0),
        }
    }

    pub fn with_out_delay(mut self, delay: Duration) -> Self {
        self.out_delay = delay;
        self
    }

    pub fn with_idle_delay(mut self, delay: Duration) -> Self {
        self.idle_delay = delay;
        self
    }

    pub fn push_in(&self, result: rusb::Result<Vec<u8>>) {
        self.in_script.lock().unwrap().push_back(result);
    }

    pub fn fail_out(&self, error: rusb::Error) {
        *self.out_failure.lock().unwrap() = Some(error);
    }

    pub fn trace(&self) -> Vec<TraceEvent> {
        self.trace.lock().unwrap().clone()
    }

    /// Payloads of every OUT transfer, in submission order
    pub fn out_payloads(&self) -> Vec<Vec<u8>> {
        self.trace()
            .into_iter()
            .filter_map(|e| match e {
                TraceEvent::OutSubmitted(data) => Some(data),
                _ => None,
            })
            .collect()
    }

    pub fn max_in_flight_in(&self) -> usize {
        self.max_in_flight_in.load(Ordering::SeqCst)
    }

    pub fn max_in_flight_out(&self) -> usize {
        self.max_in_flight_out.load(Ordering::SeqCst)
    }

    fn record(&self, event: TraceEvent) {
        self.trace.lock().unwrap().push(event);
    }
}

fn enter(counter: &AtomicUsize, max: &AtomicUsize) {
    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
    max.fetch_max(now, Ordering::SeqCst);
}

impl BulkPipe for MockBulkPipe {
    fn write_bulk(&self, data: &[u8], _timeout: Duration) -> rusb::Result<usize> {
        enter(&self.in_flight_out, &self.max_in_flight_out);
        self.record(TraceEvent::OutSubmitted(data.to_vec()));
        if !self.out_delay.is_zero() {
            std::thread::sleep(self.out_delay);
        }
        let failure = *self.out_failure.lock().unwrap();
        self.in_flight_out.fetch_sub(1, Ordering::SeqCst);

        match failure {
            Some(error) => Err(error),
            None => Ok(data.len()),
        }
    }

    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize> {
        enter(&self.in_flight_in, &self.max_in_flight_in);
        self.record(TraceEvent::InArmed);

        let scripted = self.in_script.lock().unwrap().pop_front();
        let result = match scripted {
            Some(Ok(data)) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                self.record(TraceEvent::InCompleted(data[..len].to_vec()));
                Ok(len)
            }
            Some(Err(error)) => Err(error),
            None => {
                let wait = if timeout.is_zero() {
                    self.idle_delay
                } else {
                    self.idle_delay.min(timeout)
                };
                std::thread::sleep(wait);
                Err(rusb::Error::Timeout)
            }
        };

        self.in_flight_in.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn max_packet_size(&self) -> usize {
        self.packet_size
    }
}

/// Output sink that records every write into a trace
///
/// With `short_by` set, each write reports that many bytes fewer than it
/// was given.
pub struct RecordingWriter {
    trace: Trace,
    short_by: usize,
}

impl RecordingWriter {
    pub fn new(trace: Trace) -> Self {
        Self { trace, short_by: 0 }
    }

    pub fn short(trace: Trace, short_by: usize) -> Self {
        Self { trace, short_by }
    }
}

impl AsyncWrite for RecordingWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let written = buf.len().saturating_sub(self.short_by);
        self.trace
            .lock()
            .unwrap()
            .push(TraceEvent::Write(buf[..written].to_vec()));
        Poll::Ready(Ok(written))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Extract the writes from a trace, in order
pub fn writes(trace: &Trace) -> Vec<Vec<u8>> {
    trace
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            TraceEvent::Write(data) => Some(data.clone()),
            _ => None,
        })
        .collect()
}

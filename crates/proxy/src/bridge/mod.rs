//! Duplex bridge between the accessory's bulk endpoints and an external
//! byte channel
//!
//! One `tokio::select!` per iteration multiplexes every wake source:
//! termination, the in-flight OUT and IN transfer completions, external
//! input (while pipeline A is armed), external output (while a received
//! payload waits) and a bounded idle timer. Blocking bulk transfers run
//! on the blocking pool; each hands its buffer back through its join
//! handle together with the transfer result, so buffers are allocated
//! once and never shared.

pub mod channel;
pub mod state;

pub use channel::{ChannelReader, ChannelWriter, ExternalChannel};
pub use state::{BridgeState, InCompletion};

use crate::config::BridgeSettings;
use common::{BulkPipe, Error, Result, TransferDirection};
use std::future::{self, Future};
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{self, JoinHandle};
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Result of one blocking bulk transfer, with its buffer handed back
type Completion = (rusb::Result<usize>, Vec<u8>);

/// Why the bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// External input reached end-of-file
    InputClosed,
    /// A termination signal arrived
    Interrupted,
    /// A bulk transfer failed
    TransferFailed {
        direction: TransferDirection,
        error: rusb::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub out_transfers: u64,
    pub bytes_to_device: u64,
    pub in_transfers: u64,
    pub bytes_to_host: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeReport {
    pub exit: BridgeExit,
    pub stats: BridgeStats,
}

pub struct Bridge<P: BulkPipe> {
    pipe: Arc<P>,
    settings: BridgeSettings,
}

impl<P: BulkPipe> Bridge<P> {
    pub fn new(pipe: P, settings: BridgeSettings) -> Self {
        Self {
            pipe: Arc::new(pipe),
            settings,
        }
    }

    pub fn pipe(&self) -> &P {
        &self.pipe
    }

    /// Forward until input ends, a transfer fails or `shutdown` resolves.
    ///
    /// Outstanding transfers are drained (bounded by the drain timeout)
    /// and the writer is shut down on every exit path, fatal ones
    /// included.
    pub async fn run<R, W, S>(
        &self,
        mut reader: R,
        mut writer: W,
        shutdown: S,
    ) -> Result<BridgeReport>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut pump = Pump::new(Arc::clone(&self.pipe), self.settings.clone());
        tokio::pin!(shutdown);

        info!(
            "Bridge started (packet size {}, wait for first byte: {})",
            pump.packet_size, self.settings.wait_for_first_byte
        );

        let exit = loop {
            match pump.step(&mut reader, &mut writer, shutdown.as_mut()).await {
                Ok(None) => continue,
                Ok(Some(exit)) => break Ok(exit),
                Err(e) => break Err(e),
            }
        };

        pump.drain().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Closing external output failed: {}", e);
        }

        let stats = pump.stats;
        info!(
            "Bridge stopped: {} bytes to device in {} transfers, {} bytes to host in {} transfers",
            stats.bytes_to_device, stats.out_transfers, stats.bytes_to_host, stats.in_transfers
        );

        let exit = exit?;
        match exit {
            BridgeExit::InputClosed => info!("External input closed"),
            BridgeExit::Interrupted => info!("Interrupted"),
            BridgeExit::TransferFailed { direction, error } => {
                warn!("Bulk {} transfer failed: {}", direction, error)
            }
        }
        Ok(BridgeReport { exit, stats })
    }
}

/// Loop-local state of one bridge run
struct Pump<P: BulkPipe> {
    pipe: Arc<P>,
    settings: BridgeSettings,
    packet_size: usize,
    state: BridgeState,
    /// OUT buffer, at home while no OUT transfer is in flight
    out_buf: Option<Vec<u8>>,
    /// IN buffer, at home while idle between transfers
    in_buf: Option<Vec<u8>>,
    /// Received payload and its length, waiting for the external output
    pending: Option<(Vec<u8>, usize)>,
    out_task: Option<JoinHandle<Completion>>,
    in_task: Option<JoinHandle<Completion>>,
    stats: BridgeStats,
}

impl<P: BulkPipe> Pump<P> {
    fn new(pipe: Arc<P>, settings: BridgeSettings) -> Self {
        let packet_size = pipe.max_packet_size().max(1);
        let state = BridgeState::new(settings.wait_for_first_byte);
        Self {
            pipe,
            settings,
            packet_size,
            state,
            out_buf: Some(vec![0u8; packet_size]),
            in_buf: Some(vec![0u8; packet_size]),
            pending: None,
            out_task: None,
            in_task: None,
            stats: BridgeStats::default(),
        }
    }

    /// One wait and its handling. `Some` ends the loop.
    async fn step<R, W, S>(
        &mut self,
        reader: &mut R,
        writer: &mut W,
        shutdown: Pin<&mut S>,
    ) -> Result<Option<BridgeExit>>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        if self.state.should_arm_in() {
            if let Some(buf) = self.in_buf.take() {
                self.submit_in(buf)?;
            }
        }

        let input_armed = self.state.input_armed();
        let output_wanted = self.state.output_wanted();

        tokio::select! {
            biased;

            _ = shutdown => {
                return Ok(Some(BridgeExit::Interrupted));
            }

            joined = join(&mut self.out_task) => {
                self.out_task = None;
                let (result, buf) = joined?;
                return Ok(self.out_completed(result, buf));
            }

            joined = join(&mut self.in_task) => {
                self.in_task = None;
                let (result, buf) = joined?;
                return Ok(self.in_completed(result, buf));
            }

            read = read_input(reader, &mut self.out_buf), if input_armed => {
                let len = read?;
                if len == 0 {
                    return Ok(Some(BridgeExit::InputClosed));
                }
                let buf = self
                    .out_buf
                    .take()
                    .ok_or(Error::TransferInFlight(TransferDirection::Out))?;
                self.submit_out(buf, len)?;
            }

            written = write_output(writer, &self.pending), if output_wanted => {
                let written = written?;
                let (buf, len) = self
                    .pending
                    .take()
                    .ok_or(Error::TransferInFlight(TransferDirection::In))?;
                if written != len {
                    return Err(Error::ShortWrite { expected: len, written });
                }
                writer.flush().await?;

                self.stats.bytes_to_host += len as u64;
                self.state.delivered();
                self.in_buf = Some(buf);
                trace!("Wrote {} bytes to external output", len);
            }

            _ = time::sleep(self.settings.idle_timeout()) => {
                let (ins, outs) = self.state.outstanding();
                trace!("Idle: {} IN and {} OUT transfers outstanding", ins, outs);
            }
        }

        Ok(None)
    }

    fn submit_out(&mut self, buf: Vec<u8>, len: usize) -> Result<()> {
        self.state.out_submitted()?;
        let pipe = Arc::clone(&self.pipe);
        let timeout = self.settings.write_timeout();
        self.out_task = Some(task::spawn_blocking(move || {
            let result = pipe.write_bulk(&buf[..len], timeout);
            (result, buf)
        }));
        trace!("Submitted {} byte OUT transfer", len);
        Ok(())
    }

    fn submit_in(&mut self, mut buf: Vec<u8>) -> Result<()> {
        self.state.in_submitted()?;
        let pipe = Arc::clone(&self.pipe);
        let timeout = self.settings.idle_timeout();
        self.in_task = Some(task::spawn_blocking(move || {
            let result = pipe.read_bulk(&mut buf, timeout);
            (result, buf)
        }));
        Ok(())
    }

    fn out_completed(&mut self, result: rusb::Result<usize>, buf: Vec<u8>) -> Option<BridgeExit> {
        self.state.out_completed();
        self.out_buf = Some(buf);

        match result {
            Ok(len) => {
                self.stats.out_transfers += 1;
                self.stats.bytes_to_device += len as u64;
                trace!("OUT transfer completed ({} bytes)", len);
                None
            }
            Err(error) => Some(BridgeExit::TransferFailed {
                direction: TransferDirection::Out,
                error,
            }),
        }
    }

    fn in_completed(&mut self, result: rusb::Result<usize>, buf: Vec<u8>) -> Option<BridgeExit> {
        let (len, exit) = match result {
            Ok(len) => (len, None),
            Err(rusb::Error::Timeout) => (0, None),
            Err(error) => (
                0,
                Some(BridgeExit::TransferFailed {
                    direction: TransferDirection::In,
                    error,
                }),
            ),
        };

        match self.state.in_completed(len) {
            InCompletion::Drain => {
                self.stats.in_transfers += 1;
                trace!("IN transfer completed ({} bytes)", len);
                self.pending = Some((buf, len));
            }
            InCompletion::Rearm => self.in_buf = Some(buf),
        }
        exit
    }

    /// Wait for outstanding transfers, bounded by the drain timeout
    async fn drain(&mut self) {
        if let Some((_, len)) = self.pending.take() {
            warn!("Discarding {} received bytes that were not written out", len);
        }

        let (ins, outs) = self.state.outstanding();
        if ins + outs == 0 {
            return;
        }
        debug!("Draining {} IN and {} OUT transfers", ins, outs);

        let out_task = self.out_task.take();
        let in_task = self.in_task.take();
        let drained = time::timeout(self.settings.drain_timeout(), async {
            if let Some(handle) = out_task {
                if let Ok((Err(e), _)) = handle.await {
                    debug!("OUT transfer failed during shutdown: {}", e);
                }
            }
            if let Some(handle) = in_task {
                if let Ok((Ok(len), _)) = handle.await {
                    if len > 0 {
                        warn!("Discarding {} bytes received during shutdown", len);
                    }
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Gave up waiting for outstanding transfers");
        }
    }
}

async fn join(task: &mut Option<JoinHandle<Completion>>) -> Result<Completion> {
    match task {
        Some(handle) => handle.await.map_err(|e| Error::Task(e.to_string())),
        None => future::pending().await,
    }
}

async fn read_input<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Option<Vec<u8>>,
) -> io::Result<usize> {
    match buf {
        Some(buf) => reader.read(buf).await,
        None => future::pending().await,
    }
}

async fn write_output<W: AsyncWrite + Unpin>(
    writer: &mut W,
    pending: &Option<(Vec<u8>, usize)>,
) -> io::Result<usize> {
    match pending {
        Some((buf, len)) => writer.write(&buf[..*len]).await,
        None => future::pending().await,
    }
}

/// Resolves on the first SIGINT or SIGTERM.
///
/// Both streams are registered before this returns, so a signal that
/// arrives before the bridge starts waiting is not lost.
#[cfg(unix)]
pub fn termination_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => debug!("Received SIGINT"),
            _ = terminate.recv() => debug!("Received SIGTERM"),
        }
    })
}

/// Resolves on the first Ctrl-C.
///
/// The listener is registered before this returns, as on unix.
#[cfg(windows)]
pub fn termination_signal() -> Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c()?;
    Ok(async move {
        ctrl_c.recv().await;
        debug!("Received Ctrl-C");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{MockBulkPipe, new_trace};

    #[tokio::test]
    async fn test_join_empty_slot_never_resolves() {
        let mut slot = None;
        let waited = time::timeout(time::Duration::from_millis(10), join(&mut slot)).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_termination_signal_waits_for_signal() {
        let signal = termination_signal().unwrap();
        let waited = time::timeout(time::Duration::from_millis(10), signal).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_pump_allocates_packet_sized_buffers() {
        let pipe = Arc::new(MockBulkPipe::new(64, new_trace()));
        let pump = Pump::new(pipe, BridgeSettings::default());
        assert_eq!(pump.packet_size, 64);
        assert_eq!(pump.out_buf.as_ref().map(Vec::len), Some(64));
        assert_eq!(pump.in_buf.as_ref().map(Vec::len), Some(64));
    }
}

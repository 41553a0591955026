//! Transmit engine and sink adapter.
//!
//! One thread owns the socket and the pacing state. Each loop iteration
//! either renders-and-sends a primary frame (when its wall-clock deadline
//! has arrived), resends the previous payload once at the half-way mark of
//! its playback window, or sleeps until the nearest deadline. The host
//! talks to the thread through a message queue; latency reads are served
//! lock-free from an atomic deadline cell.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info};

use crate::config::OutputConfig;
use crate::error::LinkError;
use crate::host::{HostEvent, RenderSource, SinkMessage, SinkState};
use crate::link::LinkSocket;
use crate::sample::SampleSpec;
use crate::time::Clock;
use crate::wire::MAX_PAYLOAD;

/// Below this many µs of waiting we spin instead of sleeping; the channel
/// timeout alone is too coarse for frame pacing.
const SPIN_THRESHOLD_USEC: u64 = 2_000;

/// Snapshot of the transmit counters.
#[derive(Debug, Default, Clone)]
pub struct OutputStats {
    pub frames_sent: u64,
    pub retries_sent: u64,
}

#[derive(Default)]
struct SharedStats {
    frames_sent: AtomicU64,
    retries_sent: AtomicU64,
}

/// The audio sink backed by a wireless transmitter.
///
/// Owns the I/O thread; dropping the stream shuts it down. Rewinds are
/// disabled on this sink ([`OutputStream::max_rewind`] is zero) because
/// sent frames cannot be taken back off the air.
pub struct OutputStream {
    ctl_tx: Sender<SinkMessage>,
    events_rx: Receiver<HostEvent>,
    thread: Option<JoinHandle<()>>,
    clock: Clock,
    next_deadline: Arc<AtomicU64>,
    block_usec_max: u64,
    stats: Arc<SharedStats>,
}

impl OutputStream {
    /// Open the interface and start the transmit thread. The sink starts
    /// suspended; the host opens it with
    /// [`set_state`](OutputStream::set_state).
    pub fn new(config: OutputConfig, source: Box<dyn RenderSource>) -> Result<Self, LinkError> {
        if !config.spec.is_valid() {
            return Err(LinkError::InvalidArgument("invalid sample spec"));
        }

        let link = LinkSocket::open(
            &config.iface,
            config.group,
            config.mcs_index,
            config.spec.frame_size(),
        )?;

        let spec = config.spec;
        let max_request = spec.frame_align(MAX_PAYLOAD);
        let block_usec_max = spec.bytes_to_usec(max_request);
        info!(
            "sink '{}' on {}: {} byte blocks, {}us timing, {}",
            config.sink_name, config.iface, max_request, block_usec_max, spec
        );

        let clock = Clock::new();
        let next_deadline = Arc::new(AtomicU64::new(clock.now_usec()));
        let stats = Arc::new(SharedStats::default());
        let (ctl_tx, ctl_rx) = unbounded();
        let (events_tx, events_rx) = unbounded();

        let transmitter = Transmitter {
            link,
            spec,
            clock,
            source,
            ctl_rx,
            events_tx,
            next_deadline: Arc::clone(&next_deadline),
            stats: Arc::clone(&stats),
            state: SinkState::Suspended,
            max_request,
            block_usec: block_usec_max,
            next_primary: 0,
            retry_at: 0,
            primary_ts: 0,
            sends: 0,
            chunk: Vec::with_capacity(max_request),
        };

        let thread = thread::Builder::new()
            .name("iwab-sink".to_owned())
            .spawn(move || transmitter.run())
            .map_err(LinkError::Io)?;

        Ok(Self {
            ctl_tx,
            events_rx,
            thread: Some(thread),
            clock,
            next_deadline,
            block_usec_max,
            stats,
        })
    }

    pub fn set_state(&self, state: SinkState) {
        let _ = self.ctl_tx.send(SinkMessage::SetState(state));
    }

    /// Re-negotiate the render block size from a requested latency;
    /// `None` restores the default (maximum) block.
    pub fn update_requested_latency(&self, usec: Option<u64>) {
        let _ = self.ctl_tx.send(SinkMessage::UpdateLatency(usec));
    }

    /// Time until the next primary send, clamped to one maximum block.
    /// Staleness is bounded by one tick of the transmit thread.
    pub fn latency(&self) -> u64 {
        let deadline = self.next_deadline.load(Ordering::Relaxed);
        deadline
            .saturating_sub(self.clock.now_usec())
            .min(self.block_usec_max)
    }

    /// Rewinding is disabled on this sink.
    pub fn max_rewind(&self) -> usize {
        0
    }

    /// Events posted by the transmit thread (unload requests).
    pub fn events(&self) -> &Receiver<HostEvent> {
        &self.events_rx
    }

    pub fn stats(&self) -> OutputStats {
        OutputStats {
            frames_sent: self.stats.frames_sent.load(Ordering::Relaxed),
            retries_sent: self.stats.retries_sent.load(Ordering::Relaxed),
        }
    }

    /// Deliver the in-band shutdown message and join the thread.
    pub fn shutdown(&mut self) {
        let _ = self.ctl_tx.send(SinkMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Nearest future deadline to arm the loop timer at: the retry slot is
/// only live while exactly one send of the current chunk is out.
fn next_wakeup(next_primary: u64, retry_at: u64, sends: u8) -> u64 {
    if sends == 1 {
        retry_at.min(next_primary)
    } else {
        next_primary
    }
}

/// Render one block: let the source fill what it can, pad the rest with
/// silence so the wire always carries a full, aligned block.
fn render_block(source: &mut dyn RenderSource, chunk: &mut Vec<u8>, nbytes: usize, silence: u8) {
    chunk.clear();
    chunk.resize(nbytes, silence);
    let written = source.render(chunk).min(nbytes);
    chunk[written..].fill(silence);
}

struct Transmitter {
    link: LinkSocket,
    spec: SampleSpec,
    clock: Clock,
    source: Box<dyn RenderSource>,
    ctl_rx: Receiver<SinkMessage>,
    events_tx: Sender<HostEvent>,
    next_deadline: Arc<AtomicU64>,
    stats: Arc<SharedStats>,
    state: SinkState,
    /// Render request size in bytes; frame-aligned, at most [`MAX_PAYLOAD`].
    max_request: usize,
    /// Playback duration of one render block.
    block_usec: u64,
    /// Absolute deadline of the next primary send.
    next_primary: u64,
    /// Absolute deadline of the current chunk's retry slot.
    retry_at: u64,
    /// Timestamp the current chunk was stamped with; its retry carries the
    /// same one.
    primary_ts: u64,
    /// Sends of the current chunk so far (0, 1 or 2).
    sends: u8,
    chunk: Vec<u8>,
}

impl Transmitter {
    fn run(mut self) {
        debug!("transmit thread starting up");
        self.next_primary = self.clock.now_usec();

        loop {
            while let Ok(msg) = self.ctl_rx.try_recv() {
                if !self.handle(msg) {
                    debug!("transmit thread shutting down");
                    return;
                }
            }

            if self.state != SinkState::Opened {
                // timer disabled; only a message can wake us
                match self.ctl_rx.recv() {
                    Ok(msg) => {
                        if !self.handle(msg) {
                            debug!("transmit thread shutting down");
                            return;
                        }
                    }
                    Err(_) => return, // host went away
                }
                continue;
            }

            let now = self.clock.now_usec();
            let result = if now >= self.next_primary {
                self.send_primary()
            } else if now >= self.retry_at && self.sends == 1 {
                self.send_retry()
            } else {
                Ok(())
            };

            if let Err(e) = result {
                error!("failed to send wireless frame: {e}");
                self.fail();
                return;
            }

            self.next_deadline.store(self.next_primary, Ordering::Relaxed);
            let wake = next_wakeup(self.next_primary, self.retry_at, self.sends);
            if !self.wait_until(wake) {
                debug!("transmit thread shutting down");
                return;
            }
        }
    }

    /// Process one host message; returns false on shutdown.
    fn handle(&mut self, msg: SinkMessage) -> bool {
        match msg {
            SinkMessage::SetState(state) => {
                if state == SinkState::Opened && self.state != SinkState::Opened {
                    info!("sink is opened");
                    // re-base the stream clock and abandon any stale retry
                    self.next_primary = self.clock.now_usec();
                    self.sends = 0;
                } else if state == SinkState::Suspended && self.state != SinkState::Suspended {
                    info!("sink is suspended");
                }
                self.state = state;
                true
            }
            SinkMessage::UpdateLatency(requested) => {
                let aligned_max = self.spec.frame_align(MAX_PAYLOAD);
                let nbytes = match requested {
                    Some(usec) if usec > 0 => self
                        .spec
                        .usec_to_bytes(usec)
                        .clamp(self.spec.frame_size(), aligned_max),
                    _ => aligned_max,
                };
                self.max_request = nbytes;
                self.block_usec = self.spec.bytes_to_usec(nbytes);
                debug!(
                    "requested latency update: {} byte blocks, {}us timing",
                    self.max_request, self.block_usec
                );
                true
            }
            SinkMessage::Shutdown => false,
        }
    }

    /// Render a block at the primary deadline and put it on the air,
    /// stamped with the deadline (not the actual send time).
    fn send_primary(&mut self) -> Result<(), LinkError> {
        render_block(
            &mut *self.source,
            &mut self.chunk,
            self.max_request,
            self.spec.format.silence_byte(),
        );

        let timestamp = self.next_primary;
        self.send_once(timestamp, false)?;
        self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);

        let chunk_usec = self.spec.bytes_to_usec(self.chunk.len());
        self.primary_ts = timestamp;
        self.retry_at = timestamp + chunk_usec / 2;
        self.next_primary = timestamp + chunk_usec;
        self.sends = 1;
        Ok(())
    }

    /// Resend the same payload bytes with the primary's timestamp.
    fn send_retry(&mut self) -> Result<(), LinkError> {
        self.send_once(self.primary_ts, true)?;
        self.stats.retries_sent.fetch_add(1, Ordering::Relaxed);
        self.sends = 2;
        Ok(())
    }

    /// One send attempt: transient EINTR/EAGAIN retry within the tick,
    /// anything else is fatal.
    fn send_once(&mut self, timestamp: u64, retry: bool) -> Result<(), LinkError> {
        loop {
            match self.link.send(&self.chunk, timestamp, retry) {
                Ok(_) => return Ok(()),
                Err(LinkError::Io(e))
                    if e.kind() == std::io::ErrorKind::Interrupted
                        || e.kind() == std::io::ErrorKind::WouldBlock =>
                {
                    continue
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sleep until `deadline`, waking early for host messages. Sleeps
    /// through the channel so a message interrupts the wait; the last
    /// stretch is spun for sub-millisecond pacing. Returns false on
    /// shutdown.
    fn wait_until(&mut self, deadline: u64) -> bool {
        let now = self.clock.now_usec();
        if deadline <= now {
            return true;
        }

        if deadline - now > SPIN_THRESHOLD_USEC {
            match self.ctl_rx.recv_deadline(self.clock.instant_at(deadline - 1_000)) {
                // let the main loop re-evaluate with the new state
                Ok(msg) => return self.handle(msg),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }

        while self.clock.now_usec() < deadline {
            std::hint::spin_loop();
        }
        true
    }

    /// Unrecoverable send failure: ask the host to unload and keep
    /// draining the queue until the shutdown message arrives.
    fn fail(&mut self) {
        let _ = self.events_tx.send(HostEvent::UnloadRequest);
        while let Ok(msg) = self.ctl_rx.recv() {
            if matches!(msg, SinkMessage::Shutdown) {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_wakeup() {
        // retry slot pending: wake at whichever comes first
        assert_eq!(next_wakeup(1000, 600, 1), 600);
        assert_eq!(next_wakeup(1000, 1200, 1), 1000);
        // retry already sent or no chunk: the next primary is all there is
        assert_eq!(next_wakeup(1000, 600, 2), 1000);
        assert_eq!(next_wakeup(1000, 600, 0), 1000);
    }

    #[test]
    fn test_render_block_pads_short_renders() {
        let mut source = |buf: &mut [u8]| {
            buf[..4].copy_from_slice(&[1, 2, 3, 4]);
            4
        };
        let mut chunk = Vec::new();
        render_block(&mut source, &mut chunk, 8, 0);
        assert_eq!(chunk, vec![1, 2, 3, 4, 0, 0, 0, 0]);
    }

    #[test]
    fn test_render_block_caps_overlong_claims() {
        // a source claiming more than the block must not wander out
        let mut source = |_: &mut [u8]| usize::MAX;
        let mut chunk = Vec::new();
        render_block(&mut source, &mut chunk, 8, 0);
        assert_eq!(chunk.len(), 8);
    }
}

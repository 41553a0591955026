//! Receive engine and sink-input adapter.
//!
//! The engine turns parsed frames into monotonically-timed PCM in the
//! jitter queue: duplicates and stale sequences are rejected, a sequence
//! regression is treated as a sender restart, and playback gaps are filled
//! with repeated copies of the newer payload so the mixer's clock never
//! starves. Everything runs on the host's I/O thread; the only state
//! changes the engine induces on its host are cork (sustained underrun)
//! and resume (traffic while corked).

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use log::{debug, error, info, warn};

use crate::config::InputConfig;
use crate::error::{LinkError, ReadError};
use crate::host::SinkControl;
use crate::jitter::{JitterConfig, JitterQueue, PopError};
use crate::link::LinkSocket;
use crate::sample::SampleSpec;
use crate::time::Clock;
use crate::wire::{IwabHeader, MAX_FRAME, MAX_PAYLOAD};

/// Statistics window length.
pub const STAT_PERIOD_USEC: u64 = 10_000_000;

/// Sustained underrun within one window that corks the input.
pub const CORK_UNDERRUN_USEC: u64 = 500_000;

/// Cumulative receive counters.
#[derive(Debug, Default, Clone)]
pub struct RxStats {
    /// Frames admitted to the queue.
    pub frames: u64,
    pub duplicates: u64,
    pub restarts: u64,
    pub stale_drops: u64,
    pub misaligned: u64,
    pub malformed: u64,
    /// Playback time lost to gaps, µs.
    pub lost_usec: u64,
    /// Requested-but-unserved playback time, µs.
    pub underrun_usec: u64,
    /// Playback time dropped at the queue cap, µs.
    pub overrun_usec: u64,
}

/// One statistics window; published and reset every [`STAT_PERIOD_USEC`].
#[derive(Debug, Default)]
struct StatWindow {
    start_usec: u64,
    lost_usec: u64,
    underrun_usec: u64,
    overrun_usec: u64,
    fill_bytes: u64,
    fill_samples: u64,
}

/// How an incoming frame relates to the receiver state. First matching
/// rule wins, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Duplicate,
    Restart,
    Stale,
    Gap { missing_usec: u64 },
    InOrder,
}

/// The receive reconstruction engine.
///
/// Socket-free: the adapter (or a test) feeds it parsed headers and
/// payloads. `last_seq == 0` means "fresh"; the first valid frame after a
/// reset adopts its own sequence and timestamp without gap fill.
pub struct RxEngine {
    spec: SampleSpec,
    queue: JitterQueue,
    last_seq: u32,
    last_playback_ts: u64,
    corked: bool,
    clock: Clock,
    window: StatWindow,
    stats: RxStats,
}

impl RxEngine {
    pub fn new(spec: SampleSpec, jitter: JitterConfig, clock: Clock) -> Self {
        Self {
            spec,
            queue: JitterQueue::new(jitter, &spec),
            last_seq: 0,
            last_playback_ts: 0,
            corked: false,
            clock,
            window: StatWindow {
                start_usec: clock.now_usec(),
                ..StatWindow::default()
            },
            stats: RxStats::default(),
        }
    }

    pub fn queue(&self) -> &JitterQueue {
        &self.queue
    }

    pub fn is_corked(&self) -> bool {
        self.corked
    }

    pub fn last_seq(&self) -> u32 {
        self.last_seq
    }

    pub fn stats(&self) -> &RxStats {
        &self.stats
    }

    /// Duration of the currently queued bytes.
    pub fn latency_usec(&self) -> u64 {
        self.spec.bytes_to_usec(self.queue.len())
    }

    /// Count a datagram the codec rejected.
    pub fn note_malformed(&mut self) {
        self.stats.malformed += 1;
    }

    fn classify(&self, header: &IwabHeader) -> Class {
        if header.seq == self.last_seq {
            return Class::Duplicate;
        }
        if self.last_seq != 0 && header.seq < self.last_seq {
            return Class::Restart;
        }
        if self.last_playback_ts != 0 && header.timestamp < self.last_playback_ts {
            return Class::Stale;
        }
        if self.last_seq != 0 && header.seq != self.last_seq + 1 {
            return Class::Gap {
                missing_usec: header.timestamp - self.last_playback_ts,
            };
        }
        Class::InOrder
    }

    fn reset(&mut self) {
        self.last_seq = 0;
        self.last_playback_ts = 0;
    }

    /// Feed one valid frame through classification and into the queue.
    pub fn accept(&mut self, header: &IwabHeader, payload: &[u8], host: &mut dyn SinkControl) {
        let now = self.clock.now_usec();
        self.maybe_publish(now, host);

        if payload.is_empty() || !self.spec.is_frame_aligned(payload.len()) {
            self.stats.misaligned += 1;
            return;
        }

        if self.corked {
            info!("wireless traffic resumed, uncorking");
            host.request_cork(false);
            self.corked = false;
            self.reset();
        }

        match self.classify(header) {
            Class::Duplicate => {
                self.stats.duplicates += 1;
                return;
            }
            Class::Restart => {
                warn!(
                    "sequence regressed from {} to {}, assuming sender restart",
                    self.last_seq, header.seq
                );
                self.stats.restarts += 1;
                self.reset();
                return;
            }
            Class::Stale => {
                warn!(
                    "timestamps disordered: previous {}, incoming {}",
                    self.last_playback_ts, header.timestamp
                );
                self.stats.stale_drops += 1;
                return;
            }
            Class::Gap { missing_usec } => {
                debug_assert!(header.timestamp >= self.last_playback_ts);
                self.stats.lost_usec += missing_usec;
                self.window.lost_usec += missing_usec;
                self.fill_gap(missing_usec, payload);
            }
            Class::InOrder => {}
        }

        if self.queue.push(payload).is_err() {
            warn!(
                "buffer overrun, frame received but the audio queue is full ({} bytes)",
                self.queue.len()
            );
            self.count_overrun(payload.len());
        } else {
            self.stats.frames += 1;
        }

        self.last_seq = header.seq;
        self.last_playback_ts = header.timestamp + self.spec.bytes_to_usec(payload.len());

        self.window.fill_bytes += self.queue.len() as u64;
        self.window.fill_samples += 1;
    }

    /// Cover a playback gap with repeated copies of the newer payload,
    /// truncated to land exactly on the gap's duration.
    fn fill_gap(&mut self, missing_usec: u64, payload: &[u8]) {
        let mut missing = self.spec.usec_to_bytes(missing_usec);
        while missing > 0 {
            let n = missing.min(payload.len());
            if self.queue.push(&payload[..n]).is_err() {
                self.count_overrun(missing);
                break;
            }
            missing -= n;
        }
    }

    fn count_overrun(&mut self, bytes: usize) {
        let usec = self.spec.bytes_to_usec(bytes);
        self.stats.overrun_usec += usec;
        self.window.overrun_usec += usec;
    }

    /// Serve the mixer's pull: copy up to `request` bytes into `out`.
    ///
    /// An underrun is charged for the full requested duration; once the
    /// window's running total crosses [`CORK_UNDERRUN_USEC`] the consuming
    /// sink is corked and the queue flushed.
    pub fn pop(
        &mut self,
        request: usize,
        out: &mut Vec<u8>,
        host: &mut dyn SinkControl,
    ) -> Result<usize, PopError> {
        let now = self.clock.now_usec();
        self.maybe_publish(now, host);

        match self.queue.pop(request) {
            Ok(chunk) => {
                out.clear();
                out.extend_from_slice(chunk);
                Ok(out.len())
            }
            Err(e) => {
                let usec = self.spec.bytes_to_usec(request);
                self.stats.underrun_usec += usec;
                self.window.underrun_usec += usec;
                debug!("buffer underrun: {request} bytes requested but queue empty");
                if !self.corked && self.window.underrun_usec > CORK_UNDERRUN_USEC {
                    warn!(
                        "{} ms of sustained underrun, corking input",
                        self.window.underrun_usec / 1000
                    );
                    host.request_cork(true);
                    self.corked = true;
                    self.queue.flush_read();
                }
                Err(e)
            }
        }
    }

    /// Forward a host rewind request to the queue.
    pub fn rewind(&mut self, nbytes: usize) -> usize {
        self.queue.rewind(nbytes)
    }

    /// Publish the window statistics as sink properties and start a new
    /// window.
    fn maybe_publish(&mut self, now: u64, host: &mut dyn SinkControl) {
        let elapsed = now.saturating_sub(self.window.start_usec);
        if elapsed < STAT_PERIOD_USEC {
            return;
        }

        let secs = (elapsed / 1_000_000).max(1);
        host.set_property(
            "iwab.lost",
            format!("{} ms/s", self.window.lost_usec / 1000 / secs),
        );
        host.set_property(
            "iwab.underrun",
            format!("{} ms/s", self.window.underrun_usec / 1000 / secs),
        );
        host.set_property(
            "iwab.overrun",
            format!("{} ms/s", self.window.overrun_usec / 1000 / secs),
        );
        let avg_fill = if self.window.fill_samples > 0 {
            self.window.fill_bytes as f64 / self.window.fill_samples as f64 / MAX_PAYLOAD as f64
        } else {
            0.0
        };
        host.set_property("iwab.queue-fill", format!("{avg_fill:.1} chunks"));

        self.window = StatWindow {
            start_usec: now,
            ..StatWindow::default()
        };
    }
}

/// Sink-input adapter: an [`RxEngine`] over a [`LinkSocket`], driven by the
/// host sink's I/O thread.
///
/// The host includes [`InputStream::as_raw_fd`] in its poll set and calls
/// [`InputStream::process_input`] on readability; the mixer pulls through
/// [`InputStream::pop`] on the same thread.
pub struct InputStream {
    link: LinkSocket,
    engine: RxEngine,
    host: Box<dyn SinkControl>,
    read_buf: Box<[u8]>,
}

impl InputStream {
    /// Open the wireless interface and set up the reconstruction engine.
    pub fn new(config: InputConfig, host: Box<dyn SinkControl>) -> Result<Self, LinkError> {
        if !config.spec.is_valid() {
            return Err(LinkError::InvalidArgument("invalid sample spec"));
        }
        let link = LinkSocket::open(
            &config.iface,
            config.group,
            crate::config::DEFAULT_MCS_INDEX,
            config.spec.frame_size(),
        )?;
        info!(
            "listening for wireless audio on {} ({})",
            config.iface, config.spec
        );
        Ok(Self {
            link,
            engine: RxEngine::new(config.spec, config.jitter, Clock::new()),
            host,
            read_buf: vec![0u8; MAX_FRAME].into_boxed_slice(),
        })
    }

    pub fn engine(&self) -> &RxEngine {
        &self.engine
    }

    /// Drain the socket: parse, classify and enqueue every pending frame.
    /// Call when the socket polls readable.
    pub fn process_input(&mut self) {
        loop {
            match self.link.read(&mut self.read_buf) {
                Ok(view) => {
                    self.engine
                        .accept(&view.header, view.payload, &mut *self.host);
                }
                Err(ReadError::Again) => break,
                Err(ReadError::Malformed(_)) => {
                    // somebody else's traffic on the monitor interface
                    self.engine.note_malformed();
                }
                Err(ReadError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(ReadError::Io(e)) => {
                    error!("failed to read wireless data: {e}");
                    break;
                }
            }
        }
    }

    /// The mixer's pull callback: copy up to `request` bytes into `out`.
    pub fn pop(&mut self, request: usize, out: &mut Vec<u8>) -> Result<usize, PopError> {
        self.engine.pop(request, out, &mut *self.host)
    }

    /// Host rewind request; returns the bytes actually rewound.
    pub fn process_rewind(&mut self, nbytes: usize) -> usize {
        self.engine.rewind(nbytes)
    }

    /// Latency currently buffered ahead of the mixer, µs.
    pub fn latency(&self) -> u64 {
        self.engine.latency_usec()
    }
}

impl AsRawFd for InputStream {
    fn as_raw_fd(&self) -> RawFd {
        self.link.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHost;

    impl SinkControl for NullHost {
        fn request_cork(&mut self, _cork: bool) {}

        fn set_property(&mut self, _key: &str, _value: String) {}
    }

    fn engine() -> RxEngine {
        RxEngine::new(SampleSpec::default(), JitterConfig::default(), Clock::new())
    }

    fn header(seq: u32, timestamp: u64) -> IwabHeader {
        IwabHeader {
            version: 0,
            length: 1400,
            seq,
            timestamp,
            retry: 0,
        }
    }

    #[test]
    fn test_misaligned_payload_discarded() {
        let mut rx = engine();
        let mut host = NullHost;
        rx.accept(&header(1, 0), &[0u8; 1399], &mut host);
        assert_eq!(rx.stats().misaligned, 1);
        assert_eq!(rx.queue().len(), 0);
        assert_eq!(rx.last_seq(), 0);
    }

    #[test]
    fn test_fresh_state_adopts_first_frame() {
        let mut rx = engine();
        let mut host = NullHost;
        // a mid-stream sequence number arrives into fresh state: no fill
        rx.accept(&header(500, 4_000_000), &vec![1u8; 1400], &mut host);
        assert_eq!(rx.queue().len(), 1400);
        assert_eq!(rx.last_seq(), 500);
    }
}

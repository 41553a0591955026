//! Jitter queue: a bounded byte FIFO between packet arrival and the
//! mixer's pull cadence.
//!
//! Single-threaded: the receive engine pushes and the host's pull
//! callback pops on the same I/O thread, so there is no internal locking. The backing ring keeps one extra queue's worth of already-read
//! history so the host's rewind requests can be honoured.

use thiserror::Error;

use crate::sample::SampleSpec;
use crate::wire::MAX_FRAME;

/// Queue sizing, all byte-counted and frame-aligned at construction.
#[derive(Debug, Clone, Copy)]
pub struct JitterConfig {
    /// Hard cap; pushes beyond this fail with [`PushError::Overrun`].
    pub max_bytes: usize,
    /// Nominal fill the receive side aims for.
    pub target_bytes: usize,
    /// Pops fail until this much has been buffered once.
    pub prebuf_bytes: usize,
    /// Pops serving less than this fail as underruns.
    pub minreq_bytes: usize,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            max_bytes: 8 * MAX_FRAME,
            target_bytes: 4 * MAX_FRAME,
            prebuf_bytes: 2 * MAX_FRAME,
            minreq_bytes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("jitter queue overrun")]
pub struct PushError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("jitter queue underrun")]
pub struct PopError;

/// Queue health counters.
#[derive(Debug, Default, Clone)]
pub struct JitterStats {
    pub pushes: u64,
    pub pops: u64,
    pub overruns: u64,
    pub overrun_bytes: u64,
    pub underruns: u64,
}

/// Bounded FIFO of PCM bytes with rewind history and prebuffering.
pub struct JitterQueue {
    cfg: JitterConfig,
    frame_size: usize,
    /// Ring storage, twice the cap so rewind history survives a full
    /// queue of subsequent pushes.
    buf: Box<[u8]>,
    /// Absolute (non-wrapped) read/write offsets; `write - read` is the
    /// queued length.
    read: u64,
    write: u64,
    prebuffering: bool,
    silence: Vec<u8>,
    stats: JitterStats,
}

impl JitterQueue {
    pub fn new(cfg: JitterConfig, spec: &SampleSpec) -> Self {
        let frame_size = spec.frame_size();
        let align = |n: usize| (n - n % frame_size).max(frame_size);
        let cfg = JitterConfig {
            max_bytes: align(cfg.max_bytes),
            target_bytes: align(cfg.target_bytes).min(align(cfg.max_bytes)),
            prebuf_bytes: (cfg.prebuf_bytes - cfg.prebuf_bytes % frame_size).min(align(cfg.max_bytes)),
            minreq_bytes: cfg.minreq_bytes - cfg.minreq_bytes % frame_size,
        };
        let capacity = cfg.max_bytes * 2;
        let silence_len = MAX_FRAME.max(cfg.minreq_bytes);
        Self {
            cfg,
            frame_size,
            buf: vec![0u8; capacity].into_boxed_slice(),
            read: 0,
            write: 0,
            prebuffering: true,
            silence: vec![spec.format.silence_byte(); silence_len],
            stats: JitterStats::default(),
        }
    }

    pub fn config(&self) -> &JitterConfig {
        &self.cfg
    }

    /// Queued (pushed but not yet popped) bytes.
    pub fn len(&self) -> usize {
        (self.write - self.read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.write == self.read
    }

    pub fn is_prebuffering(&self) -> bool {
        self.prebuffering
    }

    pub fn stats(&self) -> &JitterStats {
        &self.stats
    }

    /// Pre-computed silence, for hosts that paint over underruns.
    pub fn silence(&self, len: usize) -> &[u8] {
        &self.silence[..len.min(self.silence.len())]
    }

    /// Append a chunk at the tail.
    ///
    /// On overrun the chunk is dropped whole and existing contents are
    /// untouched.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), PushError> {
        debug_assert_eq!(chunk.len() % self.frame_size, 0);

        if self.len() + chunk.len() > self.cfg.max_bytes {
            self.stats.overruns += 1;
            self.stats.overrun_bytes += chunk.len() as u64;
            return Err(PushError);
        }

        let cap = self.buf.len();
        let at = (self.write % cap as u64) as usize;
        let first = chunk.len().min(cap - at);
        self.buf[at..at + first].copy_from_slice(&chunk[..first]);
        self.buf[..chunk.len() - first].copy_from_slice(&chunk[first..]);
        self.write += chunk.len() as u64;
        self.stats.pushes += 1;
        Ok(())
    }

    /// Pop up to `request` bytes as one contiguous frame-aligned chunk.
    ///
    /// May return fewer bytes than requested (ring wrap); fails while
    /// prebuffering, on an empty queue, or when less than the configured
    /// minimum is available. An empty-queue pop re-enters prebuffering.
    pub fn pop(&mut self, request: usize) -> Result<&[u8], PopError> {
        let available = self.len();

        if self.prebuffering {
            if available >= self.cfg.prebuf_bytes {
                self.prebuffering = false;
            } else {
                self.stats.underruns += 1;
                return Err(PopError);
            }
        }

        if available == 0 || available < self.cfg.minreq_bytes {
            self.prebuffering = true;
            self.stats.underruns += 1;
            return Err(PopError);
        }

        let cap = self.buf.len();
        let at = (self.read % cap as u64) as usize;
        let contiguous = cap - at;
        let n = request.min(available).min(contiguous);
        let n = n - n % self.frame_size;
        if n == 0 {
            self.stats.underruns += 1;
            return Err(PopError);
        }

        self.read += n as u64;
        self.stats.pops += 1;
        Ok(&self.buf[at..at + n])
    }

    /// Move the read cursor backwards by up to `n` bytes, bounded by the
    /// history that has not been overwritten yet. Returns the bytes
    /// actually rewound.
    pub fn rewind(&mut self, n: usize) -> usize {
        let n = (n - n % self.frame_size) as u64;
        let stored = self.write.min(self.buf.len() as u64);
        let history = (stored - (self.write - self.read)).min(self.read);
        let rewound = n.min(history);
        self.read -= rewound;
        rewound as usize
    }

    /// Discard all queued bytes without disturbing the writer and
    /// re-enter prebuffering.
    pub fn flush_read(&mut self) {
        self.read = self.write;
        self.prebuffering = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(max: usize, prebuf: usize) -> JitterQueue {
        let cfg = JitterConfig {
            max_bytes: max,
            target_bytes: max / 2,
            prebuf_bytes: prebuf,
            minreq_bytes: 0,
        };
        JitterQueue::new(cfg, &SampleSpec::default())
    }

    fn pop_all(q: &mut JitterQueue) -> Vec<u8> {
        let mut out = Vec::new();
        while let Ok(chunk) = q.pop(usize::MAX) {
            out.extend_from_slice(chunk);
        }
        out
    }

    #[test]
    fn test_fifo_order() {
        let mut q = queue(4096, 0);
        q.push(&[1, 1, 1, 1]).unwrap();
        q.push(&[2, 2, 2, 2]).unwrap();
        assert_eq!(pop_all(&mut q), vec![1, 1, 1, 1, 2, 2, 2, 2]);
    }

    #[test]
    fn test_overrun_keeps_contents() {
        let mut q = queue(2800, 0);
        let a = vec![1u8; 1400];
        let b = vec![2u8; 1400];
        let c = vec![3u8; 1400];
        q.push(&a).unwrap();
        q.push(&b).unwrap();
        assert_eq!(q.push(&c), Err(PushError));
        assert_eq!(q.len(), 2800);
        let drained = pop_all(&mut q);
        assert_eq!(&drained[..1400], &a[..]);
        assert_eq!(&drained[1400..], &b[..]);
        assert_eq!(q.stats().overruns, 1);
        assert_eq!(q.stats().overrun_bytes, 1400);
    }

    #[test]
    fn test_bounds_invariant() {
        let mut q = queue(2800, 0);
        for i in 0..32 {
            let chunk = vec![i as u8; 400];
            let _ = q.push(&chunk);
            if i % 3 == 0 {
                let _ = q.pop(600);
            }
            assert!(q.len() <= q.config().max_bytes);
        }
    }

    #[test]
    fn test_prebuf_gates_pops() {
        let mut q = queue(8192, 2800);
        q.push(&vec![1u8; 1400]).unwrap();
        assert_eq!(q.pop(1400), Err(PopError));
        q.push(&vec![2u8; 1400]).unwrap();
        assert_eq!(q.pop(1400).unwrap().len(), 1400);
        // once primed, pops keep working below the prebuf mark
        assert_eq!(q.pop(1400).unwrap().len(), 1400);
        // but an empty pop re-arms prebuffering
        assert_eq!(q.pop(1400), Err(PopError));
        q.push(&vec![3u8; 1400]).unwrap();
        assert_eq!(q.pop(1400), Err(PopError));
    }

    #[test]
    fn test_rewind_bounded_by_history() {
        let mut q = queue(4096, 0);
        q.push(&vec![7u8; 1400]).unwrap();
        assert_eq!(q.pop(1400).unwrap().len(), 1400);
        assert_eq!(q.len(), 0);
        // nothing has been overwritten, the full pop is rewindable
        assert_eq!(q.rewind(2000), 1400);
        assert_eq!(q.pop(1400).unwrap(), &vec![7u8; 1400][..]);
        // no history at the very start
        let mut fresh = queue(4096, 0);
        assert_eq!(fresh.rewind(100), 0);
    }

    #[test]
    fn test_flush_read() {
        let mut q = queue(4096, 0);
        q.push(&vec![1u8; 400]).unwrap();
        q.flush_read();
        assert!(q.is_empty());
        assert!(q.is_prebuffering());
        q.push(&vec![2u8; 400]).unwrap();
        assert_eq!(q.pop(400).unwrap(), &vec![2u8; 400][..]);
    }

    #[test]
    fn test_silence_is_precomputed() {
        let q = queue(4096, 0);
        let silence = q.silence(1400);
        assert_eq!(silence.len(), 1400);
        assert!(silence.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_wrap_preserves_data() {
        let mut q = queue(2800, 0);
        // push/pop enough to wrap the 5600-byte ring several times
        for round in 0u8..20 {
            let chunk = vec![round; 1400];
            q.push(&chunk).unwrap();
            let mut got = Vec::new();
            while got.len() < 1400 {
                got.extend_from_slice(q.pop(1400 - got.len()).unwrap());
            }
            assert_eq!(got, chunk);
        }
    }
}

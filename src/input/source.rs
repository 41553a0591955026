//! Capture-source variant of the receive side.
//!
//! Thinner than [`super::InputStream`]: recovered payloads are posted
//! straight to the host source with no jitter queue and no reordering;
//! the host's own source latency handles arrival jitter. Duplicate
//! suppression is kept so a retransmission does not double audio.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use log::{error, info};

use crate::config::SourceConfig;
use crate::error::{LinkError, ReadError};
use crate::host::SourcePost;
use crate::link::LinkSocket;
use crate::sample::SampleSpec;
use crate::wire::MAX_FRAME;

/// A wireless capture source: every valid frame read off the air is posted
/// to the host as one chunk.
pub struct SourceStream {
    link: LinkSocket,
    spec: SampleSpec,
    last_seq: u32,
    read_buf: Box<[u8]>,
    frames: u64,
}

impl SourceStream {
    pub fn new(config: SourceConfig) -> Result<Self, LinkError> {
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
            "capture source '{}' on {} ({})",
            config.source_name, config.iface, config.spec
        );
        Ok(Self {
            link,
            spec: config.spec,
            last_seq: 0,
            read_buf: vec![0u8; MAX_FRAME].into_boxed_slice(),
            frames: 0,
        })
    }

    /// Frames posted so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// The latency the host should advertise for this source: one maximum
    /// frame's worth of audio.
    pub fn fixed_latency(&self) -> u64 {
        self.spec.bytes_to_usec(crate::wire::MAX_PAYLOAD)
    }

    /// Drain the socket, posting each recovered payload to `host`.
    ///
    /// A hard socket error is returned to the caller; the host is expected
    /// to tear the source down.
    pub fn process_input(&mut self, host: &mut dyn SourcePost) -> Result<(), LinkError> {
        loop {
            match self.link.read(&mut self.read_buf) {
                Ok(view) => {
                    if view.header.seq == self.last_seq {
                        continue; // retransmission of the last frame
                    }
                    if !self.spec.is_frame_aligned(view.payload.len()) {
                        continue;
                    }
                    self.last_seq = view.header.seq;
                    self.frames += 1;
                    host.post(view.payload);
                }
                Err(ReadError::Again) => return Ok(()),
                Err(ReadError::Malformed(_)) => {}
                Err(ReadError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(ReadError::Io(e)) => {
                    error!("failed to read wireless data: {e}");
                    return Err(LinkError::Io(e));
                }
            }
        }
    }
}

impl AsRawFd for SourceStream {
    fn as_raw_fd(&self) -> RawFd {
        self.link.as_raw_fd()
    }
}

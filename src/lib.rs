//! iwab: one-way audio broadcast over a monitor-mode 802.11 link.
//!
//! A sender renders PCM from a host audio mixer into fixed-size frames,
//! wraps each frame in a radiotap + 802.11 QoS-data preamble plus a small
//! application header, and broadcasts it on a raw wireless interface. A
//! receiver on another station recovers the frames, reconstructs the stream
//! under loss and reordering, and feeds a bounded jitter queue consumed by
//! its own mixer.
//!
//! - Output: [`output::OutputStream`] exposes the transmit engine as an
//!   audio sink (pull-mode render source, paced wall-clock sends with one
//!   optional retransmission per frame).
//! - Input: [`input::InputStream`] exposes the receive engine as a sink
//!   input (drain-on-readable, duplicate/stale rejection, gap fill,
//!   cork/resume); [`input::SourceStream`] is the thinner capture-source
//!   variant.
//!
//! Audio format notes: the wire carries raw interleaved PCM, S16LE 44.1kHz
//! stereo by default. Both ends must be configured with the same sample
//! spec; there is no in-band negotiation.

pub mod config;
pub mod error;
pub mod host;
pub mod input;
pub mod jitter;
pub mod link;
pub mod output;
pub mod sample;
pub mod time;
pub mod wire;

pub use config::{InputConfig, OutputConfig, SourceConfig};
pub use error::{ConfigError, FrameError, LinkError};
pub use host::{HostEvent, RenderSource, SinkControl, SinkMessage, SinkState, SourcePost};
pub use input::{InputStream, SourceStream};
pub use jitter::{JitterConfig, JitterQueue};
pub use link::{FrameEncoder, LinkSocket};
pub use output::OutputStream;
pub use sample::{ChannelMap, SampleFormat, SampleSpec};
pub use time::Clock;

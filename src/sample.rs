//! Sample formats, sample specs and channel maps.
//!
//! The wire carries raw interleaved PCM; every byte count that crosses the
//! transport is aligned to a whole sample frame (`channels ×
//! bytes_per_sample`), and loss accounting converts between bytes and
//! microseconds with the integer math below.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Supported PCM sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S16le,
    S24le,
    S32le,
    F32le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16le => 2,
            SampleFormat::S24le => 3,
            SampleFormat::S32le => 4,
            SampleFormat::F32le => 4,
        }
    }

    /// Byte value that renders as silence when repeated.
    /// All supported formats are signed or float, so zero throughout.
    pub fn silence_byte(self) -> u8 {
        0
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S16le => "s16le",
            SampleFormat::S24le => "s24le",
            SampleFormat::S32le => "s32le",
            SampleFormat::F32le => "float32le",
        }
    }
}

impl FromStr for SampleFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "s16le" | "s16" => Ok(SampleFormat::S16le),
            "s24le" | "s24" => Ok(SampleFormat::S24le),
            "s32le" | "s32" => Ok(SampleFormat::S32le),
            "float32le" | "float32" | "f32le" => Ok(SampleFormat::F32le),
            other => Err(ConfigError::InvalidSampleSpec(format!(
                "unknown sample format '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const RATE_MAX: u32 = 192_000;
pub const CHANNELS_MAX: u8 = 8;

/// A sample specification: format, rate and channel count.
///
/// Sender and receiver must agree on this out of band; there is no in-band
/// negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    pub format: SampleFormat,
    pub rate: u32,
    pub channels: u8,
}

impl Default for SampleSpec {
    /// The current wire default: S16LE, 44.1 kHz, stereo.
    fn default() -> Self {
        Self {
            format: SampleFormat::S16le,
            rate: 44_100,
            channels: 2,
        }
    }
}

impl SampleSpec {
    pub fn is_valid(&self) -> bool {
        self.rate > 0 && self.rate <= RATE_MAX && self.channels > 0 && self.channels <= CHANNELS_MAX
    }

    /// Bytes per sample frame (one sample for every channel).
    pub fn frame_size(&self) -> usize {
        self.format.bytes_per_sample() * self.channels as usize
    }

    pub fn bytes_per_second(&self) -> u64 {
        self.frame_size() as u64 * self.rate as u64
    }

    /// Round `bytes` down to a whole number of sample frames.
    pub fn frame_align(&self, bytes: usize) -> usize {
        bytes - bytes % self.frame_size()
    }

    pub fn is_frame_aligned(&self, bytes: usize) -> bool {
        bytes % self.frame_size() == 0
    }

    /// Playback duration of `bytes` of PCM, in microseconds.
    pub fn bytes_to_usec(&self, bytes: usize) -> u64 {
        bytes as u64 * 1_000_000 / self.bytes_per_second()
    }

    /// Frame-aligned byte count covering `usec` of playback, rounded down.
    pub fn usec_to_bytes(&self, usec: u64) -> usize {
        let bytes = (usec as u128 * self.bytes_per_second() as u128 / 1_000_000) as usize;
        self.frame_align(bytes)
    }
}

impl fmt::Display for SampleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}ch {}Hz", self.format, self.channels, self.rate)
    }
}

/// Speaker positions, PulseAudio naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPosition {
    Mono,
    FrontLeft,
    FrontRight,
    FrontCenter,
    RearLeft,
    RearRight,
    RearCenter,
    Lfe,
    SideLeft,
    SideRight,
}

impl ChannelPosition {
    pub fn name(self) -> &'static str {
        match self {
            ChannelPosition::Mono => "mono",
            ChannelPosition::FrontLeft => "front-left",
            ChannelPosition::FrontRight => "front-right",
            ChannelPosition::FrontCenter => "front-center",
            ChannelPosition::RearLeft => "rear-left",
            ChannelPosition::RearRight => "rear-right",
            ChannelPosition::RearCenter => "rear-center",
            ChannelPosition::Lfe => "lfe",
            ChannelPosition::SideLeft => "side-left",
            ChannelPosition::SideRight => "side-right",
        }
    }
}

impl FromStr for ChannelPosition {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mono" => Ok(ChannelPosition::Mono),
            "front-left" | "left" => Ok(ChannelPosition::FrontLeft),
            "front-right" | "right" => Ok(ChannelPosition::FrontRight),
            "front-center" | "center" => Ok(ChannelPosition::FrontCenter),
            "rear-left" => Ok(ChannelPosition::RearLeft),
            "rear-right" => Ok(ChannelPosition::RearRight),
            "rear-center" => Ok(ChannelPosition::RearCenter),
            "lfe" | "subwoofer" => Ok(ChannelPosition::Lfe),
            "side-left" => Ok(ChannelPosition::SideLeft),
            "side-right" => Ok(ChannelPosition::SideRight),
            other => Err(ConfigError::InvalidValue {
                key: "channel_map",
                value: other.to_owned(),
                reason: "unknown channel position".to_owned(),
            }),
        }
    }
}

/// An ordered channel layout matching a [`SampleSpec`]'s channel count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    /// The default layout for a channel count: mono, stereo, or
    /// front/rear pairs with center and LFE for larger counts.
    pub fn default_for(channels: u8) -> Self {
        use ChannelPosition::*;
        let positions = match channels {
            1 => vec![Mono],
            2 => vec![FrontLeft, FrontRight],
            3 => vec![FrontLeft, FrontRight, FrontCenter],
            4 => vec![FrontLeft, FrontRight, RearLeft, RearRight],
            5 => vec![FrontLeft, FrontRight, FrontCenter, RearLeft, RearRight],
            6 => vec![FrontLeft, FrontRight, FrontCenter, Lfe, RearLeft, RearRight],
            7 => vec![
                FrontLeft,
                FrontRight,
                FrontCenter,
                Lfe,
                RearCenter,
                SideLeft,
                SideRight,
            ],
            _ => vec![
                FrontLeft,
                FrontRight,
                FrontCenter,
                Lfe,
                RearLeft,
                RearRight,
                SideLeft,
                SideRight,
            ],
        };
        Self { positions }
    }

    /// Parse a comma-separated position list, or the `mono`/`stereo`
    /// shorthands.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let positions = match s {
            "stereo" => vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
            "mono" => vec![ChannelPosition::Mono],
            list => list
                .split(',')
                .map(|name| name.trim().parse())
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(Self { positions })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }

    /// Check the map against a sample spec's channel count.
    pub fn matches(&self, spec: &SampleSpec) -> bool {
        self.positions.len() == spec.channels as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_spec() {
        let ss = SampleSpec::default();
        assert!(ss.is_valid());
        assert_eq!(ss.frame_size(), 4);
        assert_eq!(ss.bytes_per_second(), 176_400);
    }

    #[test]
    fn test_usec_bytes_roundtrip() {
        let ss = SampleSpec::default();
        // 1400 bytes at S16LE/44100/2ch is 7936us (floor)
        assert_eq!(ss.bytes_to_usec(1400), 7936);
        // converting back floors twice (µs, then frame alignment), so the
        // result may sit one frame short of the original
        let back = ss.usec_to_bytes(7936);
        assert!(back <= 1400 && 1400 - back <= ss.frame_size());
    }

    #[test]
    fn test_frame_align() {
        let ss = SampleSpec::default();
        assert_eq!(ss.frame_align(1400), 1400);
        assert_eq!(ss.frame_align(1401), 1400);
        assert_eq!(ss.frame_align(3), 0);
    }

    #[test]
    fn test_channel_map_parse() {
        let map = ChannelMap::parse("front-left,front-right").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map, ChannelMap::parse("stereo").unwrap());
        assert!(map.matches(&SampleSpec::default()));
        assert!(ChannelMap::parse("front-left,what").is_err());
    }
}

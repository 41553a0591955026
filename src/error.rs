//! Error types for the iwab transport.

use std::io;
use thiserror::Error;

/// Errors raised while parsing module arguments or validating a
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed argument '{0}', expected key=value")]
    MalformedArgument(String),
    #[error("unknown argument '{0}'")]
    UnknownArgument(String),
    #[error("invalid value '{value}' for '{key}': {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("invalid sample spec: {0}")]
    InvalidSampleSpec(String),
    #[error("channel map has {map} positions but spec has {channels} channels")]
    ChannelMapMismatch { map: usize, channels: u8 },
}

/// Errors from the link-layer socket.
///
/// Only [`LinkError::InterfaceOpen`] (at init) and a hard [`LinkError::Io`]
/// on send (at run time) are fatal to a stream; everything frame-shaped is a
/// [`FrameError`] and is absorbed by the receive loop.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("failed to open interface '{iface}': {source}")]
    InterfaceOpen {
        iface: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Reasons a received link-layer frame was rejected by the codec.
///
/// All of these mean "not a valid iwab frame, keep draining"; the receive
/// loop counts them and carries on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Too short to cover the declared radiotap length plus a dot11 header.
    #[error("truncated frame: {got} bytes cannot cover {need} of headers")]
    Truncated { got: usize, need: usize },
    /// Not an 802.11 QoS data frame.
    #[error("not a QoS data frame (type {ftype}, subtype {subtype})")]
    NotQosData { ftype: u8, subtype: u8 },
    /// One of the three address fields does not match the group filter.
    #[error("address filter mismatch")]
    AddressFilter,
    /// Remainder cannot cover the app header, one aligned sample frame and
    /// the FCS trailer.
    #[error("short payload: {got} bytes after dot11, need at least {need}")]
    ShortPayload { got: usize, need: usize },
}

/// Outcome classes of a non-blocking link read.
#[derive(Debug)]
pub enum ReadError {
    /// Socket drained, no more datagrams pending.
    Again,
    /// A datagram arrived but it is not a valid iwab frame.
    Malformed(FrameError),
    /// Hard socket error.
    Io(io::Error),
}

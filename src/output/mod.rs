//! Transmit side: the paced sender exposed as an audio sink.

pub mod stream;

pub use stream::{OutputStats, OutputStream};

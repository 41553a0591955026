//! Transmit demo: a 440 Hz tone broadcast on a monitor-mode interface.
//!
//! Usage: cargo run --example tx_tone [iface]
//!
//! Needs CAP_NET_RAW (or root) and an interface in monitor mode. Pair it
//! with the rx_play demo on another station.

use std::env;
use std::f32::consts::TAU;
use std::thread;
use std::time::Duration;

use iwab::{HostEvent, OutputConfig, OutputStream, RenderSource, SinkState};

/// Renders a quiet stereo sine as S16LE.
struct Tone {
    phase: f32,
    step: f32,
}

impl Tone {
    fn new(freq: f32, rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: TAU * freq / rate as f32,
        }
    }
}

impl RenderSource for Tone {
    fn render(&mut self, buf: &mut [u8]) -> usize {
        for frame in buf.chunks_exact_mut(4) {
            let sample = ((self.phase.sin() * 0.2) * i16::MAX as f32) as i16;
            let bytes = sample.to_le_bytes();
            frame[0..2].copy_from_slice(&bytes);
            frame[2..4].copy_from_slice(&bytes);
            self.phase = (self.phase + self.step) % TAU;
        }
        buf.len() - buf.len() % 4
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut config = OutputConfig::default();
    if let Some(iface) = env::args().nth(1) {
        config.iface = iface;
    }

    let tone = Tone::new(440.0, config.spec.rate);
    let mut stream = OutputStream::new(config, Box::new(tone))?;
    stream.set_state(SinkState::Opened);
    println!("transmitting, ctrl-c to stop");

    loop {
        thread::sleep(Duration::from_secs(2));
        if let Ok(HostEvent::UnloadRequest) = stream.events().try_recv() {
            eprintln!("transmitter failed, shutting down");
            break;
        }
        let stats = stream.stats();
        println!(
            "{} frames, {} retries, latency {}us",
            stats.frames_sent,
            stats.retries_sent,
            stream.latency()
        );
    }

    stream.shutdown();
    Ok(())
}

//! Receive demo: wireless input played back through cpal.
//!
//! Usage: cargo run --example rx_play [iface]
//!
//! Audio flows: monitor interface → InputStream → SPSC ring → cpal
//! callback → soundcard. The ring decouples the I/O loop from the audio
//! callback the same way a host mixer's own buffering would.

use std::collections::HashMap;
use std::env;
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

use iwab::{InputConfig, InputStream, SinkControl};

/// Stand-in for the consuming sink: cork state and published properties.
struct PlaybackHost {
    corked: Arc<AtomicBool>,
    properties: Arc<Mutex<HashMap<String, String>>>,
}

impl SinkControl for PlaybackHost {
    fn request_cork(&mut self, cork: bool) {
        println!("{}", if cork { "corked" } else { "resumed" });
        self.corked.store(cork, Ordering::Relaxed);
    }

    fn set_property(&mut self, key: &str, value: String) {
        println!("{key} = {value}");
        self.properties.lock().insert(key.to_owned(), value);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut config = InputConfig::default();
    if let Some(iface) = env::args().nth(1) {
        config.iface = iface;
    }
    let spec = config.spec;

    let corked = Arc::new(AtomicBool::new(false));
    let host = PlaybackHost {
        corked: Arc::clone(&corked),
        properties: Arc::new(Mutex::new(HashMap::new())),
    };
    let mut stream = InputStream::new(config, Box::new(host))?;
    let fd = stream.as_raw_fd();

    // half a second of float samples between the I/O loop and the callback
    let ring = HeapRb::<f32>::new(spec.rate as usize * spec.channels as usize / 2);
    let (mut producer, mut consumer) = ring.split();

    let device = cpal::default_host()
        .default_output_device()
        .ok_or("no output device")?;
    let cpal_config = cpal::StreamConfig {
        channels: spec.channels as u16,
        sample_rate: cpal::SampleRate(spec.rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let playback = device.build_output_stream(
        &cpal_config,
        move |data: &mut [f32], _| {
            let got = consumer.pop_slice(data);
            data[got..].fill(0.0);
        },
        |e| eprintln!("playback error: {e}"),
        None,
    )?;
    playback.play()?;
    println!("listening, ctrl-c to stop");

    let mut chunk = Vec::new();
    loop {
        let mut fds = [libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        }];
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, 100) };
        if ready > 0 && (fds[0].revents & libc::POLLIN) != 0 {
            stream.process_input();
        }

        // move whole frames into the ring while there is room
        while producer.vacant_len() >= 1400 / 2 {
            match stream.pop(1400, &mut chunk) {
                Ok(_) => {
                    for sample in chunk.chunks_exact(2) {
                        let value = i16::from_le_bytes([sample[0], sample[1]]);
                        producer.try_push(value as f32 / 32768.0).ok();
                    }
                }
                Err(_) => break,
            }
        }
    }
}

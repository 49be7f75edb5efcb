//! Operator-side stream viewer
//!
//! Connects to an appliance's video transport and saves every received
//! frame as a JPEG, printing the running frame rate.
//!
//! ```text
//! cargo run --example stream_viewer -- tcp 192.168.137.141:8000 frames/
//! cargo run --example stream_viewer -- udp 192.168.137.141:8000 frames/ 0.0.0.0:8000
//! ```

use netra_io::capture::Frame;
use netra_io::streaming::{TcpFrameReceiver, UdpFrameReceiver, UdpReceive};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const JPEG_QUALITY: u8 = 90;

enum Receiver {
    Tcp(TcpFrameReceiver),
    Udp(UdpFrameReceiver),
}

impl Receiver {
    fn next(&mut self) -> netra_io::Result<Option<Frame>> {
        match self {
            Receiver::Tcp(rx) => rx.receive(),
            Receiver::Udp(rx) => match rx.receive()? {
                UdpReceive::Frame(frame) => Ok(Some(frame)),
                UdpReceive::NoFrame => Ok(None),
                UdpReceive::Timeout(_) => {
                    // The server may have restarted and forgotten us
                    rx.register()?;
                    Ok(None)
                }
            },
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("usage: {} <tcp|udp> <server:port> <out-dir> [udp-bind]", args[0]);
        std::process::exit(2);
    }
    let server: SocketAddr = args[2].parse()?;
    let out_dir = PathBuf::from(&args[3]);
    std::fs::create_dir_all(&out_dir)?;

    let mut receiver = match args[1].as_str() {
        "tcp" => Receiver::Tcp(TcpFrameReceiver::connect(server, Duration::from_secs(3))?),
        "udp" => {
            let bind = args
                .get(4)
                .cloned()
                .unwrap_or_else(|| format!("0.0.0.0:{}", server.port()));
            Receiver::Udp(UdpFrameReceiver::connect(&bind, server, Duration::from_secs(1))?)
        }
        other => return Err(format!("unknown transport {:?}", other).into()),
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || r.store(false, Ordering::Relaxed))?;

    let mut saved = 0u64;
    let mut window_start = Instant::now();
    let mut window_frames = 0u32;
    while running.load(Ordering::Relaxed) {
        let Some(frame) = receiver.next()? else {
            continue;
        };
        saved += 1;
        window_frames += 1;
        save(&frame, &out_dir, saved)?;

        let elapsed = window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            log::info!(
                "{:.1} fps, {}x{}, {} frames saved",
                f64::from(window_frames) / elapsed.as_secs_f64(),
                frame.width(),
                frame.height(),
                saved
            );
            window_start = Instant::now();
            window_frames = 0;
        }
    }
    log::info!("Saved {} frames to {}", saved, out_dir.display());
    if let Receiver::Udp(rx) = &receiver {
        log::info!("{} datagrams rejected as malformed or foreign", rx.rejected());
    }
    Ok(())
}

fn save(frame: &Frame, dir: &Path, index: u64) -> netra_io::Result<()> {
    let jpeg = frame.encode_jpeg(JPEG_QUALITY)?;
    std::fs::write(dir.join(format!("frame_{:06}.jpg", index)), jpeg)?;
    Ok(())
}

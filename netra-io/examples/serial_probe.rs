//! Serial control link probe
//!
//! Plays the robot controller: sends one framed task signal and prints the
//! framed reply, with the raw bytes in hex for protocol debugging.
//!
//! ```text
//! cargo run --example serial_probe -- /dev/ttyUSB0 3
//! cargo run --example serial_probe -- /dev/ttyUSB0 3 115200 @ #
//! ```

use netra_io::control::{ControlLink, Delimiters, FramedChannel, encode_frame};
use netra_io::transport::SerialTransport;
use std::time::Duration;

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!(
            "usage: {} <port> <signal> [baud] [head] [tail]",
            args.first().map(String::as_str).unwrap_or("serial_probe")
        );
        std::process::exit(2);
    }
    let port = &args[1];
    let signal = &args[2];
    let baud: u32 = args.get(3).map(|b| b.parse()).transpose()?.unwrap_or(115200);
    let head = args.get(4).map(String::as_str).unwrap_or("@");
    let tail = args.get(5).map(String::as_str).unwrap_or("#");

    let delimiters = Delimiters::new(head, tail)?;
    log::info!("Opening {} at {} baud...", port, baud);
    let transport = SerialTransport::open(port, baud)?;
    let mut channel = FramedChannel::new(Box::new(transport), delimiters.clone());
    // Stale replies from an earlier run would be taken for ours
    channel.discard_pending()?;

    let frame = encode_frame(signal, &delimiters)?;
    log::info!("Sending {:?} ({})", String::from_utf8_lossy(&frame), hex(&frame));
    channel.write(signal)?;

    match channel.read_timeout(REPLY_TIMEOUT)? {
        Some(reply) => {
            let framed = encode_frame(&reply, &delimiters)?;
            println!("{}", reply);
            log::info!("Reply {:?} ({})", String::from_utf8_lossy(&framed), hex(&framed));
        }
        None => {
            log::warn!("No reply within {:?}", REPLY_TIMEOUT);
            std::process::exit(1);
        }
    }
    Ok(())
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

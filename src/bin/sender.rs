//! Test Tone Sender
//!
//! Streams a continuous sine wave in the receiver's datagram format, paced in
//! real time. Optional simulated loss skips sequence numbers so the
//! receiver's drop statistics can be exercised.

use anyhow::{bail, Result};
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_audio_receiver::{
    codec::{PacketEncoder, ToneGenerator},
    constants::{DEFAULT_PACKET_MS, DEFAULT_SAMPLE_RATE},
};

/// UDP audio packet sender (test tool)
#[derive(Parser, Debug)]
#[command(name = "sender", version)]
struct Args {
    /// Target host/IP address
    host: String,

    /// Target UDP port
    port: u16,

    /// Audio sample rate in Hz
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    /// Sine wave frequency in Hz
    #[arg(long, default_value_t = 440.0)]
    frequency: f64,

    /// Amplitude as a fraction of full scale
    #[arg(long, default_value_t = 0.3)]
    amplitude: f64,

    /// Duration of each packet in milliseconds
    #[arg(long, default_value_t = DEFAULT_PACKET_MS)]
    packet_ms: f32,

    /// Drop roughly one packet in N (0 disables)
    #[arg(long, default_value_t = 0)]
    drop_every: u32,

    /// Stop after this many packets (0 runs until Ctrl+C)
    #[arg(long, default_value_t = 0)]
    count: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.port == 0 {
        bail!("Port must be between 1 and 65535");
    }
    if args.sample_rate == 0 {
        bail!("Sample rate must be positive");
    }
    if args.frequency <= 0.0 {
        bail!("Frequency must be positive");
    }
    if args.packet_ms <= 0.0 {
        bail!("Packet duration must be positive");
    }

    let target: SocketAddr = (args.host.as_str(), args.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::anyhow!("Could not resolve {}", args.host))?;

    let samples_per_packet = ((args.sample_rate as f32 * args.packet_ms / 1000.0) as usize).max(1);
    let packet_interval = Duration::from_secs_f64(samples_per_packet as f64 / args.sample_rate as f64);

    let socket = UdpSocket::bind(if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" })?;

    tracing::info!("Sending audio packets to {}", target);
    tracing::info!(
        "Sample rate: {} Hz, tone: {} Hz, {} samples/packet ({:?})",
        args.sample_rate,
        args.frequency,
        samples_per_packet,
        packet_interval
    );
    tracing::info!("Frame format: [2-byte seq#][4-byte sample timestamp][audio samples]");
    tracing::info!("Press Ctrl+C to stop");

    let mut tone = ToneGenerator::new(args.frequency, args.sample_rate, args.amplitude);
    let mut encoder = PacketEncoder::new();
    let mut block = vec![0i16; samples_per_packet];
    let mut skipped: u64 = 0;
    let mut next_send = Instant::now();
    let mut last_report = Instant::now();

    loop {
        tone.fill(&mut block);

        let emitted = encoder.stats().packets_encoded + skipped;
        if args.drop_every > 0 && emitted > 0 && emitted % args.drop_every as u64 == 0 {
            encoder.skip(1, samples_per_packet);
            skipped += 1;
        } else {
            let packet = encoder.next_packet(&block);
            if let Err(e) = socket.send_to(&packet, target) {
                tracing::warn!("Failed to send packet: {}", e);
            }
        }

        if args.count > 0 && encoder.stats().packets_encoded + skipped >= args.count {
            break;
        }

        if last_report.elapsed() >= Duration::from_secs(5) {
            last_report = Instant::now();
            let stats = encoder.stats();
            tracing::info!(
                "Sent {} packets ({:.1} KB), skipped {}, next seq {}",
                stats.packets_encoded,
                stats.bytes_produced as f64 / 1024.0,
                skipped,
                encoder.sequence()
            );
        }

        // Sleep to maintain real-time rate
        next_send += packet_interval;
        let now = Instant::now();
        if next_send > now {
            std::thread::sleep(next_send - now);
        } else {
            next_send = now;
        }
    }

    let stats = encoder.stats();
    println!("\nSent {} total packets", stats.packets_encoded);
    println!("Skipped {} packets", skipped);
    println!("Final sequence number: {}", encoder.sequence().wrapping_sub(1));
    println!("Final sample timestamp: {}", encoder.timestamp());

    Ok(())
}

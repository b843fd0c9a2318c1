//! Audio Receiver Application
//!
//! Listens for PCM datagrams, plays them on the default output device and
//! optionally saves them to a WAV file.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use udp_audio_receiver::{
    audio::device::list_output_devices, config::AppConfig, ui::WebServer, UdpAudioStreamer,
};

/// Receive a UDP PCM audio stream and play it back
#[derive(Parser, Debug)]
#[command(name = "receiver", version)]
struct Args {
    /// UDP port to listen on
    port: Option<u16>,

    /// Audio sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Save received audio to a WAV file
    #[arg(long)]
    save_file: Option<PathBuf>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Render on a timer instead of a sound device
    #[arg(long)]
    headless: bool,

    /// Serve statistics over HTTP
    #[arg(long)]
    http: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => AppConfig::load_or_default()?,
    };

    if let Some(port) = args.port {
        config.network.udp_port = port;
    }
    if let Some(rate) = args.sample_rate {
        config.audio.sample_rate = rate;
    }
    if let Some(path) = &args.save_file {
        config.recording.save_file = Some(path.clone());
    }
    if let Some(device) = &args.device {
        config.audio.output_device = Some(device.clone());
    }
    config.audio.headless |= args.headless;
    config.ui.enabled |= args.http;

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_devices {
        println!("\n=== Available Output Devices ===");
        for device in list_output_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}{}:", device.name, default_marker);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        return Ok(());
    }

    let config = load_config(&args)?;

    tracing::info!("Starting UDP Audio Receiver");

    let mut streamer = UdpAudioStreamer::new(config.clone())?;
    streamer.start().context("failed to start receiver")?;

    if config.ui.enabled {
        let web_server = WebServer::new(
            config.ui.clone(),
            streamer.session().clone(),
            config.network.udp_port,
            config.recording.save_file.is_some(),
        );
        let _web_handle = web_server.start_background();
    }

    tracing::info!("Press Ctrl+C to stop...");

    let mut stats_interval = tokio::time::interval(Duration::from_secs(5));
    stats_interval.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
                break;
            }
            _ = stats_interval.tick() => {
                while let Some(e) = streamer.poll_output_error() {
                    tracing::error!("Audio output: {}", e);
                }

                let stats = streamer.statistics();
                tracing::info!(
                    "Stats: {} received, {} dropped ({:.2}%), {} out of order, {} rejected, buffer {}/{}, {} underruns",
                    stats.packets_received,
                    stats.packets_dropped,
                    stats.drop_rate_percent(),
                    stats.packets_out_of_order,
                    stats.transport_errors,
                    stats.buffer_level,
                    stats.buffer_capacity,
                    stats.underruns
                );
                let receiver = streamer.receiver_stats();
                if receiver.socket_errors > 0 {
                    tracing::warn!("{} socket receive errors so far", receiver.socket_errors);
                }
            }
        }
    }

    // Joining the receive thread blocks for up to one socket timeout
    let stats = tokio::task::spawn_blocking(move || streamer.stop()).await?;

    println!("\nPacket Statistics:");
    println!("  Packets received: {}", stats.packets_received);
    println!("  Packets dropped: {}", stats.packets_dropped);
    println!("  Packets out of order: {}", stats.packets_out_of_order);
    println!("  Bytes received: {}", stats.bytes_received);
    println!("  Malformed datagrams: {}", stats.transport_errors);
    println!("  Drop rate: {:.2}%", stats.drop_rate_percent());

    tracing::info!("UDP Audio Receiver finished");
    Ok(())
}

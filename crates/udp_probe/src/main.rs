use anyhow::Context;
use clap::Parser;
use iqdemod_core::protocol::decode_audio_block;
use std::io::IsTerminal;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;

#[derive(Debug, Parser)]
#[command(
    name = "udp_probe",
    version,
    about = "Listen for iqdemod audio datagrams and print a short summary of each."
)]
struct Args {
    /// Local address to bind (example: 0.0.0.0:7355)
    bind: SocketAddr,

    /// Multicast group to join on the default interface
    #[arg(long)]
    group: Option<Ipv4Addr>,

    /// Number of datagrams to print before exiting
    #[arg(long, default_value_t = 10)]
    count: usize,

    /// Per-datagram receive timeout (milliseconds)
    #[arg(long, default_value_t = 4000)]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .with_writer(std::io::stdout)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .map_err(|e| anyhow::anyhow!("init tracing: {e}"))?;

    let args = Args::parse();
    let socket = UdpSocket::bind(args.bind)
        .await
        .with_context(|| format!("bind {}", args.bind))?;
    if let Some(group) = args.group {
        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .with_context(|| format!("join multicast group {group}"))?;
    }
    tracing::info!(bind = %args.bind, group = ?args.group, "listening");

    let mut buf = vec![0u8; 65_536];
    for idx in 0..args.count {
        let (len, from) = tokio::time::timeout(
            Duration::from_millis(args.timeout_ms),
            socket.recv_from(&mut buf),
        )
        .await
        .context("timeout")?
        .context("receive datagram")?;

        let samples = decode_audio_block(&buf[..len]);
        let (peak, rms) = levels(&samples);
        tracing::info!(
            idx,
            from = %from,
            bytes = len,
            samples = samples.len(),
            peak,
            rms,
            "audio"
        );
    }

    Ok(())
}

fn levels(samples: &[f32]) -> (f32, f32) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mut peak = 0.0f32;
    let mut sum_sq = 0.0f64;
    for s in samples {
        peak = peak.max(s.abs());
        sum_sq += f64::from(*s) * f64::from(*s);
    }
    (peak, (sum_sq / samples.len() as f64).sqrt() as f32)
}
